//! Portal (service) IP allocation

use keel_types::IpRange;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortalError {
    #[error("portal net {0} is exhausted")]
    Exhausted(IpRange),

    #[error("{ip} is not in portal net {range}")]
    OutOfRange { ip: Ipv4Addr, range: IpRange },

    #[error("{0} is already allocated")]
    InUse(Ipv4Addr),

    #[error("{0} is reserved for the master services")]
    Reserved(Ipv4Addr),

    #[error("invalid portal IP {0:?}")]
    Malformed(String),
}

/// Offsets held back for the read-write and read-only master services.
pub const MASTER_RESERVED_OFFSETS: [u64; 2] = [1, 2];

/// Hands out addresses from the portal net.
///
/// The network and broadcast addresses are never allocated. Reserved
/// offsets are only handed out through [`PortalAllocator::claim_reserved`].
#[derive(Debug)]
pub struct PortalAllocator {
    range: IpRange,
    reserved: BTreeSet<u64>,
    used: Mutex<BTreeSet<u64>>,
}

impl PortalAllocator {
    pub fn new(range: IpRange) -> Self {
        Self::with_reserved(range, MASTER_RESERVED_OFFSETS)
    }

    pub fn with_reserved(range: IpRange, reserved: impl IntoIterator<Item = u64>) -> Self {
        Self {
            range,
            reserved: reserved.into_iter().collect(),
            used: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn range(&self) -> IpRange {
        self.range
    }

    fn usable(&self, offset: u64) -> bool {
        offset > 0 && offset + 1 < self.range.size()
    }

    pub fn allocate_next(&self) -> Result<Ipv4Addr, PortalError> {
        let mut used = self.used.lock();
        let offset = (1..self.range.size().saturating_sub(1))
            .find(|o| !self.reserved.contains(o) && !used.contains(o))
            .ok_or(PortalError::Exhausted(self.range))?;
        used.insert(offset);
        self.range.nth(offset).ok_or(PortalError::Exhausted(self.range))
    }

    fn offset(&self, ip: Ipv4Addr) -> Result<u64, PortalError> {
        self.range
            .offset_of(ip)
            .filter(|o| self.usable(*o))
            .ok_or(PortalError::OutOfRange {
                ip,
                range: self.range,
            })
    }

    fn mark(&self, ip: Ipv4Addr, offset: u64) -> Result<(), PortalError> {
        if !self.used.lock().insert(offset) {
            return Err(PortalError::InUse(ip));
        }
        Ok(())
    }

    /// Reserves a user-requested address. Reserved offsets are refused.
    pub fn allocate(&self, ip: Ipv4Addr) -> Result<(), PortalError> {
        let offset = self.offset(ip)?;
        if self.reserved.contains(&offset) {
            return Err(PortalError::Reserved(ip));
        }
        self.mark(ip, offset)
    }

    /// Claims the reserved address at `offset` for a master service.
    pub fn claim_reserved(&self, offset: u64) -> Result<Ipv4Addr, PortalError> {
        let ip = self
            .range
            .nth(offset)
            .filter(|_| self.usable(offset) && self.reserved.contains(&offset))
            .ok_or(PortalError::Exhausted(self.range))?;
        self.mark(ip, offset)?;
        Ok(ip)
    }

    /// Parses and reserves `ip`.
    pub fn allocate_str(&self, ip: &str) -> Result<Ipv4Addr, PortalError> {
        let addr: Ipv4Addr = ip
            .parse()
            .map_err(|_| PortalError::Malformed(ip.to_string()))?;
        self.allocate(addr)?;
        Ok(addr)
    }

    pub fn release(&self, ip: Ipv4Addr) {
        if let Some(offset) = self.range.offset_of(ip) {
            self.used.lock().remove(&offset);
        }
    }

    pub fn is_allocated(&self, ip: Ipv4Addr) -> bool {
        self.range
            .offset_of(ip)
            .map(|o| self.used.lock().contains(&o))
            .unwrap_or(false)
    }

    /// Marks addresses already held by stored services as used, reserved
    /// ones included. Returns how many were recorded.
    pub fn sync<'a>(&self, portal_ips: impl IntoIterator<Item = &'a str>) -> usize {
        let mut recorded = 0;
        for ip in portal_ips {
            let held = ip
                .parse::<Ipv4Addr>()
                .map_err(|_| PortalError::Malformed(ip.to_string()))
                .and_then(|addr| self.offset(addr).and_then(|o| self.mark(addr, o)));
            match held {
                Ok(()) => recorded += 1,
                Err(PortalError::InUse(_)) => {}
                Err(e) => tracing::warn!(error = %e, "Ignoring stored portal IP"),
            }
        }
        recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator() -> PortalAllocator {
        PortalAllocator::new("10.0.0.0/29".parse().unwrap())
    }

    #[test]
    fn test_skips_network_broadcast_and_reserved() {
        let a = allocator();
        for last in 3..=6 {
            assert_eq!(a.allocate_next().unwrap(), Ipv4Addr::new(10, 0, 0, last));
        }
        assert!(matches!(a.allocate_next(), Err(PortalError::Exhausted(_))));
        assert!(!a.is_allocated(Ipv4Addr::new(10, 0, 0, 1)));

        assert!(matches!(
            a.allocate(Ipv4Addr::new(10, 0, 0, 7)),
            Err(PortalError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_reserved_only_claimed_by_master() {
        let a = allocator();
        assert_eq!(
            a.allocate_str("10.0.0.1"),
            Err(PortalError::Reserved(Ipv4Addr::new(10, 0, 0, 1)))
        );
        assert_eq!(
            a.allocate(Ipv4Addr::new(10, 0, 0, 2)),
            Err(PortalError::Reserved(Ipv4Addr::new(10, 0, 0, 2)))
        );

        assert_eq!(a.claim_reserved(1).unwrap(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(a.claim_reserved(1), Err(PortalError::InUse(Ipv4Addr::new(10, 0, 0, 1))));
        assert!(a.claim_reserved(3).is_err());
    }

    #[test]
    fn test_tiny_net_has_nothing_for_users() {
        let a = PortalAllocator::new("10.0.0.0/30".parse().unwrap());
        assert!(matches!(a.allocate_next(), Err(PortalError::Exhausted(_))));
        assert_eq!(a.claim_reserved(2).unwrap(), Ipv4Addr::new(10, 0, 0, 2));

        let open =
            PortalAllocator::with_reserved("10.0.0.0/30".parse().unwrap(), std::iter::empty());
        assert_eq!(open.allocate_next().unwrap(), Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn test_explicit_and_release() {
        let a = allocator();
        a.allocate(Ipv4Addr::new(10, 0, 0, 4)).unwrap();
        assert!(matches!(
            a.allocate(Ipv4Addr::new(10, 0, 0, 4)),
            Err(PortalError::InUse(_))
        ));
        assert_eq!(a.allocate_next().unwrap(), Ipv4Addr::new(10, 0, 0, 3));

        a.release(Ipv4Addr::new(10, 0, 0, 4));
        assert!(!a.is_allocated(Ipv4Addr::new(10, 0, 0, 4)));
        assert_eq!(a.allocate_next().unwrap(), Ipv4Addr::new(10, 0, 0, 4));
    }

    #[test]
    fn test_sync_from_stored() {
        let a = allocator();
        let stored = ["10.0.0.1", "10.0.0.1", "10.0.0.5", "192.168.0.1", "junk"];
        assert_eq!(a.sync(stored), 2);
        assert!(a.is_allocated(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(a.is_allocated(Ipv4Addr::new(10, 0, 0, 5)));
    }
}
