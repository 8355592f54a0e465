//! Resource quantities
//!
//! A [`Quantity`] is stored as an integer number of thousandths so that CPU
//! millicores and byte counts share one representation without floating
//! point. The textual form follows the usual suffix conventions: `m` for
//! milli, `k`/`M`/`G`/`T` decimal and `Ki`/`Mi`/`Gi`/`Ti` binary.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const RESOURCE_CPU: &str = "cpu";
pub const RESOURCE_MEMORY: &str = "memory";
pub const RESOURCE_STORAGE: &str = "storage";
pub const RESOURCE_PODS: &str = "pods";
pub const RESOURCE_SERVICES: &str = "services";
pub const RESOURCE_REPLICATION_CONTROLLERS: &str = "replicationcontrollers";
pub const RESOURCE_QUOTAS: &str = "resourcequotas";
pub const RESOURCE_PERSISTENT_VOLUME_CLAIMS: &str = "persistentvolumeclaims";

/// Named resource amounts.
pub type ResourceList = BTreeMap<String, Quantity>;

/// Preferred rendering of a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantityFormat {
    #[default]
    DecimalSI,
    BinarySI,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid number in quantity {0:?}")]
    InvalidNumber(String),

    #[error("unknown suffix {0:?}")]
    UnknownSuffix(String),

    #[error("quantity {0:?} is out of range")]
    Overflow(String),
}

/// A non-negative resource amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quantity {
    milli: i64,
    format: QuantityFormat,
}

const KI: i64 = 1024;

impl Quantity {
    /// Whole units, e.g. bytes for memory.
    pub fn new(value: i64, format: QuantityFormat) -> Self {
        Self {
            milli: value.saturating_mul(1000),
            format,
        }
    }

    /// Thousandths of a unit, e.g. millicores for CPU.
    pub fn new_milli(milli: i64, format: QuantityFormat) -> Self {
        Self { milli, format }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn format(&self) -> QuantityFormat {
        self.format
    }

    pub fn milli_value(&self) -> i64 {
        self.milli
    }

    /// Whole units, rounded up.
    pub fn value(&self) -> i64 {
        if self.milli % 1000 == 0 {
            self.milli / 1000
        } else {
            self.milli / 1000 + 1
        }
    }

    pub fn is_zero(&self) -> bool {
        self.milli == 0
    }

    pub fn is_positive(&self) -> bool {
        self.milli > 0
    }

    pub fn add(&mut self, other: Quantity) {
        self.milli = self.milli.saturating_add(other.milli);
    }

    pub fn saturating_sub(&self, other: Quantity) -> Quantity {
        Quantity {
            milli: (self.milli - other.milli).max(0),
            format: self.format,
        }
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.milli == other.milli
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.milli.cmp(&other.milli)
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (number, suffix) = s.split_at(split);

        let (multiplier, format): (i128, QuantityFormat) = match suffix {
            "m" => (1, QuantityFormat::DecimalSI),
            "" => (1_000, QuantityFormat::DecimalSI),
            "k" => (1_000_000, QuantityFormat::DecimalSI),
            "M" => (1_000_000_000, QuantityFormat::DecimalSI),
            "G" => (1_000_000_000_000, QuantityFormat::DecimalSI),
            "T" => (1_000_000_000_000_000, QuantityFormat::DecimalSI),
            "Ki" => ((KI as i128) * 1_000, QuantityFormat::BinarySI),
            "Mi" => ((KI as i128).pow(2) * 1_000, QuantityFormat::BinarySI),
            "Gi" => ((KI as i128).pow(3) * 1_000, QuantityFormat::BinarySI),
            "Ti" => ((KI as i128).pow(4) * 1_000, QuantityFormat::BinarySI),
            other => return Err(QuantityError::UnknownSuffix(other.to_string())),
        };

        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(QuantityError::InvalidNumber(s.to_string()));
        }
        if frac.len() > 18 {
            return Err(QuantityError::InvalidNumber(s.to_string()));
        }

        let parse = |digits: &str| -> Result<i128, QuantityError> {
            if digits.is_empty() {
                Ok(0)
            } else {
                digits
                    .parse::<i128>()
                    .map_err(|_| QuantityError::InvalidNumber(s.to_string()))
            }
        };

        let whole = parse(whole)?;
        let frac_value = parse(frac)?;
        let scale = 10i128.pow(frac.len() as u32);

        let milli = whole
            .checked_mul(multiplier)
            .and_then(|w| w.checked_add(frac_value * multiplier / scale))
            .ok_or_else(|| QuantityError::Overflow(s.to_string()))?;

        let milli = i64::try_from(milli).map_err(|_| QuantityError::Overflow(s.to_string()))?;
        Ok(Self { milli, format })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.milli % 1000 != 0 {
            return write!(f, "{}m", self.milli);
        }
        let value = self.milli / 1000;
        if value == 0 {
            return write!(f, "0");
        }

        let suffixes: &[(i64, &str)] = match self.format {
            QuantityFormat::BinarySI => &[
                (KI * KI * KI * KI, "Ti"),
                (KI * KI * KI, "Gi"),
                (KI * KI, "Mi"),
                (KI, "Ki"),
            ],
            QuantityFormat::DecimalSI => &[
                (1_000_000_000_000, "T"),
                (1_000_000_000, "G"),
                (1_000_000, "M"),
                (1_000, "k"),
            ],
        };

        for (unit, suffix) in suffixes {
            if value % unit == 0 {
                return write!(f, "{}{}", value / unit, suffix);
            }
        }
        write!(f, "{}", value)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Raw::Number(n) => Ok(Quantity::new(n, QuantityFormat::DecimalSI)),
        }
    }
}

/// Sum of `name` over all lists.
pub fn total<'a>(lists: impl IntoIterator<Item = &'a ResourceList>, name: &str) -> Quantity {
    let mut sum = Quantity::zero();
    for list in lists {
        if let Some(q) = list.get(name) {
            sum.add(*q);
        }
    }
    sum
}
