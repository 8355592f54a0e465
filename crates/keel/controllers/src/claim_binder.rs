//! Binding of persistent volume claims to volumes

use crate::error::Result;
use crate::periodic;
use keel_client::ClusterClient;
use keel_types::{
    AccessMode, ClaimPhase, Object, PersistentVolume, PersistentVolumeClaim, VolumePhase,
};
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct PersistentVolumeClaimBinder {
    client: ClusterClient,
    resync_period: Duration,
}

impl PersistentVolumeClaimBinder {
    pub fn new(client: ClusterClient, resync_period: Duration) -> Self {
        Self {
            client,
            resync_period,
        }
    }

    pub fn resync_period(&self) -> Duration {
        self.resync_period
    }

    pub async fn run(self, stop: CancellationToken) {
        periodic::until("persistent-volume-claim-binder", self.resync_period, stop, || {
            self.sync_all()
        })
        .await;
    }

    pub async fn sync_all(&self) -> Result<()> {
        let claims = self.client.persistent_volume_claims().list("").await?;
        let mut volumes = self.client.persistent_volumes().list("").await?;

        self.sync_volumes(&mut volumes, &claims).await?;

        for claim in claims {
            if claim.status.phase == ClaimPhase::Bound {
                continue;
            }
            if let Err(e) = self.bind_claim(claim.clone(), &mut volumes).await {
                tracing::warn!(
                    claim = %claim.object_reference(),
                    error = %e,
                    "Failed to bind claim"
                );
            }
        }
        Ok(())
    }

    /// New volumes become available; bound volumes whose claim is gone are released.
    async fn sync_volumes(
        &self,
        volumes: &mut [PersistentVolume],
        claims: &[PersistentVolumeClaim],
    ) -> Result<()> {
        let live: HashSet<(&str, &str)> = claims.iter().map(|c| (c.namespace(), c.name())).collect();

        for volume in volumes.iter_mut() {
            let next = match (&volume.spec.claim_ref, volume.status.phase) {
                (None, VolumePhase::Pending) => VolumePhase::Available,
                (Some(claim), VolumePhase::Bound)
                    if !live.contains(&(claim.namespace.as_str(), claim.name.as_str())) =>
                {
                    VolumePhase::Released
                }
                _ => continue,
            };

            tracing::debug!(volume = %volume.name(), phase = ?next, "Volume phase changed");
            volume.status.phase = next;
            *volume = self.client.persistent_volumes().update(volume.clone()).await?;
        }
        Ok(())
    }

    async fn bind_claim(
        &self,
        mut claim: PersistentVolumeClaim,
        volumes: &mut [PersistentVolume],
    ) -> Result<()> {
        let Some(index) = best_match(&claim, volumes) else {
            tracing::debug!(claim = %claim.object_reference(), "No volume matches claim");
            return Ok(());
        };

        let mut volume = volumes[index].clone();
        volume.spec.claim_ref = Some(claim.object_reference());
        volume.status.phase = VolumePhase::Bound;
        volumes[index] = self.client.persistent_volumes().update(volume).await?;

        claim.status.phase = ClaimPhase::Bound;
        claim.status.volume_name = volumes[index].name().to_string();
        let claim = self.client.persistent_volume_claims().update(claim).await?;

        tracing::info!(
            claim = %claim.object_reference(),
            volume = %claim.status.volume_name,
            "Bound claim to volume"
        );
        Ok(())
    }
}

/// Smallest available volume offering every requested access mode and enough storage.
fn best_match(claim: &PersistentVolumeClaim, volumes: &[PersistentVolume]) -> Option<usize> {
    let requested = claim.requested_storage();
    volumes
        .iter()
        .enumerate()
        .filter(|(_, v)| v.status.phase == VolumePhase::Available && v.spec.claim_ref.is_none())
        .filter(|(_, v)| has_modes(&v.spec.access_modes, &claim.spec.access_modes))
        .filter(|(_, v)| v.storage() >= requested)
        .min_by_key(|(_, v)| v.storage())
        .map(|(i, _)| i)
}

fn has_modes(offered: &[AccessMode], wanted: &[AccessMode]) -> bool {
    wanted.iter().all(|m| offered.contains(m))
}
