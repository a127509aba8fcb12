//! Orphaned resize-resource reaper.
//!
//! The success path of a resize deletes the old volume without waiting for
//! the result, and snapshots are cleaned up best-effort; a failed deletion
//! therefore leaves a tagged resource behind. The sweeper finds volumes and
//! snapshots carrying the resize tag that are no longer in use and deletes
//! them, failing if anything tagged remains afterwards.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::provider::{Provider, Snapshot, Volume, VolumeStatus};

/// Tag applied to every resource the resize workflow creates.
pub const RESIZE_TAG: &str = "voluma";

/// Summary of sweeper work.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SweepSummary {
    /// Number of volumes deleted during the sweep.
    pub deleted_volumes: usize,
    /// Number of snapshots deleted during the sweep.
    pub deleted_snapshots: usize,
}

/// Errors returned by the sweeper.
#[derive(Debug, Error)]
pub enum SweepError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when a provider call fails mid-sweep.
    #[error("sweep aborted: {source}")]
    Provider {
        /// Error reported by the provider.
        #[source]
        source: E,
    },
    /// Raised when tagged resources remain after the sweep.
    #[error("resources remain after sweep: {message}")]
    NotClean {
        /// Human-readable description of what remains.
        message: String,
    },
}

/// Deletes orphaned resize-tagged volumes and snapshots.
pub struct Sweeper<P> {
    provider: Arc<P>,
}

impl<P: Provider> Sweeper<P> {
    /// Creates a sweeper over the given provider handle.
    #[must_use]
    pub const fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    /// Performs a sweep and returns how many resources were deleted.
    ///
    /// Only resources carrying [`RESIZE_TAG`] are touched, and volumes are
    /// skipped while still attached — a volume in use is load-bearing no
    /// matter how it is tagged.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::Provider`] when a provider call fails and
    /// [`SweepError::NotClean`] when tagged resources remain after
    /// deletion attempts.
    pub async fn sweep(&self) -> Result<SweepSummary, SweepError<P::Error>> {
        let mut summary = SweepSummary::default();

        for volume in self.orphaned_volumes().await? {
            info!(volume_id = %volume.id, "deleting orphaned volume");
            self.provider
                .delete_volume(&volume.id)
                .await
                .map_err(|source| SweepError::Provider { source })?;
            summary.deleted_volumes += 1;
        }

        for snapshot in self.stale_snapshots().await? {
            info!(snapshot_id = %snapshot.id, "deleting stale snapshot");
            self.provider
                .delete_snapshot(&snapshot.id)
                .await
                .map_err(|source| SweepError::Provider { source })?;
            summary.deleted_snapshots += 1;
        }

        let residual_volumes = self.orphaned_volumes().await?.len();
        let residual_snapshots = self.stale_snapshots().await?.len();
        if residual_volumes > 0 || residual_snapshots > 0 {
            return Err(SweepError::NotClean {
                message: format!(
                    "volumes remaining: {residual_volumes}, snapshots remaining: {residual_snapshots}"
                ),
            });
        }

        Ok(summary)
    }

    async fn orphaned_volumes(&self) -> Result<Vec<Volume>, SweepError<P::Error>> {
        let volumes = self
            .provider
            .volumes(&[])
            .await
            .map_err(|source| SweepError::Provider { source })?;
        Ok(volumes
            .into_iter()
            .filter(|volume| {
                volume.tags.iter().any(|tag| tag == RESIZE_TAG)
                    && volume.attachments.is_empty()
                    && volume.status != VolumeStatus::Deleting
            })
            .collect())
    }

    async fn stale_snapshots(&self) -> Result<Vec<Snapshot>, SweepError<P::Error>> {
        let snapshots = self
            .provider
            .snapshots(&[])
            .await
            .map_err(|source| SweepError::Provider { source })?;
        Ok(snapshots
            .into_iter()
            .filter(|snapshot| snapshot.tags.iter().any(|tag| tag == RESIZE_TAG))
            .collect())
    }
}
