//! Error types for the resize workflow.

use thiserror::Error;

use crate::finalize::FinalizeError;

/// Errors surfaced by a resize run.
///
/// Generic over the provider error `PE` and the domain-updater error `DE`.
/// Validation variants are raised before any mutating call; provider and
/// poll-timeout variants trigger a full compensation unwind; domain and tag
/// variants occur after storage has committed and never roll volumes back.
#[derive(Debug, Error)]
pub enum ResizeError<PE, DE>
where
    PE: std::error::Error + 'static,
    DE: std::error::Error + 'static,
{
    /// Raised when the instance has no attached block device to resize.
    #[error("no block device attached to instance {machine_id}")]
    NoBlockDevice {
        /// Machine that was inspected.
        machine_id: String,
    },
    /// Raised when the provider does not report a volume it referenced.
    #[error("volume {volume_id} not reported by provider")]
    UnknownVolume {
        /// Volume that could not be resolved.
        volume_id: String,
    },
    /// Raised when the desired size does not grow the volume.
    #[error("desired size {desired_gb}GB must be larger than current size {current_gb}GB")]
    SizeNotIncreasing {
        /// Requested size.
        desired_gb: u32,
        /// Size of the volume today.
        current_gb: u32,
    },
    /// Raised when the desired size exceeds the configured ceiling.
    #[error("desired size {desired_gb}GB exceeds the {max_gb}GB ceiling")]
    SizeOverCeiling {
        /// Requested size.
        desired_gb: u32,
        /// Configured ceiling.
        max_gb: u32,
    },
    /// Raised when a provider call fails mid-workflow.
    #[error("{step} failed: {source}")]
    Provider {
        /// Step that issued the call.
        step: &'static str,
        /// Error reported by the provider.
        #[source]
        source: PE,
    },
    /// Raised when a state-poll loop exhausted its budget.
    #[error("timeout waiting for {action} on {target}")]
    PollTimeout {
        /// Transition that was being waited on.
        action: String,
        /// Resource that was being observed.
        target: String,
    },
    /// Raised when the domain record could not be updated after commit.
    #[error("domain update for {domain} failed: {source}")]
    Domain {
        /// Domain that should have been updated.
        domain: String,
        /// Error reported by the updater.
        #[source]
        source: DE,
    },
    /// Raised when the domain tag could not be recorded after commit.
    #[error("tagging instance {instance_id} failed: {source}")]
    Tag {
        /// Instance that should have been tagged.
        instance_id: String,
        /// Error reported by the provider.
        #[source]
        source: PE,
    },
}

impl<PE, DE> ResizeError<PE, DE>
where
    PE: std::error::Error + 'static,
    DE: std::error::Error + 'static,
{
    /// Whether the error was raised by eligibility validation, before any
    /// mutating provider call.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NoBlockDevice { .. }
                | Self::SizeNotIncreasing { .. }
                | Self::SizeOverCeiling { .. }
        )
    }

    /// Whether the error occurred after the storage resize committed.
    #[must_use]
    pub const fn is_post_commit(&self) -> bool {
        matches!(self, Self::Domain { .. } | Self::Tag { .. })
    }
}

impl<PE, DE> From<FinalizeError<PE, DE>> for ResizeError<PE, DE>
where
    PE: std::error::Error + 'static,
    DE: std::error::Error + 'static,
{
    fn from(value: FinalizeError<PE, DE>) -> Self {
        match value {
            FinalizeError::Domain { domain, source } => Self::Domain { domain, source },
            FinalizeError::Tag {
                instance_id,
                source,
            } => Self::Tag {
                instance_id,
                source,
            },
        }
    }
}
