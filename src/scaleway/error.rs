//! Error types for the Scaleway provider.

use scaleway_rs::ScalewayError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by the Scaleway provider.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScalewayProviderError {
    /// Raised when the high-level configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when listing a resource collection fails.
    #[error("failed to list {resource} in zone {zone}: {message}")]
    ListFailed {
        /// Resource collection being listed (for example `volumes`).
        resource: &'static str,
        /// Zone used for the lookup.
        zone: String,
        /// Error message from the provider.
        message: String,
    },
    /// Raised when the specified volume does not exist or is not accessible.
    #[error("volume {volume_id} not found in zone {zone}")]
    VolumeNotFound {
        /// Volume identifier that was not found.
        volume_id: String,
        /// Zone where lookup was attempted.
        zone: String,
    },
    /// Raised when a volume cannot be created.
    #[error("failed to create volume {name} in zone {zone}: {message}")]
    VolumeCreateFailed {
        /// Volume name requested.
        name: String,
        /// Zone where creation was attempted.
        zone: String,
        /// Error message from the provider.
        message: String,
    },
    /// Raised when a volume cannot be deleted.
    #[error("failed to delete volume {volume_id} in zone {zone}: {message}")]
    VolumeDeleteFailed {
        /// Volume identifier that could not be deleted.
        volume_id: String,
        /// Zone where deletion was attempted.
        zone: String,
        /// Error message from the provider.
        message: String,
    },
    /// Raised when a volume cannot be attached to an instance.
    #[error("failed to attach volume {volume_id} to instance {instance_id}: {message}")]
    VolumeAttachmentFailed {
        /// Volume identifier that could not be attached.
        volume_id: String,
        /// Instance identifier.
        instance_id: String,
        /// Error message from the provider.
        message: String,
    },
    /// Raised when a volume cannot be detached from an instance.
    #[error("failed to detach volume {volume_id} from instance {instance_id}: {message}")]
    VolumeDetachFailed {
        /// Volume identifier that could not be detached.
        volume_id: String,
        /// Instance identifier.
        instance_id: String,
        /// Error message from the provider.
        message: String,
    },
    /// Raised when a snapshot cannot be created.
    #[error("failed to snapshot volume {volume_id} in zone {zone}: {message}")]
    SnapshotCreateFailed {
        /// Volume the snapshot was requested from.
        volume_id: String,
        /// Zone where creation was attempted.
        zone: String,
        /// Error message from the provider.
        message: String,
    },
    /// Raised when a snapshot cannot be deleted.
    #[error("failed to delete snapshot {snapshot_id} in zone {zone}: {message}")]
    SnapshotDeleteFailed {
        /// Snapshot identifier that could not be deleted.
        snapshot_id: String,
        /// Zone where deletion was attempted.
        zone: String,
        /// Error message from the provider.
        message: String,
    },
    /// Raised when a power action is not permitted in the current state.
    #[error("instance {instance_id} in state {state} cannot {action}")]
    PowerActionNotAllowed {
        /// Provider instance identifier.
        instance_id: String,
        /// Action that was requested (`poweron` or `poweroff`).
        action: &'static str,
        /// Current state reported by the provider.
        state: String,
    },
    /// Raised when a started instance never exposes a public IP.
    #[error("instance {instance_id} missing public IPv4 address")]
    MissingPublicIp {
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Raised when an asynchronous operation exceeds the timeout.
    #[error("timeout waiting for {action} on instance {instance_id}")]
    Timeout {
        /// Action being waited on.
        action: String,
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Raised when the instance tag update is rejected.
    #[error("failed to tag instance {instance_id}: {message}")]
    TagFailed {
        /// Instance identifier.
        instance_id: String,
        /// Error message from the provider.
        message: String,
    },
    /// Wrapper for provider level failures.
    #[error("provider error: {message}")]
    Provider {
        /// Message returned by the provider SDK or HTTP layer.
        message: String,
    },
}

impl From<ScalewayError> for ScalewayProviderError {
    fn from(value: ScalewayError) -> Self {
        Self::Provider {
            message: value.to_string(),
        }
    }
}

impl From<ConfigError> for ScalewayProviderError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
