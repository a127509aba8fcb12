//! Provider facade for instance, volume, and snapshot operations.
//!
//! The resize workflow drives a cloud provider exclusively through the
//! [`Provider`] trait so that the orchestration logic stays independent of
//! any wire-level client. Implementations must treat every operation as
//! acting on eventually-consistent remote state; callers re-poll the
//! authoritative records rather than trusting a single response.

use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

/// Future returned by provider and collaborator operations.
pub type ProviderFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Coarse lifecycle states reported for a machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MachineState {
    /// The machine is powered off.
    Stopped,
    /// The machine is powering off.
    Stopping,
    /// The machine is powering on.
    Starting,
    /// The machine is up and reachable.
    Running,
    /// A workflow is mutating the machine; the provider state is in flux.
    Pending,
    /// The machine no longer exists.
    Terminated,
    /// The provider reported a state this crate does not model.
    Unknown,
}

impl MachineState {
    /// Returns the canonical string form used in logs and tags.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Stopping => "stopping",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Pending => "pending",
            Self::Terminated => "terminated",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a provider state string, mapping unrecognised values to
    /// [`MachineState::Unknown`].
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "stopped" | "stopped in place" => Self::Stopped,
            "stopping" => Self::Stopping,
            "starting" => Self::Starting,
            "running" => Self::Running,
            "pending" => Self::Pending,
            "terminated" | "locked" => Self::Terminated,
            _ => Self::Unknown,
        }
    }

    /// Whether the machine is already powered off.
    #[must_use]
    pub const fn is_stopped(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Completion states for a snapshot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SnapshotState {
    /// The snapshot is still being captured.
    Pending,
    /// The snapshot finished and can seed new volumes.
    Completed,
    /// The provider failed to capture the snapshot.
    Error,
}

/// Lifecycle status of a volume as a whole.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VolumeStatus {
    /// The volume is being provisioned.
    Creating,
    /// The volume exists and is not attached to any instance.
    Available,
    /// The volume is attached to an instance.
    InUse,
    /// The volume is being deleted.
    Deleting,
    /// The provider reported the volume as faulted.
    Error,
    /// The provider reported a status this crate does not model.
    Unknown,
}

/// Attachment progress of a volume relative to an instance.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttachmentState {
    /// The attachment is being established.
    Attaching,
    /// The volume is attached and usable.
    Attached,
    /// The attachment is being torn down.
    Detaching,
    /// The volume has no live attachment.
    Detached,
    /// The provider reported an attachment state this crate does not model.
    Unknown,
}

/// A volume slot on an instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockDevice {
    /// Logical device path the guest sees (for example `/dev/vda`).
    pub device_path: String,
    /// Identifier of the volume occupying the slot.
    pub volume_id: String,
}

/// Read view of a compute instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instance {
    /// Provider identifier for the instance.
    pub id: String,
    /// Current lifecycle state.
    pub state: MachineState,
    /// Availability zone hosting the instance and its volumes.
    pub zone: String,
    /// Attached volume slots, primary first.
    pub block_devices: Vec<BlockDevice>,
    /// Key/value tags recorded against the instance.
    pub tags: HashMap<String, String>,
}

/// A live attachment between a volume and an instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeAttachment {
    /// Instance the volume is attached to.
    pub instance_id: String,
    /// Device path of the attachment, when the provider exposes it.
    pub device_path: String,
    /// Progress of the attachment.
    pub state: AttachmentState,
}

/// Read view of a block-storage volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Volume {
    /// Provider identifier for the volume.
    pub id: String,
    /// Size in whole gigabytes.
    pub size_gb: u32,
    /// Availability zone hosting the volume.
    pub zone: String,
    /// Overall lifecycle status.
    pub status: VolumeStatus,
    /// Live attachments; empty when the volume is free.
    pub attachments: Vec<VolumeAttachment>,
    /// Snapshot the volume was seeded from, when any.
    pub source_snapshot: Option<String>,
    /// Plain tags recorded against the volume.
    pub tags: Vec<String>,
}

impl Volume {
    /// Collapses the attachment list into a single coarse state.
    ///
    /// An empty list reads as [`AttachmentState::Detached`]; otherwise the
    /// first attachment's state wins. Both the detach and the attach waits
    /// poll this value until it reaches their terminal state.
    #[must_use]
    pub fn attachment_state(&self) -> AttachmentState {
        self.attachments
            .first()
            .map_or(AttachmentState::Detached, |attachment| attachment.state)
    }
}

/// Read view of a snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Snapshot {
    /// Provider identifier for the snapshot.
    pub id: String,
    /// Volume the snapshot was captured from.
    pub source_volume_id: String,
    /// Completion state.
    pub state: SnapshotState,
    /// Plain tags recorded against the snapshot.
    pub tags: Vec<String>,
}

/// Parameters for creating a volume seeded from a snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeSpec {
    /// Human-friendly volume name.
    pub name: String,
    /// Availability zone; must match the source instance.
    pub zone: String,
    /// Size in whole gigabytes.
    pub size_gb: u32,
    /// Snapshot to seed the volume from.
    pub snapshot_id: String,
    /// Provider volume type (for example `b_ssd`).
    pub volume_type: String,
    /// Plain tags to record against the volume.
    pub tags: Vec<String>,
}

impl VolumeSpec {
    /// Creates a spec with an empty tag list.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        zone: impl Into<String>,
        size_gb: u32,
        snapshot_id: impl Into<String>,
        volume_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            zone: zone.into(),
            size_gb,
            snapshot_id: snapshot_id.into(),
            volume_type: volume_type.into(),
            tags: Vec::new(),
        }
    }

    /// Replaces the tag list.
    #[must_use]
    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Network identity of a freshly started instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StartArtifact {
    /// Provider identifier for the instance.
    pub instance_id: String,
    /// Public address the instance answers on.
    pub ip: IpAddr,
}

/// Minimal interface the resize workflow requires from a cloud provider.
///
/// Mutating operations block until the provider acknowledges the request;
/// they do not wait for eventual consistency — callers poll the read
/// operations for that. `stop_instance` and `start_instance` are the
/// exceptions: they return once the machine reaches its terminal power
/// state, since nothing else in the workflow can proceed earlier.
pub trait Provider: Send + Sync + 'static {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetches the current view of an instance.
    fn instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, Instance, Self::Error>;

    /// Lists volumes by id; an empty id list returns every volume visible
    /// to the provider handle.
    fn volumes<'a>(&'a self, ids: &'a [String]) -> ProviderFuture<'a, Vec<Volume>, Self::Error>;

    /// Starts capturing a snapshot of the given volume.
    fn create_snapshot<'a>(
        &'a self,
        volume_id: &'a str,
        description: &'a str,
    ) -> ProviderFuture<'a, Snapshot, Self::Error>;

    /// Lists snapshots by id; an empty id list returns every snapshot
    /// visible to the provider handle.
    fn snapshots<'a>(
        &'a self,
        ids: &'a [String],
    ) -> ProviderFuture<'a, Vec<Snapshot>, Self::Error>;

    /// Provisions a new volume from a snapshot.
    fn create_volume<'a>(
        &'a self,
        spec: &'a VolumeSpec,
    ) -> ProviderFuture<'a, Volume, Self::Error>;

    /// Deletes a volume. Callers in cleanup context log failures instead of
    /// propagating them.
    fn delete_volume<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, (), Self::Error>;

    /// Deletes a snapshot. Callers in cleanup context log failures instead
    /// of propagating them.
    fn delete_snapshot<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, (), Self::Error>;

    /// Requests detachment of a volume from whatever instance holds it.
    fn detach_volume<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, (), Self::Error>;

    /// Requests attachment of a volume to an instance at a device path.
    fn attach_volume<'a>(
        &'a self,
        volume_id: &'a str,
        instance_id: &'a str,
        device_path: &'a str,
    ) -> ProviderFuture<'a, (), Self::Error>;

    /// Powers an instance off and waits for it to reach `stopped`.
    fn stop_instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, (), Self::Error>;

    /// Powers an instance on, waits for it to reach `running`, and returns
    /// its network identity.
    fn start_instance<'a>(
        &'a self,
        id: &'a str,
    ) -> ProviderFuture<'a, StartArtifact, Self::Error>;

    /// Records a key/value tag against an instance.
    fn tag_instance<'a>(
        &'a self,
        id: &'a str,
        key: &'a str,
        value: &'a str,
    ) -> ProviderFuture<'a, (), Self::Error>;
}
