//! Core library for the Voluma volume-resize tool.
//!
//! The crate exposes a provider abstraction over cloud instance, volume,
//! and snapshot operations, and a saga-style orchestrator that grows a
//! machine's primary block volume in place: snapshot the current volume,
//! seed a larger one from it, swap the two on the machine's primary device
//! slot, restart, and update the machine's domain record — with reverse
//! order compensation on any mid-flight failure.

pub mod compensation;
pub mod config;
pub mod finalize;
pub mod machines;
pub mod poll;
pub mod provider;
pub mod request;
pub mod resize;
pub mod scaleway;
pub mod sweep;

pub use compensation::{
    Compensation, CompensationError, CompensationStack, UnwindReport,
};
pub use config::{ConfigError, ResizeSettings, ScalewayConfig, SettingsError};
pub use finalize::{
    DomainUpdater, Finalizer, FinalizeError, HealthProbe, ProbeError, ProbeHandle, TcpHealthProbe,
};
pub use machines::{MachineGuard, MachineRegistry};
pub use poll::{PollError, Poller};
pub use provider::{
    AttachmentState, BlockDevice, Instance, MachineState, Provider, ProviderFuture, Snapshot,
    SnapshotState, StartArtifact, Volume, VolumeAttachment, VolumeSpec, VolumeStatus,
};
pub use request::{RequestError, ResizeRequest, ResizeRequestBuilder};
pub use resize::{ResizeArtifact, ResizeError, ResizeOrchestrator, ResizePolicy};
pub use scaleway::{ScalewayDnsError, ScalewayDnsUpdater, ScalewayProvider, ScalewayProviderError};
pub use sweep::{RESIZE_TAG, SweepError, SweepSummary, Sweeper};
