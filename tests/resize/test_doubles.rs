//! Test doubles for the resize orchestrator.
//!
//! Provides a scripted provider that simulates a one-machine cloud, records
//! every call, and allows controlled failures per step, plus scripted
//! domain-updater and health-probe collaborators.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;

use voluma::{
    AttachmentState, BlockDevice, DomainUpdater, HealthProbe, Instance, MachineState, ProbeError,
    ProbeHandle, Provider, ProviderFuture, RESIZE_TAG, Snapshot, SnapshotState, StartArtifact,
    Volume, VolumeAttachment, VolumeSpec, VolumeStatus,
};

pub const MACHINE_ID: &str = "srv-1";
pub const OLD_VOLUME_ID: &str = "vol-old";
pub const NEW_VOLUME_ID: &str = "vol-new";
pub const SNAPSHOT_ID: &str = "snap-1";
pub const DEVICE_PATH: &str = "/dev/vda";
pub const ZONE: &str = "fr-par-1";
pub const CURRENT_SIZE_GB: u32 = 20;

pub fn instance_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))
}

/// Error returned by a scripted step failure.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{step} failure")]
pub struct ScriptedProviderError {
    pub step: &'static str,
}

/// One recorded provider call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    Instance,
    Volumes,
    CreateSnapshot,
    Snapshots,
    CreateVolume,
    DeleteVolume(String),
    DeleteSnapshot(String),
    Detach(String),
    Attach {
        volume_id: String,
        instance_id: String,
        device_path: String,
    },
    Stop,
    Start,
    Tag {
        key: String,
        value: String,
    },
}

impl Call {
    fn is_mutation(&self) -> bool {
        !matches!(self, Self::Instance | Self::Volumes | Self::Snapshots)
    }
}

#[derive(Debug)]
struct State {
    calls: Vec<Call>,
    fail_steps: HashSet<&'static str>,
    no_block_devices: bool,
    snapshot_completes: bool,
    volume_becomes_available: bool,
    attach_completes: bool,
    sticky_volumes: bool,
    snapshot_exists: bool,
    new_volume_exists: bool,
    old_attached: bool,
    new_attached: bool,
}

impl Default for State {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            fail_steps: HashSet::new(),
            no_block_devices: false,
            snapshot_completes: true,
            volume_becomes_available: true,
            attach_completes: true,
            sticky_volumes: false,
            snapshot_exists: false,
            new_volume_exists: false,
            old_attached: true,
            new_attached: false,
        }
    }
}

/// Simulated one-machine cloud with scripted failures.
#[derive(Clone)]
pub struct ScriptedProvider {
    state: Arc<Mutex<State>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|err| panic!("scripted provider lock poisoned: {err}"))
    }

    /// Makes the named step fail: one of `create_snapshot`, `create_volume`,
    /// `delete_volume`, `detach`, `attach`, `stop`, `start`, `tag`.
    pub fn fail_on(&self, step: &'static str) {
        self.lock().fail_steps.insert(step);
    }

    pub fn no_block_devices(&self) {
        self.lock().no_block_devices = true;
    }

    pub fn snapshot_never_completes(&self) {
        self.lock().snapshot_completes = false;
    }

    pub fn volume_never_available(&self) {
        self.lock().volume_becomes_available = false;
    }

    /// Attach calls are acknowledged but the volume never reports attached.
    pub fn attach_never_completes(&self) {
        self.lock().attach_completes = false;
    }

    /// Deletions are acknowledged but resources remain visible.
    pub fn sticky_volumes(&self) {
        self.lock().sticky_volumes = true;
    }

    /// Seeds an orphaned, resize-tagged replacement volume and a stale
    /// snapshot, as a failed fire-and-forget delete would leave behind.
    pub fn seed_orphans(&self) {
        let mut state = self.lock();
        state.new_volume_exists = true;
        state.new_attached = false;
        state.snapshot_exists = true;
    }

    pub fn attach_new_volume(&self) {
        self.lock().new_attached = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.is_mutation())
            .count()
    }

    pub fn old_volume_attached(&self) -> bool {
        self.lock().old_attached
    }

    fn check(&self, step: &'static str) -> Result<(), ScriptedProviderError> {
        if self.lock().fail_steps.contains(step) {
            return Err(ScriptedProviderError { step });
        }
        Ok(())
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }

    fn old_volume(state: &State) -> Volume {
        let attachments = if state.old_attached {
            vec![VolumeAttachment {
                instance_id: MACHINE_ID.to_owned(),
                device_path: DEVICE_PATH.to_owned(),
                state: AttachmentState::Attached,
            }]
        } else {
            Vec::new()
        };
        Volume {
            id: OLD_VOLUME_ID.to_owned(),
            size_gb: CURRENT_SIZE_GB,
            zone: ZONE.to_owned(),
            status: if state.old_attached {
                VolumeStatus::InUse
            } else {
                VolumeStatus::Available
            },
            attachments,
            source_snapshot: None,
            tags: Vec::new(),
        }
    }

    fn new_volume(state: &State) -> Volume {
        let attachments = if state.new_attached && state.attach_completes {
            vec![VolumeAttachment {
                instance_id: MACHINE_ID.to_owned(),
                device_path: DEVICE_PATH.to_owned(),
                state: AttachmentState::Attached,
            }]
        } else {
            Vec::new()
        };
        let status = if state.new_attached && state.attach_completes {
            VolumeStatus::InUse
        } else if state.volume_becomes_available {
            VolumeStatus::Available
        } else {
            VolumeStatus::Creating
        };
        Volume {
            id: NEW_VOLUME_ID.to_owned(),
            size_gb: 40,
            zone: ZONE.to_owned(),
            status,
            attachments,
            source_snapshot: Some(SNAPSHOT_ID.to_owned()),
            tags: vec![RESIZE_TAG.to_owned(), String::from("resize")],
        }
    }
}

impl Provider for ScriptedProvider {
    type Error = ScriptedProviderError;

    fn instance<'a>(&'a self, _id: &'a str) -> ProviderFuture<'a, Instance, Self::Error> {
        Box::pin(async move {
            self.record(Call::Instance);
            let state = self.lock();
            let block_devices = if state.no_block_devices {
                Vec::new()
            } else {
                vec![BlockDevice {
                    device_path: DEVICE_PATH.to_owned(),
                    volume_id: OLD_VOLUME_ID.to_owned(),
                }]
            };
            Ok(Instance {
                id: MACHINE_ID.to_owned(),
                state: MachineState::Running,
                zone: ZONE.to_owned(),
                block_devices,
                tags: std::collections::HashMap::new(),
            })
        })
    }

    fn volumes<'a>(&'a self, ids: &'a [String]) -> ProviderFuture<'a, Vec<Volume>, Self::Error> {
        Box::pin(async move {
            self.record(Call::Volumes);
            let state = self.lock();
            let mut volumes = vec![Self::old_volume(&state)];
            if state.new_volume_exists {
                volumes.push(Self::new_volume(&state));
            }
            Ok(volumes
                .into_iter()
                .filter(|volume| ids.is_empty() || ids.iter().any(|id| *id == volume.id))
                .collect())
        })
    }

    fn create_snapshot<'a>(
        &'a self,
        _volume_id: &'a str,
        _description: &'a str,
    ) -> ProviderFuture<'a, Snapshot, Self::Error> {
        Box::pin(async move {
            self.record(Call::CreateSnapshot);
            self.check("create_snapshot")?;
            self.lock().snapshot_exists = true;
            Ok(Snapshot {
                id: SNAPSHOT_ID.to_owned(),
                source_volume_id: OLD_VOLUME_ID.to_owned(),
                state: SnapshotState::Pending,
                tags: vec![RESIZE_TAG.to_owned()],
            })
        })
    }

    fn snapshots<'a>(
        &'a self,
        ids: &'a [String],
    ) -> ProviderFuture<'a, Vec<Snapshot>, Self::Error> {
        Box::pin(async move {
            self.record(Call::Snapshots);
            let state = self.lock();
            if !state.snapshot_exists {
                return Ok(Vec::new());
            }
            let snapshot = Snapshot {
                id: SNAPSHOT_ID.to_owned(),
                source_volume_id: OLD_VOLUME_ID.to_owned(),
                state: if state.snapshot_completes {
                    SnapshotState::Completed
                } else {
                    SnapshotState::Pending
                },
                tags: vec![RESIZE_TAG.to_owned()],
            };
            Ok(if ids.is_empty() || ids.iter().any(|id| *id == snapshot.id) {
                vec![snapshot]
            } else {
                Vec::new()
            })
        })
    }

    fn create_volume<'a>(
        &'a self,
        spec: &'a VolumeSpec,
    ) -> ProviderFuture<'a, Volume, Self::Error> {
        Box::pin(async move {
            self.record(Call::CreateVolume);
            self.check("create_volume")?;
            let mut state = self.lock();
            state.new_volume_exists = true;
            let mut volume = Self::new_volume(&state);
            volume.size_gb = spec.size_gb;
            Ok(volume)
        })
    }

    fn delete_volume<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.record(Call::DeleteVolume(id.to_owned()));
            self.check("delete_volume")?;
            let mut state = self.lock();
            if !state.sticky_volumes && id == NEW_VOLUME_ID {
                state.new_volume_exists = false;
            }
            Ok(())
        })
    }

    fn delete_snapshot<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.record(Call::DeleteSnapshot(id.to_owned()));
            self.check("delete_snapshot")?;
            let mut state = self.lock();
            if !state.sticky_volumes {
                state.snapshot_exists = false;
            }
            Ok(())
        })
    }

    fn detach_volume<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.record(Call::Detach(id.to_owned()));
            self.check("detach")?;
            let mut state = self.lock();
            if id == OLD_VOLUME_ID {
                state.old_attached = false;
            } else if id == NEW_VOLUME_ID {
                state.new_attached = false;
            }
            Ok(())
        })
    }

    fn attach_volume<'a>(
        &'a self,
        volume_id: &'a str,
        instance_id: &'a str,
        device_path: &'a str,
    ) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.record(Call::Attach {
                volume_id: volume_id.to_owned(),
                instance_id: instance_id.to_owned(),
                device_path: device_path.to_owned(),
            });
            self.check("attach")?;
            let mut state = self.lock();
            if volume_id == OLD_VOLUME_ID {
                state.old_attached = true;
            } else if volume_id == NEW_VOLUME_ID {
                state.new_attached = true;
            }
            Ok(())
        })
    }

    fn stop_instance<'a>(&'a self, _id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.record(Call::Stop);
            self.check("stop")
        })
    }

    fn start_instance<'a>(
        &'a self,
        _id: &'a str,
    ) -> ProviderFuture<'a, StartArtifact, Self::Error> {
        Box::pin(async move {
            self.record(Call::Start);
            self.check("start")?;
            Ok(StartArtifact {
                instance_id: MACHINE_ID.to_owned(),
                ip: instance_ip(),
            })
        })
    }

    fn tag_instance<'a>(
        &'a self,
        _id: &'a str,
        key: &'a str,
        value: &'a str,
    ) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.record(Call::Tag {
                key: key.to_owned(),
                value: value.to_owned(),
            });
            self.check("tag")
        })
    }
}

/// Waits until the (possibly fire-and-forget) call shows up.
pub async fn wait_for_call(provider: &ScriptedProvider, expected: &Call) {
    for _ in 0..200 {
        if provider.calls().iter().any(|call| call == expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("call {expected:?} never issued; saw {:?}", provider.calls());
}

#[derive(Debug, Default)]
struct DomainsState {
    fail: bool,
    updates: Vec<(IpAddr, String, String)>,
}

/// Scripted domain updater recording every change.
#[derive(Clone, Default)]
pub struct ScriptedDomains {
    state: Arc<Mutex<DomainsState>>,
}

/// Error returned by a scripted domain-update failure.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("domain update failure")]
pub struct ScriptedDomainsError;

impl ScriptedDomains {
    pub fn fail(&self) {
        self.lock().fail = true;
    }

    pub fn updates(&self) -> Vec<(IpAddr, String, String)> {
        self.lock().updates.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DomainsState> {
        self.state
            .lock()
            .unwrap_or_else(|err| panic!("scripted domains lock poisoned: {err}"))
    }
}

impl DomainUpdater for ScriptedDomains {
    type Error = ScriptedDomainsError;

    fn update_domain<'a>(
        &'a self,
        ip: IpAddr,
        domain: &'a str,
        username: &'a str,
    ) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            if state.fail {
                return Err(ScriptedDomainsError);
            }
            state
                .updates
                .push((ip, domain.to_owned(), username.to_owned()));
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    fail_connect: bool,
    fail_ping: bool,
    pings: u32,
}

/// Scripted health probe counting pings.
#[derive(Clone, Default)]
pub struct ScriptedProbe {
    state: Arc<Mutex<ProbeState>>,
}

/// Handle produced by [`ScriptedProbe`].
pub struct ScriptedProbeHandle {
    state: Arc<Mutex<ProbeState>>,
}

impl ScriptedProbe {
    pub fn fail_connect(&self) {
        self.lock().fail_connect = true;
    }

    pub fn fail_ping(&self) {
        self.lock().fail_ping = true;
    }

    pub fn pings(&self) -> u32 {
        self.lock().pings
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProbeState> {
        self.state
            .lock()
            .unwrap_or_else(|err| panic!("scripted probe lock poisoned: {err}"))
    }
}

impl ProbeHandle for ScriptedProbeHandle {
    fn ping(
        &mut self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), ProbeError>> + Send + '_>>
    {
        Box::pin(async move {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(|err| panic!("scripted probe lock poisoned: {err}"));
            if state.fail_ping {
                return Err(ProbeError::Ping {
                    message: String::from("scripted"),
                });
            }
            state.pings += 1;
            Ok(())
        })
    }
}

impl HealthProbe for ScriptedProbe {
    type Handle = ScriptedProbeHandle;

    fn connect<'a>(
        &'a self,
        query: &'a str,
        _budget: Duration,
    ) -> ProviderFuture<'a, Self::Handle, ProbeError> {
        Box::pin(async move {
            if self.lock().fail_connect {
                return Err(ProbeError::Connect {
                    query: query.to_owned(),
                    message: String::from("scripted"),
                });
            }
            Ok(ScriptedProbeHandle {
                state: Arc::clone(&self.state),
            })
        })
    }
}
