//! Orchestrates the end-to-end volume resize saga.
//!
//! The workflow validates eligibility, stops the machine, snapshots the
//! current volume, seeds a larger volume from the snapshot, swaps the two
//! volumes on the instance's primary device slot, and restarts the machine.
//! Every resource-mutating step registers its undo on a compensation stack
//! in the same place it performs the mutation; any failure before the
//! restart commits triggers a reverse-order unwind that reattaches the old
//! volume, deletes the unused replacement, and always deletes the snapshot.
//! Post-restart bookkeeping (domain record, tag, health probe) is handled by
//! the [`Finalizer`] and never rolls storage back.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::compensation::{
    Compensation, CompensationError, CompensationFuture, CompensationStack,
};
use crate::finalize::{DomainUpdater, Finalizer, HealthProbe};
use crate::machines::{MachineGuard, MachineRegistry};
use crate::poll::{PollError, Poller};
use crate::provider::{
    AttachmentState, Instance, MachineState, Provider, SnapshotState, Volume, VolumeSpec,
    VolumeStatus,
};
use crate::request::ResizeRequest;
use crate::sweep::RESIZE_TAG;

mod error;

pub use error::ResizeError;

/// Default hard ceiling on the desired size, in gigabytes.
pub const DEFAULT_MAX_SIZE_GB: u32 = 100;

const DEFAULT_VOLUME_TYPE: &str = "b_ssd";

/// Final descriptor returned to the caller on overall success.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResizeArtifact {
    /// Provider identifier for the resized instance.
    pub instance_id: String,
    /// Public address the restarted instance answers on.
    pub ip: IpAddr,
    /// Domain name bound to the instance.
    pub domain_name: String,
}

/// Policy knobs governing eligibility and the replacement volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResizePolicy {
    /// Hard ceiling on the desired size, in gigabytes.
    pub max_size_gb: u32,
    /// Provider volume type for the replacement volume.
    pub volume_type: String,
}

impl ResizePolicy {
    /// Creates a policy with an explicit ceiling and volume type.
    #[must_use]
    pub fn new(max_size_gb: u32, volume_type: impl Into<String>) -> Self {
        Self {
            max_size_gb,
            volume_type: volume_type.into(),
        }
    }
}

impl Default for ResizePolicy {
    fn default() -> Self {
        Self {
            max_size_gb: DEFAULT_MAX_SIZE_GB,
            volume_type: String::from(DEFAULT_VOLUME_TYPE),
        }
    }
}

struct PrimaryDevice {
    volume_id: String,
    device_path: String,
}

/// Drives resize workflows against a provider and its collaborators.
pub struct ResizeOrchestrator<P, D, H> {
    provider: Arc<P>,
    finalizer: Finalizer<D, H>,
    registry: Arc<MachineRegistry>,
    poller: Poller,
    policy: ResizePolicy,
}

impl<P, D, H> ResizeOrchestrator<P, D, H>
where
    P: Provider,
    D: DomainUpdater,
    H: HealthProbe,
{
    /// Creates an orchestrator with a default poller and a private machine
    /// registry.
    #[must_use]
    pub fn new(provider: Arc<P>, finalizer: Finalizer<D, H>, policy: ResizePolicy) -> Self {
        Self {
            provider,
            finalizer,
            registry: Arc::new(MachineRegistry::new()),
            poller: Poller::default(),
            policy,
        }
    }

    /// Overrides the poller.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }

    /// Shares a machine registry so external status queries observe the
    /// states this orchestrator records.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<MachineRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// The registry machine states are recorded in.
    #[must_use]
    pub fn registry(&self) -> Arc<MachineRegistry> {
        Arc::clone(&self.registry)
    }

    /// Runs one resize workflow to completion.
    ///
    /// Holds the machine's exclusion guard for the whole run. On success the
    /// old volume is deleted (fire-and-forget) and the snapshot removed; on
    /// failure every registered compensation runs in reverse order before
    /// the error is returned, leaving the machine startable with exactly one
    /// volume on its primary device slot.
    ///
    /// # Errors
    ///
    /// Returns [`ResizeError`] describing the first failing step. Internal
    /// compensation failures are logged, never surfaced here.
    pub async fn execute(
        &self,
        request: &ResizeRequest,
    ) -> Result<ResizeArtifact, ResizeError<P::Error, D::Error>> {
        let guard = self
            .registry
            .acquire(&request.machine_id, request.current_state)
            .await;
        info!(
            machine_id = %request.machine_id,
            desired_gb = request.desired_size_gb,
            "starting resize"
        );

        let mut stack = CompensationStack::new();
        match self.drive(request, &guard, &mut stack).await {
            Ok(artifact) => {
                guard.record_state(MachineState::Starting);
                let finalized = self
                    .finalizer
                    .finalize(self.provider.as_ref(), &artifact, &request.username)
                    .await;
                let report = stack.unwind(false).await;
                if report.failed > 0 {
                    warn!(failed = report.failed, "post-commit cleanup left residue");
                }
                finalized?;
                guard.record_state(MachineState::Running);
                info!(machine_id = %request.machine_id, ip = %artifact.ip, "resize committed");
                Ok(artifact)
            }
            Err(err) => {
                warn!(machine_id = %request.machine_id, error = %err, "resize aborted; unwinding");
                let report = stack.unwind(true).await;
                info!(
                    attempted = report.attempted,
                    failed = report.failed,
                    "compensation unwind finished"
                );
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        request: &ResizeRequest,
        guard: &MachineGuard,
        stack: &mut CompensationStack,
    ) -> Result<ResizeArtifact, ResizeError<P::Error, D::Error>> {
        let instance = self
            .provider
            .instance(&request.machine_id)
            .await
            .map_err(|source| ResizeError::Provider {
                step: "fetch instance",
                source,
            })?;
        let primary = self.check_eligibility(request, &instance).await?;

        if !request.current_state.is_stopped() {
            info!(machine_id = %request.machine_id, "stopping machine");
            self.provider
                .stop_instance(&request.machine_id)
                .await
                .map_err(|source| ResizeError::Provider {
                    step: "stop instance",
                    source,
                })?;
        }
        guard.record_state(MachineState::Pending);

        let snapshot_id = self.snapshot_volume(&instance, &primary.volume_id, stack).await?;
        let new_volume_id = self
            .create_replacement(request, &instance, &snapshot_id, stack)
            .await?;
        self.swap_volumes(request, &primary, &new_volume_id, stack)
            .await?;

        let started = self
            .provider
            .start_instance(&request.machine_id)
            .await
            .map_err(|source| ResizeError::Provider {
                step: "start instance",
                source,
            })?;

        Ok(ResizeArtifact {
            instance_id: started.instance_id,
            ip: started.ip,
            domain_name: request.domain_name.clone(),
        })
    }

    /// Pure validation; issues only read calls.
    async fn check_eligibility(
        &self,
        request: &ResizeRequest,
        instance: &Instance,
    ) -> Result<PrimaryDevice, ResizeError<P::Error, D::Error>> {
        let Some(primary) = instance.block_devices.first() else {
            return Err(ResizeError::NoBlockDevice {
                machine_id: instance.id.clone(),
            });
        };

        let old_volume = self.lookup_volume(&primary.volume_id).await?;
        let current_gb = old_volume.size_gb;
        if request.desired_size_gb <= current_gb {
            return Err(ResizeError::SizeNotIncreasing {
                desired_gb: request.desired_size_gb,
                current_gb,
            });
        }
        if request.desired_size_gb > self.policy.max_size_gb {
            return Err(ResizeError::SizeOverCeiling {
                desired_gb: request.desired_size_gb,
                max_gb: self.policy.max_size_gb,
            });
        }

        Ok(PrimaryDevice {
            volume_id: primary.volume_id.clone(),
            device_path: primary.device_path.clone(),
        })
    }

    /// Captures the snapshot and registers its unconditional cleanup.
    async fn snapshot_volume(
        &self,
        instance: &Instance,
        volume_id: &str,
        stack: &mut CompensationStack,
    ) -> Result<String, ResizeError<P::Error, D::Error>> {
        let description = format!("voluma resize snapshot for instance {}", instance.id);
        let snapshot = self
            .provider
            .create_snapshot(volume_id, &description)
            .await
            .map_err(|source| ResizeError::Provider {
                step: "create snapshot",
                source,
            })?;
        let snapshot_id = snapshot.id;
        info!(%snapshot_id, %volume_id, "snapshot requested");

        // The snapshot is transient either way; both branches delete it.
        stack.register(
            Compensation::new("delete snapshot")
                .on_failure(self.delete_snapshot_action(&snapshot_id))
                .on_success(self.delete_snapshot_action(&snapshot_id)),
        );

        self.poller
            .wait_for(
                "snapshot completion",
                &snapshot_id,
                &SnapshotState::Completed,
                || {
                    let provider = Arc::clone(&self.provider);
                    let ids = vec![snapshot_id.clone()];
                    async move {
                        let snapshots = provider.snapshots(&ids).await?;
                        Ok(snapshots.into_iter().next().map(|snapshot| snapshot.state))
                    }
                },
            )
            .await
            .map_err(|err| poll_failure("snapshot poll", err))?;

        Ok(snapshot_id)
    }

    /// Creates the larger volume from the snapshot and registers its
    /// failure-path deletion. Its success-path fate is decided at the swap.
    async fn create_replacement(
        &self,
        request: &ResizeRequest,
        instance: &Instance,
        snapshot_id: &str,
        stack: &mut CompensationStack,
    ) -> Result<String, ResizeError<P::Error, D::Error>> {
        let spec = VolumeSpec::new(
            format!("voluma-{}", Uuid::new_v4().simple()),
            instance.zone.clone(),
            request.desired_size_gb,
            snapshot_id,
            self.policy.volume_type.clone(),
        )
        .tags([RESIZE_TAG, "resize"]);

        let new_volume = self
            .provider
            .create_volume(&spec)
            .await
            .map_err(|source| ResizeError::Provider {
                step: "create volume",
                source,
            })?;
        let new_volume_id = new_volume.id;
        info!(volume_id = %new_volume_id, size_gb = request.desired_size_gb, "volume requested");

        stack.register(
            Compensation::new("delete new volume")
                .on_failure(self.delete_volume_action(&new_volume_id)),
        );

        self.wait_for_volume_status(&new_volume_id, VolumeStatus::Available, "volume availability")
            .await?;

        Ok(new_volume_id)
    }

    /// Swaps the old volume for the new one on the primary device slot.
    async fn swap_volumes(
        &self,
        request: &ResizeRequest,
        primary: &PrimaryDevice,
        new_volume_id: &str,
        stack: &mut CompensationStack,
    ) -> Result<(), ResizeError<P::Error, D::Error>> {
        info!(volume_id = %primary.volume_id, "detaching old volume");
        self.provider
            .detach_volume(&primary.volume_id)
            .await
            .map_err(|source| ResizeError::Provider {
                step: "detach old volume",
                source,
            })?;

        // Registered before the detach poll so a timeout mid-detach still
        // restores the old volume.
        stack.register(
            Compensation::new("old volume fate")
                .on_failure(self.restore_old_volume_action(
                    &primary.volume_id,
                    new_volume_id,
                    &request.machine_id,
                    &primary.device_path,
                ))
                .on_success(self.release_old_volume_action(&primary.volume_id)),
        );

        self.wait_for_attachment(
            &primary.volume_id,
            AttachmentState::Detached,
            "volume detachment",
        )
        .await?;

        info!(volume_id = %new_volume_id, device = %primary.device_path, "attaching new volume");
        self.provider
            .attach_volume(new_volume_id, &request.machine_id, &primary.device_path)
            .await
            .map_err(|source| ResizeError::Provider {
                step: "attach new volume",
                source,
            })?;

        self.wait_for_attachment(new_volume_id, AttachmentState::Attached, "volume attachment")
            .await
    }

    async fn lookup_volume(
        &self,
        volume_id: &str,
    ) -> Result<Volume, ResizeError<P::Error, D::Error>> {
        let ids = vec![volume_id.to_owned()];
        let volumes = self
            .provider
            .volumes(&ids)
            .await
            .map_err(|source| ResizeError::Provider {
                step: "list volumes",
                source,
            })?;
        volumes
            .into_iter()
            .find(|volume| volume.id == volume_id)
            .ok_or_else(|| ResizeError::UnknownVolume {
                volume_id: volume_id.to_owned(),
            })
    }

    async fn wait_for_volume_status(
        &self,
        volume_id: &str,
        desired: VolumeStatus,
        action: &'static str,
    ) -> Result<(), ResizeError<P::Error, D::Error>> {
        self.poller
            .wait_for(action, volume_id, &desired, || {
                let provider = Arc::clone(&self.provider);
                let ids = vec![volume_id.to_owned()];
                async move {
                    let volumes = provider.volumes(&ids).await?;
                    Ok(volumes
                        .iter()
                        .find(|volume| Some(&volume.id) == ids.first())
                        .map(|volume| volume.status))
                }
            })
            .await
            .map_err(|err| poll_failure(action, err))
    }

    async fn wait_for_attachment(
        &self,
        volume_id: &str,
        desired: AttachmentState,
        action: &'static str,
    ) -> Result<(), ResizeError<P::Error, D::Error>> {
        self.poller
            .wait_for(action, volume_id, &desired, || {
                let provider = Arc::clone(&self.provider);
                let ids = vec![volume_id.to_owned()];
                async move {
                    let volumes = provider.volumes(&ids).await?;
                    Ok(volumes
                        .iter()
                        .find(|volume| Some(&volume.id) == ids.first())
                        .map(Volume::attachment_state))
                }
            })
            .await
            .map_err(|err| poll_failure(action, err))
    }

    fn delete_snapshot_action(
        &self,
        snapshot_id: &str,
    ) -> impl FnOnce() -> CompensationFuture + Send + 'static {
        let provider = Arc::clone(&self.provider);
        let snapshot_id = snapshot_id.to_owned();
        move || {
            Box::pin(async move {
                provider
                    .delete_snapshot(&snapshot_id)
                    .await
                    .map_err(CompensationError::new)
            })
        }
    }

    fn delete_volume_action(
        &self,
        volume_id: &str,
    ) -> impl FnOnce() -> CompensationFuture + Send + 'static {
        let provider = Arc::clone(&self.provider);
        let volume_id = volume_id.to_owned();
        move || {
            Box::pin(async move {
                provider
                    .delete_volume(&volume_id)
                    .await
                    .map_err(CompensationError::new)
            })
        }
    }

    /// Failure path for the swap: free the device slot and put the old
    /// volume back where it was so the machine stays startable.
    fn restore_old_volume_action(
        &self,
        old_volume_id: &str,
        new_volume_id: &str,
        machine_id: &str,
        device_path: &str,
    ) -> impl FnOnce() -> CompensationFuture + Send + 'static {
        let provider = Arc::clone(&self.provider);
        let old_volume_id = old_volume_id.to_owned();
        let new_volume_id = new_volume_id.to_owned();
        let machine_id = machine_id.to_owned();
        let device_path = device_path.to_owned();
        move || {
            Box::pin(async move {
                if let Err(err) = provider.detach_volume(&new_volume_id).await {
                    warn!(volume_id = %new_volume_id, error = %err,
                        "could not detach replacement volume during restore");
                }
                provider
                    .attach_volume(&old_volume_id, &machine_id, &device_path)
                    .await
                    .map_err(CompensationError::new)
            })
        }
    }

    /// Success path for the swap: the old volume is no longer load-bearing,
    /// so its deletion runs detached from the workflow.
    fn release_old_volume_action(
        &self,
        old_volume_id: &str,
    ) -> impl FnOnce() -> CompensationFuture + Send + 'static {
        let provider = Arc::clone(&self.provider);
        let volume_id = old_volume_id.to_owned();
        move || {
            Box::pin(async move {
                tokio::spawn(async move {
                    if let Err(err) = provider.delete_volume(&volume_id).await {
                        warn!(%volume_id, error = %err,
                            "old volume delete failed; volume may be orphaned");
                    }
                });
                Ok(())
            })
        }
    }
}

fn poll_failure<PE, DE>(step: &'static str, err: PollError<PE>) -> ResizeError<PE, DE>
where
    PE: std::error::Error + 'static,
    DE: std::error::Error + 'static,
{
    match err {
        PollError::Timeout { action, target } => ResizeError::PollTimeout { action, target },
        PollError::Query(source) => ResizeError::Provider { step, source },
    }
}
