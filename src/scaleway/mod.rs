//! Scaleway implementation of the provider facade.
//!
//! Instance power actions and power-state reads go through `scaleway_rs`;
//! volumes, snapshots, attachment patches, and tagging use direct HTTP
//! calls, since the SDK does not expose those operations.

mod api;
mod dns;
mod error;

use std::time::Duration;

use scaleway_rs::ScalewayApi;

use crate::config::ScalewayConfig;
use crate::poll::Poller;
use crate::provider::{
    Instance, Provider, ProviderFuture, Snapshot, StartArtifact, Volume, VolumeSpec,
};

pub use dns::{ScalewayDnsError, ScalewayDnsUpdater};
pub use error::ScalewayProviderError;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Provider backed by the Scaleway Instance API.
///
/// Every operation is scoped to the configured availability zone; the
/// resize workflow requires instance and volumes to share a zone anyway.
#[derive(Clone)]
pub struct ScalewayProvider {
    api: ScalewayApi,
    config: ScalewayConfig,
    zone: String,
    poller: Poller,
}

impl ScalewayProvider {
    /// Constructs a new provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayProviderError::Config`] when the provided
    /// configuration fails validation.
    pub fn new(config: ScalewayConfig) -> Result<Self, ScalewayProviderError> {
        config.validate()?;
        let zone = config.default_zone.clone();
        Ok(Self {
            api: ScalewayApi::new(&config.secret_key),
            config,
            zone,
            poller: Poller::new(POLL_INTERVAL, WAIT_TIMEOUT),
        })
    }

    /// Overrides the poller used for internal power-state waits.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }

    /// Zone every operation is scoped to.
    #[must_use]
    pub fn zone(&self) -> &str {
        &self.zone
    }
}

impl Provider for ScalewayProvider {
    type Error = ScalewayProviderError;

    fn instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, Instance, Self::Error> {
        Box::pin(async move { self.get_instance(id).await })
    }

    fn volumes<'a>(&'a self, ids: &'a [String]) -> ProviderFuture<'a, Vec<Volume>, Self::Error> {
        Box::pin(async move { self.list_volumes(ids).await })
    }

    fn create_snapshot<'a>(
        &'a self,
        volume_id: &'a str,
        description: &'a str,
    ) -> ProviderFuture<'a, Snapshot, Self::Error> {
        Box::pin(async move { self.snapshot_volume(volume_id, description).await })
    }

    fn snapshots<'a>(
        &'a self,
        ids: &'a [String],
    ) -> ProviderFuture<'a, Vec<Snapshot>, Self::Error> {
        Box::pin(async move { self.list_snapshots(ids).await })
    }

    fn create_volume<'a>(
        &'a self,
        spec: &'a VolumeSpec,
    ) -> ProviderFuture<'a, Volume, Self::Error> {
        Box::pin(async move { self.provision_volume(spec).await })
    }

    fn delete_volume<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move { self.remove_volume(id).await })
    }

    fn delete_snapshot<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move { self.remove_snapshot(id).await })
    }

    fn detach_volume<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move { self.detach(id).await })
    }

    fn attach_volume<'a>(
        &'a self,
        volume_id: &'a str,
        instance_id: &'a str,
        device_path: &'a str,
    ) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move { self.attach(volume_id, instance_id, device_path).await })
    }

    fn stop_instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move { self.power_off(id).await })
    }

    fn start_instance<'a>(
        &'a self,
        id: &'a str,
    ) -> ProviderFuture<'a, StartArtifact, Self::Error> {
        Box::pin(async move { self.power_on(id).await })
    }

    fn tag_instance<'a>(
        &'a self,
        id: &'a str,
        key: &'a str,
        value: &'a str,
    ) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move { self.upsert_tag(id, key, value).await })
    }
}
