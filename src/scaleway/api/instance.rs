//! Instance reads, power transitions, and tagging.

use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::debug;

use crate::poll::PollError;
use crate::provider::{BlockDevice, Instance, MachineState, StartArtifact};
use crate::scaleway::{ScalewayProvider, ScalewayProviderError};

/// Server payload subset used by this crate.
#[derive(Clone, Debug, Deserialize)]
pub(super) struct ServerBody {
    pub id: String,
    pub state: String,
    pub zone: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub volumes: HashMap<String, ServerVolumeRef>,
}

/// Volume slot entry inside a server payload.
#[derive(Clone, Debug, Deserialize)]
pub(super) struct ServerVolumeRef {
    pub id: String,
}

#[derive(Deserialize)]
struct GetServerResponse {
    server: ServerBody,
}

#[derive(Serialize)]
struct UpdateServerTagsRequest {
    tags: Vec<String>,
}

/// Maps a volume slot index to the virtio device path the guest sees.
pub(super) fn slot_device_path(slot: usize) -> String {
    let letter = u8::try_from(slot)
        .ok()
        .and_then(|index| index.checked_add(b'a'))
        .filter(|byte| *byte <= b'z')
        .map_or('?', char::from);
    format!("/dev/vd{letter}")
}

/// Maps a virtio device path back to its volume slot key.
pub(super) fn device_slot(device_path: &str) -> Option<String> {
    let suffix = device_path.strip_prefix("/dev/vd")?;
    let mut letters = suffix.chars();
    let letter = letters.next()?;
    if letters.next().is_some() || !letter.is_ascii_lowercase() {
        return None;
    }
    let index = u32::from(letter).checked_sub(u32::from('a'))?;
    Some(index.to_string())
}

fn sorted_block_devices(volumes: &HashMap<String, ServerVolumeRef>) -> Vec<BlockDevice> {
    let mut slots: Vec<(usize, &ServerVolumeRef)> = volumes
        .iter()
        .filter_map(|(key, volume)| key.parse::<usize>().ok().map(|slot| (slot, volume)))
        .collect();
    slots.sort_by_key(|(slot, _)| *slot);
    slots
        .into_iter()
        .map(|(slot, volume)| BlockDevice {
            device_path: slot_device_path(slot),
            volume_id: volume.id.clone(),
        })
        .collect()
}

fn tag_map(tags: &[String]) -> HashMap<String, String> {
    tags.iter()
        .map(|tag| {
            tag.split_once('=').map_or_else(
                || (tag.clone(), String::new()),
                |(key, value)| (key.to_owned(), value.to_owned()),
            )
        })
        .collect()
}

impl ScalewayProvider {
    /// Fetches the raw server payload for an instance.
    pub(super) async fn fetch_server(
        &self,
        instance_id: &str,
    ) -> Result<ServerBody, ScalewayProviderError> {
        let url = format!(
            "{}/zones/{}/servers/{}",
            super::SCALEWAY_INSTANCE_API_BASE,
            self.zone,
            instance_id
        );

        let response = super::HTTP_CLIENT
            .get(&url)
            .header("X-Auth-Token", &self.config.secret_key)
            .send()
            .await
            .map_err(super::provider_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(super::provider_error)?;
        if status.is_success() {
            let parsed: GetServerResponse =
                serde_json::from_slice(&body).map_err(super::provider_error)?;
            return Ok(parsed.server);
        }

        Err(ScalewayProviderError::Provider {
            message: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    pub(in crate::scaleway) async fn get_instance(
        &self,
        instance_id: &str,
    ) -> Result<Instance, ScalewayProviderError> {
        let server = self.fetch_server(instance_id).await?;
        Ok(Instance {
            id: server.id,
            state: MachineState::parse(&server.state),
            zone: server.zone,
            block_devices: sorted_block_devices(&server.volumes),
            tags: tag_map(&server.tags),
        })
    }

    /// Reads the power view (state, allowed actions, public IP) through the
    /// SDK's list endpoint.
    async fn fetch_power_view(
        &self,
        instance_id: &str,
    ) -> Result<Option<PowerView>, ScalewayProviderError> {
        let mut servers = self
            .api
            .list_instances(&self.zone)
            .servers(instance_id)
            .per_page(1)
            .run_async()
            .await?;

        Ok(servers.pop().map(|server| PowerView {
            state: server.state,
            allowed_actions: server.allowed_actions,
            public_ip: server.public_ip.map(|ip| ip.address),
        }))
    }

    async fn perform_power_action(
        &self,
        instance_id: &str,
        action: &'static str,
        view: &PowerView,
    ) -> Result<(), ScalewayProviderError> {
        if !view.allowed_actions.iter().any(|allowed| allowed == action) {
            return Err(ScalewayProviderError::PowerActionNotAllowed {
                instance_id: instance_id.to_owned(),
                action,
                state: view.state.clone(),
            });
        }
        self.api
            .perform_instance_action_async(&self.zone, instance_id, action)
            .await?;
        Ok(())
    }

    pub(in crate::scaleway) async fn power_off(
        &self,
        instance_id: &str,
    ) -> Result<(), ScalewayProviderError> {
        let Some(view) = self.fetch_power_view(instance_id).await? else {
            return Err(ScalewayProviderError::Provider {
                message: format!("instance {instance_id} not visible in zone {}", self.zone),
            });
        };
        if view.state == "stopped" {
            debug!(instance_id, "instance already stopped");
            return Ok(());
        }
        self.perform_power_action(instance_id, "poweroff", &view)
            .await?;

        self.poller
            .wait_for("instance stop", instance_id, &MachineState::Stopped, || {
                let provider = self.clone();
                let id = instance_id.to_owned();
                async move {
                    let view = provider.fetch_power_view(&id).await?;
                    Ok(view.map(|power| MachineState::parse(&power.state)))
                }
            })
            .await
            .map_err(|err| flatten_poll(err, instance_id))
    }

    pub(in crate::scaleway) async fn power_on(
        &self,
        instance_id: &str,
    ) -> Result<StartArtifact, ScalewayProviderError> {
        let Some(view) = self.fetch_power_view(instance_id).await? else {
            return Err(ScalewayProviderError::Provider {
                message: format!("instance {instance_id} not visible in zone {}", self.zone),
            });
        };
        if view.state != "running" {
            self.perform_power_action(instance_id, "poweron", &view)
                .await?;
        }
        self.wait_for_public_ip(instance_id).await
    }

    /// Waits until the instance is running with a parseable public IPv4.
    async fn wait_for_public_ip(
        &self,
        instance_id: &str,
    ) -> Result<StartArtifact, ScalewayProviderError> {
        let deadline = Instant::now() + self.poller.wait_timeout();
        let mut saw_running = false;

        while Instant::now() <= deadline {
            let Some(view) = self.fetch_power_view(instance_id).await? else {
                sleep(self.poller.poll_interval()).await;
                continue;
            };

            if view.state != "running" {
                sleep(self.poller.poll_interval()).await;
                continue;
            }

            saw_running = true;

            if let Some(address) = view
                .public_ip
                .as_ref()
                .and_then(|ip| IpAddr::from_str(ip).ok())
            {
                return Ok(StartArtifact {
                    instance_id: instance_id.to_owned(),
                    ip: address,
                });
            }

            sleep(self.poller.poll_interval()).await;
        }

        if saw_running {
            return Err(ScalewayProviderError::MissingPublicIp {
                instance_id: instance_id.to_owned(),
            });
        }

        Err(ScalewayProviderError::Timeout {
            action: "instance start".to_owned(),
            instance_id: instance_id.to_owned(),
        })
    }

    pub(in crate::scaleway) async fn upsert_tag(
        &self,
        instance_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ScalewayProviderError> {
        let server = self.fetch_server(instance_id).await?;
        let prefix = format!("{key}=");
        let mut tags: Vec<String> = server
            .tags
            .into_iter()
            .filter(|tag| !tag.starts_with(&prefix))
            .collect();
        tags.push(format!("{key}={value}"));

        let url = format!(
            "{}/zones/{}/servers/{}",
            super::SCALEWAY_INSTANCE_API_BASE,
            self.zone,
            instance_id
        );
        let response = super::HTTP_CLIENT
            .patch(&url)
            .header("X-Auth-Token", &self.config.secret_key)
            .json(&UpdateServerTagsRequest { tags })
            .send()
            .await
            .map_err(super::provider_error)?;

        if response.status().is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(ScalewayProviderError::TagFailed {
            instance_id: instance_id.to_owned(),
            message,
        })
    }
}

struct PowerView {
    state: String,
    allowed_actions: Vec<String>,
    public_ip: Option<String>,
}

fn flatten_poll(
    err: PollError<ScalewayProviderError>,
    instance_id: &str,
) -> ScalewayProviderError {
    match err {
        PollError::Timeout { action, .. } => ScalewayProviderError::Timeout {
            action,
            instance_id: instance_id.to_owned(),
        },
        PollError::Query(inner) => inner,
    }
}
