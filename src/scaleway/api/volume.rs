//! Volume listing, provisioning, deletion, and attachment patches.

use std::collections::HashMap;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::provider::{AttachmentState, Volume, VolumeAttachment, VolumeSpec, VolumeStatus};
use crate::scaleway::{ScalewayProvider, ScalewayProviderError};

use super::instance::device_slot;

const BYTES_PER_GB: u64 = 1_000_000_000;

pub(super) fn gb_to_bytes(size_gb: u32) -> u64 {
    u64::from(size_gb) * BYTES_PER_GB
}

#[expect(clippy::integer_division, reason = "volume sizes are whole gigabytes")]
pub(super) const fn bytes_to_gb(bytes: u64) -> u64 {
    bytes / BYTES_PER_GB
}

/// Volume payload subset used by this crate.
#[derive(Clone, Debug, Deserialize)]
pub(super) struct VolumeBody {
    pub id: String,
    pub size: u64,
    pub state: String,
    pub zone: String,
    #[serde(default)]
    pub server: Option<VolumeServerRef>,
    #[serde(default)]
    pub base_snapshot: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Server reference inside a volume payload.
#[derive(Clone, Debug, Deserialize)]
pub(super) struct VolumeServerRef {
    pub id: String,
}

#[derive(Deserialize)]
struct ListVolumesResponse {
    volumes: Vec<VolumeBody>,
}

#[derive(Deserialize)]
struct GetVolumeResponse {
    volume: VolumeBody,
}

#[derive(Deserialize)]
struct CreateVolumeResponse {
    volume: VolumeBody,
}

#[derive(Serialize)]
struct CreateVolumeRequest {
    name: String,
    size: u64,
    volume_type: String,
    project: String,
    base_snapshot: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

/// Volume reference for attachment in the Scaleway API.
#[derive(Clone, Debug, Serialize)]
struct VolumeAttachmentBody {
    id: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    boot: bool,
}

/// Request body for `PATCH /servers/{id}` to change attached volumes.
#[derive(Clone, Debug, Serialize)]
struct UpdateInstanceVolumesRequest {
    volumes: HashMap<String, VolumeAttachmentBody>,
}

fn volume_status(state: &str) -> VolumeStatus {
    match state {
        "available" => VolumeStatus::Available,
        "in_use" => VolumeStatus::InUse,
        "deleting" => VolumeStatus::Deleting,
        "error" => VolumeStatus::Error,
        "creating" | "fetching" | "resizing" | "saving" | "snapshotting" | "hotsyncing" => {
            VolumeStatus::Creating
        }
        _ => VolumeStatus::Unknown,
    }
}

fn into_volume(body: VolumeBody) -> Volume {
    let status = volume_status(&body.state);
    // The volume payload does not expose the slot; device paths come from
    // the instance view.
    let attachments = body
        .server
        .map(|server| {
            let state = if status == VolumeStatus::InUse {
                AttachmentState::Attached
            } else {
                AttachmentState::Attaching
            };
            vec![VolumeAttachment {
                instance_id: server.id,
                device_path: String::new(),
                state,
            }]
        })
        .unwrap_or_default();

    Volume {
        id: body.id,
        size_gb: u32::try_from(bytes_to_gb(body.size)).unwrap_or(u32::MAX),
        zone: body.zone,
        status,
        attachments,
        source_snapshot: body.base_snapshot,
        tags: body.tags,
    }
}

impl ScalewayProvider {
    pub(in crate::scaleway) async fn list_volumes(
        &self,
        ids: &[String],
    ) -> Result<Vec<Volume>, ScalewayProviderError> {
        let url = format!(
            "{}/zones/{}/volumes",
            super::SCALEWAY_INSTANCE_API_BASE,
            self.zone
        );
        let response = super::HTTP_CLIENT
            .get(&url)
            .header("X-Auth-Token", &self.config.secret_key)
            .send()
            .await
            .map_err(super::provider_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(super::provider_error)?;
        if !status.is_success() {
            return Err(ScalewayProviderError::ListFailed {
                resource: "volumes",
                zone: self.zone.clone(),
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let parsed: ListVolumesResponse =
            serde_json::from_slice(&body).map_err(super::provider_error)?;
        let volumes = parsed
            .volumes
            .into_iter()
            .filter(|volume| ids.is_empty() || ids.iter().any(|id| *id == volume.id))
            .map(into_volume)
            .collect();
        Ok(volumes)
    }

    async fn get_volume(&self, volume_id: &str) -> Result<Volume, ScalewayProviderError> {
        let url = format!(
            "{}/zones/{}/volumes/{}",
            super::SCALEWAY_INSTANCE_API_BASE,
            self.zone,
            volume_id
        );
        let response = super::HTTP_CLIENT
            .get(&url)
            .header("X-Auth-Token", &self.config.secret_key)
            .send()
            .await
            .map_err(super::provider_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ScalewayProviderError::VolumeNotFound {
                volume_id: volume_id.to_owned(),
                zone: self.zone.clone(),
            });
        }

        let body = response.bytes().await.map_err(super::provider_error)?;
        if !status.is_success() {
            return Err(ScalewayProviderError::Provider {
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let parsed: GetVolumeResponse =
            serde_json::from_slice(&body).map_err(super::provider_error)?;
        Ok(into_volume(parsed.volume))
    }

    pub(in crate::scaleway) async fn provision_volume(
        &self,
        spec: &VolumeSpec,
    ) -> Result<Volume, ScalewayProviderError> {
        let url = format!(
            "{}/zones/{}/volumes",
            super::SCALEWAY_INSTANCE_API_BASE,
            spec.zone
        );
        let payload = CreateVolumeRequest {
            name: spec.name.clone(),
            size: gb_to_bytes(spec.size_gb),
            volume_type: spec.volume_type.clone(),
            project: self.config.default_project_id.clone(),
            base_snapshot: spec.snapshot_id.clone(),
            organization: self.config.default_organization_id.clone(),
            tags: spec.tags.clone(),
        };

        let response = super::HTTP_CLIENT
            .post(&url)
            .header("X-Auth-Token", &self.config.secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(super::provider_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(super::provider_error)?;
        if status.is_success() {
            let parsed: CreateVolumeResponse =
                serde_json::from_slice(&body).map_err(super::provider_error)?;
            return Ok(into_volume(parsed.volume));
        }

        Err(ScalewayProviderError::VolumeCreateFailed {
            name: spec.name.clone(),
            zone: spec.zone.clone(),
            message: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    pub(in crate::scaleway) async fn remove_volume(
        &self,
        volume_id: &str,
    ) -> Result<(), ScalewayProviderError> {
        let url = format!(
            "{}/zones/{}/volumes/{}",
            super::SCALEWAY_INSTANCE_API_BASE,
            self.zone,
            volume_id
        );
        let response = super::HTTP_CLIENT
            .delete(&url)
            .header("X-Auth-Token", &self.config.secret_key)
            .send()
            .await
            .map_err(super::provider_error)?;

        let status = response.status();
        // A volume that is already gone counts as deleted.
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(ScalewayProviderError::VolumeDeleteFailed {
            volume_id: volume_id.to_owned(),
            zone: self.zone.clone(),
            message,
        })
    }

    pub(in crate::scaleway) async fn attach(
        &self,
        volume_id: &str,
        instance_id: &str,
        device_path: &str,
    ) -> Result<(), ScalewayProviderError> {
        let Some(slot) = device_slot(device_path) else {
            return Err(ScalewayProviderError::VolumeAttachmentFailed {
                volume_id: volume_id.to_owned(),
                instance_id: instance_id.to_owned(),
                message: format!("unmappable device path {device_path}"),
            });
        };

        let server = self.fetch_server(instance_id).await?;
        let mut volumes: HashMap<String, VolumeAttachmentBody> = server
            .volumes
            .iter()
            .map(|(key, volume)| {
                (
                    key.clone(),
                    VolumeAttachmentBody {
                        id: volume.id.clone(),
                        boot: key == "0",
                    },
                )
            })
            .collect();
        volumes.insert(
            slot.clone(),
            VolumeAttachmentBody {
                id: volume_id.to_owned(),
                boot: slot == "0",
            },
        );

        self.patch_instance_volumes(
            instance_id,
            &UpdateInstanceVolumesRequest { volumes },
            PatchContext::attach(volume_id),
        )
        .await
    }

    pub(in crate::scaleway) async fn detach(
        &self,
        volume_id: &str,
    ) -> Result<(), ScalewayProviderError> {
        let volume = self.get_volume(volume_id).await?;
        let Some(holder) = volume
            .attachments
            .first()
            .map(|attachment| attachment.instance_id.clone())
        else {
            debug!(volume_id, "volume already detached");
            return Ok(());
        };

        let server = self.fetch_server(&holder).await?;
        let volumes: HashMap<String, VolumeAttachmentBody> = server
            .volumes
            .iter()
            .filter(|(_, volume_ref)| volume_ref.id != volume_id)
            .map(|(key, volume_ref)| {
                (
                    key.clone(),
                    VolumeAttachmentBody {
                        id: volume_ref.id.clone(),
                        boot: key == "0",
                    },
                )
            })
            .collect();

        self.patch_instance_volumes(
            &holder,
            &UpdateInstanceVolumesRequest { volumes },
            PatchContext::detach(volume_id),
        )
        .await
    }

    /// Sends a PATCH request to update instance volumes.
    async fn patch_instance_volumes(
        &self,
        instance_id: &str,
        request: &UpdateInstanceVolumesRequest,
        context: PatchContext<'_>,
    ) -> Result<(), ScalewayProviderError> {
        let url = format!(
            "{}/zones/{}/servers/{}",
            super::SCALEWAY_INSTANCE_API_BASE,
            self.zone,
            instance_id
        );

        let response = super::HTTP_CLIENT
            .patch(&url)
            .header("X-Auth-Token", &self.config.secret_key)
            .json(request)
            .send()
            .await
            .map_err(super::provider_error)?;

        if response.status().is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(context.into_error(instance_id.to_owned(), message))
    }
}

#[derive(Copy, Clone, Debug)]
enum PatchAction {
    Attach,
    Detach,
}

#[derive(Copy, Clone, Debug)]
struct PatchContext<'a> {
    volume_id: &'a str,
    action: PatchAction,
}

impl<'a> PatchContext<'a> {
    const fn attach(volume_id: &'a str) -> Self {
        Self {
            volume_id,
            action: PatchAction::Attach,
        }
    }

    const fn detach(volume_id: &'a str) -> Self {
        Self {
            volume_id,
            action: PatchAction::Detach,
        }
    }

    fn into_error(self, instance_id: String, message: String) -> ScalewayProviderError {
        match self.action {
            PatchAction::Attach => ScalewayProviderError::VolumeAttachmentFailed {
                volume_id: self.volume_id.to_owned(),
                instance_id,
                message,
            },
            PatchAction::Detach => ScalewayProviderError::VolumeDetachFailed {
                volume_id: self.volume_id.to_owned(),
                instance_id,
                message,
            },
        }
    }
}
