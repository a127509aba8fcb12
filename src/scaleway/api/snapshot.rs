//! Snapshot creation, listing, and deletion.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::provider::{Snapshot, SnapshotState};
use crate::scaleway::{ScalewayProvider, ScalewayProviderError};
use crate::sweep::RESIZE_TAG;

/// Snapshot payload subset used by this crate.
#[derive(Clone, Debug, Deserialize)]
pub(super) struct SnapshotBody {
    pub id: String,
    pub state: String,
    #[serde(default)]
    pub base_volume: Option<SnapshotVolumeRef>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Volume reference inside a snapshot payload.
#[derive(Clone, Debug, Deserialize)]
pub(super) struct SnapshotVolumeRef {
    pub id: String,
}

#[derive(Deserialize)]
struct CreateSnapshotResponse {
    snapshot: SnapshotBody,
}

#[derive(Deserialize)]
struct ListSnapshotsResponse {
    snapshots: Vec<SnapshotBody>,
}

#[derive(Serialize)]
struct CreateSnapshotRequest {
    name: String,
    volume_id: String,
    project: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

fn snapshot_state(state: &str) -> SnapshotState {
    match state {
        "available" => SnapshotState::Completed,
        "error" | "invalid_data" => SnapshotState::Error,
        _ => SnapshotState::Pending,
    }
}

fn into_snapshot(body: SnapshotBody) -> Snapshot {
    Snapshot {
        id: body.id,
        source_volume_id: body
            .base_volume
            .map(|volume| volume.id)
            .unwrap_or_default(),
        state: snapshot_state(&body.state),
        tags: body.tags,
    }
}

impl ScalewayProvider {
    pub(in crate::scaleway) async fn snapshot_volume(
        &self,
        volume_id: &str,
        description: &str,
    ) -> Result<Snapshot, ScalewayProviderError> {
        let url = format!(
            "{}/zones/{}/snapshots",
            super::SCALEWAY_INSTANCE_API_BASE,
            self.zone
        );
        let payload = CreateSnapshotRequest {
            name: description.to_owned(),
            volume_id: volume_id.to_owned(),
            project: self.config.default_project_id.clone(),
            organization: self.config.default_organization_id.clone(),
            tags: vec![String::from(RESIZE_TAG), String::from("resize")],
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
            let parsed: CreateSnapshotResponse =
                serde_json::from_slice(&body).map_err(super::provider_error)?;
            return Ok(into_snapshot(parsed.snapshot));
        }

        Err(ScalewayProviderError::SnapshotCreateFailed {
            volume_id: volume_id.to_owned(),
            zone: self.zone.clone(),
            message: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    pub(in crate::scaleway) async fn list_snapshots(
        &self,
        ids: &[String],
    ) -> Result<Vec<Snapshot>, ScalewayProviderError> {
        let url = format!(
            "{}/zones/{}/snapshots",
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
                resource: "snapshots",
                zone: self.zone.clone(),
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let parsed: ListSnapshotsResponse =
            serde_json::from_slice(&body).map_err(super::provider_error)?;
        let snapshots = parsed
            .snapshots
            .into_iter()
            .filter(|snapshot| ids.is_empty() || ids.iter().any(|id| *id == snapshot.id))
            .map(into_snapshot)
            .collect();
        Ok(snapshots)
    }

    pub(in crate::scaleway) async fn remove_snapshot(
        &self,
        snapshot_id: &str,
    ) -> Result<(), ScalewayProviderError> {
        let url = format!(
            "{}/zones/{}/snapshots/{}",
            super::SCALEWAY_INSTANCE_API_BASE,
            self.zone,
            snapshot_id
        );
        let response = super::HTTP_CLIENT
            .delete(&url)
            .header("X-Auth-Token", &self.config.secret_key)
            .send()
            .await
            .map_err(super::provider_error)?;

        let status = response.status();
        // A snapshot that is already gone counts as deleted.
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(ScalewayProviderError::SnapshotDeleteFailed {
            snapshot_id: snapshot_id.to_owned(),
            zone: self.zone.clone(),
            message,
        })
    }
}
