//! Domain record updates through the Scaleway Domains API.

use std::net::IpAddr;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::finalize::DomainUpdater;
use crate::provider::ProviderFuture;

use super::api::HTTP_CLIENT;

const SCALEWAY_DOMAIN_API_BASE: &str = "https://api.scaleway.com/domain/v2beta1";
const RECORD_TTL_SECS: u32 = 300;

/// Errors raised while updating domain records.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScalewayDnsError {
    /// Raised when the domain cannot be split into a record and a zone.
    #[error("domain {domain} has no parent zone")]
    InvalidDomain {
        /// Domain that could not be parsed.
        domain: String,
    },
    /// Raised when the record change is rejected.
    #[error("failed to update record for {domain}: {message}")]
    UpdateFailed {
        /// Domain whose record could not be updated.
        domain: String,
        /// Error message from the provider.
        message: String,
    },
    /// Wrapper for transport level failures.
    #[error("provider error: {message}")]
    Provider {
        /// Message returned by the HTTP layer.
        message: String,
    },
}

#[derive(Serialize)]
struct RecordChanges {
    changes: Vec<Change>,
}

#[derive(Serialize)]
struct Change {
    set: SetChange,
}

#[derive(Serialize)]
struct SetChange {
    id_fields: IdFields,
    records: Vec<Record>,
}

#[derive(Serialize)]
struct IdFields {
    name: String,
    #[serde(rename = "type")]
    record_type: String,
}

#[derive(Serialize)]
struct Record {
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    data: String,
    ttl: u32,
}

/// Splits `box.example.com` into the record name `box` and zone
/// `example.com`.
fn split_domain(domain: &str) -> Option<(&str, &str)> {
    let (name, zone) = domain.split_once('.')?;
    if name.is_empty() || !zone.contains('.') {
        return None;
    }
    Some((name, zone))
}

/// Points per-machine subdomains at their instance via Scaleway DNS zones.
#[derive(Clone, Debug)]
pub struct ScalewayDnsUpdater {
    secret_key: String,
}

impl ScalewayDnsUpdater {
    /// Creates an updater authenticating with the given secret key.
    #[must_use]
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
        }
    }

    async fn set_record(
        &self,
        ip: IpAddr,
        domain: &str,
        username: &str,
    ) -> Result<(), ScalewayDnsError> {
        let Some((record_name, dns_zone)) = split_domain(domain) else {
            return Err(ScalewayDnsError::InvalidDomain {
                domain: domain.to_owned(),
            });
        };

        info!(%domain, %ip, %username, "setting A record");
        let payload = RecordChanges {
            changes: vec![Change {
                set: SetChange {
                    id_fields: IdFields {
                        name: record_name.to_owned(),
                        record_type: String::from("A"),
                    },
                    records: vec![Record {
                        name: record_name.to_owned(),
                        record_type: String::from("A"),
                        data: ip.to_string(),
                        ttl: RECORD_TTL_SECS,
                    }],
                },
            }],
        };

        let url = format!("{SCALEWAY_DOMAIN_API_BASE}/dns-zones/{dns_zone}/records");
        let response = HTTP_CLIENT
            .patch(&url)
            .header("X-Auth-Token", &self.secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ScalewayDnsError::Provider {
                message: err.to_string(),
            })?;

        if response.status().is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(ScalewayDnsError::UpdateFailed {
            domain: domain.to_owned(),
            message,
        })
    }
}

impl DomainUpdater for ScalewayDnsUpdater {
    type Error = ScalewayDnsError;

    fn update_domain<'a>(
        &'a self,
        ip: IpAddr,
        domain: &'a str,
        username: &'a str,
    ) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move { self.set_record(ip, domain, username).await })
    }
}
