//! Direct HTTP plumbing for the Scaleway Instance API.

use std::sync::LazyLock;
use std::time::Duration;

use super::ScalewayProviderError;

mod instance;
mod snapshot;
mod volume;

pub(super) const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
pub(super) const SCALEWAY_INSTANCE_API_BASE: &str = "https://api.scaleway.com/instance/v1";

pub(super) static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Wraps a transport-level failure.
pub(super) fn provider_error(err: impl std::fmt::Display) -> ScalewayProviderError {
    ScalewayProviderError::Provider {
        message: err.to_string(),
    }
}
