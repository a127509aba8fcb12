//! Configuration loading via `ortho-config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::poll::Poller;

/// Scaleway specific configuration derived from environment variables,
/// configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "SCW")]
pub struct ScalewayConfig {
    /// Access key assigned to the Scaleway application. While not required
    /// for API calls, it is captured to support future audit logging.
    pub access_key: Option<String>,
    /// Secret key used for authentication. This value is required.
    pub secret_key: String,
    /// Organisation identifier used by some Scaleway endpoints.
    pub default_organization_id: Option<String>,
    /// Project identifier used for billing and resource scoping.
    pub default_project_id: String,
    /// Availability zone every operation is scoped to. Defaults to
    /// `fr-par-1`.
    #[ortho_config(default = "fr-par-1".to_owned())]
    pub default_zone: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
    section: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
        section: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
            section,
        }
    }
}

impl ScalewayConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to [{}] in voluma.toml",
                metadata.description, metadata.env_var, metadata.toml_key, metadata.section
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("voluma")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages
    /// include guidance on how to provide missing values via environment
    /// variables or configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.secret_key,
            &FieldMetadata::new(
                "Scaleway API secret key",
                "SCW_SECRET_KEY",
                "secret_key",
                "scaleway",
            ),
        )?;
        Self::require_field(
            &self.default_project_id,
            &FieldMetadata::new(
                "Scaleway project ID",
                "SCW_DEFAULT_PROJECT_ID",
                "default_project_id",
                "scaleway",
            ),
        )?;
        Self::require_field(
            &self.default_zone,
            &FieldMetadata::new(
                "availability zone",
                "SCW_DEFAULT_ZONE",
                "default_zone",
                "scaleway",
            ),
        )?;
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

/// Resize policy and wait budgets layered via `OrthoConfig`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "VOLUMA",
    discovery(
        app_name = "voluma",
        env_var = "VOLUMA_CONFIG_PATH",
        config_file_name = "voluma.toml",
        dotfile_name = ".voluma.toml",
        project_file_name = "voluma.toml"
    )
)]
pub struct ResizeSettings {
    /// Hard ceiling on the desired volume size, in gigabytes.
    #[ortho_config(default = 100)]
    pub max_size_gb: u32,
    /// Provider volume type used for the replacement volume.
    #[ortho_config(default = "b_ssd".to_owned())]
    pub volume_type: String,
    /// Seconds to sleep between state-poll attempts.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Total seconds each state-poll loop may take before failing.
    #[ortho_config(default = 300)]
    pub wait_timeout_secs: u64,
    /// Seconds allowed for the post-resize health probe to connect.
    #[ortho_config(default = 60)]
    pub probe_timeout_secs: u64,
    /// TCP port probed on the restarted machine.
    #[ortho_config(default = 22)]
    pub probe_port: u16,
}

impl ResizeSettings {
    /// Loads settings without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, SettingsError> {
        Self::load_from_iter([std::ffi::OsString::from("voluma")])
            .map_err(|err| SettingsError::Parse(err.to_string()))
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when the ceiling is zero, the volume type
    /// is empty, or a wait budget is zero.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_size_gb == 0 {
            return Err(SettingsError::InvalidCeiling);
        }
        if self.volume_type.trim().is_empty() {
            return Err(SettingsError::MissingVolumeType);
        }
        if self.poll_interval_secs == 0 || self.wait_timeout_secs == 0 {
            return Err(SettingsError::InvalidWaitBudget);
        }
        Ok(())
    }

    /// Builds the poller these settings describe.
    #[must_use]
    pub const fn poller(&self) -> Poller {
        Poller::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.wait_timeout_secs),
        )
    }

    /// Health-probe connect budget.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Errors raised while loading or validating [`ResizeSettings`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SettingsError {
    /// Surfaces errors from the `ortho-config` loader.
    #[error("settings parsing failed: {0}")]
    Parse(String),
    /// Indicates the configured size ceiling is zero.
    #[error("max_size_gb must be at least 1")]
    InvalidCeiling,
    /// Indicates the configured volume type is empty.
    #[error("volume_type must not be empty")]
    MissingVolumeType,
    /// Indicates a zero poll interval or wait timeout.
    #[error("poll_interval_secs and wait_timeout_secs must be at least 1")]
    InvalidWaitBudget,
}
