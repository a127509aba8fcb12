//! Strongly-typed resize request, validated at construction.

use thiserror::Error;

use crate::provider::MachineState;

/// Errors raised while building a [`ResizeRequest`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// Raised when a required string field is missing or empty.
    #[error("missing or empty field: {0}")]
    Validation(String),
    /// Raised when the desired size is zero.
    #[error("desired size must be at least 1GB")]
    ZeroSize,
}

/// Immutable input to one resize workflow run.
///
/// Carries exactly the fields the workflow needs, instead of an untyped
/// metadata map resolved at point of use. The desired size is validated for
/// shape here; whether it is an eligible *increase* is the workflow's first
/// step, since that requires reading the current volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResizeRequest {
    /// Provider identifier of the machine to resize.
    pub machine_id: String,
    /// Target size of the primary volume, in whole gigabytes.
    pub desired_size_gb: u32,
    /// Lifecycle state recorded for the machine when the request was made.
    pub current_state: MachineState,
    /// Domain name to point at the resized machine.
    pub domain_name: String,
    /// Username recorded against the domain update.
    pub username: String,
}

impl ResizeRequest {
    /// Starts a builder for a [`ResizeRequest`].
    #[must_use]
    pub fn builder() -> ResizeRequestBuilder {
        ResizeRequestBuilder::new()
    }

    /// Validates the request, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when any string field is empty
    /// and [`RequestError::ZeroSize`] when the desired size is zero.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.machine_id.is_empty() {
            return Err(RequestError::Validation("machine_id".to_owned()));
        }
        if self.desired_size_gb == 0 {
            return Err(RequestError::ZeroSize);
        }
        if self.domain_name.is_empty() {
            return Err(RequestError::Validation("domain_name".to_owned()));
        }
        if self.username.is_empty() {
            return Err(RequestError::Validation("username".to_owned()));
        }
        Ok(())
    }
}

/// Builder for [`ResizeRequest`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResizeRequestBuilder {
    machine_id: String,
    desired_size_gb: u32,
    current_state: Option<MachineState>,
    domain_name: String,
    username: String,
}

impl ResizeRequestBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the machine identifier.
    #[must_use]
    pub fn machine_id(mut self, value: impl Into<String>) -> Self {
        self.machine_id = value.into();
        self
    }

    /// Sets the desired size in gigabytes.
    #[must_use]
    pub const fn desired_size_gb(mut self, value: u32) -> Self {
        self.desired_size_gb = value;
        self
    }

    /// Sets the recorded lifecycle state.
    #[must_use]
    pub const fn current_state(mut self, value: MachineState) -> Self {
        self.current_state = Some(value);
        self
    }

    /// Sets the domain name.
    #[must_use]
    pub fn domain_name(mut self, value: impl Into<String>) -> Self {
        self.domain_name = value.into();
        self
    }

    /// Sets the username.
    #[must_use]
    pub fn username(mut self, value: impl Into<String>) -> Self {
        self.username = value.into();
        self
    }

    /// Builds and validates the [`ResizeRequest`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when any required field is empty or the
    /// desired size is zero.
    pub fn build(self) -> Result<ResizeRequest, RequestError> {
        let request = ResizeRequest {
            machine_id: self.machine_id.trim().to_owned(),
            desired_size_gb: self.desired_size_gb,
            current_state: self.current_state.unwrap_or(MachineState::Unknown),
            domain_name: self.domain_name.trim().to_owned(),
            username: self.username.trim().to_owned(),
        };
        request.validate()?;
        Ok(request)
    }
}
