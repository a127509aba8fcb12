//! Post-resize bookkeeping: domain record, instance tag, health probe.
//!
//! Everything here runs after the storage resize has committed. A failed
//! domain update or tag is returned to the caller — they must know the
//! record is stale — but never rolls the volumes back. The health probe is
//! purely best-effort: its failure is logged and swallowed, since the
//! machine is already resized and started.

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::provider::{Provider, ProviderFuture};
use crate::resize::ResizeArtifact;

/// Tag key recording the domain bound to an instance.
pub const DOMAIN_TAG_KEY: &str = "voluma-domain";

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_PROBE_PORT: u16 = 22;

/// Collaborator that points a domain record at a new address.
pub trait DomainUpdater: Send + Sync + 'static {
    /// Updater specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Points `domain` at `ip`, recording `username` against the change.
    fn update_domain<'a>(
        &'a self,
        ip: IpAddr,
        domain: &'a str,
        username: &'a str,
    ) -> ProviderFuture<'a, (), Self::Error>;
}

/// Errors raised by health probes. Never fatal to the workflow.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProbeError {
    /// Raised when the connection attempt exceeded its budget.
    #[error("connect to {query} timed out")]
    Timeout {
        /// Probe target in `host:port` form.
        query: String,
    },
    /// Raised when the connection attempt failed outright.
    #[error("connect to {query} failed: {message}")]
    Connect {
        /// Probe target in `host:port` form.
        query: String,
        /// Error reported by the connection attempt.
        message: String,
    },
    /// Raised when an established connection stopped answering.
    #[error("ping failed: {message}")]
    Ping {
        /// Error reported by the ping.
        message: String,
    },
}

/// Live connection to a machine under probe. Dropping the handle closes it.
pub trait ProbeHandle: Send {
    /// Verifies the machine still answers on the established connection.
    fn ping(&mut self) -> Pin<Box<dyn Future<Output = Result<(), ProbeError>> + Send + '_>>;
}

/// Collaborator that checks a restarted machine is reachable.
pub trait HealthProbe: Send + Sync + 'static {
    /// Connection handle type.
    type Handle: ProbeHandle;

    /// Connects to the machine named by `query` within `budget`.
    fn connect<'a>(
        &'a self,
        query: &'a str,
        budget: Duration,
    ) -> ProviderFuture<'a, Self::Handle, ProbeError>;
}

/// Health probe that dials the machine's TCP port.
///
/// A machine that accepts a connection on its SSH port has finished booting
/// far enough to count as reachable.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TcpHealthProbe;

/// Open TCP connection produced by [`TcpHealthProbe`].
pub struct TcpProbeHandle {
    stream: TcpStream,
}

impl ProbeHandle for TcpProbeHandle {
    fn ping(&mut self) -> Pin<Box<dyn Future<Output = Result<(), ProbeError>> + Send + '_>> {
        Box::pin(async move {
            self.stream
                .writable()
                .await
                .map_err(|err| ProbeError::Ping {
                    message: err.to_string(),
                })
        })
    }
}

impl HealthProbe for TcpHealthProbe {
    type Handle = TcpProbeHandle;

    fn connect<'a>(
        &'a self,
        query: &'a str,
        budget: Duration,
    ) -> ProviderFuture<'a, Self::Handle, ProbeError> {
        Box::pin(async move {
            match timeout(budget, TcpStream::connect(query)).await {
                Ok(Ok(stream)) => Ok(TcpProbeHandle { stream }),
                Ok(Err(err)) => Err(ProbeError::Connect {
                    query: query.to_owned(),
                    message: err.to_string(),
                }),
                Err(_) => Err(ProbeError::Timeout {
                    query: query.to_owned(),
                }),
            }
        })
    }
}

/// Errors raised while finalising a committed resize.
#[derive(Debug, Error)]
pub enum FinalizeError<PE, DE>
where
    PE: std::error::Error + 'static,
    DE: std::error::Error + 'static,
{
    /// Raised when the domain record could not be updated.
    #[error("domain update for {domain} failed: {source}")]
    Domain {
        /// Domain that should have been updated.
        domain: String,
        /// Error reported by the updater.
        #[source]
        source: DE,
    },
    /// Raised when the domain tag could not be recorded on the instance.
    #[error("tagging instance {instance_id} failed: {source}")]
    Tag {
        /// Instance that should have been tagged.
        instance_id: String,
        /// Error reported by the provider.
        #[source]
        source: PE,
    },
}

/// Runs post-resize bookkeeping against the collaborators.
#[derive(Clone, Debug)]
pub struct Finalizer<D, H> {
    domains: D,
    probe: H,
    probe_timeout: Duration,
    probe_port: u16,
}

impl<D, H> Finalizer<D, H>
where
    D: DomainUpdater,
    H: HealthProbe,
{
    /// Creates a finalizer with the default probe budget and port.
    #[must_use]
    pub const fn new(domains: D, probe: H) -> Self {
        Self {
            domains,
            probe,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            probe_port: DEFAULT_PROBE_PORT,
        }
    }

    /// Overrides the probe connect budget.
    #[must_use]
    pub const fn with_probe_timeout(mut self, budget: Duration) -> Self {
        self.probe_timeout = budget;
        self
    }

    /// Overrides the probed TCP port.
    #[must_use]
    pub const fn with_probe_port(mut self, port: u16) -> Self {
        self.probe_port = port;
        self
    }

    /// Updates the domain record, tags the instance with the domain binding,
    /// and pings the restarted machine.
    ///
    /// # Errors
    ///
    /// Returns [`FinalizeError`] when the domain update or the tagging
    /// fails. A probe failure is logged at warn level and swallowed.
    pub async fn finalize<P: Provider>(
        &self,
        provider: &P,
        artifact: &ResizeArtifact,
        username: &str,
    ) -> Result<(), FinalizeError<P::Error, D::Error>> {
        info!(domain = %artifact.domain_name, ip = %artifact.ip, "updating domain record");
        self.domains
            .update_domain(artifact.ip, &artifact.domain_name, username)
            .await
            .map_err(|source| FinalizeError::Domain {
                domain: artifact.domain_name.clone(),
                source,
            })?;

        provider
            .tag_instance(&artifact.instance_id, DOMAIN_TAG_KEY, &artifact.domain_name)
            .await
            .map_err(|source| FinalizeError::Tag {
                instance_id: artifact.instance_id.clone(),
                source,
            })?;

        let query = format!("{}:{}", artifact.ip, self.probe_port);
        match self.probe.connect(&query, self.probe_timeout).await {
            Ok(mut handle) => match handle.ping().await {
                Ok(()) => info!(%query, "machine answered health ping"),
                Err(err) => warn!(%query, error = %err, "health ping failed after resize"),
            },
            Err(err) => warn!(%query, error = %err, "health probe could not connect"),
        }

        Ok(())
    }
}
