use serde::{Deserialize, Serialize};
use std::{fmt::Display, net::IpAddr, time::Duration};
use thiserror::Error;

pub mod config;
pub mod health;
pub mod image;
pub mod introspect;
pub mod launch;
pub mod lifecycle;
pub mod runtime;
pub mod state;

pub use config::*;
pub use health::{HealthProbe, ProbeError};
pub use launch::FixtureHandle;
pub use lifecycle::*;
pub use runtime::*;
pub use state::*;

/// Opaque identifier assigned to a container by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(pub String);

impl Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContainerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ContainerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A pinned image identity, rendered as `name:version`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub name: String,
    pub version: String,
}

impl ImageRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// A single port entry as reported by live runtime metadata.
///
/// Never cached: the host side is assigned by the runtime at start time and
/// is only trustworthy when read back from the running container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: Option<u16>,
    pub host_ip: Option<IpAddr>,
}

impl PortMapping {
    pub fn is_public(&self) -> bool {
        matches!(self.host_ip, Some(ip) if ip.is_unspecified())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAttachment {
    pub network: String,
    pub ip_address: Option<String>,
}

/// Live metadata for a container, as returned by a runtime listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: ContainerId,
    pub image: String,
    pub ports: Vec<PortMapping>,
    pub networks: Vec<NetworkAttachment>,
}

/// Progress event collected while pulling an image, diagnostic only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullProgress {
    pub status: String,
    pub detail: Option<String>,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container {0} not found")]
    ContainerNotFound(ContainerId),

    #[error("image {0} not found")]
    ImageNotFound(String),

    #[error("container exited before reporting running: {0}")]
    ExitedBeforeRunning(String),

    #[error("runtime error")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RuntimeError {
    pub fn internal<T>(value: T) -> Self
    where
        T: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        RuntimeError::Internal(value.into())
    }
}

#[derive(Debug, Error)]
pub enum PortResolutionError {
    #[error("container {0} has no ports exposed or mapped at all")]
    NoPortsExposed(ContainerId),

    #[error("no mapping found for port {port} on container {container}")]
    PortNotMapped { container: ContainerId, port: u16 },

    #[error("port {port} of container {container} is mapped but not published")]
    PortNotPublished { container: ContainerId, port: u16 },

    #[error("port {port} of container {container} is bound to {host_ip} instead of all interfaces")]
    PortBoundToLoopbackOnly {
        container: ContainerId,
        port: u16,
        host_ip: String,
    },

    #[error("container {0} is not listed by the runtime")]
    ContainerNotFound(ContainerId),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[derive(Debug, Error)]
pub enum NetworkResolutionError {
    #[error("container {0} is not connected to any network")]
    NotConnectedToAnyNetwork(ContainerId),

    #[error("container {container} has no address on network {network}")]
    MissingAddress {
        container: ContainerId,
        network: String,
    },

    #[error("container {0} is not listed by the runtime")]
    ContainerNotFound(ContainerId),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("invalid fixture config, field `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("failed to pull image {image}")]
    PullFailed {
        image: ImageRef,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to launch container for {image}: {reason}")]
    LaunchFailed {
        image: ImageRef,
        reason: String,
        #[source]
        source: Option<RuntimeError>,
    },

    #[error("health check against {url} timed out after {timeout:?}, last error: {last_error}")]
    HealthCheckTimeout {
        url: String,
        timeout: Duration,
        last_error: String,
    },

    #[error("fixture {image} is not running (state: {state})")]
    NotRunning { image: ImageRef, state: FixtureState },

    #[error("fixture {image} has no container, nothing to destroy")]
    NothingToDestroy { image: ImageRef },

    #[error("fixture {image} cannot {operation} from state {state}")]
    InvalidState {
        image: ImageRef,
        state: FixtureState,
        operation: &'static str,
    },

    #[error("fixture {image} has no exposed port named `{name}`")]
    UnknownService { image: ImageRef, name: String },

    #[error("port resolution failed for {image}")]
    Port {
        image: ImageRef,
        #[source]
        source: PortResolutionError,
    },

    #[error("network resolution failed for {image}")]
    Network {
        image: ImageRef,
        #[source]
        source: NetworkResolutionError,
    },

    #[error("container runtime call failed for {image}")]
    Runtime {
        image: ImageRef,
        #[source]
        source: RuntimeError,
    },
}

impl FixtureError {
    pub fn invalid_config(field: &'static str, reason: impl Display) -> Self {
        FixtureError::InvalidConfig {
            field,
            reason: reason.to_string(),
        }
    }
}
