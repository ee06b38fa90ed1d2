use itertools::Itertools as _;
use tracing::debug;

use crate::{
    launch::FixtureHandle, ContainerRuntime, ContainerSummary, NetworkResolutionError,
    PortResolutionError, RuntimeError,
};

/// Applies the publication policy to one container's live port table.
///
/// When a port is listed more than once (e.g. one IPv4 and one IPv6
/// binding) a mapping published on all interfaces wins; otherwise the first
/// mapping decides which error is reported.
pub fn select_public_port(
    summary: &ContainerSummary,
    container_port: u16,
) -> Result<u16, PortResolutionError> {
    if summary.ports.is_empty() {
        return Err(PortResolutionError::NoPortsExposed(summary.id.clone()));
    }

    let mapping = summary
        .ports
        .iter()
        .filter(|m| m.container_port == container_port)
        .find_or_first(|m| m.is_public() && m.host_port.is_some())
        .ok_or_else(|| PortResolutionError::PortNotMapped {
            container: summary.id.clone(),
            port: container_port,
        })?;

    let Some(host_port) = mapping.host_port else {
        return Err(PortResolutionError::PortNotPublished {
            container: summary.id.clone(),
            port: container_port,
        });
    };

    if !mapping.is_public() {
        return Err(PortResolutionError::PortBoundToLoopbackOnly {
            container: summary.id.clone(),
            port: container_port,
            host_ip: mapping
                .host_ip
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "<unset>".into()),
        });
    }

    Ok(host_port)
}

/// Address on the first attached network; fixtures are single-homed
pub fn select_container_ip(summary: &ContainerSummary) -> Result<String, NetworkResolutionError> {
    let network = summary
        .networks
        .first()
        .ok_or_else(|| NetworkResolutionError::NotConnectedToAnyNetwork(summary.id.clone()))?;

    match network.ip_address.as_deref() {
        Some(ip) if !ip.is_empty() => Ok(ip.to_string()),
        _ => Err(NetworkResolutionError::MissingAddress {
            container: summary.id.clone(),
            network: network.network.clone(),
        }),
    }
}

/// Reads live metadata for a fixture's container. Nothing is cached: every
/// call goes back to the runtime.
pub struct RuntimeIntrospector<'a, R> {
    runtime: &'a R,
}

impl<'a, R: ContainerRuntime> RuntimeIntrospector<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    async fn summary(&self, handle: &FixtureHandle) -> Result<ContainerSummary, RuntimeError> {
        let listed = self
            .runtime
            .list_containers(&handle.config().image)
            .await?;

        debug!(
            container = %handle.id(),
            listed = listed.len(),
            "queried runtime for live metadata"
        );

        listed
            .into_iter()
            .find(|x| &x.id == handle.id())
            .ok_or_else(|| RuntimeError::ContainerNotFound(handle.id().clone()))
    }

    pub async fn resolve_public_port(
        &self,
        handle: &FixtureHandle,
        container_port: u16,
    ) -> Result<u16, PortResolutionError> {
        let summary = self.summary(handle).await.map_err(|err| match err {
            RuntimeError::ContainerNotFound(id) => PortResolutionError::ContainerNotFound(id),
            other => other.into(),
        })?;

        select_public_port(&summary, container_port)
    }

    pub async fn resolve_container_ip(
        &self,
        handle: &FixtureHandle,
    ) -> Result<String, NetworkResolutionError> {
        let summary = self.summary(handle).await.map_err(|err| match err {
            RuntimeError::ContainerNotFound(id) => NetworkResolutionError::ContainerNotFound(id),
            other => other.into(),
        })?;

        select_container_ip(&summary)
    }

    pub async fn resolve_image_reference(
        &self,
        handle: &FixtureHandle,
    ) -> Result<String, RuntimeError> {
        self.summary(handle).await.map(|x| x.image)
    }
}
