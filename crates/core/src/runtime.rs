use std::collections::BTreeMap;

use tokio::sync::oneshot;

use crate::{ContainerId, ContainerSummary, ImageRef, PullProgress, RuntimeError};

/// What the launcher asks the runtime to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub image: ImageRef,
    pub exposed_ports: Vec<u16>,
    /// Let the runtime pick an ephemeral host port for every exposed port
    pub publish_all_ports: bool,
    pub labels: BTreeMap<String, String>,
}

/// One-shot "container is running" notification.
///
/// Resolves exactly once per start: `Ok` when the runtime reports the
/// container as running, `Err` if it reports a failure first. A dropped
/// sender means the runtime went away without reporting either.
pub type StartSignal = oneshot::Receiver<Result<(), RuntimeError>>;

/// Capability over a container-runtime daemon.
///
/// A single client is shared by reference across every component of a
/// fixture; implementations must not open a new connection per call.
#[trait_variant::make(Send)]
pub trait ContainerRuntime: Send + Sync + 'static {
    async fn image_exists(&self, image: &ImageRef) -> Result<bool, RuntimeError>;

    async fn pull_image(&self, image: &ImageRef) -> Result<Vec<PullProgress>, RuntimeError>;

    async fn create_container(&self, spec: &LaunchSpec) -> Result<ContainerId, RuntimeError>;

    /// Requests the start. Returning `Ok` is only the acknowledgment; the
    /// container is running once the returned signal resolves.
    async fn start_container(&self, id: &ContainerId) -> Result<StartSignal, RuntimeError>;

    async fn list_containers(
        &self,
        image: &ImageRef,
    ) -> Result<Vec<ContainerSummary>, RuntimeError>;

    /// Stopping a container that is already stopped succeeds
    async fn stop_container(&self, id: &ContainerId, timeout_secs: u64)
        -> Result<(), RuntimeError>;

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), RuntimeError>;
}
