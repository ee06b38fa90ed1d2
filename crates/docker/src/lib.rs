//! Docker Engine implementation of the container-runtime capability, on top
//! of bollard.

use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use bollard::{
    container::{
        Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
        RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    },
    errors::Error as DockerError,
    image::CreateImageOptions,
    models::{ContainerState, ContainerStateStatusEnum, HostConfig, PortTypeEnum},
    Docker,
};
use futures_util::StreamExt as _;
use ledgerbox_core::{
    ContainerId, ContainerRuntime, ContainerSummary, ImageRef, LaunchSpec, NetworkAttachment,
    PortMapping, PullProgress, RuntimeError, StartSignal,
};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

const START_POLL_INTERVAL: Duration = Duration::from_millis(50);
const START_WATCH_LIMIT: Duration = Duration::from_secs(120);

const NOT_MODIFIED: u16 = 304;
const NOT_FOUND: u16 = 404;

#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects using the local defaults (`DOCKER_HOST` or the platform
    /// socket) and checks the daemon answers.
    pub async fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults().map_err(RuntimeError::internal)?;
        let runtime = Self::from_client(docker);

        runtime.ping().await?;

        Ok(runtime)
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    pub async fn ping(&self) -> Result<(), RuntimeError> {
        let reply = self.docker.ping().await.map_err(RuntimeError::internal)?;
        debug!(reply = %reply, "docker daemon reachable");
        Ok(())
    }
}

fn status_code(err: &DockerError) -> Option<u16> {
    match err {
        DockerError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

fn container_err(id: &ContainerId, err: DockerError) -> RuntimeError {
    match status_code(&err) {
        Some(NOT_FOUND) => RuntimeError::ContainerNotFound(id.clone()),
        _ => RuntimeError::internal(err),
    }
}

pub fn container_config(spec: &LaunchSpec) -> Config<String> {
    let exposed_ports = spec
        .exposed_ports
        .iter()
        .map(|port| (format!("{port}/tcp"), HashMap::new()))
        .collect();

    let labels = spec
        .labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let host_config = HostConfig {
        publish_all_ports: Some(spec.publish_all_ports),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.to_string()),
        exposed_ports: Some(exposed_ports),
        labels: Some(labels),
        host_config: Some(host_config),
        ..Default::default()
    }
}

/// Maps a Docker listing entry into runtime-neutral metadata.
///
/// Networks are ordered by name since Docker reports them unordered; UDP
/// entries are dropped because every exposed port is published as TCP.
pub fn summary_from_docker(summary: bollard::models::ContainerSummary) -> ContainerSummary {
    let ports = summary
        .ports
        .unwrap_or_default()
        .into_iter()
        .filter(|p| !matches!(p.typ, Some(PortTypeEnum::UDP) | Some(PortTypeEnum::SCTP)))
        .map(|p| PortMapping {
            container_port: p.private_port,
            host_port: p.public_port,
            host_ip: p.ip.as_deref().and_then(|ip| ip.parse().ok()),
        })
        .collect();

    let networks: BTreeMap<_, _> = summary
        .network_settings
        .and_then(|x| x.networks)
        .unwrap_or_default()
        .into_iter()
        .collect();

    let networks = networks
        .into_iter()
        .map(|(network, endpoint)| NetworkAttachment {
            network,
            ip_address: endpoint.ip_address,
        })
        .collect();

    ContainerSummary {
        id: ContainerId(summary.id.unwrap_or_default()),
        image: summary.image.unwrap_or_default(),
        ports,
        networks,
    }
}

/// Docker takes the grace period as a signed integer
fn stop_timeout(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// Classifies an inspected container state: `None` while it is still
/// starting up.
pub fn start_outcome(state: &ContainerState) -> Option<Result<(), RuntimeError>> {
    if state.running == Some(true) {
        return Some(Ok(()));
    }

    match state.status {
        Some(ContainerStateStatusEnum::EXITED) | Some(ContainerStateStatusEnum::DEAD) => {
            let detail = state
                .error
                .as_deref()
                .filter(|x| !x.is_empty())
                .map(|x| format!(": {x}"))
                .unwrap_or_default();

            let reason = format!("exit code {}{detail}", state.exit_code.unwrap_or_default());

            Some(Err(RuntimeError::ExitedBeforeRunning(reason)))
        }
        _ => None,
    }
}

/// Polls the container state until it reports running or gives up, then
/// delivers the outcome exactly once.
async fn watch_start(
    docker: Docker,
    id: ContainerId,
    signal: oneshot::Sender<Result<(), RuntimeError>>,
) {
    let deadline = tokio::time::Instant::now() + START_WATCH_LIMIT;

    let outcome = loop {
        let inspect = docker
            .inspect_container(&id.0, None::<InspectContainerOptions>)
            .await;

        let state = match inspect {
            Ok(x) => x.state.unwrap_or_default(),
            Err(err) => break Err(container_err(&id, err)),
        };

        if let Some(outcome) = start_outcome(&state) {
            break outcome;
        }

        if tokio::time::Instant::now() >= deadline {
            break Err(RuntimeError::internal(format!(
                "container {id} not running after {START_WATCH_LIMIT:?}"
            )));
        }

        tokio::time::sleep(START_POLL_INTERVAL).await;
    };

    if signal.send(outcome).is_err() {
        debug!(container = %id, "start signal receiver gone");
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn image_exists(&self, image: &ImageRef) -> Result<bool, RuntimeError> {
        match self.docker.inspect_image(&image.to_string()).await {
            Ok(_) => Ok(true),
            Err(err) if status_code(&err) == Some(NOT_FOUND) => Ok(false),
            Err(err) => Err(RuntimeError::internal(err)),
        }
    }

    async fn pull_image(&self, image: &ImageRef) -> Result<Vec<PullProgress>, RuntimeError> {
        let options = CreateImageOptions {
            from_image: image.name.clone(),
            tag: image.version.clone(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        let mut progress = vec![];

        while let Some(event) = stream.next().await {
            let info = event.map_err(|err| match status_code(&err) {
                Some(NOT_FOUND) => RuntimeError::ImageNotFound(image.to_string()),
                _ => RuntimeError::internal(err),
            })?;

            if let Some(error) = info.error {
                return Err(RuntimeError::internal(error));
            }

            if let Some(status) = info.status {
                progress.push(PullProgress {
                    status,
                    detail: info.progress,
                });
            }
        }

        Ok(progress)
    }

    async fn create_container(&self, spec: &LaunchSpec) -> Result<ContainerId, RuntimeError> {
        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, container_config(spec))
            .await
            .map_err(|err| match status_code(&err) {
                Some(NOT_FOUND) => RuntimeError::ImageNotFound(spec.image.to_string()),
                _ => RuntimeError::internal(err),
            })?;

        for warning in response.warnings.iter() {
            warn!(container = %response.id, %warning, "docker create warning");
        }

        Ok(ContainerId(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<StartSignal, RuntimeError> {
        self.docker
            .start_container(&id.0, None::<StartContainerOptions<String>>)
            .await
            .map_err(|err| container_err(id, err))?;

        debug!(container = %id, "start acknowledged, watching for running state");

        let (tx, rx) = oneshot::channel();
        tokio::spawn(watch_start(self.docker.clone(), id.clone(), tx));

        Ok(rx)
    }

    async fn list_containers(
        &self,
        image: &ImageRef,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let filters: HashMap<String, Vec<String>> =
            [("ancestor".to_string(), vec![image.to_string()])]
                .into_iter()
                .collect();

        let options = ListContainersOptions {
            filters,
            ..Default::default()
        };

        let listed = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(RuntimeError::internal)?;

        Ok(listed.into_iter().map(summary_from_docker).collect())
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout_secs: u64,
    ) -> Result<(), RuntimeError> {
        let options = StopContainerOptions {
            t: stop_timeout(timeout_secs),
        };

        match self.docker.stop_container(&id.0, Some(options)).await {
            Ok(()) => {
                info!(container = %id, "container stopped");
                Ok(())
            }
            Err(err) if status_code(&err) == Some(NOT_MODIFIED) => {
                debug!(container = %id, "container already stopped");
                Ok(())
            }
            Err(err) => Err(container_err(id, err)),
        }
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        };

        self.docker
            .remove_container(&id.0, Some(options))
            .await
            .map_err(|err| container_err(id, err))?;

        info!(container = %id, force, "container removed");

        Ok(())
    }
}
