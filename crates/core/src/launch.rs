use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    ContainerId, ContainerRuntime, FixtureConfig, FixtureError, LaunchSpec, FIXTURE_LABEL,
};

/// Live reference to a launched container.
///
/// Owned by exactly one fixture; intentionally not `Clone`.
#[derive(Debug)]
pub struct FixtureHandle {
    id: ContainerId,
    config: Arc<FixtureConfig>,
}

impl FixtureHandle {
    pub fn new(id: ContainerId, config: Arc<FixtureConfig>) -> Self {
        Self { id, config }
    }

    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    pub fn config(&self) -> &FixtureConfig {
        &self.config
    }
}

pub fn launch_spec(config: &FixtureConfig) -> LaunchSpec {
    let mut labels = config.labels.clone();
    labels.insert(FIXTURE_LABEL.to_string(), config.image.to_string());

    LaunchSpec {
        image: config.image.clone(),
        exposed_ports: config.container_ports().collect(),
        publish_all_ports: true,
        labels,
    }
}

pub struct ContainerLauncher<'a, R> {
    runtime: &'a R,
}

impl<'a, R: ContainerRuntime> ContainerLauncher<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    /// Stops then removes the container behind `handle`
    pub async fn teardown(&self, handle: &FixtureHandle) -> Result<(), FixtureError> {
        let config = handle.config();
        let runtime_err = |source| FixtureError::Runtime {
            image: config.image.clone(),
            source,
        };

        debug!(container = %handle.id(), "stopping previous container");

        self.runtime
            .stop_container(handle.id(), config.stop_timeout_secs)
            .await
            .map_err(runtime_err)?;

        self.runtime
            .remove_container(handle.id(), false)
            .await
            .map_err(runtime_err)?;

        info!(container = %handle.id(), "previous container removed");

        Ok(())
    }

    /// Launches a fresh container into `slot`.
    ///
    /// Whatever `slot` holds is torn down first and only cleared once the
    /// runtime confirmed its removal. The new handle is stored as soon as the
    /// container is created, so a failure while starting still leaves it
    /// reachable for cleanup. Returns once the runtime reported the
    /// container as running, not at the create acknowledgment.
    pub async fn launch(
        &self,
        config: &Arc<FixtureConfig>,
        slot: &mut Option<FixtureHandle>,
    ) -> Result<ContainerId, FixtureError> {
        if let Some(previous) = slot.as_ref() {
            self.teardown(previous).await?;
            *slot = None;
        }

        let spec = launch_spec(config);

        let id = self
            .runtime
            .create_container(&spec)
            .await
            .map_err(|source| FixtureError::LaunchFailed {
                image: config.image.clone(),
                reason: "create request rejected".into(),
                source: Some(source),
            })?;

        info!(image = %config.image, container = %id, "container created");

        *slot = Some(FixtureHandle::new(id.clone(), config.clone()));

        let signal = self
            .runtime
            .start_container(&id)
            .await
            .map_err(|source| FixtureError::LaunchFailed {
                image: config.image.clone(),
                reason: format!("start request for {id} rejected"),
                source: Some(source),
            })?;

        match signal.await {
            Ok(Ok(())) => {
                info!(image = %config.image, container = %id, "container running");
                Ok(id)
            }
            Ok(Err(source)) => Err(FixtureError::LaunchFailed {
                image: config.image.clone(),
                reason: format!("container {id} failed before running"),
                source: Some(source),
            }),
            Err(_) => Err(FixtureError::LaunchFailed {
                image: config.image.clone(),
                reason: format!("runtime dropped the start notification for {id}"),
                source: None,
            }),
        }
    }
}
