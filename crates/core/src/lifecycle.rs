use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    health::{health_url, HealthMonitor, HealthProbe},
    image::ImageProvisioner,
    introspect::RuntimeIntrospector,
    launch::{ContainerLauncher, FixtureHandle},
    ContainerRuntime, FixtureConfig, FixtureDefaults, FixtureError, FixtureOptions, FixtureState,
};

/// A disposable container standing in for a ledger node during tests.
///
/// Owns at most one container at a time and is the only writer of its
/// [`FixtureState`]. Lifecycle calls on one fixture must not overlap; the
/// `&mut self` receivers enforce that within a single owner.
pub struct Fixture<R, P> {
    runtime: Arc<R>,
    probe: P,
    config: Arc<FixtureConfig>,
    state: FixtureState,
    handle: Option<FixtureHandle>,
}

impl<R, P> Fixture<R, P>
where
    R: ContainerRuntime,
    P: HealthProbe,
{
    /// Validates `options` against `defaults`. Fails before touching the
    /// runtime if the config is invalid.
    pub fn new(
        runtime: Arc<R>,
        probe: P,
        options: FixtureOptions,
        defaults: &FixtureDefaults,
    ) -> Result<Self, FixtureError> {
        let config = options.resolve(defaults)?;
        Ok(Self::with_config(runtime, probe, config))
    }

    pub fn with_config(runtime: Arc<R>, probe: P, config: FixtureConfig) -> Self {
        Self {
            runtime,
            probe,
            config: Arc::new(config),
            state: FixtureState::Uninitialized,
            handle: None,
        }
    }

    pub fn config(&self) -> &FixtureConfig {
        &self.config
    }

    pub fn state(&self) -> FixtureState {
        self.state
    }

    /// `name:version` of the configured image, no runtime call involved
    pub fn image_reference(&self) -> String {
        self.config.image.to_string()
    }

    /// The live handle, only while running
    pub fn handle(&self) -> Result<&FixtureHandle, FixtureError> {
        match (&self.handle, self.state) {
            (Some(handle), FixtureState::Running) => Ok(handle),
            _ => Err(self.not_running()),
        }
    }

    fn not_running(&self) -> FixtureError {
        FixtureError::NotRunning {
            image: self.config.image.clone(),
            state: self.state,
        }
    }

    fn invalid_state(&self, operation: &'static str) -> FixtureError {
        FixtureError::InvalidState {
            image: self.config.image.clone(),
            state: self.state,
            operation,
        }
    }

    fn transition(&mut self, next: FixtureState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );

        debug!(image = %self.config.image, from = %self.state, to = %next, "fixture transition");
        self.state = next;
    }

    fn fail(&mut self, err: FixtureError) -> FixtureError {
        warn!(
            image = %self.config.image,
            state = %self.state,
            container = ?self.handle.as_ref().map(|h| h.id()),
            error = %err,
            "fixture failed"
        );

        if !self.state.is_terminal() {
            self.state = FixtureState::Failed;
        }

        err
    }

    /// Pulls, launches and waits for the fixture to become healthy.
    ///
    /// Starting a running fixture tears the old container down and launches
    /// a new one. On failure the fixture moves to `Failed` and any container
    /// created along the way is kept for [`Fixture::destroy`].
    pub async fn start(&mut self) -> Result<&FixtureHandle, FixtureError> {
        let restart = match self.state {
            FixtureState::Uninitialized | FixtureState::Stopped => false,
            FixtureState::Running => true,
            _ => return Err(self.invalid_state("start")),
        };

        if let Err(err) = self.bring_up(restart).await {
            return Err(self.fail(err));
        }

        self.handle()
    }

    async fn bring_up(&mut self, restart: bool) -> Result<(), FixtureError> {
        if restart {
            info!(image = %self.config.image, "restarting fixture");
        } else {
            self.transition(FixtureState::Pulling);

            ImageProvisioner::new(&*self.runtime)
                .ensure(&self.config.image, self.config.pull_policy)
                .await?;
        }

        self.transition(FixtureState::Launching);

        ContainerLauncher::new(&*self.runtime)
            .launch(&self.config, &mut self.handle)
            .await?;

        self.transition(FixtureState::AwaitingHealthy);

        let url = self.resolve_health_url().await?;

        HealthMonitor::new(&self.probe, self.config.poll_interval)
            .wait_until_healthy(&url, self.config.health_timeout)
            .await?;

        self.transition(FixtureState::Running);

        info!(image = %self.config.image, health = %url, "fixture running");

        Ok(())
    }

    async fn resolve_health_url(&self) -> Result<String, FixtureError> {
        let handle = self.handle.as_ref().ok_or_else(|| self.not_running())?;
        let port = self.resolve_public_port(handle, self.config.ops_api_port).await?;

        Ok(health_url(
            &self.config.health_host,
            port,
            &self.config.health_path,
        ))
    }

    async fn resolve_public_port(
        &self,
        handle: &FixtureHandle,
        container_port: u16,
    ) -> Result<u16, FixtureError> {
        RuntimeIntrospector::new(&*self.runtime)
            .resolve_public_port(handle, container_port)
            .await
            .map_err(|source| FixtureError::Port {
                image: self.config.image.clone(),
                source,
            })
    }

    pub async fn stop(&mut self) -> Result<(), FixtureError> {
        let Some(handle) = self.handle.as_ref() else {
            return Err(self.not_running());
        };

        if self.state != FixtureState::Running {
            return Err(self.not_running());
        }

        let id = handle.id().clone();

        self.transition(FixtureState::Stopping);

        let stopped = self
            .runtime
            .stop_container(&id, self.config.stop_timeout_secs)
            .await;

        if let Err(source) = stopped {
            let err = FixtureError::Runtime {
                image: self.config.image.clone(),
                source,
            };
            return Err(self.fail(err));
        }

        self.transition(FixtureState::Stopped);
        info!(image = %self.config.image, container = %id, "fixture stopped");

        Ok(())
    }

    /// Removes the container permanently.
    ///
    /// Valid while running or stopped. Also accepted after a failed start to
    /// release whatever container was left behind, in which case the fixture
    /// stays `Failed`.
    pub async fn destroy(&mut self) -> Result<(), FixtureError> {
        let Some(handle) = self.handle.as_ref() else {
            return Err(FixtureError::NothingToDestroy {
                image: self.config.image.clone(),
            });
        };

        let force = match self.state {
            FixtureState::Stopped => false,
            FixtureState::Running | FixtureState::Failed => true,
            _ => return Err(self.invalid_state("destroy")),
        };

        let id = handle.id().clone();

        if let Err(source) = self.runtime.remove_container(&id, force).await {
            let err = FixtureError::Runtime {
                image: self.config.image.clone(),
                source,
            };
            return Err(self.fail(err));
        }

        self.handle = None;

        if self.state != FixtureState::Failed {
            self.transition(FixtureState::Destroyed);
        }

        info!(image = %self.config.image, container = %id, "fixture destroyed");

        Ok(())
    }

    /// Host port the runtime published for `container_port`, read live
    pub async fn public_port(&self, container_port: u16) -> Result<u16, FixtureError> {
        let handle = self.handle()?;
        self.resolve_public_port(handle, container_port).await
    }

    pub async fn ops_api_public_port(&self) -> Result<u16, FixtureError> {
        self.public_port(self.config.ops_api_port).await
    }

    pub async fn container_ip_address(&self) -> Result<String, FixtureError> {
        let handle = self.handle()?;

        RuntimeIntrospector::new(&*self.runtime)
            .resolve_container_ip(handle)
            .await
            .map_err(|source| FixtureError::Network {
                image: self.config.image.clone(),
                source,
            })
    }

    /// Image reference as reported by the runtime for the live container
    pub async fn container_image_reference(&self) -> Result<String, FixtureError> {
        let handle = self.handle()?;

        RuntimeIntrospector::new(&*self.runtime)
            .resolve_image_reference(handle)
            .await
            .map_err(|source| FixtureError::Runtime {
                image: self.config.image.clone(),
                source,
            })
    }

    pub async fn health_url(&self) -> Result<String, FixtureError> {
        self.handle()?;
        self.resolve_health_url().await
    }

    /// Base URL for a named exposed port, e.g. `http://127.0.0.1:32771`
    pub async fn service_url(&self, name: &str) -> Result<String, FixtureError> {
        let port = self
            .config
            .service_port(name)
            .ok_or_else(|| FixtureError::UnknownService {
                image: self.config.image.clone(),
                name: name.to_string(),
            })?;

        let public = self.public_port(port).await?;

        Ok(format!("http://{}:{}", self.config.health_host, public))
    }
}

impl<R, P> Drop for Fixture<R, P> {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            warn!(
                image = %self.config.image,
                container = %handle.id(),
                "fixture dropped while still owning a container"
            );
        }
    }
}
