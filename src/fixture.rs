use std::sync::Arc;

use ledgerbox_core::{Fixture, FixtureDefaults, FixtureOptions};
use ledgerbox_docker::DockerRuntime;

use crate::{
    prelude::*,
    probe::{HttpProbe, DEFAULT_REQUEST_TIMEOUT},
};

/// A fixture driving the local Docker Engine and probing over HTTP
pub type DockerFixture = Fixture<DockerRuntime, HttpProbe>;

/// Connects to the local Docker daemon and builds a fixture from `options`.
///
/// Configuration is validated before any container is touched; the daemon
/// connection is only attempted once the options are known to be valid.
pub async fn connect_fixture(
    options: FixtureOptions,
    defaults: &FixtureDefaults,
) -> Result<DockerFixture, Error> {
    let config = options.resolve(defaults)?;

    let runtime = DockerRuntime::connect().await.map_err(Error::runtime)?;
    let probe = HttpProbe::new(DEFAULT_REQUEST_TIMEOUT).map_err(Error::client)?;

    Ok(Fixture::with_config(Arc::new(runtime), probe, config))
}
