use std::collections::BTreeMap;

use ledgerbox::{
    core::FixtureDefaults,
    fixture::{connect_fixture, DockerFixture},
    prelude::*,
};
use miette::{Context, IntoDiagnostic};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Image version to run, overrides the config value
    #[arg(long)]
    version: Option<String>,

    /// Always pull the image, even if present locally
    #[arg(long)]
    pull: bool,

    /// Leave the container in place on exit
    #[arg(long)]
    keep: bool,
}

#[derive(Serialize)]
struct Endpoints {
    container_id: String,
    image: String,
    container_ip: String,
    health_url: String,
    ports: BTreeMap<String, u16>,
}

async fn describe(fixture: &DockerFixture) -> Result<Endpoints, Error> {
    let handle = fixture.handle()?;

    let mut ports = BTreeMap::new();

    for (name, port) in fixture.config().exposed_ports.iter() {
        ports.insert(name.clone(), fixture.public_port(*port).await?);
    }

    Ok(Endpoints {
        container_id: handle.id().to_string(),
        image: fixture.container_image_reference().await?,
        container_ip: fixture.container_ip_address().await?,
        health_url: fixture.health_url().await?,
        ports,
    })
}

async fn shutdown(fixture: &mut DockerFixture, keep: bool) -> Result<(), Error> {
    if keep {
        warn!("leaving fixture container in place");
        return Ok(());
    }

    if fixture.state() == FixtureState::Running {
        fixture.stop().await?;
    }

    fixture.destroy().await?;

    Ok(())
}

#[tokio::main]
pub async fn run(config: super::Config, args: &Args) -> miette::Result<()> {
    crate::common::setup_tracing(&config.logging)?;

    let mut options = config.fixture;

    if let Some(version) = &args.version {
        options.image_version = Some(version.clone());
    }

    if args.pull {
        options.pull_policy = Some(ledgerbox::core::PullPolicy::Always);
    }

    let mut fixture = connect_fixture(options, &FixtureDefaults::default())
        .await
        .context("preparing fixture")?;

    let exit = crate::common::hook_exit_token();

    // start is bounded by the health timeout, interrupts are honored after it
    if let Err(err) = fixture.start().await.map(|_| ()) {
        // whatever got created must go before reporting
        if let Err(cleanup) = fixture.destroy().await {
            warn!(%cleanup, "cleanup after failed start");
        }

        return Err(Error::from(err)).context("starting fixture");
    }

    if exit.is_cancelled() {
        warn!("interrupted while starting");
        return shutdown(&mut fixture, args.keep)
            .await
            .context("tearing down fixture");
    }

    let endpoints = describe(&fixture).await.context("describing fixture")?;
    let json = serde_json::to_string_pretty(&endpoints).into_diagnostic()?;
    println!("{json}");

    info!("fixture running, press ctrl-c to tear down");
    exit.cancelled().await;

    shutdown(&mut fixture, args.keep)
        .await
        .context("tearing down fixture")?;

    Ok(())
}
