use std::time::Duration;

use ledgerbox::{
    core::health::{health_url, HealthMonitor},
    prelude::*,
    probe::HttpProbe,
};
use miette::Context;

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Full readiness URL, eg: http://127.0.0.1:9443/version
    #[arg(conflicts_with = "port")]
    url: Option<String>,

    /// Port on 127.0.0.1 to probe at the configured health path
    #[arg(long)]
    port: Option<u16>,

    #[arg(long, default_value_t = 120_000)]
    timeout_ms: u64,

    #[arg(long, default_value_t = 100)]
    interval_ms: u64,
}

#[tokio::main]
pub async fn run(config: super::Config, args: &Args) -> miette::Result<()> {
    crate::common::setup_tracing(&config.logging)?;

    let url = match (&args.url, args.port) {
        (Some(url), _) => url.clone(),
        (None, Some(port)) => {
            let path = config.fixture.health_path.as_deref().unwrap_or("/version");
            let host = config.fixture.health_host.as_deref().unwrap_or("127.0.0.1");
            health_url(host, port, path)
        }
        (None, None) => return Err(Error::config("either a url or --port is required").into()),
    };

    if args.interval_ms == 0 || args.timeout_ms == 0 {
        return Err(Error::config("timeout and interval must be positive").into());
    }

    let timeout = Duration::from_millis(args.timeout_ms);
    let probe = HttpProbe::new(timeout.min(ledgerbox::probe::DEFAULT_REQUEST_TIMEOUT))
        .map_err(Error::client)?;

    HealthMonitor::new(&probe, Duration::from_millis(args.interval_ms))
        .wait_until_healthy(&url, timeout)
        .await
        .map_err(Error::from)
        .context("waiting for endpoint")?;

    println!("{url} is healthy");

    Ok(())
}
