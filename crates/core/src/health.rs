use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::FixtureError;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ProbeError {
    pub fn request<T>(value: T) -> Self
    where
        T: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        ProbeError::Request(value.into())
    }
}

/// A single readiness probe against an endpoint, returning the HTTP status
#[trait_variant::make(Send)]
pub trait HealthProbe: Send + Sync + 'static {
    async fn probe(&self, url: &str) -> Result<u16, ProbeError>;
}

pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

pub fn health_url(host: &str, public_port: u16, path: &str) -> String {
    format!("http://{host}:{public_port}{path}")
}

/// Polls a readiness endpoint until it answers 2xx or a hard deadline.
///
/// Individual probe failures are expected while the node warms up and are
/// swallowed. The deadline is checked on every iteration and bounds each
/// probe too, so the total wait never exceeds the timeout by more than one
/// polling interval.
pub struct HealthMonitor<'a, P> {
    probe: &'a P,
    interval: Duration,
}

impl<'a, P: HealthProbe> HealthMonitor<'a, P> {
    pub fn new(probe: &'a P, interval: Duration) -> Self {
        Self { probe, interval }
    }

    pub async fn wait_until_healthy(&self, url: &str, timeout: Duration) -> Result<(), FixtureError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut attempts = 0u64;
        let mut last_error = String::from("no probe completed");

        loop {
            let now = Instant::now();

            if now >= deadline {
                return Err(FixtureError::HealthCheckTimeout {
                    url: url.to_string(),
                    timeout,
                    last_error,
                });
            }

            attempts += 1;

            match tokio::time::timeout(deadline - now, self.probe.probe(url)).await {
                Ok(Ok(status)) if is_success(status) => {
                    info!(
                        url,
                        attempts,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "endpoint healthy"
                    );
                    return Ok(());
                }
                Ok(Ok(status)) => last_error = format!("unexpected status {status}"),
                Ok(Err(err)) => last_error = err.to_string(),
                Err(_) => last_error = "probe still pending at deadline".into(),
            }

            debug!(url, attempts, error = %last_error, "endpoint not ready yet");

            let now = Instant::now();
            if now >= deadline {
                continue;
            }

            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }
    }
}
