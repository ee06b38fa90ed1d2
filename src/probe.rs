use std::time::Duration;

use ledgerbox_core::{HealthProbe, ProbeError};
use reqwest::Client;
use tracing::trace;

/// Upper bound for a single readiness request. The monitor also cuts any
/// request that outlives the overall health deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Plain HTTP GET readiness probe
#[derive(Clone, Debug)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()?;

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl HealthProbe for HttpProbe {
    async fn probe(&self, url: &str) -> Result<u16, ProbeError> {
        let response = self.client.get(url).send().await.map_err(|err| {
            if err.is_connect() {
                ProbeError::Connect(format!("{url}: {err}"))
            } else {
                ProbeError::request(err)
            }
        })?;

        let status = response.status().as_u16();
        trace!(url, status, "probe answered");

        Ok(status)
    }
}
