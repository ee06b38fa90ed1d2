use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::{FixtureError, ImageRef};

pub const MIN_IMAGE_VERSION_LEN: usize = 5;
pub const MIN_IMAGE_NAME_LEN: usize = 1;
pub const OPS_API_PORT_RANGE: std::ops::RangeInclusive<u32> = 1024..=65535;
pub const EXPOSED_PORT_RANGE: std::ops::RangeInclusive<u32> = 1..=65535;

/// Name under which the ops API port is always part of the exposed set
pub const OPS_API_SERVICE: &str = "ops-api";

/// Label attached to every launched container, valued with the image ref
pub const FIXTURE_LABEL: &str = "ledgerbox.fixture";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PullPolicy {
    #[default]
    IfNotPresent,
    Always,
}

/// Raw fixture configuration as provided by a caller or a config file.
///
/// Every field is optional; missing values are filled from a
/// [`FixtureDefaults`] before validation. Ports are kept wide so that an
/// out-of-range value is reported as an invalid field instead of a parse
/// error.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct FixtureOptions {
    pub image_name: Option<String>,
    pub image_version: Option<String>,
    pub exposed_ports: Option<BTreeMap<String, u32>>,
    pub ops_api_port: Option<u32>,
    pub health_path: Option<String>,
    pub health_host: Option<String>,
    pub health_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub pull_policy: Option<PullPolicy>,
    pub stop_timeout_secs: Option<u64>,
    pub labels: BTreeMap<String, String>,
}

/// Immutable defaults injected at construction time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureDefaults {
    pub image_name: String,
    pub image_version: String,
    pub exposed_ports: BTreeMap<String, u32>,
    pub ops_api_port: u32,
    pub health_path: String,
    pub health_host: String,
    pub health_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub pull_policy: PullPolicy,
    pub stop_timeout_secs: u64,
}

impl FixtureDefaults {
    /// All-in-one Fabric v1 network: orderer, peer, CA and supervisord in a
    /// single container, with the peer operations API as health target.
    pub fn fabric_all_in_one_v1() -> Self {
        let exposed_ports = [
            ("orderer", 7050),
            ("peer", 7051),
            ("peer-chaincode", 7052),
            ("peer-events", 7053),
            ("ca", 7054),
            ("supervisord", 9001),
        ]
        .into_iter()
        .map(|(name, port)| (name.to_string(), port))
        .collect();

        Self {
            image_name: "sownak/cactus-fabric-all-in-one".into(),
            image_version: "1.4.8".into(),
            exposed_ports,
            ops_api_port: 9443,
            health_path: "/version".into(),
            health_host: "127.0.0.1".into(),
            health_timeout_ms: 120_000,
            poll_interval_ms: 100,
            pull_policy: PullPolicy::IfNotPresent,
            stop_timeout_secs: 10,
        }
    }
}

impl Default for FixtureDefaults {
    fn default() -> Self {
        Self::fabric_all_in_one_v1()
    }
}

/// A fully defaulted and validated fixture configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureConfig {
    pub image: ImageRef,
    pub exposed_ports: BTreeMap<String, u16>,
    pub ops_api_port: u16,
    pub health_path: String,
    pub health_host: String,
    pub health_timeout: Duration,
    pub poll_interval: Duration,
    pub pull_policy: PullPolicy,
    pub stop_timeout_secs: u64,
    pub labels: BTreeMap<String, String>,
}

impl FixtureConfig {
    /// Internal ports to publish, deduplicated
    pub fn container_ports(&self) -> impl Iterator<Item = u16> + '_ {
        let mut ports: Vec<_> = self.exposed_ports.values().copied().collect();
        ports.sort_unstable();
        ports.dedup();
        ports.into_iter()
    }

    pub fn service_port(&self, name: &str) -> Option<u16> {
        self.exposed_ports.get(name).copied()
    }
}

impl TryFrom<FixtureOptions> for FixtureConfig {
    type Error = FixtureError;

    fn try_from(value: FixtureOptions) -> Result<Self, Self::Error> {
        value.resolve(&FixtureDefaults::default())
    }
}

impl FixtureOptions {
    /// Applies defaults, then validates. Pure: performs no I/O.
    pub fn resolve(self, defaults: &FixtureDefaults) -> Result<FixtureConfig, FixtureError> {
        let image_name = self.image_name.unwrap_or_else(|| defaults.image_name.clone());
        let image_version = self
            .image_version
            .unwrap_or_else(|| defaults.image_version.clone());
        let ops_api_port = self.ops_api_port.unwrap_or(defaults.ops_api_port);
        let declared = self
            .exposed_ports
            .unwrap_or_else(|| defaults.exposed_ports.clone());
        let health_path = self
            .health_path
            .unwrap_or_else(|| defaults.health_path.clone());
        let health_host = self
            .health_host
            .unwrap_or_else(|| defaults.health_host.clone());
        let health_timeout_ms = self.health_timeout_ms.unwrap_or(defaults.health_timeout_ms);
        let poll_interval_ms = self.poll_interval_ms.unwrap_or(defaults.poll_interval_ms);

        if image_version.trim().chars().count() < MIN_IMAGE_VERSION_LEN {
            return Err(FixtureError::invalid_config(
                "image_version",
                format!(
                    "`{image_version}` is shorter than {MIN_IMAGE_VERSION_LEN} characters"
                ),
            ));
        }

        if image_name.trim().chars().count() < MIN_IMAGE_NAME_LEN {
            return Err(FixtureError::invalid_config(
                "image_name",
                "must not be empty",
            ));
        }

        if !OPS_API_PORT_RANGE.contains(&ops_api_port) {
            return Err(FixtureError::invalid_config(
                "ops_api_port",
                format!("{ops_api_port} is outside {OPS_API_PORT_RANGE:?}"),
            ));
        }

        let mut exposed_ports = BTreeMap::new();

        for (name, port) in declared {
            if !EXPOSED_PORT_RANGE.contains(&port) {
                return Err(FixtureError::invalid_config(
                    "exposed_ports",
                    format!("port `{name}` = {port} is outside {EXPOSED_PORT_RANGE:?}"),
                ));
            }

            if name == OPS_API_SERVICE && port != ops_api_port {
                return Err(FixtureError::invalid_config(
                    "exposed_ports",
                    format!(
                        "`{OPS_API_SERVICE}` = {port} conflicts with ops_api_port {ops_api_port}"
                    ),
                ));
            }

            exposed_ports.insert(name, port as u16);
        }

        exposed_ports.insert(OPS_API_SERVICE.to_string(), ops_api_port as u16);

        if !health_path.starts_with('/') {
            return Err(FixtureError::invalid_config(
                "health_path",
                format!("`{health_path}` must start with `/`"),
            ));
        }

        if health_host.trim().is_empty() {
            return Err(FixtureError::invalid_config(
                "health_host",
                "must not be empty",
            ));
        }

        if health_timeout_ms == 0 {
            return Err(FixtureError::invalid_config(
                "health_timeout_ms",
                "must be greater than zero",
            ));
        }

        if poll_interval_ms == 0 || poll_interval_ms > health_timeout_ms {
            return Err(FixtureError::invalid_config(
                "poll_interval_ms",
                format!("{poll_interval_ms} must be within 1..={health_timeout_ms}"),
            ));
        }

        Ok(FixtureConfig {
            image: ImageRef::new(image_name, image_version),
            exposed_ports,
            ops_api_port: ops_api_port as u16,
            health_path,
            health_host,
            health_timeout: Duration::from_millis(health_timeout_ms),
            poll_interval: Duration::from_millis(poll_interval_ms),
            pull_policy: self.pull_policy.unwrap_or(defaults.pull_policy),
            stop_timeout_secs: self.stop_timeout_secs.unwrap_or(defaults.stop_timeout_secs),
            labels: self.labels,
        })
    }
}

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LoggingConfig {
    #[serde_as(as = "DisplayFromStr")]
    pub max_level: tracing::Level,

    #[serde(default)]
    pub include_docker: bool,

    #[serde(default)]
    pub include_http: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            max_level: tracing::Level::INFO,
            include_docker: Default::default(),
            include_http: Default::default(),
        }
    }
}
