use ledgerbox_core::{FixtureDefaults, FixtureOptions};

pub mod faults;
pub mod probe;
pub mod toy_runtime;

pub use faults::TestFault;
pub use probe::{ProbeReply, ScriptedProbe};
pub use toy_runtime::{Call, HostBinding, ToyRuntime};

pub const TEST_IMAGE_NAME: &str = "fixture-node";
pub const TEST_IMAGE_VERSION: &str = "1.4.8";
pub const TEST_OPS_API_PORT: u32 = 9443;

/// Options for a small fixture with a fast health-check cadence
pub fn test_options() -> FixtureOptions {
    FixtureOptions {
        image_name: Some(TEST_IMAGE_NAME.into()),
        image_version: Some(TEST_IMAGE_VERSION.into()),
        ops_api_port: Some(TEST_OPS_API_PORT),
        exposed_ports: Some([("rpc".to_string(), 8545), ("ws".to_string(), 8546)].into()),
        health_timeout_ms: Some(2_000),
        poll_interval_ms: Some(100),
        ..Default::default()
    }
}

pub fn test_defaults() -> FixtureDefaults {
    FixtureDefaults::default()
}
