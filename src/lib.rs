pub mod fixture;
pub mod prelude;
pub mod probe;

pub use ledgerbox_core as core;
pub use ledgerbox_docker as docker;
