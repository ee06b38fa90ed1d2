pub use ledgerbox_core::{FixtureError, FixtureState};

use miette::Diagnostic;
use std::fmt::Display;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("client error: {0}")]
    ClientError(String),

    #[error("container runtime error: {0}")]
    RuntimeError(String),

    #[error(transparent)]
    #[diagnostic(code(ledgerbox::fixture))]
    Fixture(#[from] FixtureError),

    #[error("{0}")]
    Message(String),
}

impl Error {
    pub fn config(text: impl Display) -> Error {
        Error::ConfigError(text.to_string())
    }

    pub fn client(error: impl Display) -> Error {
        Error::ClientError(error.to_string())
    }

    pub fn runtime(error: impl Display) -> Error {
        Error::RuntimeError(error.to_string())
    }

    pub fn message(text: impl Into<String>) -> Error {
        Error::Message(text.into())
    }
}
