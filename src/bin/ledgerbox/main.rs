use clap::{Parser, Subcommand};
use ledgerbox::core::{FixtureOptions, LoggingConfig};
use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};

mod common;
mod probe;
mod up;

#[derive(Debug, Subcommand)]
enum Command {
    /// Starts a fixture and keeps it running until interrupted
    Up(up::Args),

    /// Runs readiness probes against an arbitrary endpoint
    Probe(probe::Args),
}

#[derive(Debug, Parser)]
#[clap(name = "Ledgerbox")]
#[clap(bin_name = "ledgerbox")]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub fixture: FixtureOptions,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn new(explicit_file: &Option<std::path::PathBuf>) -> Result<Self, config::ConfigError> {
        let mut s = config::Config::builder();

        // system-wide base config
        s = s.add_source(config::File::with_name("/etc/ledgerbox/fixture.toml").required(false));

        // a file in the working dir overrides it
        s = s.add_source(config::File::with_name("ledgerbox.toml").required(false));

        // an explicit file is mandatory
        if let Some(explicit) = explicit_file.as_ref().and_then(|x| x.to_str()) {
            s = s.add_source(config::File::with_name(explicit).required(true));
        }

        // env vars are the last-step overrides, eg: LEDGERBOX_FIXTURE__IMAGE_VERSION
        s = s.add_source(
            config::Environment::with_prefix("LEDGERBOX")
                .prefix_separator("_")
                .separator("__"),
        );

        s.build()?.try_deserialize()
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let config = Config::new(&args.config).into_diagnostic()?;

    match args.command {
        Command::Up(x) => up::run(config, &x)?,
        Command::Probe(x) => probe::run(config, &x)?,
    };

    Ok(())
}
