//! Logging flags and tracing subscriber setup.
//!
//! ```text
//! # Default (INFO level, full format)
//! mev-playground start
//!
//! # DEBUG level with JSON output
//! mev-playground -vv --log-format json start
//! ```
//!
//! `RUST_LOG` directives take precedence over the verbosity flag.

use std::io;

use clap::{ArgAction, Parser, ValueEnum};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Full format with timestamp, level, target and spans.
    #[default]
    Full,
    /// Level and message only.
    Compact,
    /// One JSON object per event.
    Json,
}

/// Logging flags shared by every subcommand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Parser)]
pub struct LoggingArgs {
    /// Increase logging verbosity.
    ///
    /// - `-v`: DEBUG level
    /// - `-vv` or more: TRACE level
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Log output format.
    #[arg(long = "log-format", default_value = "full", global = true)]
    pub format: LogFormat,
}

impl LoggingArgs {
    /// Converts the verbosity count to a [`LevelFilter`].
    ///
    /// Progress of a `start` is reported at INFO, so that is the floor.
    #[inline]
    pub const fn log_level_filter(&self) -> LevelFilter {
        match self.verbosity {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Installs the global tracing subscriber. Should only be called once.
    pub fn init_tracing(&self) -> eyre::Result<()> {
        let filter = EnvFilter::builder()
            .with_default_directive(self.log_level_filter().into())
            .from_env_lossy();

        let base = tracing_subscriber::fmt::layer().with_writer(io::stderr);
        let layer = match self.format {
            LogFormat::Full => base.boxed(),
            LogFormat::Compact => base.compact().boxed(),
            LogFormat::Json => base.json().boxed(),
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
            .map_err(|e| eyre::eyre!("Failed to initialize tracing subscriber: {}", e))
    }
}
