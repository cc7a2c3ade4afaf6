//! CLI definitions for managing a local MEV playground.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    config::{BuilderVariant, ForkName, PlaygroundConfig},
    error::PlaygroundError,
    logging::LoggingArgs,
};

/// Manage a local Ethereum + MEV-Boost playground
#[derive(Parser, Debug)]
#[command(name = "mev-playground", about = "Manage a local Ethereum + MEV-Boost playground")]
pub struct PlaygroundCli {
    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for artifacts, volumes and the run lock
    #[arg(long, env = "MEV_PLAYGROUND_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Logging flags
    #[command(flatten)]
    pub logging: LoggingArgs,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a fresh genesis and start every component
    Start(StartArgs),
    /// Stop all components, keeping data
    Stop,
    /// Stop and remove containers, network and the data directory
    Nuke {
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
        /// Only remove generated artifacts; keep volumes and the network
        #[arg(long)]
        artifacts_only: bool,
    },
    /// Show component health
    Status,
    /// Show the last lines of a component's output
    Logs {
        /// Component name
        component: String,
        /// Number of lines
        #[arg(long, short = 'n', default_value_t = 100)]
        tail: usize,
    },
    /// Show chain parameters, images and endpoints
    Info {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

/// Flags for `start`
#[derive(Args, Debug, Default)]
pub struct StartArgs {
    /// Builder variant
    #[arg(long, value_enum)]
    pub builder: Option<BuilderVariant>,

    /// Builder image; implies `--builder custom` unless a variant is given
    #[arg(long, env = "MEV_PLAYGROUND_BUILDER_IMAGE")]
    pub builder_image: Option<String>,

    /// Relay image
    #[arg(long, env = "MEV_PLAYGROUND_RELAY_IMAGE")]
    pub relay_image: Option<String>,

    /// Do not run the load generator
    #[arg(long)]
    pub no_loadgen: bool,

    /// Load generator transactions per second
    #[arg(long)]
    pub tps: Option<u32>,

    /// Number of genesis validators
    #[arg(long)]
    pub validators: Option<u32>,

    /// Slot duration in seconds
    #[arg(long)]
    pub seconds_per_slot: Option<u64>,

    /// Seconds between generation and genesis
    #[arg(long)]
    pub genesis_delay: Option<u64>,

    /// Fork active at genesis
    #[arg(long, value_enum)]
    pub fork: Option<ForkName>,
}

impl StartArgs {
    /// Applies the flags over `config`.
    pub fn apply(&self, config: &mut PlaygroundConfig) {
        if let Some(image) = &self.builder_image {
            config.images.builder = Some(image.clone());
            config.builder = BuilderVariant::Custom;
        }
        if let Some(builder) = self.builder {
            config.builder = builder;
        }
        if let Some(image) = &self.relay_image {
            config.images.relay = image.clone();
        }
        if self.no_loadgen {
            config.load_generator.enabled = false;
        }
        if let Some(tps) = self.tps {
            config.load_generator.tps = tps;
        }
        if let Some(validators) = self.validators {
            config.chain.validator_count = validators;
        }
        if let Some(secs) = self.seconds_per_slot {
            config.chain.seconds_per_slot = secs;
        }
        if let Some(delay) = self.genesis_delay {
            config.chain.genesis_delay = delay;
        }
        if let Some(fork) = self.fork {
            config.chain.fork = fork;
        }
    }
}

impl PlaygroundCli {
    /// Layers defaults, the config file and flags into one configuration.
    pub fn resolve_config(&self) -> Result<PlaygroundConfig, PlaygroundError> {
        let mut config = match &self.config {
            Some(path) => PlaygroundConfig::load(path)?,
            None => PlaygroundConfig::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Command::Start(args) = &self.command {
            args.apply(&mut config);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn parse(args: &[&str]) -> PlaygroundCli {
        PlaygroundCli::try_parse_from(std::iter::once("mev-playground").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_start_flags_override_defaults() {
        let cli = parse(&[
            "--data-dir",
            "/tmp/pg",
            "start",
            "--builder",
            "none",
            "--relay-image",
            "example/relay:dev",
            "--no-loadgen",
            "--fork",
            "fulu",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/pg"));
        assert_eq!(config.builder, BuilderVariant::None);
        assert_eq!(config.images.relay, "example/relay:dev");
        assert!(!config.load_generator.enabled);
        assert_eq!(config.chain.fork, ForkName::Fulu);
    }

    #[test]
    fn test_builder_image_implies_custom() {
        let cli = parse(&["start", "--builder-image", "example/builder:dev"]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.builder, BuilderVariant::Custom);
        assert_eq!(config.builder_image().as_deref(), Some("example/builder:dev"));
    }

    #[test]
    fn test_flags_win_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[load_generator]\ntps = 5\n\n[chain]\nvalidator_count = 8").unwrap();
        let path = file.path().to_str().unwrap();
        let cli = parse(&["--config", path, "start", "--tps", "50"]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.load_generator.tps, 50);
        assert_eq!(config.chain.validator_count, 8);
    }

    #[test]
    fn test_subcommands() {
        assert!(matches!(parse(&["logs", "relay", "-n", "5"]).command, Command::Logs { tail: 5, .. }));
        assert!(matches!(
            parse(&["nuke", "--yes", "--artifacts-only"]).command,
            Command::Nuke { yes: true, artifacts_only: true }
        ));
        assert!(matches!(parse(&["info", "--json"]).command, Command::Info { json: true }));
    }
}
