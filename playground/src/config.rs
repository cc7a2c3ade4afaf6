//! Playground configuration.
//!
//! Values are layered as defaults, then an optional TOML file, then CLI flags.
//! Every section deserializes with `#[serde(default)]`, so a config file only
//! has to name the values it changes.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::{containers::PlaygroundPorts, error::PlaygroundError, images};

/// Directory name used under the home directory when no data dir is given.
pub const DEFAULT_DATA_DIR_NAME: &str = ".mev_playground";

/// Chain id of the local network.
pub const DEFAULT_CHAIN_ID: u64 = 3_151_908;

/// Mnemonic the validator keys and prefunded accounts are derived from.
pub const DEFAULT_MNEMONIC: &str = "giant issue aisle success illegal bike spike question tent bar rely arctic volcano long crawl hungry vocal artwork sniff fantasy very lucky have athlete";

/// Which block builder to run alongside the relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BuilderVariant {
    /// The stock rbuilder image.
    #[default]
    Primary,
    /// A user-supplied builder image.
    Custom,
    /// No builder; blocks come from the local execution client.
    None,
}

/// Latest fork active at genesis. Later forks are scheduled at the far-future epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ForkName {
    /// Deneb (Cancun on the execution layer).
    Deneb,
    /// Electra (Prague on the execution layer).
    #[default]
    Electra,
    /// Fulu (Osaka on the execution layer).
    Fulu,
}

impl fmt::Display for ForkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Deneb => "deneb",
            Self::Electra => "electra",
            Self::Fulu => "fulu",
        })
    }
}

/// Chain parameters fed into genesis generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Execution chain id.
    pub chain_id: u64,
    /// Slot duration.
    pub seconds_per_slot: u64,
    /// Number of genesis validators.
    pub validator_count: u32,
    /// Seconds between generation and the genesis timestamp.
    pub genesis_delay: u64,
    /// Latest fork active at genesis.
    pub fork: ForkName,
    /// Mnemonic for validator keys.
    pub mnemonic: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            seconds_per_slot: 12,
            validator_count: 100,
            genesis_delay: 0,
            fork: ForkName::default(),
            mnemonic: DEFAULT_MNEMONIC.to_string(),
        }
    }
}

/// Image overrides for every component and tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Execution client.
    pub execution: String,
    /// Beacon node and validator client.
    pub consensus: String,
    /// mev-boost sidecar.
    pub sidecar: String,
    /// Relay.
    pub relay: String,
    /// Builder. Required for [`BuilderVariant::Custom`].
    pub builder: Option<String>,
    /// Explorer.
    pub explorer: String,
    /// Load generator.
    pub load_generator: String,
    /// Redis.
    pub redis: String,
    /// Postgres.
    pub postgres: String,
    /// Genesis generator tool.
    pub genesis_generator: String,
    /// Keystore generator tool.
    pub keystore_generator: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            execution: images::RETH_IMAGE.to_string(),
            consensus: images::LIGHTHOUSE_IMAGE.to_string(),
            sidecar: images::MEV_BOOST_IMAGE.to_string(),
            relay: images::RELAY_IMAGE.to_string(),
            builder: None,
            explorer: images::DORA_IMAGE.to_string(),
            load_generator: images::CONTENDER_IMAGE.to_string(),
            redis: images::REDIS_IMAGE.to_string(),
            postgres: images::POSTGRES_IMAGE.to_string(),
            genesis_generator: images::GENESIS_GENERATOR_IMAGE.to_string(),
            keystore_generator: images::KEYSTORE_GENERATOR_IMAGE.to_string(),
        }
    }
}

/// Load generator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadGeneratorConfig {
    /// Whether the load generator is part of the resolved set.
    pub enabled: bool,
    /// Target transactions per second.
    pub tps: u32,
    /// Extra arguments placed before the scenario subcommand.
    pub extra_args: Vec<String>,
}

impl Default for LoadGeneratorConfig {
    fn default() -> Self {
        Self { enabled: true, tps: 20, extra_args: Vec::new() }
    }
}

/// Top-level playground configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaygroundConfig {
    /// Root of all persisted state.
    pub data_dir: PathBuf,
    /// Builder variant.
    pub builder: BuilderVariant,
    /// Component images.
    pub images: ImageConfig,
    /// Chain parameters.
    pub chain: ChainConfig,
    /// Load generator settings.
    pub load_generator: LoadGeneratorConfig,
    /// Host ports.
    pub ports: PlaygroundPorts,
    /// Extra environment variables per component name, applied over the defaults.
    pub extra_env: BTreeMap<String, BTreeMap<String, String>>,
    /// Health-check timeout overrides in seconds, per component name.
    pub health_timeouts: BTreeMap<String, u64>,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            builder: BuilderVariant::default(),
            images: ImageConfig::default(),
            chain: ChainConfig::default(),
            load_generator: LoadGeneratorConfig::default(),
            ports: PlaygroundPorts::default(),
            extra_env: BTreeMap::new(),
            health_timeouts: BTreeMap::new(),
        }
    }
}

impl PlaygroundConfig {
    /// Returns `$HOME/.mev_playground`, or a relative directory if `HOME` is unset.
    pub fn default_data_dir() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_DATA_DIR_NAME)
    }

    /// Parses a configuration from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self, PlaygroundError> {
        toml::from_str(content).map_err(|e| PlaygroundError::InvalidConfig(e.to_string()))
    }

    /// Loads a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, PlaygroundError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PlaygroundError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Image the builder component runs, or `None` when no builder is configured.
    pub fn builder_image(&self) -> Option<String> {
        match self.builder {
            BuilderVariant::Primary => Some(
                self.images
                    .builder
                    .clone()
                    .unwrap_or_else(|| images::default_builder_image().to_string()),
            ),
            BuilderVariant::Custom => self.images.builder.clone(),
            BuilderVariant::None => None,
        }
    }

    /// Checks the configuration before any side effect.
    ///
    /// The data directory is created if needed and probed for writability.
    pub fn validate(&self) -> Result<(), PlaygroundError> {
        if self.builder == BuilderVariant::Custom
            && self.images.builder.as_deref().is_none_or(str::is_empty)
        {
            return Err(PlaygroundError::InvalidConfig(
                "builder variant `custom` requires a builder image".to_string(),
            ));
        }
        if self.chain.seconds_per_slot == 0 {
            return Err(PlaygroundError::InvalidConfig("seconds_per_slot must be > 0".into()));
        }
        if self.chain.validator_count == 0 {
            return Err(PlaygroundError::InvalidConfig("validator_count must be > 0".into()));
        }
        if self.chain.mnemonic.split_whitespace().count() < 12 {
            return Err(PlaygroundError::InvalidConfig("mnemonic must have at least 12 words".into()));
        }
        if self.load_generator.enabled && self.load_generator.tps == 0 {
            return Err(PlaygroundError::InvalidConfig("load generator tps must be > 0".into()));
        }
        self.check_data_dir()
    }

    fn check_data_dir(&self) -> Result<(), PlaygroundError> {
        let unwritable = |e: std::io::Error| {
            PlaygroundError::InvalidConfig(format!(
                "data directory {} is not writable: {e}",
                self.data_dir.display()
            ))
        };
        std::fs::create_dir_all(&self.data_dir).map_err(unwritable)?;
        let probe = self.data_dir.join(".write-probe");
        std::fs::write(&probe, b"").map_err(unwritable)?;
        std::fs::remove_file(&probe).map_err(unwritable)
    }
}
