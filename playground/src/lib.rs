#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod utils;
pub use utils::unique_name;

pub mod cli;
pub mod config;
pub mod containers;
pub mod error;
pub mod genesis;
pub mod images;
pub mod info;
pub mod logging;
pub mod network;
pub mod orchestrator;
pub mod registry;
pub mod runtime;
pub mod status;

pub use config::{BuilderVariant, PlaygroundConfig};
pub use error::{Phase, PlaygroundError};
pub use genesis::{GenesisArtifacts, GenesisTool};
pub use info::PlaygroundInfo;
pub use orchestrator::{ComponentState, Playground, RunContext, StartReport, StopReport};
pub use status::{HealthStatus, StatusReport};
