//! Static description of a playground: chain parameters, images and endpoints.

use std::{fmt, net::Ipv4Addr, path::PathBuf};

use serde::Serialize;

use crate::config::{BuilderVariant, ForkName};

/// One component as it will be (or is) deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentInfo {
    /// Component name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Static address on the playground network.
    pub address: Ipv4Addr,
    /// Host endpoints, one per published port.
    pub endpoints: Vec<String>,
    /// Components it waits for.
    pub depends_on: Vec<String>,
}

/// Everything `info` prints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaygroundInfo {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Execution chain id.
    pub chain_id: u64,
    /// Slot duration.
    pub seconds_per_slot: u64,
    /// Genesis validator count.
    pub validator_count: u32,
    /// Fork active at genesis.
    pub fork: ForkName,
    /// Builder variant.
    pub builder: BuilderVariant,
    /// Network name and subnet.
    pub network: String,
    /// Relay URL with its public key, as validators register it.
    pub relay_url: String,
    /// Components in startup order.
    pub components: Vec<ComponentInfo>,
}

impl fmt::Display for PlaygroundInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Chain:")?;
        writeln!(f, "  Chain ID:         {}", self.chain_id)?;
        writeln!(f, "  Seconds per slot: {}", self.seconds_per_slot)?;
        writeln!(f, "  Validators:       {}", self.validator_count)?;
        writeln!(f, "  Fork:             {}", self.fork)?;
        writeln!(f, "  Builder:          {:?}", self.builder)?;
        writeln!(f, "  Network:          {}", self.network)?;
        writeln!(f, "  Data dir:         {}", self.data_dir.display())?;
        writeln!(f, "  Relay:            {}", self.relay_url)?;
        writeln!(f)?;
        writeln!(f, "Components:")?;
        for c in &self.components {
            writeln!(f, "  {:<20} {:<15} {}", c.name, c.address, c.image)?;
            for endpoint in &c.endpoints {
                writeln!(f, "  {:<20} {}", "", endpoint)?;
            }
        }
        Ok(())
    }
}
