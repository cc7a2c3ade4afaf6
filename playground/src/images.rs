//! Default Docker images for playground components.

/// Docker image for Reth.
pub const RETH_IMAGE: &str = "ghcr.io/paradigmxyz/reth:v1.10.2";
/// Docker image for Lighthouse (beacon node and validator client).
pub const LIGHTHOUSE_IMAGE: &str = "sigp/lighthouse:v8.0.1";
/// Docker image for mev-boost.
pub const MEV_BOOST_IMAGE: &str = "flashbots/mev-boost:latest";
/// Docker image for the combined relay (API, housekeeper and website).
pub const RELAY_IMAGE: &str = "turbo-relay-combined:latest";
/// Docker image for rbuilder on x86_64 hosts.
pub const RBUILDER_IMAGE_AMD64: &str = "ghcr.io/flashbots/rbuilder:latest";
/// Docker image for rbuilder on arm64 hosts.
pub const RBUILDER_IMAGE_ARM64: &str = "ghcr.io/flashbots/rbuilder:latest-linux-arm64";
/// Docker image for the Dora beacon explorer.
pub const DORA_IMAGE: &str = "pk910/dora-the-explorer:latest";
/// Docker image for the Contender load generator.
pub const CONTENDER_IMAGE: &str = "flashbots/contender:latest";
/// Docker image for Redis.
pub const REDIS_IMAGE: &str = "redis:7-alpine";
/// Docker image for Postgres.
pub const POSTGRES_IMAGE: &str = "postgres:15-alpine";
/// Docker image for the Ethereum genesis generator.
pub const GENESIS_GENERATOR_IMAGE: &str = "ethpandaops/ethereum-genesis-generator:5.2.0";
/// Docker image for validator keystore generation.
pub const KEYSTORE_GENERATOR_IMAGE: &str = "protolambda/eth2-val-tools:latest";

/// Returns the rbuilder image matching the host architecture.
pub const fn default_builder_image() -> &'static str {
    if cfg!(target_arch = "aarch64") { RBUILDER_IMAGE_ARM64 } else { RBUILDER_IMAGE_AMD64 }
}
