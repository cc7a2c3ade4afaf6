//! Genesis coordination: one shared timestamp and mnemonic feeding the chain
//! genesis generator and the keystore generator.
//!
//! Every call to [`generate_genesis`] produces fresh artifacts. Outputs are staged
//! in a temporary directory inside the data directory and moved into
//! `<data>/artifacts` only after every job has succeeded.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

mod jwt;
pub use jwt::{random_jwt_secret, write_jwt_secret};

mod keystores;
pub use keystores::{KEYSTORE_PASSWORD, ValidatorDefinition, arrange_keystores};

mod values;
pub use values::{
    ALTAIR_FORK_VERSION, BELLATRIX_FORK_VERSION, CAPELLA_FORK_VERSION, DENEB_FORK_VERSION,
    DEPOSIT_CONTRACT_ADDRESS, DISPERSE_CONTRACT_ADDRESS, ELECTRA_FORK_VERSION, FAR_FUTURE_EPOCH,
    FULU_FORK_VERSION, GENESIS_FORK_VERSION, PREFUNDED_ACCOUNTS, WITHDRAWAL_ADDRESS,
    additional_contracts_json, fork_epoch, premine_json, render_values_env, values_env_timestamp,
};

use crate::{
    config::{ChainConfig, ImageConfig},
    runtime::{BindMount, ContainerRuntime, JobSpec, RuntimeError},
    utils::unix_now,
};

/// Name of the artifacts directory under the data directory.
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Outputs of the chain generator that must exist for a genesis to be accepted.
const REQUIRED_CHAIN_OUTPUTS: [&str; 4] =
    ["genesis.json", "genesis.ssz", "config.yaml", "genesis_validators_root.txt"];

/// Errors from genesis and keystore generation.
#[derive(Debug, Error)]
pub enum GenesisError {
    /// A generator job failed.
    #[error("{tool} failed: {diagnostic}")]
    ToolFailed {
        /// Generator name.
        tool: &'static str,
        /// The tool's diagnostic output.
        diagnostic: String,
    },
    /// A generator exited cleanly but an expected file is missing.
    #[error("{tool} did not produce {path}")]
    MissingOutput {
        /// Generator name.
        tool: &'static str,
        /// The missing file.
        path: String,
    },
    /// A generated file could not be parsed.
    #[error("malformed {file}: {reason}")]
    Malformed {
        /// File name.
        file: String,
        /// Parse failure.
        reason: String,
    },
    /// Staging or moving artifacts failed.
    #[error("{0}")]
    Io(String),
}

impl GenesisError {
    fn from_job(tool: &'static str, err: RuntimeError) -> Self {
        let diagnostic = match err {
            RuntimeError::JobFailed { code, output, .. } => format!("exit code {code}\n{output}"),
            other => other.to_string(),
        };
        Self::ToolFailed { tool, diagnostic }
    }
}

fn io_err(context: impl std::fmt::Display) -> impl FnOnce(std::io::Error) -> GenesisError {
    move |e| GenesisError::Io(format!("{context}: {e}"))
}

/// Layout of an artifacts directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    root: PathBuf,
}

impl ArtifactPaths {
    /// Layout rooted at `<data_dir>/artifacts`.
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self { root: data_dir.join(ARTIFACTS_DIR) }
    }

    /// The artifacts directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path to the EL genesis JSON file.
    pub fn el_genesis_path(&self) -> PathBuf {
        self.root.join("genesis.json")
    }

    /// Returns the path to the JWT secret file.
    pub fn jwt_path(&self) -> PathBuf {
        self.root.join("jwt.hex")
    }

    /// Returns the path to the consensus testnet directory.
    pub fn testnet_dir(&self) -> PathBuf {
        self.root.join("beacon")
    }

    /// Returns the path to the CL genesis SSZ file.
    pub fn cl_genesis_ssz_path(&self) -> PathBuf {
        self.testnet_dir().join("genesis.ssz")
    }

    /// Returns the path to the CL configuration YAML file.
    pub fn cl_config_path(&self) -> PathBuf {
        self.testnet_dir().join("config.yaml")
    }

    /// Returns the path to the validators root file.
    pub fn validators_root_path(&self) -> PathBuf {
        self.testnet_dir().join("genesis_validators_root.txt")
    }

    /// Returns the path to the validator keys directory.
    pub fn validators_dir(&self) -> PathBuf {
        self.root.join("validators")
    }

    /// Returns the path to the validator client's definitions file.
    pub fn validator_definitions_path(&self) -> PathBuf {
        self.validators_dir().join("validator_definitions.yml")
    }

    /// Reads the genesis timestamp from the EL genesis, if one exists.
    pub fn read_genesis_time(&self) -> Result<Option<u64>, GenesisError> {
        let path = self.el_genesis_path();
        if !path.exists() {
            return Ok(None);
        }
        read_genesis_time(&path).map(Some)
    }

    /// Reads the validators root, 0x-prefixed.
    pub fn read_validators_root(&self) -> Result<String, GenesisError> {
        read_validators_root(&self.validators_root_path())
    }

    /// SHA-256 over the EL genesis, the CL config and the JWT secret.
    pub fn digest(&self) -> Result<String, GenesisError> {
        let mut hasher = Sha256::new();
        for path in [self.el_genesis_path(), self.cl_config_path(), self.jwt_path()] {
            let bytes = std::fs::read(&path).map_err(io_err(path.display()))?;
            hasher.update(&bytes);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

fn read_genesis_time(path: &Path) -> Result<u64, GenesisError> {
    let malformed = |reason: String| GenesisError::Malformed { file: path.display().to_string(), reason };
    let content = std::fs::read_to_string(path).map_err(io_err(path.display()))?;
    let genesis: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| malformed(e.to_string()))?;
    match &genesis["timestamp"] {
        serde_json::Value::Number(n) => n.as_u64().ok_or_else(|| malformed("negative timestamp".into())),
        serde_json::Value::String(s) => {
            let parsed = match s.strip_prefix("0x") {
                Some(digits) => u64::from_str_radix(digits, 16),
                None => s.parse::<u64>(),
            };
            parsed.map_err(|e| malformed(format!("timestamp `{s}`: {e}")))
        }
        _ => Err(malformed("missing timestamp".into())),
    }
}

fn read_validators_root(path: &Path) -> Result<String, GenesisError> {
    let root = std::fs::read_to_string(path).map_err(io_err(path.display()))?;
    let root = root.trim();
    Ok(if root.starts_with("0x") { root.to_string() } else { format!("0x{root}") })
}

/// Artifacts of one genesis generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisArtifacts {
    /// Shared genesis unix timestamp.
    pub genesis_time: u64,
    /// Genesis validators root, 0x-prefixed.
    pub validators_root: String,
    /// Where the artifacts live.
    pub paths: ArtifactPaths,
    /// Content digest, see [`ArtifactPaths::digest`].
    pub digest: String,
}

/// The external generators, invoked as one-shot jobs.
#[async_trait]
pub trait GenesisTool: Send + Sync {
    /// Runs the chain genesis generator.
    ///
    /// `input_dir` holds `values.env` and `additional-contracts.json`. Outputs are
    /// expected under `output_dir/metadata`.
    async fn generate_chain(&self, input_dir: &Path, output_dir: &Path) -> Result<(), GenesisError>;

    /// Derives `count` validator keystores from `mnemonic`.
    ///
    /// Outputs are expected under `parent_dir/keystores/{keys,secrets}`.
    async fn generate_keystores(
        &self,
        mnemonic: &str,
        count: u32,
        parent_dir: &Path,
    ) -> Result<(), GenesisError>;
}

/// Runs the generators as containers on a [`ContainerRuntime`].
#[derive(Debug)]
pub struct ContainerGenesisTool<R> {
    runtime: Arc<R>,
    genesis_image: String,
    keystore_image: String,
}

impl<R: ContainerRuntime> ContainerGenesisTool<R> {
    /// Creates a tool using the configured generator images.
    pub fn new(runtime: Arc<R>, images: &ImageConfig) -> Self {
        Self {
            runtime,
            genesis_image: images.genesis_generator.clone(),
            keystore_image: images.keystore_generator.clone(),
        }
    }
}

/// `uid:gid` owning `dir`, so job outputs stay removable by the caller.
#[cfg(unix)]
fn owner_of(dir: &Path) -> Option<String> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(dir).ok().map(|m| format!("{}:{}", m.uid(), m.gid()))
}

#[cfg(not(unix))]
fn owner_of(_dir: &Path) -> Option<String> {
    None
}

#[async_trait]
impl<R: ContainerRuntime> GenesisTool for ContainerGenesisTool<R> {
    async fn generate_chain(&self, input_dir: &Path, output_dir: &Path) -> Result<(), GenesisError> {
        let bind = |source: PathBuf, target: &str, read_only| BindMount {
            source,
            target: target.to_string(),
            read_only,
        };
        let job = JobSpec {
            name: "genesis-generator".to_string(),
            image: self.genesis_image.clone(),
            entrypoint: None,
            command: vec!["all".to_string()],
            env: Default::default(),
            mounts: vec![
                bind(input_dir.join("values.env"), "/config/values.env", true),
                bind(
                    input_dir.join("additional-contracts.json"),
                    "/config/additional-contracts.json",
                    true,
                ),
                bind(output_dir.to_path_buf(), "/data", false),
            ],
            user: owner_of(output_dir),
        };
        let output =
            self.runtime.run_job(&job).await.map_err(|e| GenesisError::from_job("genesis-generator", e))?;
        debug!(lines = output.output.lines().count(), "genesis generator finished");
        Ok(())
    }

    async fn generate_keystores(
        &self,
        mnemonic: &str,
        count: u32,
        parent_dir: &Path,
    ) -> Result<(), GenesisError> {
        let command = [
            "keystores",
            "--insecure",
            "--prysm-pass",
            KEYSTORE_PASSWORD,
            "--out-loc",
            "/parent/keystores",
            "--source-mnemonic",
            mnemonic,
            "--source-min",
            "0",
            "--source-max",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain([count.to_string()])
        .collect();
        let job = JobSpec {
            name: "keystore-generator".to_string(),
            image: self.keystore_image.clone(),
            entrypoint: None,
            command,
            env: Default::default(),
            mounts: vec![BindMount {
                source: parent_dir.to_path_buf(),
                target: "/parent".to_string(),
                read_only: false,
            }],
            user: owner_of(parent_dir),
        };
        self.runtime.run_job(&job).await.map_err(|e| GenesisError::from_job("keystore-generator", e))?;
        Ok(())
    }
}

/// Picks the genesis timestamp: `now + delay`, strictly after any previous genesis.
pub fn next_genesis_time(now: u64, delay: u64, previous: Option<u64>) -> u64 {
    let candidate = now.saturating_add(delay);
    match previous {
        Some(prev) if prev >= candidate => prev.saturating_add(1),
        _ => candidate,
    }
}

/// Generates a fresh genesis and key set into `<data_dir>/artifacts`.
///
/// Any prior artifacts are replaced. On failure the prior artifacts are left as
/// they were and nothing partial is written.
pub async fn generate_genesis<T>(
    tool: &T,
    data_dir: &Path,
    chain: &ChainConfig,
) -> Result<GenesisArtifacts, GenesisError>
where
    T: GenesisTool + ?Sized,
{
    let target = ArtifactPaths::in_data_dir(data_dir);
    // An unreadable previous genesis only loses the monotonicity bump.
    let previous = target.read_genesis_time().unwrap_or(None);
    let genesis_time = next_genesis_time(unix_now(), chain.genesis_delay, previous);
    info!(genesis_time, validators = chain.validator_count, fork = %chain.fork, "generating genesis");

    std::fs::create_dir_all(data_dir).map_err(io_err(data_dir.display()))?;
    let staging = tempfile::Builder::new()
        .prefix(".genesis-")
        .tempdir_in(data_dir)
        .map_err(io_err("create staging directory"))?;
    let input_dir = staging.path().join("input");
    let chain_out = staging.path().join("chain");
    let keys_parent = staging.path().join("keys");
    for dir in [&input_dir, &chain_out, &keys_parent] {
        std::fs::create_dir_all(dir).map_err(io_err(dir.display()))?;
    }
    std::fs::write(input_dir.join("values.env"), render_values_env(chain, genesis_time))
        .map_err(io_err("write values.env"))?;
    std::fs::write(input_dir.join("additional-contracts.json"), additional_contracts_json())
        .map_err(io_err("write additional-contracts.json"))?;

    tool.generate_chain(&input_dir, &chain_out).await?;
    let metadata = chain_out.join("metadata");
    for file in REQUIRED_CHAIN_OUTPUTS {
        if !metadata.join(file).is_file() {
            return Err(GenesisError::MissingOutput {
                tool: "genesis-generator",
                path: format!("metadata/{file}"),
            });
        }
    }

    tool.generate_keystores(&chain.mnemonic, chain.validator_count, &keys_parent).await?;

    let assembled = ArtifactPaths { root: staging.path().join(ARTIFACTS_DIR) };
    std::fs::create_dir_all(assembled.testnet_dir()).map_err(io_err("create testnet dir"))?;
    std::fs::copy(metadata.join("genesis.json"), assembled.el_genesis_path())
        .map_err(io_err("copy genesis.json"))?;
    for file in ["genesis.ssz", "config.yaml", "genesis_validators_root.txt"] {
        std::fs::copy(metadata.join(file), assembled.testnet_dir().join(file))
            .map_err(io_err(format!("copy {file}")))?;
    }
    for file in ["deploy_block.txt", "deposit_contract_block.txt"] {
        std::fs::write(assembled.testnet_dir().join(file), "0").map_err(io_err(format!("write {file}")))?;
    }
    arrange_keystores(&keys_parent.join("keystores"), &assembled.validators_dir(), chain.validator_count)?;
    write_jwt_secret(&assembled.jwt_path()).map_err(io_err("write jwt.hex"))?;
    std::fs::copy(assembled.jwt_path(), assembled.testnet_dir().join("jwt.hex"))
        .map_err(io_err("copy jwt.hex"))?;

    // The generator's own timestamp is authoritative if it differs from the request.
    let genesis_time = read_genesis_time(&assembled.el_genesis_path())?;
    let validators_root = assembled.read_validators_root()?;

    if target.root().exists() {
        std::fs::remove_dir_all(target.root()).map_err(io_err("remove previous artifacts"))?;
    }
    std::fs::rename(assembled.root(), target.root()).map_err(io_err("move artifacts into place"))?;
    let digest = target.digest()?;

    info!(genesis_time, validators_root = %validators_root, digest = %digest, "genesis ready");
    Ok(GenesisArtifacts { genesis_time, validators_root, paths: target, digest })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1_000, 0, None, 1_000)]
    #[case(1_000, 30, None, 1_030)]
    #[case(1_000, 0, Some(999), 1_000)]
    #[case(1_000, 0, Some(1_000), 1_001)]
    #[case(1_000, 0, Some(5_000), 5_001)]
    #[case(1_000, 0, Some(u64::MAX), u64::MAX)]
    #[case(u64::MAX, 10, None, u64::MAX)]
    fn test_next_genesis_time(
        #[case] now: u64,
        #[case] delay: u64,
        #[case] previous: Option<u64>,
        #[case] expected: u64,
    ) {
        assert_eq!(next_genesis_time(now, delay, previous), expected);
    }

    #[rstest]
    #[case(r#"{"timestamp":"0x6553f100"}"#, 1_700_000_000)]
    #[case(r#"{"timestamp":"1700000000"}"#, 1_700_000_000)]
    #[case(r#"{"timestamp":1700000000}"#, 1_700_000_000)]
    fn test_read_genesis_time(#[case] content: &str, #[case] expected: u64) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.json");
        std::fs::write(&path, content).unwrap();
        assert_eq!(read_genesis_time(&path).unwrap(), expected);
    }

    #[test]
    fn test_read_genesis_time_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.json");
        std::fs::write(&path, r#"{"config":{}}"#).unwrap();
        assert!(matches!(read_genesis_time(&path), Err(GenesisError::Malformed { .. })));
    }

    #[test]
    fn test_validators_root_prefixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("root.txt");
        std::fs::write(&path, "abcd\n").unwrap();
        assert_eq!(read_validators_root(&path).unwrap(), "0xabcd");
        std::fs::write(&path, "0xabcd").unwrap();
        assert_eq!(read_validators_root(&path).unwrap(), "0xabcd");
    }

    #[test]
    fn test_job_failure_carries_output() {
        let err = GenesisError::from_job(
            "genesis-generator",
            RuntimeError::JobFailed { name: "genesis-generator".into(), code: 2, output: "bad fork".into() },
        );
        let message = err.to_string();
        assert!(message.starts_with("genesis-generator failed"));
        assert!(message.contains("exit code 2"));
        assert!(message.contains("bad fork"));
    }

    #[test]
    fn test_layout() {
        let paths = ArtifactPaths::in_data_dir(Path::new("/tmp/pg"));
        assert_eq!(paths.el_genesis_path(), Path::new("/tmp/pg/artifacts/genesis.json"));
        assert_eq!(paths.cl_config_path(), Path::new("/tmp/pg/artifacts/beacon/config.yaml"));
        assert_eq!(
            paths.validator_definitions_path(),
            Path::new("/tmp/pg/artifacts/validators/validator_definitions.yml")
        );
    }
}
