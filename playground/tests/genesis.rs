//! Tests for genesis generation and artifact layout.

mod common;

use std::sync::Arc;

use common::{FakeGenesisTool, FakeRuntime};
use mev_playground::{
    config::{ChainConfig, ImageConfig},
    genesis::{ContainerGenesisTool, GenesisError, GenesisTool, KEYSTORE_PASSWORD, generate_genesis},
};

fn chain() -> ChainConfig {
    ChainConfig { validator_count: 3, genesis_delay: 0, ..Default::default() }
}

#[tokio::test]
async fn test_generates_full_layout() {
    let dir = tempfile::tempdir().unwrap();
    let tool = FakeGenesisTool::default();

    let genesis = generate_genesis(&tool, dir.path(), &chain()).await.unwrap();
    let paths = &genesis.paths;

    assert_eq!(tool.calls(), vec!["chain", "keystores"]);
    assert!(paths.el_genesis_path().is_file());
    assert!(paths.cl_genesis_ssz_path().is_file());
    assert!(paths.cl_config_path().is_file());
    assert!(paths.testnet_dir().join("deploy_block.txt").is_file());
    assert!(paths.testnet_dir().join("jwt.hex").is_file());
    assert_eq!(std::fs::read_to_string(paths.jwt_path()).unwrap().len(), 64);
    assert!(genesis.validators_root.starts_with("0x"));
    assert_eq!(paths.read_genesis_time().unwrap(), Some(genesis.genesis_time));

    let keystores = paths.validators_dir().join("keystores");
    assert_eq!(std::fs::read_dir(&keystores).unwrap().count(), 3);
    let definitions = std::fs::read_to_string(paths.validator_definitions_path()).unwrap();
    assert_eq!(definitions.matches("voting_public_key").count(), 3);
    let secret = std::fs::read_to_string(paths.validators_dir().join("secrets/validator_0")).unwrap();
    assert_eq!(secret, KEYSTORE_PASSWORD);

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with(".genesis-"))
        .collect();
    assert!(leftovers.is_empty(), "staging directory must be cleaned up");
}

#[tokio::test]
async fn test_consecutive_generations_differ() {
    let dir = tempfile::tempdir().unwrap();
    let tool = FakeGenesisTool::default();

    let first = generate_genesis(&tool, dir.path(), &chain()).await.unwrap();
    let second = generate_genesis(&tool, dir.path(), &chain()).await.unwrap();

    assert!(second.genesis_time > first.genesis_time);
    assert_ne!(first.digest, second.digest);
    assert_eq!(second.digest, second.paths.digest().unwrap());
}

#[tokio::test]
async fn test_failure_keeps_previous_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let good = generate_genesis(&FakeGenesisTool::default(), dir.path(), &chain()).await.unwrap();

    let broken = FakeGenesisTool { skip_validators_root: true, ..Default::default() };
    let err = generate_genesis(&broken, dir.path(), &chain()).await.unwrap_err();

    assert!(matches!(err, GenesisError::MissingOutput { ref path, .. } if path.ends_with("genesis_validators_root.txt")));
    assert_eq!(good.paths.digest().unwrap(), good.digest, "previous artifacts must be untouched");
    assert_eq!(good.paths.read_genesis_time().unwrap(), Some(good.genesis_time));
}

#[tokio::test]
async fn test_keystore_shortfall_fails() {
    let dir = tempfile::tempdir().unwrap();
    let tool = FakeGenesisTool { keystores: Some(2), ..Default::default() };

    let err = generate_genesis(&tool, dir.path(), &chain()).await.unwrap_err();

    assert!(matches!(err, GenesisError::ToolFailed { tool: "keystores", .. }), "{err}");
    assert!(!dir.path().join("artifacts").exists());
}

#[tokio::test]
async fn test_container_tool_runs_generator_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = FakeRuntime::new();
    let images = ImageConfig::default();
    let tool = ContainerGenesisTool::new(Arc::clone(&runtime), &images);

    tool.generate_chain(dir.path(), &dir.path().join("out")).await.unwrap();
    tool.generate_keystores("test mnemonic", 8, dir.path()).await.unwrap();

    let jobs = runtime.jobs();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].image, images.genesis_generator);
    assert_eq!(jobs[0].command, vec!["all"]);
    assert!(jobs[0].mounts.iter().any(|m| m.target == "/config/values.env" && m.read_only));
    assert!(jobs[0].mounts.iter().any(|m| m.target == "/data" && !m.read_only));

    assert_eq!(jobs[1].image, images.keystore_generator);
    assert_eq!(jobs[1].command.first().map(String::as_str), Some("keystores"));
    assert_eq!(jobs[1].command.last().map(String::as_str), Some("8"));
    assert!(jobs[1].command.iter().any(|a| a == "test mnemonic"));
}

#[tokio::test]
async fn test_container_tool_surfaces_job_output() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = FakeRuntime::new();
    runtime.fail_jobs("fork epochs out of order");
    let tool = ContainerGenesisTool::new(Arc::clone(&runtime), &ImageConfig::default());

    let err = tool.generate_chain(dir.path(), dir.path()).await.unwrap_err();

    assert!(matches!(err, GenesisError::ToolFailed { tool: "genesis-generator", .. }));
    assert!(err.to_string().contains("fork epochs out of order"), "{err}");
}
