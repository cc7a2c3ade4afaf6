//! In-memory container runtime and genesis tool for driving the orchestrator.

#![allow(dead_code, unreachable_pub)]

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use mev_playground::{
    PlaygroundConfig,
    genesis::{GenesisError, GenesisTool, values_env_timestamp},
    network::AddressClass,
    orchestrator::Playground,
    registry::{ComponentSpec, Registry},
    runtime::{
        COMPONENT_LABEL, ContainerHealth, ContainerRuntime, ContainerSpec, ContainerStatus,
        ContainerSummary, JobOutput, JobSpec, MANAGED_LABEL, NetworkInfo, ProbeStatus, RuntimeError,
    },
};
use sha2::{Digest, Sha256};

/// A runtime call, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    CreateNetwork(String),
    RemoveNetwork(String),
    Pull(String),
    Create(String),
    Start(String),
    Stop(String),
    Remove(String),
    Job(String),
}

#[derive(Debug)]
struct FakeContainer {
    spec: ContainerSpec,
    status: ContainerStatus,
}

#[derive(Debug, Default)]
struct FakeState {
    networks: BTreeMap<String, NetworkInfo>,
    containers: BTreeMap<String, FakeContainer>,
    events: Vec<Event>,
    jobs: Vec<JobSpec>,
    unhealthy: BTreeSet<String>,
    exiting: BTreeSet<String>,
    failing_create: BTreeSet<String>,
    failing_pull: BTreeSet<String>,
    failing_stop: BTreeSet<String>,
    failing_remove: BTreeSet<String>,
    failing_job: Option<String>,
    refuse_network_create: bool,
    refuse_network_remove: bool,
}

/// Containers live in a map; every call is recorded as an [`Event`].
#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The container runs but its health check never passes.
    pub fn fail_health(&self, name: &str) {
        self.state.lock().unwrap().unhealthy.insert(name.to_string());
    }

    /// The container exits as soon as it starts.
    pub fn exit_on_start(&self, name: &str) {
        self.state.lock().unwrap().exiting.insert(name.to_string());
    }

    /// Creating the container fails.
    pub fn fail_create(&self, name: &str) {
        self.state.lock().unwrap().failing_create.insert(name.to_string());
    }

    /// Pulling the image fails.
    pub fn fail_pull(&self, image: &str) {
        self.state.lock().unwrap().failing_pull.insert(image.to_string());
    }

    /// Stopping the container fails.
    pub fn fail_stop(&self, name: &str) {
        self.state.lock().unwrap().failing_stop.insert(name.to_string());
    }

    /// Removing the container fails.
    pub fn fail_remove(&self, name: &str) {
        self.state.lock().unwrap().failing_remove.insert(name.to_string());
    }

    /// Creating any network fails.
    pub fn refuse_network_create(&self) {
        self.state.lock().unwrap().refuse_network_create = true;
    }

    /// Removing any network fails.
    pub fn refuse_network_remove(&self) {
        self.state.lock().unwrap().refuse_network_remove = true;
    }

    /// Every job exits non-zero with `output`.
    pub fn fail_jobs(&self, output: &str) {
        self.state.lock().unwrap().failing_job = Some(output.to_string());
    }

    pub fn insert_network(&self, name: &str, subnet: &str) {
        self.state.lock().unwrap().networks.insert(
            name.to_string(),
            NetworkInfo { id: format!("{name}-id"), name: name.to_string(), subnets: vec![subnet.to_string()] },
        );
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.state.lock().unwrap().networks.contains_key(name)
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.lock().unwrap().events.clear();
    }

    pub fn jobs(&self) -> Vec<JobSpec> {
        self.state.lock().unwrap().jobs.clone()
    }

    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Start(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Stop(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state.lock().unwrap().containers.keys().cloned().collect()
    }

    pub fn status_of(&self, name: &str) -> ContainerStatus {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .map_or(ContainerStatus::Missing, |c| c.status)
    }

    pub fn spec(&self, name: &str) -> Option<ContainerSpec> {
        self.state.lock().unwrap().containers.get(name).map(|c| c.spec.clone())
    }

    fn record(&self, event: Event) {
        self.state.lock().unwrap().events.push(event);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn inspect_network(&self, name: &str) -> Result<Option<NetworkInfo>, RuntimeError> {
        Ok(self.state.lock().unwrap().networks.get(name).cloned())
    }

    async fn create_network(&self, name: &str, subnet: &str) -> Result<String, RuntimeError> {
        self.record(Event::CreateNetwork(name.to_string()));
        if self.state.lock().unwrap().refuse_network_create {
            return Err(RuntimeError::Backend("daemon refused".into()));
        }
        self.insert_network(name, subnet);
        Ok(format!("{name}-id"))
    }

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::RemoveNetwork(name.to_string()));
        if state.refuse_network_remove {
            return Err(RuntimeError::Backend(format!("network {name} has active endpoints")));
        }
        state.networks.remove(name);
        Ok(())
    }

    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError> {
        self.record(Event::Pull(image.to_string()));
        if self.state.lock().unwrap().failing_pull.contains(image) {
            return Err(RuntimeError::NotFound(image.to_string()));
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Create(spec.name.clone()));
        if state.failing_create.contains(&spec.name) {
            return Err(RuntimeError::Backend(format!("cannot create {}", spec.name)));
        }
        if state.containers.contains_key(&spec.name) {
            return Err(RuntimeError::Backend(format!("container {} already exists", spec.name)));
        }
        state
            .containers
            .insert(spec.name.clone(), FakeContainer { spec: spec.clone(), status: ContainerStatus::Created });
        Ok(())
    }

    async fn start_container(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Start(name.to_string()));
        let exiting = state.exiting.contains(name);
        let container =
            state.containers.get_mut(name).ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        container.status = if exiting { ContainerStatus::Exited } else { ContainerStatus::Running };
        Ok(())
    }

    async fn stop_container(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Stop(name.to_string()));
        if state.failing_stop.contains(name) {
            return Err(RuntimeError::Backend(format!("cannot stop {name}")));
        }
        if let Some(container) = state.containers.get_mut(name) {
            container.status = ContainerStatus::Exited;
        }
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Remove(name.to_string()));
        if state.failing_remove.contains(name) {
            return Err(RuntimeError::Backend(format!("cannot remove {name}")));
        }
        state.containers.remove(name);
        Ok(())
    }

    async fn container_health(&self, name: &str) -> Result<ContainerHealth, RuntimeError> {
        let state = self.state.lock().unwrap();
        let Some(container) = state.containers.get(name) else {
            return Ok(ContainerHealth::MISSING);
        };
        let probe = match container.status {
            ContainerStatus::Running if state.unhealthy.contains(name) => ProbeStatus::Failing,
            ContainerStatus::Running => ProbeStatus::Passing,
            _ => ProbeStatus::Pending,
        };
        Ok(ContainerHealth { status: container.status, probe })
    }

    async fn container_logs(&self, name: &str, tail: usize) -> Result<String, RuntimeError> {
        let state = self.state.lock().unwrap();
        if !state.containers.contains_key(name) {
            return Err(RuntimeError::NotFound(name.to_string()));
        }
        Ok((0..tail).map(|i| format!("{name} line {i}\n")).collect())
    }

    async fn list_managed(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .values()
            .filter(|c| c.spec.labels.get(MANAGED_LABEL).map(String::as_str) == Some("true"))
            .map(|c| ContainerSummary {
                name: c.spec.name.clone(),
                component: c.spec.labels.get(COMPONENT_LABEL).cloned(),
            })
            .collect())
    }

    async fn run_job(&self, job: &JobSpec) -> Result<JobOutput, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Job(job.name.clone()));
        state.jobs.push(job.clone());
        if let Some(output) = &state.failing_job {
            return Err(RuntimeError::JobFailed { name: job.name.clone(), code: 1, output: output.clone() });
        }
        Ok(JobOutput { output: String::new() })
    }
}

/// Writes the files the real generators would, derived from their inputs.
///
/// The validators root depends only on the mnemonic and validator count.
#[derive(Debug, Default)]
pub struct FakeGenesisTool {
    pub fail_chain: bool,
    pub skip_validators_root: bool,
    pub keystores: Option<u32>,
    pub calls: Mutex<Vec<&'static str>>,
}

impl FakeGenesisTool {
    pub fn failing() -> Self {
        Self { fail_chain: true, ..Default::default() }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

fn validators_root(mnemonic: &str, count: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(mnemonic.as_bytes());
    hasher.update(count.to_be_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

fn values_env_field<'a>(values_env: &'a str, key: &str) -> Option<&'a str> {
    values_env.lines().find_map(|line| {
        line.strip_prefix("export ")?
            .strip_prefix(key)?
            .strip_prefix('=')
            .map(|v| v.trim_matches('"'))
    })
}

#[async_trait]
impl GenesisTool for FakeGenesisTool {
    async fn generate_chain(&self, input_dir: &Path, output_dir: &Path) -> Result<(), GenesisError> {
        self.calls.lock().unwrap().push("chain");
        if self.fail_chain {
            return Err(GenesisError::ToolFailed {
                tool: "genesis-generator",
                diagnostic: "exit code 1\ninvalid fork schedule".into(),
            });
        }
        let values_env = std::fs::read_to_string(input_dir.join("values.env")).unwrap();
        assert!(input_dir.join("additional-contracts.json").is_file());
        let timestamp = values_env_timestamp(&values_env).unwrap();
        let mnemonic = values_env_field(&values_env, "EL_AND_CL_MNEMONIC").unwrap();
        let count: u32 = values_env_field(&values_env, "NUMBER_OF_VALIDATORS").unwrap().parse().unwrap();

        let metadata = output_dir.join("metadata");
        std::fs::create_dir_all(&metadata).unwrap();
        std::fs::write(
            metadata.join("genesis.json"),
            format!(r#"{{"config":{{}},"timestamp":"{timestamp:#x}"}}"#),
        )
        .unwrap();
        std::fs::write(metadata.join("genesis.ssz"), timestamp.to_le_bytes()).unwrap();
        std::fs::write(metadata.join("config.yaml"), format!("MIN_GENESIS_TIME: {timestamp}\n")).unwrap();
        if !self.skip_validators_root {
            std::fs::write(
                metadata.join("genesis_validators_root.txt"),
                validators_root(mnemonic, count).trim_start_matches("0x"),
            )
            .unwrap();
        }
        Ok(())
    }

    async fn generate_keystores(
        &self,
        _mnemonic: &str,
        count: u32,
        parent_dir: &Path,
    ) -> Result<(), GenesisError> {
        self.calls.lock().unwrap().push("keystores");
        let out = parent_dir.join("keystores");
        for i in 0..self.keystores.unwrap_or(count) {
            let pubkey = format!("0x{i:096x}");
            let dir = out.join("keys").join(&pubkey);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("voting-keystore.json"), format!(r#"{{"pubkey":"{pubkey}"}}"#)).unwrap();
            std::fs::create_dir_all(out.join("secrets")).unwrap();
            std::fs::write(out.join("secrets").join(&pubkey), "secret").unwrap();
        }
        Ok(())
    }
}

/// A config rooted at `dir` with a small validator set.
pub fn test_config(dir: &Path) -> PlaygroundConfig {
    let mut config = PlaygroundConfig { data_dir: dir.join("pg"), ..Default::default() };
    config.chain.validator_count = 4;
    config.chain.genesis_delay = 0;
    config
}

pub fn data_dir(config: &PlaygroundConfig) -> PathBuf {
    config.data_dir.clone()
}

/// A tools-class component with a short health timeout.
pub fn component(name: &str, slot: u8, deps: &[&str]) -> ComponentSpec {
    ComponentSpec::new(name, format!("example/{name}:latest"), AddressClass::Tools, slot)
        .depends_on(deps.iter().copied())
        .with_health(
            mev_playground::runtime::HealthCheck::running(Duration::from_secs(5))
                .with_interval(Duration::from_millis(100)),
        )
}

pub type FakePlayground = Playground<FakeRuntime, FakeGenesisTool>;

/// A playground over an explicit component set.
pub fn playground_with(
    config: PlaygroundConfig,
    runtime: &Arc<FakeRuntime>,
    components: Vec<ComponentSpec>,
) -> FakePlayground {
    let registry = Registry::new(components).unwrap();
    Playground::with_registry(config, Arc::clone(runtime), FakeGenesisTool::default(), registry)
}

/// A playground over the default component table.
pub fn default_playground(config: PlaygroundConfig, runtime: &Arc<FakeRuntime>) -> FakePlayground {
    Playground::new(config, Arc::clone(runtime), FakeGenesisTool::default()).unwrap()
}
