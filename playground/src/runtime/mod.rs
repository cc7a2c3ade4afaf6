//! Container runtime abstraction.
//!
//! The orchestrator only talks to containers through [`ContainerRuntime`]. The
//! production implementation is [`DockerRuntime`]; tests substitute an in-memory fake.

use std::{collections::BTreeMap, net::Ipv4Addr, path::PathBuf, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

mod docker;
pub use docker::DockerRuntime;

/// Label marking containers created by the playground.
pub const MANAGED_LABEL: &str = "mev-playground.managed";
/// Label carrying the component name.
pub const COMPONENT_LABEL: &str = "mev-playground.component";

/// Errors from the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The referenced container, network or image does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A one-shot job exited with a non-zero code.
    #[error("job `{name}` exited with code {code}: {output}")]
    JobFailed {
        /// Job name.
        name: String,
        /// Exit code.
        code: i64,
        /// Tail of the job output.
        output: String,
    },
    /// The container engine rejected or failed the request.
    #[error("container runtime: {0}")]
    Backend(String),
}

/// A host port published 1:1 to a container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// Port inside the container.
    pub container: u16,
    /// Port on the host.
    pub host: u16,
}

impl PortMapping {
    /// Publishes `port` on the same host port.
    pub const fn same(port: u16) -> Self {
        Self { container: port, host: port }
    }
}

/// A host directory bind-mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    /// Host path.
    pub source: PathBuf,
    /// Path inside the container.
    pub target: String,
    /// Mount read-only.
    pub read_only: bool,
}

impl BindMount {
    /// Returns the `source:target[:ro]` bind string.
    pub fn to_bind(&self) -> String {
        let suffix = if self.read_only { ":ro" } else { "" };
        format!("{}:{}{suffix}", self.source.display(), self.target)
    }
}

/// How a component's readiness is determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Healthy once the container is running.
    Running,
    /// Healthy once a TCP connection to the port inside the container succeeds.
    Tcp(u16),
    /// Healthy once an HTTP GET on the port and path succeeds.
    Http {
        /// Port inside the container.
        port: u16,
        /// Request path.
        path: String,
    },
    /// Healthy once the command exits zero inside the container.
    Command(Vec<String>),
}

/// Health-check definition for a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    /// Readiness probe.
    pub probe: Probe,
    /// Upper bound on the total wait.
    pub timeout: Duration,
    /// Delay between checks.
    pub interval: Duration,
    /// Grace period before failed probes count against the container.
    pub start_period: Duration,
}

impl HealthCheck {
    /// A check with the default cadence of 2s and the given timeout.
    pub const fn new(probe: Probe, timeout: Duration) -> Self {
        Self {
            probe,
            timeout,
            interval: Duration::from_secs(2),
            start_period: Duration::from_secs(5),
        }
    }

    /// Healthy as soon as the container runs.
    pub const fn running(timeout: Duration) -> Self {
        Self::new(Probe::Running, timeout)
    }

    /// Sets the polling interval.
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the start period.
    pub const fn with_start_period(mut self, start_period: Duration) -> Self {
        self.start_period = start_period;
        self
    }

    /// Returns the Docker `HEALTHCHECK` test for this probe.
    ///
    /// [`Probe::Running`] maps to `NONE`, which also disables any check baked into the image.
    pub fn docker_test(&self) -> Vec<String> {
        match &self.probe {
            Probe::Running => vec!["NONE".to_string()],
            Probe::Tcp(port) => vec![
                "CMD-SHELL".to_string(),
                format!("bash -c 'echo > /dev/tcp/localhost/{port}' || exit 1"),
            ],
            Probe::Http { port, path } => vec![
                "CMD-SHELL".to_string(),
                format!("wget -q --spider http://localhost:{port}{path} || exit 1"),
            ],
            Probe::Command(cmd) => {
                let mut test = vec!["CMD".to_string()];
                test.extend(cmd.iter().cloned());
                test
            }
        }
    }
}

/// Everything needed to create one long-running container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Command arguments.
    pub command: Vec<String>,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// Published ports.
    pub ports: Vec<PortMapping>,
    /// Bind mounts.
    pub mounts: Vec<BindMount>,
    /// Network to attach to.
    pub network: String,
    /// Static address on that network.
    pub address: Ipv4Addr,
    /// Health check translated to the engine's native form.
    pub health: Option<HealthCheck>,
    /// User to run as.
    pub user: Option<String>,
    /// Container whose PID namespace is shared.
    pub pid_container: Option<String>,
    /// Labels, including the managed-by labels.
    pub labels: BTreeMap<String, String>,
}

/// A one-shot container whose output is collected on exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Name prefix; the runtime makes it unique.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Entrypoint override.
    pub entrypoint: Option<Vec<String>>,
    /// Command arguments.
    pub command: Vec<String>,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// Bind mounts.
    pub mounts: Vec<BindMount>,
    /// `uid:gid` to run as, so outputs are owned by the caller.
    pub user: Option<String>,
}

/// Result of a successful job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutput {
    /// Combined stdout and stderr.
    pub output: String,
}

/// Existing network as seen by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Engine id.
    pub id: String,
    /// Network name.
    pub name: String,
    /// Configured IPAM subnets.
    pub subnets: Vec<String>,
}

/// A labelled container known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    /// Container name.
    pub name: String,
    /// Value of the component label.
    pub component: Option<String>,
}

/// Lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    /// Created but not started.
    Created,
    /// Running.
    Running,
    /// Stopped or exited.
    Exited,
    /// No such container.
    Missing,
    /// Any other engine state.
    Unknown,
}

/// Result of the container's health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// Last probe succeeded.
    Passing,
    /// Probe retries exhausted.
    Failing,
    /// No verdict yet.
    Pending,
    /// The container has no probe.
    NotConfigured,
}

/// Point-in-time health of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHealth {
    /// Lifecycle state.
    pub status: ContainerStatus,
    /// Probe verdict.
    pub probe: ProbeStatus,
}

impl ContainerHealth {
    /// Health of a container that does not exist.
    pub const MISSING: Self =
        Self { status: ContainerStatus::Missing, probe: ProbeStatus::NotConfigured };

    /// Whether the container is running and its probe (if any) has passed.
    pub const fn is_healthy(&self) -> bool {
        matches!(self.status, ContainerStatus::Running)
            && matches!(self.probe, ProbeStatus::Passing | ProbeStatus::NotConfigured)
    }
}

/// Operations the orchestrator needs from a container engine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Looks up a network by name.
    async fn inspect_network(&self, name: &str) -> Result<Option<NetworkInfo>, RuntimeError>;

    /// Creates a bridge network with the given subnet and returns its id.
    async fn create_network(&self, name: &str, subnet: &str) -> Result<String, RuntimeError>;

    /// Removes a network. A missing network is not an error.
    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError>;

    /// Pulls an image unless it is already present.
    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError>;

    /// Creates a container.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<(), RuntimeError>;

    /// Starts a created container.
    async fn start_container(&self, name: &str) -> Result<(), RuntimeError>;

    /// Stops a container. Missing or already stopped containers are not an error.
    async fn stop_container(&self, name: &str) -> Result<(), RuntimeError>;

    /// Force-removes a container. A missing container is not an error.
    async fn remove_container(&self, name: &str) -> Result<(), RuntimeError>;

    /// Returns the current health of a container.
    async fn container_health(&self, name: &str) -> Result<ContainerHealth, RuntimeError>;

    /// Returns the last `tail` lines of a container's output.
    async fn container_logs(&self, name: &str, tail: usize) -> Result<String, RuntimeError>;

    /// Lists containers carrying [`MANAGED_LABEL`].
    async fn list_managed(&self) -> Result<Vec<ContainerSummary>, RuntimeError>;

    /// Runs a container to completion. A non-zero exit is [`RuntimeError::JobFailed`].
    async fn run_job(&self, job: &JobSpec) -> Result<JobOutput, RuntimeError>;
}
