//! Lifecycle orchestration.
//!
//! [`Playground`] brings the resolved component set up in dependency order,
//! gating each component on its dependencies being healthy, and tears it down in
//! reverse. Orchestration state lives only in the [`RunContext`] of one `start`;
//! `status` always re-derives from the live containers.

use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet},
    fmt,
    net::Ipv4Addr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

mod health;
use health::{HealthOutcome, wait_healthy};

mod lock;
pub use lock::{LOCK_FILE, LockInfo, RunLock};

use crate::{
    config::{BuilderVariant, PlaygroundConfig},
    error::PlaygroundError,
    genesis::{ARTIFACTS_DIR, ContainerGenesisTool, GenesisArtifacts, GenesisTool, generate_genesis},
    info::{ComponentInfo, PlaygroundInfo},
    network::{NetworkHandle, NetworkSpec, ensure_network},
    registry::{ComponentSpec, MountSource, RELAY_PUBKEY, Registry, RenderContext, default_registry, render_all},
    runtime::{
        BindMount, COMPONENT_LABEL, ContainerRuntime, ContainerSpec, DockerRuntime, MANAGED_LABEL,
        RuntimeError,
    },
    status::{ComponentStatus, HealthStatus, StatusReport},
    utils::unix_now,
};

/// Directory under the data directory holding per-component volumes.
pub const VOLUMES_DIR: &str = "data";

/// Directory under the data directory holding rendered config files.
pub const CONFIG_DIR: &str = "config";

/// File under the data directory naming the components of the last `start`.
pub const COMPONENTS_FILE: &str = "components.json";

/// State of a component within one `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    /// Not started, because a dependency is not healthy or the start was interrupted.
    Pending,
    /// Created and started, health not yet established.
    Starting,
    /// Health check passed.
    Healthy,
    /// Failed to start or never became healthy.
    Unhealthy,
    /// Stopped.
    Stopped,
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Stopped => "stopped",
        })
    }
}

/// Everything resolved for one `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Absolute data directory.
    pub data_dir: PathBuf,
    /// Builder variant in effect.
    pub builder: BuilderVariant,
    /// The playground network.
    pub network: NetworkHandle,
    /// Genesis generated for this run.
    pub genesis: GenesisArtifacts,
    /// Static address of every component in the resolved set.
    pub addresses: BTreeMap<String, Ipv4Addr>,
}

impl RunContext {
    fn render_context(&self) -> RenderContext<'_> {
        RenderContext {
            addresses: &self.addresses,
            genesis_time: self.genesis.genesis_time,
            validators_root: &self.genesis.validators_root,
        }
    }

    fn host_path(&self, component: &ComponentSpec, source: &MountSource) -> PathBuf {
        match source {
            MountSource::Artifacts(None) => self.genesis.paths.root().to_path_buf(),
            MountSource::Artifacts(Some(sub)) => self.genesis.paths.root().join(sub),
            MountSource::Data(sub) => self.data_dir.join(VOLUMES_DIR).join(sub),
            MountSource::Config => self.data_dir.join(CONFIG_DIR).join(&component.name),
        }
    }

    /// Renders a component into a concrete container spec.
    ///
    /// Config files are written and volume directories created as a side effect.
    pub fn container_spec(&self, component: &ComponentSpec) -> Result<ContainerSpec, PlaygroundError> {
        let failed = |reason: String| PlaygroundError::ComponentStartFailed {
            component: component.name.clone(),
            reason,
        };
        let ctx = self.render_context();
        let command = render_all(&component.command, &ctx).map_err(|e| failed(e.to_string()))?;
        let env = component
            .env
            .iter()
            .map(|(key, value)| Ok((key.clone(), value.render(&ctx)?)))
            .collect::<Result<BTreeMap<_, _>, crate::registry::RenderError>>()
            .map_err(|e| failed(e.to_string()))?;

        if !component.files.is_empty() {
            let dir = self.host_path(component, &MountSource::Config);
            std::fs::create_dir_all(&dir).map_err(|e| failed(format!("create {}: {e}", dir.display())))?;
            for file in &component.files {
                let contents = file.contents.render(&ctx).map_err(|e| failed(e.to_string()))?;
                let path = dir.join(&file.name);
                std::fs::write(&path, contents)
                    .map_err(|e| failed(format!("write {}: {e}", path.display())))?;
            }
        }

        let mut mounts = Vec::with_capacity(component.mounts.len());
        for mount in &component.mounts {
            let source = self.host_path(component, &mount.source);
            if matches!(mount.source, MountSource::Data(_) | MountSource::Config) {
                std::fs::create_dir_all(&source)
                    .map_err(|e| failed(format!("create {}: {e}", source.display())))?;
            }
            mounts.push(BindMount { source, target: mount.target.clone(), read_only: mount.read_only });
        }

        let address = *self
            .addresses
            .get(&component.name)
            .ok_or_else(|| failed("no address assigned".to_string()))?;
        let labels = BTreeMap::from([
            (MANAGED_LABEL.to_string(), "true".to_string()),
            (COMPONENT_LABEL.to_string(), component.name.clone()),
        ]);

        Ok(ContainerSpec {
            name: component.name.clone(),
            image: component.image.clone(),
            command,
            env,
            ports: component.ports.clone(),
            mounts,
            network: self.network.name.clone(),
            address,
            health: Some(component.health.clone()),
            user: component.user.clone(),
            pid_container: component.share_pid_with.clone(),
            labels,
        })
    }
}

/// Outcome of a `start`.
#[derive(Debug)]
pub struct StartReport {
    /// The context the run was started with.
    pub context: RunContext,
    /// Final state of every component in the resolved set.
    pub states: BTreeMap<String, ComponentState>,
    /// Components in the order they were started.
    pub started: Vec<String>,
    /// Per-component failures, in the order they happened.
    pub failures: Vec<PlaygroundError>,
    /// Whether the caller cancelled the start.
    pub interrupted: bool,
}

impl StartReport {
    /// State of one component.
    pub fn state(&self, name: &str) -> Option<ComponentState> {
        self.states.get(name).copied()
    }

    /// Whether every component became healthy.
    pub fn is_success(&self) -> bool {
        !self.interrupted && self.states.values().all(|s| *s == ComponentState::Healthy)
    }
}

impl fmt::Display for StartReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<20} | {:<10}", "Component", "State")?;
        writeln!(f, "{:-<20}-+-{:-<10}", "", "")?;
        for (name, state) in &self.states {
            writeln!(f, "{name:<20} | {state:<10}")?;
        }
        for failure in &self.failures {
            writeln!(f, "error[{}]: {failure}", failure.kind())?;
        }
        if self.interrupted {
            writeln!(f, "start interrupted; started components were left running")?;
        }
        Ok(())
    }
}

/// Outcome of a `stop`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Containers a stop was issued to, in order.
    pub stopped: Vec<String>,
}

/// A playground bound to a data directory, a container runtime and a genesis tool.
#[derive(Debug)]
pub struct Playground<R, T> {
    config: PlaygroundConfig,
    runtime: Arc<R>,
    genesis: T,
    registry: Registry,
    network: NetworkSpec,
}

impl Playground<DockerRuntime, ContainerGenesisTool<DockerRuntime>> {
    /// A playground backed by the local Docker daemon.
    pub fn docker(config: PlaygroundConfig) -> Result<Self, PlaygroundError> {
        let runtime = Arc::new(DockerRuntime::connect()?);
        let genesis = ContainerGenesisTool::new(Arc::clone(&runtime), &config.images);
        Self::new(config, runtime, genesis)
    }
}

impl<R, T> Playground<R, T>
where
    R: ContainerRuntime,
    T: GenesisTool,
{
    /// A playground running the default component table for `config`.
    pub fn new(config: PlaygroundConfig, runtime: Arc<R>, genesis: T) -> Result<Self, PlaygroundError> {
        let registry = default_registry(&config)?;
        Ok(Self::with_registry(config, runtime, genesis, registry))
    }

    /// A playground running an explicit component set.
    pub fn with_registry(config: PlaygroundConfig, runtime: Arc<R>, genesis: T, registry: Registry) -> Self {
        Self { config, runtime, genesis, registry, network: NetworkSpec::playground() }
    }

    /// Replaces the network the playground provisions.
    pub fn with_network(mut self, network: NetworkSpec) -> Self {
        self.network = network;
        self
    }

    /// The configuration.
    pub const fn config(&self) -> &PlaygroundConfig {
        &self.config
    }

    /// The resolved component set.
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The container runtime.
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    fn addresses(&self) -> Result<BTreeMap<String, Ipv4Addr>, PlaygroundError> {
        self.registry
            .components()
            .iter()
            .map(|c| Ok((c.name.clone(), self.network.address(c.class, c.slot)?)))
            .collect()
    }

    fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Brings the playground up.
    ///
    /// Configuration, lock, network and genesis failures are fatal and returned as
    /// errors. Component failures are isolated to their dependency branch and
    /// reported in the [`StartReport`]. Cancelling `cancel` stops the walk and
    /// leaves started components running.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<StartReport, PlaygroundError> {
        self.config.validate()?;
        let lock = RunLock::acquire(self.data_dir())?;
        let data_dir = std::fs::canonicalize(self.data_dir())
            .map_err(|e| PlaygroundError::io(format!("resolve {}", self.data_dir().display()), e))?;
        let addresses = self.addresses()?;
        self.record_components(&data_dir)?;

        info!(phase = "network", network = %self.network.name, "provisioning network");
        let network = ensure_network(self.runtime.as_ref(), &self.network).await?;

        info!(phase = "genesis", "generating genesis");
        let genesis = generate_genesis(&self.genesis, &data_dir, &self.config.chain).await?;

        let context = RunContext { data_dir, builder: self.config.builder, network, genesis, addresses };
        let report = self.bring_up(context, cancel).await;
        // The lock stays until `stop` or `nuke`, including after an interrupted start.
        lock.keep();
        Ok(report)
    }

    async fn bring_up(&self, context: RunContext, cancel: &CancellationToken) -> StartReport {
        let mut report = StartReport {
            states: self.registry.names().map(|n| (n.to_string(), ComponentState::Pending)).collect(),
            context,
            started: Vec::new(),
            failures: Vec::new(),
            interrupted: false,
        };

        let images: BTreeSet<&str> = self.registry.components().iter().map(|c| c.image.as_str()).collect();
        for image in images {
            if let Err(e) = self.runtime.ensure_image(image).await {
                error!(image, error = %e, "failed to pull image");
                for component in self.registry.components().iter().filter(|c| c.image == image) {
                    report.states.insert(component.name.clone(), ComponentState::Unhealthy);
                    report.failures.push(PlaygroundError::ComponentStartFailed {
                        component: component.name.clone(),
                        reason: format!("image {image}: {e}"),
                    });
                }
            }
        }
        for (name, e) in self.remove_stale().await {
            error!(component = %name, error = %e, "failed to remove stale container");
            if let Some(state) = report.states.get_mut(&name).filter(|s| **s == ComponentState::Pending) {
                *state = ComponentState::Unhealthy;
                report.failures.push(PlaygroundError::ComponentStartFailed {
                    component: name,
                    reason: format!("remove stale container: {e}"),
                });
            }
        }

        for component in self.registry.startup_order() {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }
            let name = component.name.as_str();
            if report.states.get(name) != Some(&ComponentState::Pending) {
                continue;
            }
            if let Some(dep) = component
                .depends_on
                .iter()
                .find(|d| report.states.get(d.as_str()) != Some(&ComponentState::Healthy))
            {
                warn!(component = %name, dependency = %dep, "dependency not healthy, leaving pending");
                continue;
            }

            if component.await_genesis {
                let wait = Duration::from_secs(report.context.genesis.genesis_time.saturating_sub(unix_now()));
                if !wait.is_zero() {
                    info!(component = %name, secs = wait.as_secs(), "waiting for genesis");
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            report.interrupted = true;
                            break;
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }

            report.states.insert(name.to_string(), ComponentState::Starting);
            if let Err(e) = self.launch(&report.context, component).await {
                error!(component = %name, error = %e, "failed to start");
                report.states.insert(name.to_string(), ComponentState::Unhealthy);
                report.failures.push(e);
                continue;
            }
            report.started.push(name.to_string());

            let state = match wait_healthy(self.runtime.as_ref(), name, &component.health, cancel).await {
                HealthOutcome::Healthy => {
                    info!(component = %name, "component healthy");
                    ComponentState::Healthy
                }
                HealthOutcome::TimedOut => {
                    error!(component = %name, timeout = ?component.health.timeout, "health check timed out");
                    report.failures.push(PlaygroundError::ComponentUnhealthy {
                        component: name.to_string(),
                        timeout: component.health.timeout,
                    });
                    ComponentState::Unhealthy
                }
                HealthOutcome::Exited(status) => {
                    error!(component = %name, ?status, "container stopped before becoming healthy");
                    report.failures.push(PlaygroundError::ComponentStartFailed {
                        component: name.to_string(),
                        reason: format!("container is {status:?} before becoming healthy").to_lowercase(),
                    });
                    ComponentState::Unhealthy
                }
                HealthOutcome::Cancelled => {
                    report.interrupted = true;
                    break;
                }
            };
            report.states.insert(name.to_string(), state);
        }

        if report.interrupted {
            warn!(started = report.started.len(), "start interrupted");
        }
        report
    }

    async fn launch(&self, context: &RunContext, component: &ComponentSpec) -> Result<(), PlaygroundError> {
        let failed = |e: RuntimeError| PlaygroundError::ComponentStartFailed {
            component: component.name.clone(),
            reason: e.to_string(),
        };
        let spec = context.container_spec(component)?;
        debug!(component = %component.name, address = %spec.address, image = %spec.image, "creating container");
        self.runtime.create_container(&spec).await.map_err(failed)?;
        self.runtime.start_container(&component.name).await.map_err(failed)?;
        info!(component = %component.name, "container started");
        Ok(())
    }

    fn record_components(&self, data_dir: &Path) -> Result<(), PlaygroundError> {
        let path = data_dir.join(COMPONENTS_FILE);
        let names: Vec<&str> = self.registry.names().collect();
        let json = serde_json::to_string(&names)
            .map_err(|e| PlaygroundError::io(format!("encode {}", path.display()), e.into()))?;
        std::fs::write(&path, json).map_err(|e| PlaygroundError::io(format!("write {}", path.display()), e))
    }

    /// The component set of the last `start` in this data directory.
    ///
    /// Falls back to the configured set when no run was recorded. Components the
    /// run did not include are dropped, so `status`, `logs` and `stop` follow the
    /// flags the run was started with.
    fn run_registry(&self) -> Cow<'_, Registry> {
        let path = self.data_dir().join(COMPONENTS_FILE);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Cow::Borrowed(&self.registry);
        };
        let recorded: BTreeSet<String> = match serde_json::from_str(&content) {
            Ok(names) => names,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable component record");
                return Cow::Borrowed(&self.registry);
            }
        };
        let dropped: Vec<String> =
            self.registry.names().filter(|n| !recorded.contains(*n)).map(str::to_string).collect();
        if dropped.is_empty() {
            return Cow::Borrowed(&self.registry);
        }
        let mut registry = self.registry.clone();
        for name in &dropped {
            registry = match registry.without(name) {
                Ok(registry) => registry,
                Err(e) => {
                    warn!(component = %name, error = %e, "cannot narrow to recorded components");
                    return Cow::Borrowed(&self.registry);
                }
            };
        }
        debug!(?dropped, "narrowed to recorded components");
        Cow::Owned(registry)
    }

    /// Names of every container this playground may own: the run's set in
    /// shutdown order plus any labelled leftovers from earlier runs.
    async fn owned_containers(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.run_registry().shutdown_order().into_iter().map(|c| c.name.clone()).collect();
        match self.runtime.list_managed().await {
            Ok(leftovers) => {
                for leftover in leftovers {
                    if !names.contains(&leftover.name) {
                        names.push(leftover.name);
                    }
                }
            }
            Err(e) => warn!(error = %e, "failed to list labelled containers"),
        }
        names
    }

    /// Removes every owned container and returns the ones that could not be removed.
    async fn remove_stale(&self) -> Vec<(String, RuntimeError)> {
        let mut failed = Vec::new();
        for name in self.owned_containers().await {
            if let Err(e) = self.runtime.remove_container(&name).await {
                failed.push((name, e));
            }
        }
        failed
    }

    /// Issues a stop to every owned container, continuing past failures.
    async fn stop_all(&self) -> (StopReport, Option<PlaygroundError>) {
        let mut report = StopReport::default();
        let mut first_error = None;
        for name in self.owned_containers().await {
            match self.runtime.stop_container(&name).await {
                Ok(()) => {
                    debug!(component = %name, "stopped");
                    report.stopped.push(name);
                }
                Err(e) => {
                    error!(component = %name, error = %e, "failed to stop");
                    first_error.get_or_insert(PlaygroundError::Teardown { resource: name, source: e });
                }
            }
        }
        (report, first_error)
    }

    /// Stops every container in reverse startup order and releases the run lock.
    ///
    /// Containers that are missing or already stopped count as stopped. Data,
    /// artifacts and containers are kept. If any stop fails the lock is kept and
    /// the first failure is returned.
    pub async fn stop(&self) -> Result<StopReport, PlaygroundError> {
        let (report, first_error) = self.stop_all().await;
        if let Some(e) = first_error {
            return Err(e);
        }
        RunLock::release(self.data_dir())?;
        info!(stopped = report.stopped.len(), "playground stopped");
        Ok(report)
    }

    /// Stops the playground and removes its containers, network and data directory.
    ///
    /// With `artifacts_only`, only `<data>/artifacts` is removed after the stop.
    /// Runtime failures do not interrupt the teardown; the first one is returned
    /// once everything else has been attempted. Paths that could not be removed
    /// take precedence and are reported as [`PlaygroundError::CleanupFailed`].
    pub async fn nuke(&self, artifacts_only: bool) -> Result<(), PlaygroundError> {
        let (_, mut runtime_error) = self.stop_all().await;
        if let Err(e) = RunLock::release(self.data_dir()) {
            warn!(error = %e, "failed to release run lock");
        }

        let target = if artifacts_only {
            self.data_dir().join(ARTIFACTS_DIR)
        } else {
            for name in self.owned_containers().await {
                if let Err(e) = self.runtime.remove_container(&name).await {
                    error!(component = %name, error = %e, "failed to remove container");
                    runtime_error.get_or_insert(PlaygroundError::Teardown { resource: name, source: e });
                }
            }
            if let Err(e) = self.runtime.remove_network(&self.network.name).await {
                error!(network = %self.network.name, error = %e, "failed to remove network");
                runtime_error
                    .get_or_insert(PlaygroundError::Teardown { resource: self.network.name.clone(), source: e });
            }
            self.data_dir().to_path_buf()
        };

        let leftovers = remove_tree(&target);
        if !leftovers.is_empty() {
            return Err(PlaygroundError::CleanupFailed { paths: leftovers });
        }
        if let Some(e) = runtime_error {
            return Err(e);
        }
        info!(path = %target.display(), "playground removed");
        Ok(())
    }

    /// Derives the health of every component from the live containers.
    pub async fn status(&self) -> StatusReport {
        let mut report = StatusReport::default();
        let registry = self.run_registry();
        for component in registry.startup_order() {
            let (container, health) = match self.runtime.container_health(&component.name).await {
                Ok(h) => (h.status, HealthStatus::from_container(h)),
                Err(e) => {
                    warn!(component = %component.name, error = %e, "health query failed");
                    (crate::runtime::ContainerStatus::Unknown, HealthStatus::Unknown)
                }
            };
            report.components.push(ComponentStatus {
                name: component.name.clone(),
                image: component.image.clone(),
                container,
                health,
            });
        }
        report
    }

    /// Returns the last `tail` lines of a component's output.
    pub async fn logs(&self, component: &str, tail: usize) -> Result<String, PlaygroundError> {
        if !self.run_registry().contains(component) {
            return Err(PlaygroundError::UnknownComponent(component.to_string()));
        }
        Ok(self.runtime.container_logs(component, tail).await?)
    }

    /// Describes the resolved playground without touching the runtime.
    pub fn info(&self) -> Result<PlaygroundInfo, PlaygroundError> {
        let components = self
            .registry
            .startup_order()
            .into_iter()
            .map(|c| {
                Ok(ComponentInfo {
                    name: c.name.clone(),
                    image: c.image.clone(),
                    address: self.network.address(c.class, c.slot)?,
                    endpoints: c.ports.iter().map(|p| format!("http://localhost:{}", p.host)).collect(),
                    depends_on: c.depends_on.clone(),
                })
            })
            .collect::<Result<Vec<_>, PlaygroundError>>()?;
        let chain = &self.config.chain;
        Ok(PlaygroundInfo {
            data_dir: self.config.data_dir.clone(),
            chain_id: chain.chain_id,
            seconds_per_slot: chain.seconds_per_slot,
            validator_count: chain.validator_count,
            fork: chain.fork,
            builder: self.config.builder,
            network: format!("{} ({})", self.network.name, self.network.subnet),
            relay_url: format!("http://{RELAY_PUBKEY}@localhost:{}", self.config.ports.relay_http),
            components,
        })
    }
}

/// Removes `path` recursively and returns whatever could not be removed.
fn remove_tree(path: &Path) -> Vec<PathBuf> {
    match std::fs::symlink_metadata(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(_) => return vec![path.to_path_buf()],
        Ok(meta) if !meta.is_dir() => {
            return match std::fs::remove_file(path) {
                Ok(()) => Vec::new(),
                Err(_) => vec![path.to_path_buf()],
            };
        }
        Ok(_) => {}
    }
    if std::fs::remove_dir_all(path).is_ok() {
        return Vec::new();
    }

    let mut leftovers = Vec::new();
    match std::fs::read_dir(path) {
        Ok(entries) => {
            for entry in entries.filter_map(Result::ok) {
                leftovers.extend(remove_tree(&entry.path()));
            }
        }
        Err(_) => leftovers.push(path.to_path_buf()),
    }
    if leftovers.is_empty() && std::fs::remove_dir(path).is_err() {
        leftovers.push(path.to_path_buf());
    }
    leftovers
}
