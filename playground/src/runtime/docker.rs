//! [`ContainerRuntime`] backed by the local Docker daemon.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use bollard::{
    Docker,
    container::LogOutput,
    errors::Error as DockerError,
    models::{
        ContainerCreateBody, ContainerStateStatusEnum, EndpointIpamConfig, EndpointSettings,
        HealthConfig, HealthStatusEnum, HostConfig, Ipam, IpamConfig, NetworkCreateRequest,
        NetworkingConfig, PortBinding,
    },
    query_parameters::{
        CreateContainerOptionsBuilder, CreateImageOptionsBuilder, InspectContainerOptions,
        InspectNetworkOptions, ListContainersOptionsBuilder, LogsOptionsBuilder,
        RemoveContainerOptionsBuilder, StartContainerOptions, StopContainerOptionsBuilder,
        WaitContainerOptions,
    },
};
use futures_util::{StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use super::{
    COMPONENT_LABEL, ContainerHealth, ContainerRuntime, ContainerSpec, ContainerStatus,
    ContainerSummary, HealthCheck, JobOutput, JobSpec, MANAGED_LABEL, NetworkInfo, Probe,
    ProbeStatus, RuntimeError,
};
use crate::unique_name;

/// Seconds Docker waits for a graceful stop before killing.
const STOP_TIMEOUT_SECS: i32 = 10;
/// Lines of job output kept in a failure diagnostic.
const JOB_OUTPUT_TAIL: usize = 40;

/// Talks to Docker over the local socket.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects using the platform's default socket and `DOCKER_HOST`.
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Backend(format!("cannot connect to docker: {e}")))?;
        Ok(Self { docker })
    }

    async fn collect_logs(&self, name: &str, tail: Option<usize>) -> Result<String, RuntimeError> {
        let mut options = LogsOptionsBuilder::default().stdout(true).stderr(true);
        if let Some(tail) = tail {
            options = options.tail(&tail.to_string());
        }
        let chunks: Vec<LogOutput> = self
            .docker
            .logs(name, Some(options.build()))
            .try_collect()
            .await
            .map_err(|e| classify(e, name))?;
        Ok(chunks.iter().map(ToString::to_string).collect())
    }
}

fn status_code(err: &DockerError) -> Option<u16> {
    match err {
        DockerError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

fn classify(err: DockerError, subject: &str) -> RuntimeError {
    if status_code(&err) == Some(404) {
        RuntimeError::NotFound(subject.to_string())
    } else {
        RuntimeError::Backend(err.to_string())
    }
}

fn nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

fn health_config(check: &HealthCheck) -> HealthConfig {
    let test = check.docker_test();
    if check.probe == Probe::Running {
        return HealthConfig { test: Some(test), ..Default::default() };
    }
    // Docker marks a container unhealthy after `retries` consecutive failures; the
    // orchestrator enforces the overall timeout itself.
    let retries = (check.timeout.as_secs() / check.interval.as_secs().max(1)).max(1);
    HealthConfig {
        test: Some(test),
        interval: Some(nanos(check.interval)),
        timeout: Some(nanos(check.interval.max(Duration::from_secs(1)))),
        retries: Some(i64::try_from(retries).unwrap_or(i64::MAX)),
        start_period: Some(nanos(check.start_period)),
        ..Default::default()
    }
}

fn container_body(spec: &ContainerSpec) -> ContainerCreateBody {
    let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
        .ports
        .iter()
        .map(|port| {
            (
                format!("{}/tcp", port.container),
                Some(vec![PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some(port.host.to_string()),
                }]),
            )
        })
        .collect();

    let host_config = HostConfig {
        binds: Some(spec.mounts.iter().map(|m| m.to_bind()).collect()),
        port_bindings: Some(port_bindings),
        network_mode: Some(spec.network.clone()),
        pid_mode: spec.pid_container.as_ref().map(|c| format!("container:{c}")),
        ..Default::default()
    };

    let endpoint = EndpointSettings {
        ipam_config: Some(EndpointIpamConfig {
            ipv4_address: Some(spec.address.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };

    ContainerCreateBody {
        image: Some(spec.image.clone()),
        cmd: (!spec.command.is_empty()).then(|| spec.command.clone()),
        env: Some(spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect()),
        labels: Some(spec.labels.clone().into_iter().collect()),
        user: spec.user.clone(),
        healthcheck: spec.health.as_ref().map(health_config),
        host_config: Some(host_config),
        networking_config: Some(NetworkingConfig {
            endpoints_config: Some(HashMap::from([(spec.network.clone(), endpoint)])),
        }),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn inspect_network(&self, name: &str) -> Result<Option<NetworkInfo>, RuntimeError> {
        match self.docker.inspect_network(name, None::<InspectNetworkOptions>).await {
            Ok(network) => {
                let subnets = network
                    .ipam
                    .and_then(|ipam| ipam.config)
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|config| config.subnet)
                    .collect();
                Ok(Some(NetworkInfo {
                    id: network.id.unwrap_or_default(),
                    name: network.name.unwrap_or_else(|| name.to_string()),
                    subnets,
                }))
            }
            Err(e) if status_code(&e) == Some(404) => Ok(None),
            Err(e) => Err(classify(e, name)),
        }
    }

    async fn create_network(&self, name: &str, subnet: &str) -> Result<String, RuntimeError> {
        let request = NetworkCreateRequest {
            name: name.to_string(),
            driver: Some("bridge".to_string()),
            ipam: Some(Ipam {
                config: Some(vec![IpamConfig {
                    subnet: Some(subnet.to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            labels: Some(HashMap::from([(MANAGED_LABEL.to_string(), "true".to_string())])),
            ..Default::default()
        };
        let response =
            self.docker.create_network(request).await.map_err(|e| classify(e, name))?;
        info!(network = name, subnet, id = %response.id, "created network");
        Ok(response.id)
    }

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        match self.docker.remove_network(name).await {
            Ok(()) => Ok(()),
            Err(e) if status_code(&e) == Some(404) => Ok(()),
            Err(e) => Err(classify(e, name)),
        }
    }

    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => return Ok(()),
            Err(e) if status_code(&e) == Some(404) => {}
            Err(e) => return Err(classify(e, image)),
        }
        info!(image, "pulling image");
        let options = CreateImageOptionsBuilder::default().from_image(image).build();
        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(update) = progress.next().await {
            let update = update.map_err(|e| classify(e, image))?;
            if let Some(status) = update.status {
                debug!(image, %status, "pull progress");
            }
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<(), RuntimeError> {
        let options = CreateContainerOptionsBuilder::default().name(&spec.name).build();
        let response = self
            .docker
            .create_container(Some(options), container_body(spec))
            .await
            .map_err(|e| classify(e, &spec.image))?;
        for warning in response.warnings {
            warn!(container = %spec.name, %warning, "docker warning on create");
        }
        Ok(())
    }

    async fn start_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(name, None::<StartContainerOptions>)
            .await
            .map_err(|e| classify(e, name))
    }

    async fn stop_container(&self, name: &str) -> Result<(), RuntimeError> {
        let options = StopContainerOptionsBuilder::default().t(STOP_TIMEOUT_SECS).build();
        match self.docker.stop_container(name, Some(options)).await {
            Ok(()) => Ok(()),
            // 304: already stopped.
            Err(e) if matches!(status_code(&e), Some(304 | 404)) => Ok(()),
            Err(e) => Err(classify(e, name)),
        }
    }

    async fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptionsBuilder::default().force(true).v(true).build();
        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if status_code(&e) == Some(404) => Ok(()),
            Err(e) => Err(classify(e, name)),
        }
    }

    async fn container_health(&self, name: &str) -> Result<ContainerHealth, RuntimeError> {
        let inspect = match self.docker.inspect_container(name, None::<InspectContainerOptions>).await
        {
            Ok(inspect) => inspect,
            Err(e) if status_code(&e) == Some(404) => return Ok(ContainerHealth::MISSING),
            Err(e) => return Err(classify(e, name)),
        };
        let Some(state) = inspect.state else {
            return Ok(ContainerHealth {
                status: ContainerStatus::Unknown,
                probe: ProbeStatus::NotConfigured,
            });
        };
        let status = match state.status {
            Some(ContainerStateStatusEnum::RUNNING) => ContainerStatus::Running,
            Some(ContainerStateStatusEnum::CREATED) => ContainerStatus::Created,
            Some(ContainerStateStatusEnum::EXITED | ContainerStateStatusEnum::DEAD) => {
                ContainerStatus::Exited
            }
            _ => ContainerStatus::Unknown,
        };
        let probe = match state.health.and_then(|h| h.status) {
            Some(HealthStatusEnum::HEALTHY) => ProbeStatus::Passing,
            Some(HealthStatusEnum::UNHEALTHY) => ProbeStatus::Failing,
            Some(HealthStatusEnum::STARTING) => ProbeStatus::Pending,
            _ => ProbeStatus::NotConfigured,
        };
        Ok(ContainerHealth { status, probe })
    }

    async fn container_logs(&self, name: &str, tail: usize) -> Result<String, RuntimeError> {
        self.collect_logs(name, Some(tail)).await
    }

    async fn list_managed(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let options = ListContainersOptionsBuilder::default().all(true).build();
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| RuntimeError::Backend(e.to_string()))?;
        Ok(containers
            .into_iter()
            .filter_map(|container| {
                let labels = container.labels.unwrap_or_default();
                if labels.get(MANAGED_LABEL).map(String::as_str) != Some("true") {
                    return None;
                }
                let name = container
                    .names
                    .and_then(|names| names.into_iter().next())?
                    .trim_start_matches('/')
                    .to_string();
                Some(ContainerSummary { name, component: labels.get(COMPONENT_LABEL).cloned() })
            })
            .collect())
    }

    async fn run_job(&self, job: &JobSpec) -> Result<JobOutput, RuntimeError> {
        self.ensure_image(&job.image).await?;
        let name = unique_name(&job.name);
        let body = ContainerCreateBody {
            image: Some(job.image.clone()),
            entrypoint: job.entrypoint.clone(),
            cmd: Some(job.command.clone()),
            env: Some(job.env.iter().map(|(k, v)| format!("{k}={v}")).collect()),
            labels: Some(HashMap::from([(MANAGED_LABEL.to_string(), "job".to_string())])),
            user: job.user.clone(),
            host_config: Some(HostConfig {
                binds: Some(job.mounts.iter().map(|m| m.to_bind()).collect()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = CreateContainerOptionsBuilder::default().name(&name).build();
        self.docker
            .create_container(Some(options), body)
            .await
            .map_err(|e| classify(e, &job.image))?;
        debug!(job = %name, image = %job.image, "running job");

        let outcome = async {
            self.start_container(&name).await?;
            let mut wait = self.docker.wait_container(&name, None::<WaitContainerOptions>);
            let mut code = 0;
            while let Some(result) = wait.next().await {
                match result {
                    Ok(response) => code = response.status_code,
                    Err(DockerError::DockerContainerWaitError { code: exit, .. }) => code = exit,
                    Err(e) => return Err(classify(e, &name)),
                }
            }
            let output = self.collect_logs(&name, None).await?;
            Ok((code, output))
        }
        .await;

        if let Err(e) = self.remove_container(&name).await {
            warn!(job = %name, error = %e, "failed to remove job container");
        }

        let (code, output) = outcome?;
        if code != 0 {
            let tail = output.lines().rev().take(JOB_OUTPUT_TAIL).collect::<Vec<_>>();
            let tail = tail.into_iter().rev().collect::<Vec<_>>().join("\n");
            return Err(RuntimeError::JobFailed { name: job.name.clone(), code, output: tail });
        }
        Ok(JobOutput { output })
    }
}
