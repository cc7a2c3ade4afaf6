//! Read-only projections of the live container set.

use std::fmt;

use crate::runtime::{ContainerHealth, ContainerStatus, ProbeStatus};

/// Health of a component, derived from its container on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    /// No container exists for the component.
    Pending,
    /// Created or running, probe not yet passed.
    Starting,
    /// Running and the probe (if any) passes.
    Healthy,
    /// Running but the probe is failing.
    Unhealthy,
    /// The container has exited.
    Stopped,
    /// The runtime could not tell.
    Unknown,
}

impl HealthStatus {
    /// Derives the status from a container health snapshot.
    pub const fn from_container(health: ContainerHealth) -> Self {
        match (health.status, health.probe) {
            (ContainerStatus::Running, ProbeStatus::Passing | ProbeStatus::NotConfigured) => {
                Self::Healthy
            }
            (ContainerStatus::Running, ProbeStatus::Failing) => Self::Unhealthy,
            (ContainerStatus::Running, ProbeStatus::Pending) | (ContainerStatus::Created, _) => {
                Self::Starting
            }
            (ContainerStatus::Exited, _) => Self::Stopped,
            (ContainerStatus::Missing, _) => Self::Pending,
            (ContainerStatus::Unknown, _) => Self::Unknown,
        }
    }

    /// Lowercase name as shown by the CLI.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn container_status_str(status: ContainerStatus) -> &'static str {
    match status {
        ContainerStatus::Created => "created",
        ContainerStatus::Running => "running",
        ContainerStatus::Exited => "exited",
        ContainerStatus::Missing => "missing",
        ContainerStatus::Unknown => "unknown",
    }
}

/// One row of a [`StatusReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentStatus {
    /// Component name.
    pub name: String,
    /// Image the component is declared with.
    pub image: String,
    /// Container lifecycle state.
    pub container: ContainerStatus,
    /// Derived health.
    pub health: HealthStatus,
}

/// Status of every component in the resolved set, in startup order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Rows in startup order.
    pub components: Vec<ComponentStatus>,
}

impl StatusReport {
    /// Looks up a component's health.
    pub fn health_of(&self, name: &str) -> Option<HealthStatus> {
        self.components.iter().find(|c| c.name == name).map(|c| c.health)
    }

    /// Whether every component is healthy.
    pub fn all_healthy(&self) -> bool {
        self.components.iter().all(|c| c.health == HealthStatus::Healthy)
    }

    /// Whether no container exists for any component.
    pub fn is_down(&self) -> bool {
        self.components.iter().all(|c| c.container == ContainerStatus::Missing)
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<20} | {:<10} | {:<10}", "Component", "Container", "Health")?;
        writeln!(f, "{:-<20}-+-{:-<10}-+-{:-<10}", "", "", "")?;
        for c in &self.components {
            writeln!(
                f,
                "{:<20} | {:<10} | {:<10}",
                c.name,
                container_status_str(c.container),
                c.health.as_str()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ContainerStatus::Running, ProbeStatus::Passing, HealthStatus::Healthy)]
    #[case(ContainerStatus::Running, ProbeStatus::NotConfigured, HealthStatus::Healthy)]
    #[case(ContainerStatus::Running, ProbeStatus::Pending, HealthStatus::Starting)]
    #[case(ContainerStatus::Running, ProbeStatus::Failing, HealthStatus::Unhealthy)]
    #[case(ContainerStatus::Created, ProbeStatus::NotConfigured, HealthStatus::Starting)]
    #[case(ContainerStatus::Exited, ProbeStatus::Failing, HealthStatus::Stopped)]
    #[case(ContainerStatus::Missing, ProbeStatus::NotConfigured, HealthStatus::Pending)]
    #[case(ContainerStatus::Unknown, ProbeStatus::Pending, HealthStatus::Unknown)]
    fn test_health_derivation(
        #[case] status: ContainerStatus,
        #[case] probe: ProbeStatus,
        #[case] expected: HealthStatus,
    ) {
        assert_eq!(HealthStatus::from_container(ContainerHealth { status, probe }), expected);
    }

    #[test]
    fn test_table_rows() {
        let report = StatusReport {
            components: vec![
                ComponentStatus {
                    name: "relay".into(),
                    image: "example/relay".into(),
                    container: ContainerStatus::Running,
                    health: HealthStatus::Unhealthy,
                },
                ComponentStatus {
                    name: "builder".into(),
                    image: "example/builder".into(),
                    container: ContainerStatus::Missing,
                    health: HealthStatus::Pending,
                },
            ],
        };
        let table = report.to_string();
        assert!(table.lines().nth(2).unwrap().contains("unhealthy"));
        assert!(table.lines().nth(3).unwrap().contains("pending"));
        assert!(!report.all_healthy());
        assert_eq!(report.health_of("builder"), Some(HealthStatus::Pending));
    }
}
