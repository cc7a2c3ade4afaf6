//! Error types surfaced by playground operations.

use std::{fmt, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::{genesis::GenesisError, registry::RegistryError, runtime::RuntimeError};

/// The lifecycle phase an error originated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Configuration loading and validation.
    Config,
    /// Shared network provisioning.
    Network,
    /// Chain genesis and key material generation.
    Genesis,
    /// Launching or health-checking a single component.
    Component(String),
    /// Run-lock acquisition.
    Lock,
    /// Stop or nuke teardown.
    Cleanup,
    /// A container runtime call outside the phases above.
    Runtime,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => f.write_str("config"),
            Self::Network => f.write_str("network"),
            Self::Genesis => f.write_str("genesis"),
            Self::Component(name) => write!(f, "component:{name}"),
            Self::Lock => f.write_str("lock"),
            Self::Cleanup => f.write_str("cleanup"),
            Self::Runtime => f.write_str("runtime"),
        }
    }
}

/// Errors returned by the playground facade.
#[derive(Debug, Error)]
pub enum PlaygroundError {
    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A network with the playground's name exists with a different subnet.
    #[error(
        "network `{name}` already exists with subnet(s) [{existing}], expected {expected}; run `nuke` to reset it"
    )]
    NetworkConflict {
        /// Network name.
        name: String,
        /// Subnets configured on the existing network.
        existing: String,
        /// Subnet the playground requires.
        expected: String,
    },

    /// The container runtime failed while provisioning the network.
    #[error("network provisioning failed: {0}")]
    Network(#[source] RuntimeError),

    /// Genesis or key material could not be produced.
    #[error("genesis generation failed: {0}")]
    GenerationFailed(#[from] GenesisError),

    /// A component could not be created or started.
    #[error("component `{component}` failed to start: {reason}")]
    ComponentStartFailed {
        /// Component name.
        component: String,
        /// Diagnostic from the runtime or renderer.
        reason: String,
    },

    /// A component never passed its health check.
    #[error("component `{component}` did not become healthy within {timeout:?}")]
    ComponentUnhealthy {
        /// Component name.
        component: String,
        /// The health-check timeout that elapsed.
        timeout: Duration,
    },

    /// Another run already holds the run lock for this data directory.
    #[error(
        "playground already running: lock held at {}; run `stop` or `nuke` to release it",
        .0.display()
    )]
    AlreadyRunning(PathBuf),

    /// The named component is not part of the resolved set.
    #[error("unknown component `{0}`")]
    UnknownComponent(String),

    /// Teardown left resources behind.
    #[error("cleanup failed, could not remove: {}", display_paths(.paths))]
    CleanupFailed {
        /// Resources that could not be removed.
        paths: Vec<PathBuf>,
    },

    /// The container runtime failed to stop or remove a resource during teardown.
    #[error("teardown of `{resource}` failed: {source}")]
    Teardown {
        /// Container or network name.
        resource: String,
        /// The runtime failure.
        #[source]
        source: RuntimeError,
    },

    /// A container runtime call failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// A filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl From<RegistryError> for PlaygroundError {
    fn from(err: RegistryError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
}

impl PlaygroundError {
    /// Builds an [`PlaygroundError::Io`] with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }

    /// Returns the lifecycle phase this error belongs to.
    pub fn phase(&self) -> Phase {
        match self {
            Self::InvalidConfig(_) => Phase::Config,
            Self::NetworkConflict { .. } | Self::Network(_) => Phase::Network,
            Self::GenerationFailed(_) => Phase::Genesis,
            Self::ComponentStartFailed { component, .. }
            | Self::ComponentUnhealthy { component, .. } => Phase::Component(component.clone()),
            Self::AlreadyRunning(_) => Phase::Lock,
            Self::UnknownComponent(_) => Phase::Config,
            Self::CleanupFailed { .. } | Self::Teardown { .. } => Phase::Cleanup,
            Self::Runtime(_) | Self::Io { .. } => Phase::Runtime,
        }
    }

    /// Returns a stable, machine-readable kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid-config",
            Self::NetworkConflict { .. } => "network-conflict",
            Self::Network(_) => "network",
            Self::GenerationFailed(_) => "generation-failed",
            Self::ComponentStartFailed { .. } => "component-start-failed",
            Self::ComponentUnhealthy { .. } => "component-unhealthy",
            Self::AlreadyRunning(_) => "already-running",
            Self::UnknownComponent(_) => "unknown-component",
            Self::CleanupFailed { .. } => "cleanup-failed",
            Self::Teardown { .. } => "teardown",
            Self::Runtime(_) => "runtime",
            Self::Io { .. } => "io",
        }
    }

    /// Process exit code used by the CLI for this error.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidConfig(_) => 2,
            Self::NetworkConflict { .. } => 3,
            Self::GenerationFailed(_) => 4,
            Self::ComponentStartFailed { .. } | Self::ComponentUnhealthy { .. } => 5,
            Self::AlreadyRunning(_) => 6,
            Self::UnknownComponent(_) => 7,
            Self::CleanupFailed { .. } => 8,
            Self::Network(_) | Self::Teardown { .. } | Self::Runtime(_) | Self::Io { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(PlaygroundError::InvalidConfig("x".into()), 2, "invalid-config")]
    #[case(
        PlaygroundError::NetworkConflict { name: "n".into(), existing: "a".into(), expected: "b".into() },
        3,
        "network-conflict"
    )]
    #[case(PlaygroundError::AlreadyRunning(PathBuf::from("/tmp/lock")), 6, "already-running")]
    #[case(PlaygroundError::UnknownComponent("ghost".into()), 7, "unknown-component")]
    #[case(PlaygroundError::CleanupFailed { paths: vec![] }, 8, "cleanup-failed")]
    #[case(PlaygroundError::Network(RuntimeError::Backend("refused".into())), 1, "network")]
    fn test_exit_codes(#[case] err: PlaygroundError, #[case] code: i32, #[case] kind: &str) {
        assert_eq!(err.exit_code(), code);
        assert_eq!(err.kind(), kind);
    }

    #[test]
    fn test_component_phase_carries_name() {
        let err = PlaygroundError::ComponentUnhealthy {
            component: "relay".into(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(err.phase(), Phase::Component("relay".into()));
        assert_eq!(err.phase().to_string(), "component:relay");
    }

    #[rstest]
    #[case(PlaygroundError::Network(RuntimeError::Backend("refused".into())), Phase::Network)]
    #[case(
        PlaygroundError::Teardown { resource: "relay".into(), source: RuntimeError::Backend("busy".into()) },
        Phase::Cleanup
    )]
    #[case(PlaygroundError::Runtime(RuntimeError::NotFound("x".into())), Phase::Runtime)]
    fn test_runtime_failures_carry_phase(#[case] err: PlaygroundError, #[case] phase: Phase) {
        assert_eq!(err.phase(), phase);
    }

    #[test]
    fn test_cleanup_lists_paths() {
        let err = PlaygroundError::CleanupFailed {
            paths: vec![PathBuf::from("/a"), PathBuf::from("/b")],
        };
        assert_eq!(err.to_string(), "cleanup failed, could not remove: /a, /b");
    }
}
