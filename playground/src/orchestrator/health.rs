//! Bounded, cancellable health waits.

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::runtime::{ContainerRuntime, ContainerStatus, HealthCheck};

/// How a health wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HealthOutcome {
    /// The check passed.
    Healthy,
    /// The deadline passed without a passing check.
    TimedOut,
    /// The container stopped or disappeared while waiting.
    Exited(ContainerStatus),
    /// The caller cancelled the wait.
    Cancelled,
}

/// Polls `name` every `check.interval` until it is healthy, its timeout elapses,
/// it exits, or `cancel` fires.
///
/// Runtime errors while polling are treated as "not yet healthy".
pub(crate) async fn wait_healthy<R>(
    runtime: &R,
    name: &str,
    check: &HealthCheck,
    cancel: &CancellationToken,
) -> HealthOutcome
where
    R: ContainerRuntime + ?Sized,
{
    let deadline = Instant::now() + check.timeout;
    let mut ticker = tokio::time::interval(check.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return HealthOutcome::Cancelled,
            _ = ticker.tick() => {}
        }

        match runtime.container_health(name).await {
            Ok(health) if health.is_healthy() => {
                debug!(component = %name, "healthy");
                return HealthOutcome::Healthy;
            }
            Ok(health) if matches!(health.status, ContainerStatus::Exited | ContainerStatus::Missing) => {
                return HealthOutcome::Exited(health.status);
            }
            Ok(health) => trace!(component = %name, ?health, "not healthy yet"),
            Err(e) => warn!(component = %name, error = %e, "health query failed"),
        }

        if Instant::now() >= deadline {
            return HealthOutcome::TimedOut;
        }
    }
}
