//! Per-container task state machines: the single unit of work the play
//! scheduler runs for each container.

mod clean;
mod login;
mod pull;
mod restart;
mod start;
mod status;
mod stop;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

pub use clean::CleanTask;
pub use login::{registry_host, LoginTask};
pub use pull::PullTask;
pub use restart::RestartTask;
pub use start::StartTask;
pub use status::{FullStatusTask, StatusTask};
pub use stop::StopTask;

use crate::engine::{ContainerStatus, Engine, EngineError};
use crate::entities::Container;
use crate::output::OutputFormatter;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("container {0} failed to reach the {1} state")]
    Orchestration(String, String),
    #[error("container {0} stop failed: {1}")]
    StopFailure(String, String),
}

/// The outcome of a non-fatal stop attempt; a container that never reaches
/// `Stopped` is logged and treated as a scheduling success (§4.5 StopTask
/// step 4), matching the upstream's tolerant shutdown behavior.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Done,
    StopFailed(String),
}

#[async_trait]
pub trait Task: Send + Sync {
    async fn run(
        &self,
        container: &Container,
        engine: &dyn Engine,
        output: &OutputFormatter,
    ) -> Result<TaskOutcome, TaskError>;
}

/// Poll `inspect` until the container reaches `target`, or time out.
pub(crate) async fn wait_for_status(
    container: &Container,
    engine: &dyn Engine,
    target: ContainerStatus,
    timeout: Duration,
) -> Result<bool, TaskError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let info = engine.inspect(&container.name).await?;
        if info.status == Some(target) {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            debug!(
                "container {} did not reach {:?} within {:?}",
                container.name, target, timeout
            );
            return Ok(false);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// The status a container must stay in while `phase`'s checks run; a
/// phase with no applicable running state (the container isn't up yet,
/// as with `pre-start`/`pre-stop`) has no such predicate.
fn down_predicate(phase: &str) -> Option<ContainerStatus> {
    match phase {
        "running" => Some(ContainerStatus::Running),
        "stopped" => Some(ContainerStatus::Stopped),
        _ => None,
    }
}

/// Run every configured lifecycle check for `phase` concurrently with each
/// other, returning true only if all of them pass. While the checks are
/// in flight, also polls the container's status every 500ms; if `phase`
/// has an expected status and the container falls out of it, the gate
/// fails immediately instead of waiting out each check's own retry
/// budget.
pub(crate) async fn check_lifecycle(
    container: &Container,
    engine: &dyn Engine,
    phase: &str,
) -> bool {
    let Some(checks) = container.lifecycle.get(phase) else {
        return true;
    };

    let port_lookup = |name: &str| {
        container
            .ports
            .iter()
            .find(|p| p.name.as_deref() == Some(name))
            .map(|p| p.exposed)
    };

    let mut built = Vec::with_capacity(checks.len());
    for check_config in checks {
        match crate::lifecycle::LifecycleCheckFactory::build(check_config, &port_lookup) {
            Ok(c) => built.push(c),
            Err(_) => return false,
        }
    }

    let expected_status = down_predicate(phase);
    let checks_future = futures_util::future::join_all(built.iter().map(|c| c.test(container, engine)));
    tokio::pin!(checks_future);

    loop {
        tokio::select! {
            biased;
            results = &mut checks_future => return results.into_iter().all(|ok| ok),
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                let Some(expected) = expected_status else { continue };
                let status = engine.inspect(&container.name).await.ok().and_then(|i| i.status);
                if status != Some(expected) {
                    return false;
                }
            }
        }
    }
}
