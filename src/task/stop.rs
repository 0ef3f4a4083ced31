use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{check_lifecycle, wait_for_status, Task, TaskError, TaskOutcome};
use crate::engine::{ContainerStatus, Engine};
use crate::entities::Container;
use crate::output::OutputFormatter;

/// Gracefully stops a container, gating on its `pre-stop` checks before
/// issuing the stop (fatal) and reporting its `stopped` checks afterward
/// (non-fatal). Failing to reach `Stopped` is itself reported but does not
/// abort the play: the container is logged and the task reports
/// `TaskOutcome::StopFailed` rather than `Err`, so dependents can still be
/// processed.
pub struct StopTask;

#[async_trait]
impl Task for StopTask {
    async fn run(
        &self,
        container: &Container,
        engine: &dyn Engine,
        output: &OutputFormatter,
    ) -> Result<TaskOutcome, TaskError> {
        let info = engine.inspect(&container.name).await?;
        if info.status == Some(ContainerStatus::Missing) || info.status == Some(ContainerStatus::Stopped)
        {
            output.commit("already stopped");
            return Ok(TaskOutcome::Done);
        }

        if !check_lifecycle(container, engine, "pre-stop").await {
            warn!("pre-stop checks failed for {}", container.name);
            return Err(TaskError::Orchestration(
                container.name.clone(),
                "pre-stop".to_string(),
            ));
        }

        output.pending("stopping container");
        engine
            .stop(&container.name, "SIGTERM", container.stop_timeout)
            .await?;

        let reached = wait_for_status(
            container,
            engine,
            ContainerStatus::Stopped,
            Duration::from_secs(container.stop_timeout as u64 + 5),
        )
        .await?;

        if reached {
            if !check_lifecycle(container, engine, "stopped").await {
                warn!("stopped checks failed for {}", container.name);
            }
            output.commit("stopped");
            Ok(TaskOutcome::Done)
        } else {
            let reason = format!("{} did not stop within its timeout", container.name);
            warn!("{}", reason);
            output.commit("stop failed");
            Ok(TaskOutcome::StopFailed(reason))
        }
    }
}
