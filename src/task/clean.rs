use async_trait::async_trait;

use super::{Task, TaskError, TaskOutcome};
use crate::engine::{ContainerStatus, Engine};
use crate::entities::Container;
use crate::output::OutputFormatter;

/// Removes a stopped container; a no-op if it's running or already gone.
pub struct CleanTask;

#[async_trait]
impl Task for CleanTask {
    async fn run(
        &self,
        container: &Container,
        engine: &dyn Engine,
        output: &OutputFormatter,
    ) -> Result<TaskOutcome, TaskError> {
        let info = engine.inspect(&container.name).await?;
        match info.status {
            None | Some(ContainerStatus::Missing) => {
                output.commit("nothing to clean");
            }
            Some(ContainerStatus::Running) | Some(ContainerStatus::Paused) => {
                output.commit("still running, skipped");
            }
            Some(ContainerStatus::Created) | Some(ContainerStatus::Stopped) => {
                output.pending("removing container");
                engine.remove(&container.name).await?;
                output.commit("removed");
            }
        }
        Ok(TaskOutcome::Done)
    }
}
