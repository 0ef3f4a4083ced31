use std::time::Duration;

use async_trait::async_trait;

use super::start::StartTask;
use super::stop::StopTask;
use super::{Task, TaskError, TaskOutcome};
use crate::engine::Engine;
use crate::entities::Container;
use crate::output::OutputFormatter;

/// Stops then starts a container, honoring an optional delay between the
/// two steps and, when `only_if_changed` is set, skipping the restart
/// entirely if the image hasn't changed since the container was created.
pub struct RestartTask {
    pub start: StartTask,
    pub stop_start_delay: Duration,
    pub only_if_changed: bool,
}

#[async_trait]
impl Task for RestartTask {
    async fn run(
        &self,
        container: &Container,
        engine: &dyn Engine,
        output: &OutputFormatter,
    ) -> Result<TaskOutcome, TaskError> {
        if self.only_if_changed {
            let current = engine.inspect(&container.name).await?;
            let images = engine.images().await?;
            let image_unchanged = current
                .image_id
                .as_ref()
                .is_some_and(|id| images.iter().any(|tag| tag == id || tag == &container.image));
            if image_unchanged {
                output.commit("unchanged, skipped");
                return Ok(TaskOutcome::Done);
            }
        }

        StopTask.run(container, engine, output).await?;
        if self.stop_start_delay > Duration::ZERO {
            tokio::time::sleep(self.stop_start_delay).await;
        }
        self.start.run(container, engine, output).await
    }
}
