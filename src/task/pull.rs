use async_trait::async_trait;

use super::{Task, TaskError, TaskOutcome};
use crate::engine::{Engine, RegistryAuth};
use crate::entities::Container;
use crate::output::OutputFormatter;

pub struct PullTask {
    pub registry_auth: Option<RegistryAuth>,
}

#[async_trait]
impl Task for PullTask {
    async fn run(
        &self,
        container: &Container,
        engine: &dyn Engine,
        output: &OutputFormatter,
    ) -> Result<TaskOutcome, TaskError> {
        output.pending("pulling");
        engine
            .pull(&container.image, self.registry_auth.as_ref())
            .await?;
        output.commit("pulled");
        Ok(TaskOutcome::Done)
    }
}
