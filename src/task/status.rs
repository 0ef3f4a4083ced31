use async_trait::async_trait;

use super::{Task, TaskError, TaskOutcome};
use crate::engine::Engine;
use crate::entities::Container;
use crate::output::OutputFormatter;

/// Reports basic container status (exists/running/stopped).
pub struct StatusTask;

#[async_trait]
impl Task for StatusTask {
    async fn run(
        &self,
        container: &Container,
        engine: &dyn Engine,
        output: &OutputFormatter,
    ) -> Result<TaskOutcome, TaskError> {
        let info = engine.inspect(&container.name).await?;
        output.commit(&format!("{:?}", info.status.unwrap_or(crate::engine::ContainerStatus::Missing)));
        Ok(TaskOutcome::Done)
    }
}

/// Reports status plus per-port reachability, used by `status -F`.
pub struct FullStatusTask;

#[async_trait]
impl Task for FullStatusTask {
    async fn run(
        &self,
        container: &Container,
        engine: &dyn Engine,
        output: &OutputFormatter,
    ) -> Result<TaskOutcome, TaskError> {
        let info = engine.inspect(&container.name).await?;
        let status = info.status.unwrap_or(crate::engine::ContainerStatus::Missing);

        let mut port_states = Vec::new();
        if status == crate::engine::ContainerStatus::Running {
            for port in &container.ports {
                let Some(host) = engine.host_address(&container.name).await.ok().flatten() else {
                    continue;
                };
                let addr = format!("{}:{}", host, port.exposed);
                let open = tokio::time::timeout(
                    std::time::Duration::from_millis(500),
                    tokio::net::TcpStream::connect(&addr),
                )
                .await
                .map(|r| r.is_ok())
                .unwrap_or(false);
                port_states.push(format!(
                    "{}={}",
                    port.name.clone().unwrap_or_else(|| port.exposed.to_string()),
                    if open { "up" } else { "down" }
                ));
            }
        }

        output.commit(&format!("{:?} [{}]", status, port_states.join(", ")));
        Ok(TaskOutcome::Done)
    }
}
