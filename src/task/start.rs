use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{check_lifecycle, wait_for_status, Task, TaskError, TaskOutcome};
use crate::engine::{ContainerStatus, CreateSpec, Engine, RegistryAuth};
use crate::entities::Container;
use crate::output::OutputFormatter;

/// Creates (if missing) and starts a container, gating on its `pre-start`
/// checks before creation (fatal) and its `running` checks after start
/// reaches a running status (fatal) before reporting success.
pub struct StartTask {
    /// Reuse an existing container instead of recreating it, unless none
    /// exists yet, in which case create always runs regardless (§9 Open
    /// Question c).
    pub reuse: bool,
    pub refresh_image: bool,
    pub registry_auth: Option<RegistryAuth>,
}

fn to_create_spec(container: &Container) -> CreateSpec {
    let exposed_ports = container
        .ports
        .iter()
        .map(|p| (p.exposed, p.protocol.clone()))
        .collect();
    let port_bindings = container
        .ports
        .iter()
        .map(|p| (p.exposed, p.protocol.clone(), p.external))
        .collect();
    let binds = container
        .volumes
        .iter()
        .map(|v| {
            if v.read_only {
                format!("{}:{}:ro", v.source, v.target)
            } else {
                format!("{}:{}", v.source, v.target)
            }
        })
        .collect();
    let env = container
        .env
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    CreateSpec {
        name: container.name.clone(),
        image: container.image.clone(),
        command: container.command.clone(),
        env,
        exposed_ports,
        port_bindings,
        binds,
        volumes_from: container.volumes_from.clone(),
        links: container.links.clone(),
        privileged: container.privileged,
        extra_hosts: container.extra_hosts.clone(),
        network_mode: container.network_mode.clone(),
        restart_policy: container
            .restart_policy
            .as_ref()
            .map(|p| (p.name.clone(), p.max_retries)),
        dns: container.dns.clone(),
        memory: container.limits.memory,
        memory_swap: container.limits.memory_swap,
        cpu_shares: container.limits.cpu_shares,
    }
}

#[async_trait]
impl Task for StartTask {
    async fn run(
        &self,
        container: &Container,
        engine: &dyn Engine,
        output: &OutputFormatter,
    ) -> Result<TaskOutcome, TaskError> {
        let info = engine.inspect(&container.name).await?;

        if info.status == Some(ContainerStatus::Running) {
            output.pending("already running");
            return Ok(TaskOutcome::Done);
        }

        if !check_lifecycle(container, engine, "pre-start").await {
            warn!("pre-start checks failed for {}", container.name);
            return Err(TaskError::Orchestration(
                container.name.clone(),
                "pre-start".to_string(),
            ));
        }

        if self.refresh_image || info.status == Some(ContainerStatus::Missing) {
            output.pending("pulling image");
            engine
                .pull(&container.image, self.registry_auth.as_ref())
                .await?;
        }

        let exists = info.status != Some(ContainerStatus::Missing);
        // Reuse only applies when a container already exists; a missing
        // container is always created regardless of the reuse flag.
        if !exists || !self.reuse {
            if exists {
                engine.remove(&container.name).await?;
            }
            output.pending("creating container");
            engine.create(&to_create_spec(container)).await?;
        }

        output.pending("starting container");
        engine.start(&container.name).await?;

        let reached = wait_for_status(
            container,
            engine,
            ContainerStatus::Running,
            Duration::from_secs(30),
        )
        .await?;
        if !reached {
            return Err(TaskError::Orchestration(
                container.name.clone(),
                "running".to_string(),
            ));
        }

        output.pending("waiting for lifecycle checks");
        if !check_lifecycle(container, engine, "running").await {
            warn!("lifecycle checks failed for {}", container.name);
            return Err(TaskError::Orchestration(
                container.name.clone(),
                "healthy".to_string(),
            ));
        }

        info!("started {}", container.name);
        output.commit("started");
        Ok(TaskOutcome::Done)
    }
}
