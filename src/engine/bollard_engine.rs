//! `bollard`-backed implementation of [`Engine`], one instance per
//! [`crate::entities::Ship`].

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::{HostConfig, PortBinding, PortMap, RestartPolicy as BollardRestartPolicy};
use bollard::Docker;
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use super::{ContainerInfo, ContainerStatus, CreateSpec, Engine, EngineError, EngineResult, RegistryAuth};

pub struct BollardEngine {
    docker: Docker,
}

impl BollardEngine {
    pub fn connect(address: &str, api_version: Option<&str>) -> EngineResult<Self> {
        let docker = match api_version {
            Some(_) => Docker::connect_with_http_defaults()?,
            None => Docker::connect_with_http(address, 30, bollard::API_DEFAULT_VERSION)?,
        };
        Ok(Self { docker })
    }

    fn auth_config(auth: &RegistryAuth) -> bollard::auth::DockerCredentials {
        bollard::auth::DockerCredentials {
            username: auth.username.clone(),
            password: auth.password.clone(),
            email: auth.email.clone(),
            serveraddress: auth.server_address.clone(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Engine for BollardEngine {
    async fn inspect(&self, name: &str) -> EngineResult<ContainerInfo> {
        match self.docker.inspect_container(name, None).await {
            Ok(inspect) => {
                let running = inspect
                    .state
                    .as_ref()
                    .and_then(|s| s.running)
                    .unwrap_or(false);
                let paused = inspect.state.as_ref().and_then(|s| s.paused).unwrap_or(false);
                let status = if paused {
                    ContainerStatus::Paused
                } else if running {
                    ContainerStatus::Running
                } else {
                    ContainerStatus::Stopped
                };
                Ok(ContainerInfo {
                    status: Some(status),
                    image_id: inspect.image,
                })
            }
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
                Ok(ContainerInfo {
                    status: Some(ContainerStatus::Missing),
                    image_id: None,
                })
            }
            Err(e) => Err(EngineError::Docker(e)),
        }
    }

    async fn images(&self) -> EngineResult<Vec<String>> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await?;
        Ok(images.into_iter().flat_map(|i| i.repo_tags).collect())
    }

    async fn create(&self, spec: &CreateSpec) -> EngineResult<()> {
        let mut port_bindings: PortMap = HashMap::new();
        let mut exposed_ports = HashMap::new();
        for (port, proto) in &spec.exposed_ports {
            exposed_ports.insert(format!("{}/{}", port, proto), HashMap::new());
        }
        for (internal, proto, external) in &spec.port_bindings {
            port_bindings.insert(
                format!("{}/{}", internal, proto),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: external.map(|p| p.to_string()),
                }]),
            );
        }

        let restart_policy = spec.restart_policy.as_ref().map(|(name, retries)| {
            let name = match name.as_str() {
                "always" => bollard::models::RestartPolicyNameEnum::ALWAYS,
                "on-failure" => bollard::models::RestartPolicyNameEnum::ON_FAILURE,
                "unless-stopped" => bollard::models::RestartPolicyNameEnum::UNLESS_STOPPED,
                _ => bollard::models::RestartPolicyNameEnum::NO,
            };
            BollardRestartPolicy {
                name: Some(name),
                maximum_retry_count: Some(*retries as i64),
            }
        });

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            binds: Some(spec.binds.clone()),
            volumes_from: Some(spec.volumes_from.clone()),
            links: Some(spec.links.clone()),
            privileged: Some(spec.privileged),
            extra_hosts: Some(spec.extra_hosts.clone()),
            network_mode: spec.network_mode.clone(),
            restart_policy,
            dns: Some(spec.dns.clone()),
            memory: spec.memory.map(|v| v as i64),
            memory_swap: spec.memory_swap,
            cpu_shares: spec.cpu_shares,
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: spec.command.clone(),
            env: Some(spec.env.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        match self.docker.create_container(Some(options), config).await {
            Ok(_) => {
                info!("created container {}", spec.name);
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 409, .. }) => {
                Err(EngineError::ContainerExists(spec.name.clone()))
            }
            Err(e) => Err(EngineError::Docker(e)),
        }
    }

    async fn start(&self, name: &str) -> EngineResult<()> {
        self.docker
            .start_container::<String>(name, None)
            .await
            .map_err(EngineError::Docker)?;
        info!("started container {}", name);
        Ok(())
    }

    async fn stop(&self, name: &str, _signal: &str, timeout_secs: u32) -> EngineResult<()> {
        match self
            .docker
            .stop_container(name, Some(StopContainerOptions { t: timeout_secs as i64 }))
            .await
        {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 304, .. }) => {
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
                Err(EngineError::ContainerNotFound(name.to_string()))
            }
            Err(e) => Err(EngineError::Docker(e)),
        }
    }

    async fn remove(&self, name: &str) -> EngineResult<()> {
        match self
            .docker
            .remove_container(name, Some(RemoveContainerOptions { force: true, ..Default::default() }))
            .await
        {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
                Ok(())
            }
            Err(e) => Err(EngineError::Docker(e)),
        }
    }

    async fn logs(&self, name: &str, lines: Option<u32>, follow: bool) -> EngineResult<String> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow,
            tail: lines.map(|n| n.to_string()).unwrap_or_else(|| "all".into()),
            ..Default::default()
        };
        let mut stream = self.docker.logs(name, Some(options));
        let mut out = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message } | LogOutput::StdErr { message }) => {
                    out.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("error reading logs for {}: {}", name, e);
                    break;
                }
            }
        }
        Ok(out)
    }

    async fn attach(&self, name: &str) -> EngineResult<()> {
        debug!("attaching to {}", name);
        self.logs(name, None, true).await.map(|_| ())
    }

    async fn pull(&self, image: &str, auth: Option<&RegistryAuth>) -> EngineResult<()> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let credentials = auth.map(Self::auth_config);
        let mut stream = self.docker.create_image(Some(options), None, credentials);
        while let Some(progress) = stream.next().await {
            if let Err(e) = progress {
                return Err(EngineError::PullFailed(image.to_string(), e.to_string()));
            }
        }
        info!("pulled image {}", image);
        Ok(())
    }

    async fn login(&self, auth: &RegistryAuth) -> EngineResult<()> {
        self.docker
            .login(&Self::auth_config(auth))
            .await
            .map(|_| ())
            .map_err(|e| EngineError::LoginFailed(e.to_string()))
    }

    async fn exec_create(&self, name: &str, argv: &[String]) -> EngineResult<String> {
        let exec = self
            .docker
            .create_exec(
                name,
                CreateExecOptions {
                    cmd: Some(argv.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        Ok(exec.id)
    }

    async fn exec_start(&self, exec_id: &str) -> EngineResult<()> {
        match self
            .docker
            .start_exec(exec_id, Some(StartExecOptions { detach: false, ..Default::default() }))
            .await?
        {
            StartExecResults::Attached { mut output, .. } => {
                while output.next().await.is_some() {}
            }
            StartExecResults::Detached => {}
        }
        Ok(())
    }

    async fn exec_inspect(&self, exec_id: &str) -> EngineResult<Option<i64>> {
        let inspect = self.docker.inspect_exec(exec_id).await?;
        if inspect.running.unwrap_or(false) {
            Ok(None)
        } else {
            Ok(Some(inspect.exit_code.unwrap_or(-1)))
        }
    }

    async fn host_address(&self, name: &str) -> EngineResult<Option<String>> {
        let inspect = self.docker.inspect_container(name, None).await?;
        Ok(inspect
            .network_settings
            .and_then(|ns| ns.ip_address)
            .filter(|s| !s.is_empty()))
    }
}
