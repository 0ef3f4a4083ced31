//! The remote container engine contract.
//!
//! `Engine` is the opaque capability every `Task` drives: everything it
//! needs from the Docker daemon running on a given [`crate::entities::Ship`].
//! Production code talks to it through [`BollardEngine`]; tests drive the
//! same trait through [`fake::FakeEngine`] so the conductor, play scheduler,
//! and task state machines can be exercised without a live daemon.

mod bollard_engine;
#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use thiserror::Error;

pub use bollard_engine::BollardEngine;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("container not found: {0}")]
    ContainerNotFound(String),
    #[error("container already exists: {0}")]
    ContainerExists(String),
    #[error("image pull failed for {0}: {1}")]
    PullFailed(String, String),
    #[error("login failed: {0}")]
    LoginFailed(String),
    #[error(transparent)]
    Docker(#[from] bollard::errors::Error),
    #[error("{0}")]
    Other(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// The status of a container as last reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Missing,
    Created,
    Running,
    Stopped,
    Paused,
}

/// Metadata returned by `create`/`inspect` relevant to link-variable and
/// lifecycle-check resolution.
#[derive(Debug, Clone, Default)]
pub struct ContainerInfo {
    pub status: Option<ContainerStatus>,
    pub image_id: Option<String>,
}

/// Spec needed to create a container; assembled by `Task` implementations
/// from `Container`/`Service`/`Ship` entities (§6 container config schema).
#[derive(Debug, Clone, Default)]
pub struct CreateSpec {
    pub name: String,
    pub image: String,
    pub command: Option<Vec<String>>,
    pub env: Vec<String>,
    pub exposed_ports: Vec<(u16, String)>,
    pub port_bindings: Vec<(u16, String, Option<u16>)>,
    pub binds: Vec<String>,
    pub volumes_from: Vec<String>,
    pub links: Vec<String>,
    pub privileged: bool,
    pub extra_hosts: Vec<String>,
    pub network_mode: Option<String>,
    pub restart_policy: Option<(String, u32)>,
    pub dns: Vec<String>,
    pub memory: Option<u64>,
    pub memory_swap: Option<i64>,
    pub cpu_shares: Option<i64>,
}

/// Registry credentials used by `login`/`pull`.
#[derive(Debug, Clone, Default)]
pub struct RegistryAuth {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub server_address: Option<String>,
}

#[async_trait]
pub trait Engine: Send + Sync {
    /// Resolve a container name to its current status.
    async fn inspect(&self, name: &str) -> EngineResult<ContainerInfo>;

    /// List locally available image tags.
    async fn images(&self) -> EngineResult<Vec<String>>;

    /// Create a container from the given spec. Errors with
    /// `ContainerExists` if one already exists under that name.
    async fn create(&self, spec: &CreateSpec) -> EngineResult<()>;

    /// Start an already-created container.
    async fn start(&self, name: &str) -> EngineResult<()>;

    /// Stop a running container, sending `signal` and waiting up to
    /// `timeout_secs` before the engine force-kills it.
    async fn stop(&self, name: &str, signal: &str, timeout_secs: u32) -> EngineResult<()>;

    /// Remove a stopped container.
    async fn remove(&self, name: &str) -> EngineResult<()>;

    /// Fetch the most recent `lines` of output, or all of it if `None`.
    async fn logs(&self, name: &str, lines: Option<u32>, follow: bool) -> EngineResult<String>;

    /// Attach and stream output, used for `logs -F`.
    async fn attach(&self, name: &str) -> EngineResult<()>;

    /// Pull an image, optionally with registry auth.
    async fn pull(&self, image: &str, auth: Option<&RegistryAuth>) -> EngineResult<()>;

    /// Validate registry credentials.
    async fn login(&self, auth: &RegistryAuth) -> EngineResult<()>;

    /// Start an exec session for the given argv inside a running container.
    async fn exec_create(&self, name: &str, argv: &[String]) -> EngineResult<String>;

    /// Begin executing a previously created exec session.
    async fn exec_start(&self, exec_id: &str) -> EngineResult<()>;

    /// Poll an exec session; `Ok(None)` means it's still running.
    async fn exec_inspect(&self, exec_id: &str) -> EngineResult<Option<i64>>;

    /// Resolve the host-reachable address for a container, used by
    /// lifecycle checks that dial the container from outside.
    async fn host_address(&self, name: &str) -> EngineResult<Option<String>>;
}
