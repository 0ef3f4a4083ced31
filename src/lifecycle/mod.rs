//! Pluggable lifecycle checks used to decide when a started container is
//! actually ready: TCP port pings, HTTP requests, local/in-container
//! command execution, and a plain sleep.

mod checks;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{ConfigError, LifecycleCheckRaw};
use crate::engine::Engine;
use crate::entities::Container;

pub use checks::{ExecCheck, HttpCheck, RemoteExecCheck, SleepCheck, TcpCheck};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("lifecycle check timed out")]
    Timeout,
    #[error(transparent)]
    Engine(#[from] crate::engine::EngineError),
}

/// A single configured lifecycle check, as parsed from the environment
/// description. Kept separate from the executable check so it can be
/// cloned/serialized cheaply and merged between service- and
/// container-level configuration.
#[derive(Debug, Clone)]
pub struct LifecycleCheckConfig {
    pub kind: String,
    pub params: HashMap<String, serde_yaml::Value>,
}

impl LifecycleCheckConfig {
    pub fn from_raw(raw: &LifecycleCheckRaw) -> Self {
        Self {
            kind: raw.kind.clone(),
            params: raw.params.clone(),
        }
    }

    fn param_str(&self, key: &str) -> Option<String> {
        self.params
            .get(key)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    fn param_u64(&self, key: &str, default: u64) -> u64 {
        self.params
            .get(key)
            .and_then(|v| v.as_u64())
            .unwrap_or(default)
    }

    fn param_bool(&self, key: &str, default: bool) -> bool {
        self.params
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }
}

/// A runnable lifecycle check. `test` returns whether the container has
/// become ready; callers are responsible for retry/backoff/timeout policy
/// around the individual probes, except where noted per-variant below.
#[async_trait]
pub trait LifecycleCheck: Send + Sync {
    async fn test(&self, container: &Container, engine: &dyn Engine) -> bool;
}

pub struct LifecycleCheckFactory;

impl LifecycleCheckFactory {
    /// Build the executable check for one configured entry. `port_lookup`
    /// resolves a named port (as declared on the container) to its exposed
    /// port number, needed by the `tcp` and `rexec` checks.
    pub fn build(
        config: &LifecycleCheckConfig,
        port_lookup: &dyn Fn(&str) -> Option<u16>,
    ) -> Result<Box<dyn LifecycleCheck>, ConfigError> {
        match config.kind.as_str() {
            "tcp" => {
                let port_name = config
                    .param_str("port")
                    .ok_or_else(|| ConfigError::InvalidLifecycleCheck("tcp check missing 'port'".into()))?;
                let port = port_lookup(&port_name).ok_or_else(|| {
                    ConfigError::InvalidLifecycleCheck(format!("unknown port '{}'", port_name))
                })?;
                Ok(Box::new(TcpCheck {
                    port,
                    max_wait: Duration::from_secs(config.param_u64("max_wait", 180)),
                }))
            }
            "http" => {
                let port_name = config
                    .param_str("port")
                    .ok_or_else(|| ConfigError::InvalidLifecycleCheck("http check missing 'port'".into()))?;
                let port = port_lookup(&port_name).ok_or_else(|| {
                    ConfigError::InvalidLifecycleCheck(format!("unknown port '{}'", port_name))
                })?;
                Ok(Box::new(HttpCheck {
                    port,
                    scheme: config.param_str("scheme").unwrap_or_else(|| "http".into()),
                    method: config.param_str("method").unwrap_or_else(|| "GET".into()),
                    path: config.param_str("path").unwrap_or_else(|| "/".into()),
                    match_regex: config.param_str("match_regex"),
                    requires_status_codes: config.param_str("requires_status_codes"),
                    max_wait: Duration::from_secs(config.param_u64("max_wait", 180)),
                }))
            }
            "exec" => {
                let command = config.param_str("command").ok_or_else(|| {
                    ConfigError::InvalidLifecycleCheck("exec check missing 'command'".into())
                })?;
                Ok(Box::new(ExecCheck {
                    command,
                    max_wait: Duration::from_secs(config.param_u64("max_wait", 180)),
                }))
            }
            "rexec" => {
                let command = config.param_str("command").ok_or_else(|| {
                    ConfigError::InvalidLifecycleCheck("rexec check missing 'command'".into())
                })?;
                Ok(Box::new(RemoteExecCheck {
                    command,
                    max_wait: Duration::from_secs(config.param_u64("max_wait", 180)),
                }))
            }
            "sleep" => Ok(Box::new(SleepCheck {
                seconds: config.param_u64("sleep", 1),
                cancellable: config.param_bool("cancellable", true),
            })),
            other => Err(ConfigError::InvalidLifecycleCheck(format!(
                "unknown lifecycle check type '{}'",
                other
            ))),
        }
    }
}
