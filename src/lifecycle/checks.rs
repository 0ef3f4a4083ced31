use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use super::LifecycleCheck;
use crate::engine::Engine;
use crate::entities::Container;

/// Retries a connect attempt once a second until `max_wait` elapses.
pub struct TcpCheck {
    pub port: u16,
    pub max_wait: Duration,
}

#[async_trait]
impl LifecycleCheck for TcpCheck {
    async fn test(&self, container: &Container, engine: &dyn Engine) -> bool {
        let Some(host) = engine.host_address(&container.name).await.ok().flatten() else {
            return false;
        };
        let addr = format!("{}:{}", host, self.port);
        let deadline = Instant::now() + self.max_wait;

        loop {
            match tokio::time::timeout(
                Duration::from_secs(1),
                tokio::net::TcpStream::connect(&addr),
            )
            .await
            {
                Ok(Ok(_)) => return true,
                _ => {
                    if Instant::now() >= deadline {
                        warn!("tcp lifecycle check against {} timed out", addr);
                        return false;
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

/// Issues an HTTP request and checks the status code (default: any 2xx) or
/// an optional regex match against the response body.
pub struct HttpCheck {
    pub port: u16,
    pub scheme: String,
    pub method: String,
    pub path: String,
    pub match_regex: Option<String>,
    pub requires_status_codes: Option<String>,
    pub max_wait: Duration,
}

#[async_trait]
impl LifecycleCheck for HttpCheck {
    async fn test(&self, container: &Container, engine: &dyn Engine) -> bool {
        let Some(host) = engine.host_address(&container.name).await.ok().flatten() else {
            return false;
        };
        let url = format!("{}://{}:{}{}", self.scheme, host, self.port, self.path);
        let deadline = Instant::now() + self.max_wait;

        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
        {
            Ok(c) => c,
            Err(_) => return false,
        };

        let accepted_codes: Vec<u16> = self
            .requires_status_codes
            .as_deref()
            .map(|s| s.split(',').filter_map(|c| c.trim().parse().ok()).collect())
            .unwrap_or_default();

        loop {
            let method = reqwest::Method::from_bytes(self.method.as_bytes())
                .unwrap_or(reqwest::Method::GET);
            let response = client.request(method, &url).send().await;

            if let Ok(resp) = response {
                let status_ok = if accepted_codes.is_empty() {
                    resp.status().is_success()
                } else {
                    accepted_codes.contains(&resp.status().as_u16())
                };

                let body_ok = match &self.match_regex {
                    None => true,
                    Some(pattern) => match (Regex::new(pattern), resp.text().await) {
                        (Ok(re), Ok(body)) => re.is_match(&body),
                        _ => false,
                    },
                };

                if status_ok && body_ok {
                    return true;
                }
            }

            if Instant::now() >= deadline {
                warn!("http lifecycle check against {} timed out", url);
                return false;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

/// Runs a local command (split with shell-word rules) and checks its exit
/// code, overlaying the container's environment into the child process.
pub struct ExecCheck {
    pub command: String,
    pub max_wait: Duration,
}

#[async_trait]
impl LifecycleCheck for ExecCheck {
    async fn test(&self, container: &Container, _engine: &dyn Engine) -> bool {
        let Ok(parts) = shell_words::split(&self.command) else {
            return false;
        };
        let Some((program, args)) = parts.split_first() else {
            return false;
        };

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args).envs(container.env.iter());

        match tokio::time::timeout(self.max_wait, cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            _ => false,
        }
    }
}

/// Runs a command inside the already-started container via the remote
/// engine's exec API and polls for its exit code.
pub struct RemoteExecCheck {
    pub command: String,
    pub max_wait: Duration,
}

#[async_trait]
impl LifecycleCheck for RemoteExecCheck {
    async fn test(&self, container: &Container, engine: &dyn Engine) -> bool {
        let Ok(parts) = shell_words::split(&self.command) else {
            return false;
        };

        let deadline = Instant::now() + self.max_wait;
        let exec_id = match engine.exec_create(&container.name, &parts).await {
            Ok(id) => id,
            Err(e) => {
                debug!("rexec check failed to create exec: {}", e);
                return false;
            }
        };
        if engine.exec_start(&exec_id).await.is_err() {
            return false;
        }

        loop {
            match engine.exec_inspect(&exec_id).await {
                Ok(Some(code)) => return code == 0,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        return false;
                    }
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Err(_) => return false,
            }
        }
    }
}

/// Always succeeds after sleeping; cancellable via ctrl-c when configured.
pub struct SleepCheck {
    pub seconds: u64,
    pub cancellable: bool,
}

#[async_trait]
impl LifecycleCheck for SleepCheck {
    async fn test(&self, _container: &Container, _engine: &dyn Engine) -> bool {
        let sleep = tokio::time::sleep(Duration::from_secs(self.seconds));
        if self.cancellable {
            tokio::select! {
                _ = sleep => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        } else {
            sleep.await;
        }
        true
    }
}
