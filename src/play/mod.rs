//! The concurrent, dependency-aware scheduler that drives one [`Task`]
//! per container in [`crate::conductor::Conductor`]'s computed order.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::audit::MultiplexAuditor;
use crate::conductor::Conductor;
use crate::engine::Engine;
use crate::entities::Container;
use crate::output::OutputManager;
use crate::task::{Task, TaskError, TaskOutcome};

#[derive(Debug, Error, Clone)]
pub enum PlayError {
    #[error("manual abort")]
    Aborted,
    #[error("{container}: {message}")]
    Container { container: String, message: String },
}

impl From<TaskError> for PlayError {
    fn from(e: TaskError) -> Self {
        match e {
            TaskError::StopFailure(container, message) => PlayError::Container { container, message },
            other => PlayError::Container {
                container: String::new(),
                message: other.to_string(),
            },
        }
    }
}

struct PlayState {
    done: Mutex<HashSet<String>>,
    error: Mutex<Option<PlayError>>,
    notify: Notify,
    cancel: CancellationToken,
}

impl PlayState {
    fn set_error(&self, err: PlayError) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(err);
            self.cancel.cancel();
        }
    }

    fn mark_done(&self, name: &str) {
        self.done.lock().insert(name.to_string());
        self.notify.notify_waiters();
    }

    fn dependencies_met(&self, deps: &HashSet<String>) -> bool {
        let done = self.done.lock();
        deps.iter().all(|d| done.contains(d))
    }
}

/// Orchestrates one verb (start/stop/pull/...) across a dependency-ordered
/// set of containers with a bounded number of containers in flight.
pub struct Play {
    pub what: String,
    pub concurrency: usize,
}

impl Play {
    /// `forward_deps` maps each container name to the names (within the
    /// working set) it must wait on before its task may run.
    pub async fn run(
        &self,
        containers: Vec<Arc<Container>>,
        forward_deps: impl Fn(&str) -> HashSet<String> + Send + Sync + 'static,
        task_for: impl Fn(&Container) -> Box<dyn Task> + Send + Sync + 'static,
        engine_for: impl Fn(&Container) -> anyhow::Result<Arc<dyn Engine>> + Send + Sync + 'static,
        output: Arc<OutputManager>,
        auditor: Arc<MultiplexAuditor>,
    ) -> Result<(), PlayError> {
        let things: Vec<String> = containers.iter().map(|c| c.name.clone()).collect();
        auditor
            .action(&self.what, &things)
            .map_err(|e| PlayError::Container {
                container: String::new(),
                message: e.to_string(),
            })?;

        let state = Arc::new(PlayState {
            done: Mutex::new(HashSet::new()),
            error: Mutex::new(None),
            notify: Notify::new(),
            cancel: CancellationToken::new(),
        });

        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let forward_deps = Arc::new(forward_deps);
        let task_for = Arc::new(task_for);
        let engine_for = Arc::new(engine_for);

        let ctrl_c_cancel = state.cancel.clone();
        let ctrl_c_triggered = Arc::new(AtomicBool::new(false));
        let ctrl_c_flag = ctrl_c_triggered.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c_flag.store(true, Ordering::SeqCst);
                ctrl_c_cancel.cancel();
            }
        });

        let mut handles = Vec::with_capacity(containers.len());
        for container in containers {
            let state = state.clone();
            let semaphore = semaphore.clone();
            let forward_deps = forward_deps.clone();
            let task_for = task_for.clone();
            let engine_for = engine_for.clone();
            let output = output.clone();

            handles.push(tokio::spawn(async move {
                let deps = forward_deps(&container.name);

                loop {
                    if state.cancel.is_cancelled() {
                        return;
                    }
                    if state.dependencies_met(&deps) {
                        break;
                    }
                    let notified = state.notify.notified();
                    tokio::select! {
                        _ = notified => {}
                        _ = state.cancel.cancelled() => return,
                    }
                }

                let permit = tokio::select! {
                    p = semaphore.acquire_owned() => p.ok(),
                    _ = state.cancel.cancelled() => None,
                };
                let Some(_permit) = permit else { return };
                if state.cancel.is_cancelled() {
                    return;
                }

                let engine = match engine_for(&container) {
                    Ok(e) => e,
                    Err(e) => {
                        state.set_error(PlayError::Container {
                            container: container.name.clone(),
                            message: e.to_string(),
                        });
                        state.mark_done(&container.name);
                        return;
                    }
                };

                let formatter = output.formatter(container.name.clone());
                let task = task_for(&container);
                match task.run(&container, engine.as_ref(), &formatter).await {
                    Ok(TaskOutcome::Done) => {
                        state.mark_done(&container.name);
                    }
                    Ok(TaskOutcome::StopFailed(reason)) => {
                        warn!("{}", reason);
                        state.mark_done(&container.name);
                    }
                    Err(e) => {
                        error!("{} failed: {}", container.name, e);
                        state.set_error(PlayError::Container {
                            container: container.name.clone(),
                            message: e.to_string(),
                        });
                        state.mark_done(&container.name);
                    }
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        if ctrl_c_triggered.load(Ordering::SeqCst) {
            auditor.error(&self.what, &things, "manual abort");
            return Err(PlayError::Aborted);
        }

        let outcome = state.error.lock().clone();
        match outcome {
            Some(err) => {
                auditor.error(&self.what, &things, &err.to_string());
                Err(err)
            }
            None => {
                auditor.success(&self.what, &things);
                info!("{} completed on {} container(s)", self.what, things.len());
                Ok(())
            }
        }
    }
}

/// Build the `forward_deps` closure from the conductor's real dependency
/// edges, restricted to `set`: a container only waits on the other members
/// of `set` it actually `requires` (directly or transitively), never on
/// siblings it has no relationship with, so independent services still
/// race up to the play's concurrency bound.
pub fn dependency_map(
    conductor: &Conductor,
    set: &HashSet<Arc<Container>>,
    forward: bool,
) -> std::collections::HashMap<String, HashSet<String>> {
    conductor.edges_within(set, forward)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditSink, LogSink};
    use crate::config::EnvironmentConfig;
    use crate::engine::fake::FakeEngine;
    use crate::task::StartTask;

    fn conductor_for(yaml: &str) -> Conductor {
        let config: EnvironmentConfig = serde_yaml::from_str(yaml).unwrap();
        Conductor::build(&config).unwrap()
    }

    const TWO_SERVICES: &str = r#"
name: sample
ships:
  ship1:
    ip: 10.0.0.1
services:
  db:
    image: postgres:16
  web:
    image: myapp:latest
    requires: [db]
"#;

    #[tokio::test]
    async fn start_play_respects_dependency_order() {
        let conductor = conductor_for(TWO_SERVICES);
        let set = conductor.expand_things(&[], false).unwrap();
        let deps = dependency_map(&conductor, &set, true);

        let engine: Arc<dyn Engine> = Arc::new(FakeEngine::new());
        let output = Arc::new(OutputManager::new());
        let auditor = Arc::new(MultiplexAuditor::new(vec![Arc::new(LogSink) as Arc<dyn AuditSink>]));

        let play = Play { what: "start".into(), concurrency: 4 };
        let containers: Vec<_> = set.into_iter().collect();

        let result = play
            .run(
                containers,
                move |name| deps.get(name).cloned().unwrap_or_default(),
                |_c: &Container| -> Box<dyn Task> {
                    Box::new(StartTask {
                        reuse: false,
                        refresh_image: false,
                        registry_auth: None,
                    })
                },
                move |_c: &Container| Ok(engine.clone()),
                output,
                auditor,
            )
            .await;

        assert!(result.is_ok());
    }
}
