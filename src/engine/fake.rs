//! In-memory [`Engine`] used by conductor/play/task tests in place of a
//! live Docker daemon.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ContainerInfo, ContainerStatus, CreateSpec, Engine, EngineError, EngineResult, RegistryAuth};

#[derive(Default)]
pub struct FakeEngine {
    containers: Mutex<HashMap<String, ContainerStatus>>,
    pub fail_create: Mutex<Vec<String>>,
    pub fail_pull: Mutex<Vec<String>>,
    pub pulled_images: Mutex<Vec<String>>,
    pub actions: Mutex<Vec<(String, String)>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, name: &str, action: &str) {
        self.actions
            .lock()
            .push((name.to_string(), action.to_string()));
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn inspect(&self, name: &str) -> EngineResult<ContainerInfo> {
        let status = self
            .containers
            .lock()
            .get(name)
            .copied()
            .unwrap_or(ContainerStatus::Missing);
        Ok(ContainerInfo {
            status: Some(status),
            image_id: Some("fake-image".into()),
        })
    }

    async fn images(&self) -> EngineResult<Vec<String>> {
        Ok(self.pulled_images.lock().clone())
    }

    async fn create(&self, spec: &CreateSpec) -> EngineResult<()> {
        if self.fail_create.lock().contains(&spec.name) {
            return Err(EngineError::Other(format!("forced create failure for {}", spec.name)));
        }
        let mut containers = self.containers.lock();
        if containers.contains_key(&spec.name) {
            return Err(EngineError::ContainerExists(spec.name.clone()));
        }
        containers.insert(spec.name.clone(), ContainerStatus::Created);
        drop(containers);
        self.record(&spec.name, "create");
        Ok(())
    }

    async fn start(&self, name: &str) -> EngineResult<()> {
        self.containers
            .lock()
            .insert(name.to_string(), ContainerStatus::Running);
        self.record(name, "start");
        Ok(())
    }

    async fn stop(&self, name: &str, _signal: &str, _timeout_secs: u32) -> EngineResult<()> {
        self.containers
            .lock()
            .insert(name.to_string(), ContainerStatus::Stopped);
        self.record(name, "stop");
        Ok(())
    }

    async fn remove(&self, name: &str) -> EngineResult<()> {
        self.containers.lock().remove(name);
        self.record(name, "remove");
        Ok(())
    }

    async fn logs(&self, _name: &str, _lines: Option<u32>, _follow: bool) -> EngineResult<String> {
        Ok(String::new())
    }

    async fn attach(&self, name: &str) -> EngineResult<()> {
        self.record(name, "attach");
        Ok(())
    }

    async fn pull(&self, image: &str, _auth: Option<&RegistryAuth>) -> EngineResult<()> {
        if self.fail_pull.lock().contains(&image.to_string()) {
            return Err(EngineError::PullFailed(image.to_string(), "forced failure".into()));
        }
        self.pulled_images.lock().push(image.to_string());
        Ok(())
    }

    async fn login(&self, _auth: &RegistryAuth) -> EngineResult<()> {
        Ok(())
    }

    async fn exec_create(&self, _name: &str, _argv: &[String]) -> EngineResult<String> {
        Ok("fake-exec".into())
    }

    async fn exec_start(&self, _exec_id: &str) -> EngineResult<()> {
        Ok(())
    }

    async fn exec_inspect(&self, _exec_id: &str) -> EngineResult<Option<i64>> {
        Ok(Some(0))
    }

    async fn host_address(&self, _name: &str) -> EngineResult<Option<String>> {
        Ok(Some("127.0.0.1".to_string()))
    }
}
