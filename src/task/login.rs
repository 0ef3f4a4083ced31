use async_trait::async_trait;

use super::{Task, TaskError, TaskOutcome};
use crate::engine::{Engine, RegistryAuth};
use crate::entities::Container;
use crate::output::OutputFormatter;

/// Extracts the registry host from an image reference: the first path
/// segment if it looks like a host (contains a `.` or `:`, or is
/// `localhost`), otherwise the image is assumed to come from the default
/// registry and has no distinct host.
pub fn registry_host(image: &str) -> Option<&str> {
    let first_segment = image.split('/').next()?;
    if image.matches('/').count() == 0 {
        return None;
    }
    if first_segment.contains('.') || first_segment.contains(':') || first_segment == "localhost" {
        Some(first_segment)
    } else {
        None
    }
}

pub struct LoginTask {
    pub auth: Option<RegistryAuth>,
}

#[async_trait]
impl Task for LoginTask {
    async fn run(
        &self,
        container: &Container,
        engine: &dyn Engine,
        output: &OutputFormatter,
    ) -> Result<TaskOutcome, TaskError> {
        let Some(auth) = &self.auth else {
            // No username resolvable for this registry: skip silently
            // rather than erroring, matching the upstream fallback.
            output.commit("no credentials configured, skipped");
            return Ok(TaskOutcome::Done);
        };
        if auth.username.is_none() {
            output.commit("no username configured, skipped");
            return Ok(TaskOutcome::Done);
        }

        output.pending("logging in");
        engine.login(auth).await?;
        let _ = &container.name;
        output.commit("logged in");
        Ok(TaskOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_registry_host_from_fqdn_image() {
        assert_eq!(registry_host("registry.example.com/team/app:1"), Some("registry.example.com"));
    }

    #[test]
    fn resolves_registry_host_with_port() {
        assert_eq!(registry_host("localhost:5000/app"), Some("localhost:5000"));
    }

    #[test]
    fn treats_dockerhub_style_image_as_default_registry() {
        assert_eq!(registry_host("library/redis"), None);
        assert_eq!(registry_host("redis"), None);
    }
}
