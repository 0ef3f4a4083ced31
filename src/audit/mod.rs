//! Audit dispatch: broadcasts orchestration events (action started,
//! succeeded, failed) to zero or more sinks. Concrete sinks beyond a basic
//! logging one are out of scope; this module is the dispatch mechanism.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("sink '{0}' failed: {1}")]
    SinkFailed(String, String),
}

/// An audit sink receives the three hooks every orchestration action goes
/// through. `action` fires before the play runs, `success`/`error` after.
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &str;
    fn action(&self, what: &str, things: &[String]) -> Result<(), AuditError>;
    fn success(&self, what: &str, things: &[String]);
    fn error(&self, what: &str, things: &[String], message: &str);
}

/// A basic sink that routes audit events through `tracing`, grounded on
/// the upstream's logging auditor; chat/webhook/script sinks are external
/// collaborators left to deployment-specific configuration.
pub struct LogSink;

impl AuditSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn action(&self, what: &str, things: &[String]) -> Result<(), AuditError> {
        info!("starting {} on {}", what, things.join(", "));
        Ok(())
    }

    fn success(&self, what: &str, things: &[String]) {
        info!("{} succeeded on {}", what, things.join(", "));
    }

    fn error(&self, what: &str, things: &[String], message: &str) {
        error!("{} failed on {}: {}", what, things.join(", "), message);
    }
}

/// Wraps a sink so its errors are swallowed instead of propagated by
/// [`MultiplexAuditor::action`].
pub struct IgnoreErrors<S: AuditSink> {
    inner: S,
}

impl<S: AuditSink> IgnoreErrors<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: AuditSink> AuditSink for IgnoreErrors<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn action(&self, what: &str, things: &[String]) -> Result<(), AuditError> {
        if let Err(e) = self.inner.action(what, things) {
            warn!("ignoring audit sink '{}' error: {}", self.inner.name(), e);
        }
        Ok(())
    }

    fn success(&self, what: &str, things: &[String]) {
        self.inner.success(what, things);
    }

    fn error(&self, what: &str, things: &[String], message: &str) {
        self.inner.error(what, things, message);
    }
}

/// Broadcasts to every registered sink.
///
/// `action` re-raises the first sink error it hits, unless that sink is
/// wrapped in [`IgnoreErrors`] — a failure to announce an upcoming action
/// should be visible before the play runs. `success`/`error` never
/// propagate: a broken notification sink must not mask (or be confused
/// with) the orchestration result itself.
pub struct MultiplexAuditor {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl MultiplexAuditor {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }

    pub fn action(&self, what: &str, things: &[String]) -> Result<(), AuditError> {
        for sink in &self.sinks {
            sink.action(what, things)?;
        }
        Ok(())
    }

    pub fn success(&self, what: &str, things: &[String]) {
        for sink in &self.sinks {
            sink.success(what, things);
        }
    }

    pub fn error(&self, what: &str, things: &[String], message: &str) {
        for sink in &self.sinks {
            sink.error(what, things, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct FailingSink;
    impl AuditSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }
        fn action(&self, _what: &str, _things: &[String]) -> Result<(), AuditError> {
            Err(AuditError::SinkFailed("failing".into(), "boom".into()))
        }
        fn success(&self, _what: &str, _things: &[String]) {}
        fn error(&self, _what: &str, _things: &[String], _message: &str) {}
    }

    struct RecordingSink {
        calls: Mutex<Vec<String>>,
    }
    impl AuditSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }
        fn action(&self, what: &str, _things: &[String]) -> Result<(), AuditError> {
            self.calls.lock().push(format!("action:{}", what));
            Ok(())
        }
        fn success(&self, what: &str, _things: &[String]) {
            self.calls.lock().push(format!("success:{}", what));
        }
        fn error(&self, what: &str, _things: &[String], _message: &str) {
            self.calls.lock().push(format!("error:{}", what));
        }
    }

    #[test]
    fn action_propagates_unwrapped_sink_errors() {
        let auditor = MultiplexAuditor::new(vec![Arc::new(FailingSink)]);
        assert!(auditor.action("start", &["web".into()]).is_err());
    }

    #[test]
    fn action_swallows_wrapped_sink_errors() {
        let auditor = MultiplexAuditor::new(vec![Arc::new(IgnoreErrors::new(FailingSink))]);
        assert!(auditor.action("start", &["web".into()]).is_ok());
    }

    #[test]
    fn success_never_propagates() {
        let sink = Arc::new(RecordingSink { calls: Mutex::new(Vec::new()) });
        let auditor = MultiplexAuditor::new(vec![sink.clone()]);
        auditor.success("start", &["web".into()]);
        assert_eq!(sink.calls.lock().as_slice(), &["success:start".to_string()]);
    }
}
