//! Crate-wide error taxonomy
//!
//! Each subsystem defines its own error enum (`ConfigError`, `EngineError`,
//! `PlayError`, `AuditError`); `MaestroError` is the umbrella the CLI
//! converts to a process exit code.

use thiserror::Error;

use crate::audit::AuditError;
use crate::conductor::ConductorError;
use crate::config::ConfigError;
use crate::engine::EngineError;
use crate::play::PlayError;

#[derive(Debug, Error)]
pub enum MaestroError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Conductor(#[from] ConductorError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Play(#[from] PlayError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("manual abort")]
    UserAbort,
}

pub type Result<T> = std::result::Result<T, MaestroError>;
