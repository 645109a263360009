use std::sync::Arc;

use crate::core::traits::invoker::Invoker;

/// Brings up the secondary runtime used for hosted languages.
///
/// Implementations are called at most once per successful bootstrap; the
/// returned invoker is cached by `HostedInterpreterManager`.
#[mockall::automock]
#[async_trait::async_trait]
pub trait InterpreterBootstrap: std::fmt::Debug + Send + Sync {
    async fn bootstrap(&self) -> Result<Arc<dyn Invoker>, InitError>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InitError {
    #[error("interpreter {path} could not be started: {msg}")]
    NotFound { path: String, msg: String },
    #[error("interpreter probe timed out after {time_ms} ms")]
    Timeout { time_ms: u64 },
    #[error("interpreter probe failed: {msg}")]
    ProbeFailed { msg: String },
    #[error("{msg}")]
    Internal { msg: String },
}
