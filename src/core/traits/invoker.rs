use crate::core::domain::{ExecutionLimits, Invocation};

#[mockall::automock]
#[async_trait::async_trait]
pub trait Invoker: std::fmt::Debug + Send + Sync {
    async fn invoke(
        &self,
        call: &Invocation,
        limits: &ExecutionLimits,
    ) -> Result<InvokeOutput, InvokeError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct InvokeOutput {
    /// Serialized return value of the graded function.
    pub actual_output: String,
    /// Whatever the submission printed on its own.
    pub stdout: String,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvokeError {
    #[error("{msg}")]
    Threw { msg: String },
    #[error("Function \"{name}\" is not defined")]
    MissingFunction { name: String },
    #[error("Time limit exceeded ({time_ms} ms)")]
    TimeLimitExceeded { time_ms: u64 },
    #[error("Output limit exceeded ({limit_bytes} bytes)")]
    OutputLimitExceeded { limit_bytes: u64 },
    #[error("Internal error: {msg}")]
    Internal { msg: String },
}
