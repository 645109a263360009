use crate::core::traits::{interpreter::InitError, invoker::InvokeError};

/// Everything that can go wrong while grading a submission.
///
/// `Configuration` and `Initialization` abort a run before any case executes,
/// `Decode` and `Execution` are recorded on a single case.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HarnessError {
    #[error("{msg}")]
    Configuration { msg: String },
    #[error("Failed to initialize the {language} interpreter: {source}")]
    Initialization {
        language: String,
        #[source]
        source: InitError,
    },
    #[error("Invalid {what}: {msg}")]
    Decode { what: DecodeTarget, msg: String },
    #[error(transparent)]
    Execution(#[from] InvokeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeTarget {
    Input,
    ExpectedOutput,
    ActualOutput,
}

impl std::fmt::Display for DecodeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DecodeTarget::Input => "input (expected a JSON array of arguments)",
            DecodeTarget::ExpectedOutput => "expected output",
            DecodeTarget::ActualOutput => "actual output",
        };
        f.write_str(name)
    }
}

impl HarnessError {
    pub fn decode(what: DecodeTarget, err: serde_json::Error) -> Self {
        HarnessError::Decode {
            what,
            msg: err.to_string(),
        }
    }
}
