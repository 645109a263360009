use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSubmission {
    pub code: String,
    pub language: String,
    pub function_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    /// JSON array with the positional arguments of the graded function.
    pub input: String,
    pub expected_output: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time_ms: u64,
    /// What the submission printed itself while this case ran.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,
}

impl ExecutionResult {
    pub fn failed(case: &TestCase, actual_output: &str, error: String) -> Self {
        Self {
            input: case.input.clone(),
            expected_output: case.expected_output.clone(),
            actual_output: actual_output.to_string(),
            passed: false,
            error: Some(error),
            execution_time_ms: 0,
            stdout: String::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub id: Uuid,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub results: Vec<ExecutionResult>,
    pub all_passed: bool,
    pub total_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request accepted by the binary: one submission plus its ordered cases.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(flatten)]
    pub submission: SourceSubmission,
    pub test_cases: Vec<TestCase>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Language {
    TypeScript,
    JavaScript,
    Python,
    Cpp,
    Java,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    NativeDynamic,
    HostedInterpreter,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Dispatching,
    Rejected { msg: String },
    Initializing,
    Failed { msg: String },
    Running,
    Completed,
}

impl Default for RunState {
    fn default() -> Self {
        RunState::Idle
    }
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Rejected { .. } | RunState::Failed { .. } | RunState::Completed
        )
    }
}

#[derive(Clone, Debug)]
pub struct ExecutionLimits {
    pub time_ms: u64,
    pub memory_bytes: Option<u64>,
    pub output_size_bytes: Option<u64>,
    /// Processes and threads the sandbox user may hold at once.
    pub pids_count: Option<u64>,
}

/// One fully prepared call of the graded function.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub source: String,
    pub function_name: String,
    pub args: Vec<serde_json::Value>,
}
