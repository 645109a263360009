use std::time::Duration;

use uuid::Uuid;

use crate::core::domain::{ExecutionResult, RunReport};

/// Metadata stamped on a run when it starts.
#[derive(Clone, Debug)]
pub struct RunStamp {
    pub id: Uuid,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl RunStamp {
    pub fn now() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: chrono::Utc::now(),
        }
    }
}

/// Logical AND over every case; vacuously true for an empty list.
pub fn all_passed(results: &[ExecutionResult]) -> bool {
    results.iter().all(|r| r.passed)
}

pub fn elapsed_ms(elapsed: Duration) -> u64 {
    (elapsed.as_secs_f64() * 1000.0).round() as u64
}

/// Report for a run that went through the case loop.
pub fn completed(
    stamp: RunStamp,
    results: Vec<ExecutionResult>,
    loop_time: Duration,
    error: Option<String>,
) -> RunReport {
    RunReport {
        id: stamp.id,
        started_at: stamp.started_at,
        all_passed: all_passed(&results),
        results,
        total_time_ms: elapsed_ms(loop_time),
        error,
    }
}

/// Report for a run that stopped before any case executed.
///
/// `results` is empty unless the caller supplies synthetic entries, as the
/// unsupported-language path does.
pub fn aborted(stamp: RunStamp, results: Vec<ExecutionResult>, error: String) -> RunReport {
    RunReport {
        id: stamp.id,
        started_at: stamp.started_at,
        results,
        all_passed: false,
        total_time_ms: 0,
        error: Some(error),
    }
}
