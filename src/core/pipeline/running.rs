use tokio::sync::watch;

use crate::{
    constants::CANCELLED_CASE_MSG,
    core::{
        comparator,
        domain::{ExecutionLimits, ExecutionResult, Invocation, TestCase},
        errors::{DecodeTarget, HarnessError},
        traits::invoker::Invoker,
    },
};

/// Source and function shared by every case of one run.
#[derive(Clone, Debug)]
pub struct PreparedSubmission {
    pub source: String,
    pub function_name: String,
}

#[derive(Debug)]
pub struct CaseLoopOutcome {
    pub results: Vec<ExecutionResult>,
    pub cancelled: bool,
}

/// Runs the cases strictly one after another, in input order.
///
/// A failing case is recorded on its own result and never stops the loop.
/// The cancellation signal is checked before each case; cases that were not
/// started are recorded as failed so every case keeps its entry.
pub async fn run_cases(
    invoker: &dyn Invoker,
    submission: &PreparedSubmission,
    cases: &[TestCase],
    limits: &ExecutionLimits,
    cancel: Option<&watch::Receiver<bool>>,
) -> CaseLoopOutcome {
    let mut results = Vec::with_capacity(cases.len());
    let mut cancelled = false;

    for (case_idx, case) in cases.iter().enumerate() {
        if !cancelled && cancel.is_some_and(|rx| *rx.borrow()) {
            tracing::warn!("Run cancelled before case {}", case_idx);
            cancelled = true;
        }
        if cancelled {
            results.push(ExecutionResult::failed(
                case,
                "",
                CANCELLED_CASE_MSG.to_string(),
            ));
            continue;
        }

        let result = run_case(invoker, submission, case, limits).await;
        tracing::debug!(
            "Case {} finished: passed={}, error={:?}",
            case_idx,
            result.passed,
            result.error
        );
        results.push(result);
    }

    CaseLoopOutcome { results, cancelled }
}

async fn run_case(
    invoker: &dyn Invoker,
    submission: &PreparedSubmission,
    case: &TestCase,
    limits: &ExecutionLimits,
) -> ExecutionResult {
    let args: Vec<serde_json::Value> = match serde_json::from_str(&case.input) {
        Ok(args) => args,
        Err(err) => {
            let err = HarnessError::decode(DecodeTarget::Input, err);
            return ExecutionResult::failed(case, "", err.to_string());
        }
    };

    let call = Invocation {
        source: submission.source.clone(),
        function_name: submission.function_name.clone(),
        args,
    };

    let output = match invoker.invoke(&call, limits).await {
        Ok(output) => output,
        Err(err) => {
            let err = HarnessError::from(err);
            return ExecutionResult::failed(case, "", err.to_string());
        }
    };

    let (passed, error) = match comparator::outputs_match(&case.expected_output, &output.actual_output)
    {
        Ok(passed) => (passed, None),
        Err(err) => (false, Some(err.to_string())),
    };

    ExecutionResult {
        input: case.input.clone(),
        expected_output: case.expected_output.clone(),
        actual_output: output.actual_output,
        passed,
        error,
        execution_time_ms: output.execution_time_ms,
        stdout: output.stdout,
    }
}
