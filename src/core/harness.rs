use std::sync::Arc;

use tokio::{sync::watch, time::Instant};

use crate::{
    constants::{CANCELLED_RUN_MSG, EMPTY_CASES_MSG},
    core::{
        aggregator::{self, RunStamp},
        dispatcher::{self, Dispatch, Strategy},
        domain::{ExecutionLimits, RunReport, RunState, SourceSubmission, TestCase},
        errors::HarnessError,
        interpreter::HostedInterpreterManager,
        normalizer,
        pipeline::running::{PreparedSubmission, run_cases},
        traits::invoker::Invoker,
    },
};

/// Grades submissions against ordered test cases.
///
/// The native invoker and the hosted interpreter manager are owned by the
/// harness and shared by every run it performs.
#[derive(Clone, Debug)]
pub struct Harness {
    native: Arc<dyn Invoker>,
    hosted: Arc<HostedInterpreterManager>,
    limits: ExecutionLimits,
}

#[derive(Debug)]
struct RunTracker {
    stamp: RunStamp,
    state: RunState,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            stamp: RunStamp::now(),
            state: RunState::default(),
        }
    }

    fn change_state(&mut self, new_state: RunState) {
        if self.state.is_terminal() {
            tracing::warn!(
                "Run {}: leaving terminal state {:?}",
                self.stamp.id,
                self.state
            );
        }
        tracing::debug!(
            "Run {}: {:?} -> {:?}",
            self.stamp.id,
            self.state,
            new_state
        );
        self.state = new_state;
    }
}

impl Harness {
    pub fn new(
        native: Arc<dyn Invoker>,
        hosted: Arc<HostedInterpreterManager>,
        limits: ExecutionLimits,
    ) -> Self {
        Self {
            native,
            hosted,
            limits,
        }
    }

    pub async fn run(&self, submission: &SourceSubmission, cases: &[TestCase]) -> RunReport {
        self.run_with_cancel(submission, cases, None).await
    }

    #[tracing::instrument(
        skip(self, submission, cases, cancel),
        fields(language = %submission.language, function = %submission.function_name, cases = cases.len())
    )]
    pub async fn run_with_cancel(
        &self,
        submission: &SourceSubmission,
        cases: &[TestCase],
        cancel: Option<&watch::Receiver<bool>>,
    ) -> RunReport {
        let mut tracker = RunTracker::new();

        if cases.is_empty() {
            let err = HarnessError::Configuration {
                msg: EMPTY_CASES_MSG.to_string(),
            };
            tracing::warn!("Rejecting run: {}", err);
            tracker.change_state(RunState::Rejected {
                msg: err.to_string(),
            });
            return aggregator::aborted(tracker.stamp, Vec::new(), err.to_string());
        }

        tracker.change_state(RunState::Dispatching);
        let (invoker, source) = match dispatcher::dispatch(&submission.language, cases) {
            Dispatch::Rejected { results, error } => {
                tracing::warn!("Rejecting run: {}", error);
                tracker.change_state(RunState::Rejected { msg: error.clone() });
                return aggregator::aborted(tracker.stamp, results, error);
            }
            Dispatch::Run(Strategy::Native(_)) => {
                (self.native.clone(), normalizer::normalize(&submission.code))
            }
            Dispatch::Run(Strategy::Hosted(language)) => {
                tracker.change_state(RunState::Initializing);
                match self.hosted.acquire().await {
                    Ok(invoker) => (invoker, submission.code.clone()),
                    Err(source) => {
                        let err = HarnessError::Initialization {
                            language: dispatcher::display_name(language).to_string(),
                            source,
                        };
                        tracker.change_state(RunState::Failed {
                            msg: err.to_string(),
                        });
                        return aggregator::aborted(tracker.stamp, Vec::new(), err.to_string());
                    }
                }
            }
        };

        tracker.change_state(RunState::Running);
        let prepared = PreparedSubmission {
            source,
            function_name: submission.function_name.clone(),
        };
        let start = Instant::now();
        let outcome = run_cases(invoker.as_ref(), &prepared, cases, &self.limits, cancel).await;
        let loop_time = start.elapsed();

        tracker.change_state(RunState::Completed);
        let error = outcome.cancelled.then(|| CANCELLED_RUN_MSG.to_string());
        let report = aggregator::completed(tracker.stamp, outcome.results, loop_time, error);
        tracing::info!(
            "Run {} completed: {}/{} passed in {} ms",
            report.id,
            report.results.iter().filter(|r| r.passed).count(),
            report.results.len(),
            report.total_time_ms
        );
        report
    }
}
