use std::{sync::Arc, time::Duration};

use crate::core::{
    domain::{ExecutionLimits, Invocation},
    traits::invoker::{InvokeError, InvokeOutput, Invoker},
};

/// Invoker answering every call with a fixed result after a delay.
#[derive(Clone)]
pub struct InvokerStub {
    result: Result<InvokeOutput, InvokeError>,
    delay: Duration,
    after_call: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl InvokerStub {
    pub fn new(result: Result<InvokeOutput, InvokeError>, delay: Duration) -> Self {
        Self {
            result,
            delay,
            after_call: None,
        }
    }

    /// Runs `hook` after every invocation, e.g. to fire a cancellation.
    pub fn with_hook<F>(self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            after_call: Some(Arc::new(hook)),
            ..self
        }
    }
}

impl std::fmt::Debug for InvokerStub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvokerStub")
            .field("result", &self.result)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Invoker for InvokerStub {
    #[tracing::instrument]
    async fn invoke(
        &self,
        call: &Invocation,
        limits: &ExecutionLimits,
    ) -> Result<InvokeOutput, InvokeError> {
        tracing::debug!(
            "Start invocation: function={:?}, args={:?}, limits={:?}",
            call.function_name,
            call.args,
            limits
        );
        tokio::time::sleep(self.delay).await;
        tracing::debug!("Invocation result: {:?}", self.result);

        if let Some(hook) = &self.after_call {
            hook();
        }
        self.result.clone()
    }
}
