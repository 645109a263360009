use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::core::traits::{
    interpreter::{InitError, InterpreterBootstrap},
    invoker::Invoker,
};

/// Owns the single hosted interpreter of the process.
///
/// The bootstrap runs on first use. Concurrent first callers wait on the same
/// initialization; a successful handle is kept for the life of the manager,
/// a failed one is not cached and the next run tries again.
#[derive(Debug)]
pub struct HostedInterpreterManager {
    bootstrap: Arc<dyn InterpreterBootstrap>,
    handle: OnceCell<Arc<dyn Invoker>>,
}

impl HostedInterpreterManager {
    pub fn new(bootstrap: Arc<dyn InterpreterBootstrap>) -> Self {
        Self {
            bootstrap,
            handle: OnceCell::new(),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn acquire(&self) -> Result<Arc<dyn Invoker>, InitError> {
        let handle = self
            .handle
            .get_or_try_init(|| async {
                tracing::info!("Bootstrapping hosted interpreter");
                let result = self.bootstrap.bootstrap().await;
                match &result {
                    Ok(invoker) => tracing::info!("Hosted interpreter ready: {:?}", invoker),
                    Err(e) => tracing::error!("Hosted interpreter bootstrap failed: {}", e),
                }
                result
            })
            .await?;

        Ok(handle.clone())
    }

    #[cfg(test)]
    pub fn is_initialized(&self) -> bool {
        self.handle.initialized()
    }
}
