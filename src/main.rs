use std::panic;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

use crate::config::HarnessConfig;
use crate::core::domain::RunRequest;
use crate::core::harness::Harness;
use crate::core::interpreter::HostedInterpreterManager;
use crate::native::node::NodeInvoker;
use crate::native::python::PythonBootstrap;

mod config;
mod constants;
mod core;
mod native;

#[cfg(test)]
mod stubs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    set_panic_hook();

    let config = HarnessConfig::from_env()?;
    tracing::debug!("Configuration: {:?}", config);

    let request = read_request(std::env::args().nth(1).map(PathBuf::from)).await?;
    let harness = build_harness(&config);

    let report = harness
        .run(&request.submission, &request.test_cases)
        .await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

fn build_harness(config: &HarnessConfig) -> Harness {
    let native = Arc::new(NodeInvoker::new(&config.node_path, &config.work_dir));
    let hosted = Arc::new(HostedInterpreterManager::new(Arc::new(PythonBootstrap::new(
        &config.python_path,
        &config.work_dir,
        config.bootstrap_timeout_ms,
    ))));
    Harness::new(native, hosted, config.execution_limits())
}

async fn read_request(path: Option<PathBuf>) -> Result<RunRequest, Box<dyn std::error::Error>> {
    let raw = match path {
        Some(path) => {
            tracing::info!("Reading request from {}", path.display());
            tokio::fs::read_to_string(&path).await?
        }
        None => {
            tracing::info!("Reading request from stdin");
            let mut raw = String::new();
            tokio::io::stdin().read_to_string(&mut raw).await?;
            raw
        }
    };
    Ok(serde_json::from_str(&raw)?)
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
