use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tokio::process::Command;
use tokio::time::{Duration, timeout};

use crate::core::{
    domain::{ExecutionLimits, Invocation},
    traits::{
        interpreter::{InitError, InterpreterBootstrap},
        invoker::{InvokeError, InvokeOutput, Invoker},
    },
};
use crate::native::sandbox::{self, CaseDir, Marker, ResourceLimits};

lazy_static! {
    static ref PY_IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

const PROBE: &str = "import json, sys; sys.stdout.write('%d.%d.%d' % sys.version_info[:3])";

/// `-I` isolated mode, `-S` no site packages, `-B` no bytecode files.
const INTERPRETER_FLAGS: [&str; 5] = ["-I", "-S", "-B", "-X", "utf8"];

/// A CPython located and verified by `PythonBootstrap`.
#[derive(Clone, Debug, PartialEq)]
pub struct InterpreterHandle {
    pub path: PathBuf,
    pub version: String,
}

#[derive(Clone, Debug)]
pub struct PythonBootstrap {
    python_path: PathBuf,
    work_dir: PathBuf,
    probe_timeout_ms: u64,
}

impl PythonBootstrap {
    pub fn new<T, U>(python_path: T, work_dir: U, probe_timeout_ms: u64) -> Self
    where
        T: AsRef<Path>,
        U: AsRef<Path>,
    {
        PythonBootstrap {
            python_path: python_path.as_ref().into(),
            work_dir: work_dir.as_ref().into(),
            probe_timeout_ms,
        }
    }

    async fn probe(&self) -> Result<InterpreterHandle, InitError> {
        let probe = Command::new(&self.python_path)
            .args(["-I", "-S", "-c", PROBE])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = timeout(Duration::from_millis(self.probe_timeout_ms), probe)
            .await
            .map_err(|_| InitError::Timeout {
                time_ms: self.probe_timeout_ms,
            })?
            .map_err(|e| InitError::NotFound {
                path: self.python_path.display().to_string(),
                msg: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(InitError::ProbeFailed {
                msg: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !version.starts_with("3.") {
            return Err(InitError::ProbeFailed {
                msg: format!("unsupported Python version {:?}", version),
            });
        }

        Ok(InterpreterHandle {
            path: self.python_path.clone(),
            version,
        })
    }
}

#[async_trait::async_trait]
impl InterpreterBootstrap for PythonBootstrap {
    #[tracing::instrument]
    async fn bootstrap(&self) -> Result<Arc<dyn Invoker>, InitError> {
        let handle = self.probe().await?;
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| InitError::Internal {
                msg: format!("Failed to create {}: {}", self.work_dir.display(), e),
            })?;

        tracing::info!("Using Python {} at {}", handle.version, handle.path.display());
        Ok(Arc::new(PythonInvoker::new(handle, &self.work_dir)))
    }
}

/// Runs each case as a harness program on the bootstrapped interpreter.
///
/// Every case gets a fresh interpreter process, so module state never
/// carries over between cases or runs.
#[derive(Clone, Debug)]
pub struct PythonInvoker {
    handle: InterpreterHandle,
    work_dir: PathBuf,
}

impl PythonInvoker {
    pub fn new<T: AsRef<Path>>(handle: InterpreterHandle, work_dir: T) -> Self {
        PythonInvoker {
            handle,
            work_dir: work_dir.as_ref().into(),
        }
    }
}

/// Harness: the submission verbatim, so `from __future__` imports stay first,
/// then aliased imports, the argument decoding, the call and the verdict.
/// Every harness name carries the marker nonce.
pub fn build_harness(call: &Invocation, marker: &Marker) -> Result<String, InvokeError> {
    let encode_err = |e: serde_json::Error| InvokeError::Internal {
        msg: format!("Failed to encode arguments: {}", e),
    };
    let args_json = serde_json::to_string(&call.args).map_err(encode_err)?;
    let args_literal = serde_json::to_string(&args_json).map_err(encode_err)?;
    let name_literal = serde_json::to_string(&call.function_name).map_err(encode_err)?;

    Ok(format!(
        r#"{source}

import json as {json}
import sys as {sys}

def {emit}(line):
    {sys}.stdout.write("\n" + line + "\n")

def {run}():
    target = globals().get({name_literal})
    if not callable(target):
        {emit}("{missing}")
        return 1
    try:
        args = {json}.loads({args_literal})
        out = {json}.dumps(target(*args), separators=(",", ":"))
    except BaseException as e:
        msg = type(e).__name__ + ": " + str(e)
        {emit}("{error}" + msg.replace("\n", " "))
        return 1
    {emit}("{result}" + out)
    return 0

{sys}.exit({run}())
"#,
        source = call.source,
        json = marker.ident("json"),
        sys = marker.ident("sys"),
        emit = marker.ident("emit"),
        run = marker.ident("run"),
        name_literal = name_literal,
        args_literal = args_literal,
        missing = marker.missing,
        result = marker.result,
        error = marker.error,
    ))
}

#[async_trait::async_trait]
impl Invoker for PythonInvoker {
    #[tracing::instrument(skip(self, call, limits), fields(function = %call.function_name))]
    async fn invoke(
        &self,
        call: &Invocation,
        limits: &ExecutionLimits,
    ) -> Result<InvokeOutput, InvokeError> {
        if !PY_IDENTIFIER.is_match(&call.function_name) {
            return Err(InvokeError::MissingFunction {
                name: call.function_name.clone(),
            });
        }

        let marker = Marker::new();
        let harness = build_harness(call, &marker)?;

        let case_dir = CaseDir::create(&self.work_dir).await?;
        let script = match case_dir.write("main.py", &harness).await {
            Ok(script) => script,
            Err(e) => {
                case_dir.remove().await;
                return Err(e);
            }
        };

        let mut args: Vec<String> = INTERPRETER_FLAGS.iter().map(|f| f.to_string()).collect();
        args.push(script.to_string_lossy().to_string());

        let output = sandbox::run_sandboxed(
            &self.handle.path,
            &args,
            case_dir.path(),
            limits,
            ResourceLimits::for_case(limits).with_address_space(limits.memory_bytes),
        )
        .await;
        case_dir.remove().await;

        let output = output?;
        tracing::debug!("Python finished: status={:?}", output.status);
        sandbox::extract_result(output, &marker, &call.function_name)
    }
}
