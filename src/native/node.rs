use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

use crate::core::{
    domain::{ExecutionLimits, Invocation},
    traits::invoker::{InvokeError, InvokeOutput, Invoker},
};
use crate::native::sandbox::{self, CaseDir, Marker, ResourceLimits};

lazy_static! {
    static ref JS_IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
}

/// Runs already normalized JavaScript on Node, one fresh process per case.
#[derive(Clone, Debug)]
pub struct NodeInvoker {
    node_path: PathBuf,
    work_dir: PathBuf,
}

impl NodeInvoker {
    pub fn new<T, U>(node_path: T, work_dir: U) -> Self
    where
        T: AsRef<Path>,
        U: AsRef<Path>,
    {
        NodeInvoker {
            node_path: node_path.as_ref().into(),
            work_dir: work_dir.as_ref().into(),
        }
    }

    fn node_args(script: &Path, limits: &ExecutionLimits) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(bytes) = limits.memory_bytes {
            args.push(format!(
                "--max-old-space-size={}",
                (bytes / (1024 * 1024)).max(16)
            ));
        }
        args.push("--disallow-code-generation-from-strings".to_string());
        args.push(script.to_string_lossy().to_string());
        args
    }
}

/// Source followed by a call of the named function with the spread arguments.
///
/// The function is bound at top level right after the source, before any
/// wrapper name exists, and every wrapper name carries the marker nonce.
pub fn build_unit(call: &Invocation, marker: &Marker) -> Result<String, InvokeError> {
    let args_json = serde_json::to_string(&call.args).map_err(|e| InvokeError::Internal {
        msg: format!("Failed to encode arguments: {}", e),
    })?;
    let args_literal = serde_json::to_string(&args_json).map_err(|e| InvokeError::Internal {
        msg: format!("Failed to encode arguments: {}", e),
    })?;

    Ok(format!(
        r#"{source}
;const {target} = (() => {{ try {{ return {name}; }} catch ({err}) {{ return undefined; }} }})();
;(() => {{
  const {emit} = (line) => process.stdout.write("\n" + line + "\n");
  if (typeof {target} !== "function") {{
    {emit}("{missing}");
    process.exitCode = 1;
    return;
  }}
  try {{
    const {out} = JSON.stringify({target}(...JSON.parse({args_literal})));
    {emit}("{result}" + ({out} === undefined ? "null" : {out}));
  }} catch ({err}) {{
    const {msg} = {err} instanceof Error ? {err}.name + ": " + {err}.message : String({err});
    {emit}("{error}" + {msg}.replace(/\r?\n/g, " "));
    process.exitCode = 1;
  }}
}})();
"#,
        source = call.source,
        name = call.function_name,
        target = marker.ident("fn"),
        emit = marker.ident("emit"),
        out = marker.ident("out"),
        err = marker.ident("err"),
        msg = marker.ident("msg"),
        args_literal = args_literal,
        missing = marker.missing,
        result = marker.result,
        error = marker.error,
    ))
}

#[async_trait::async_trait]
impl Invoker for NodeInvoker {
    #[tracing::instrument(skip(self, call, limits), fields(function = %call.function_name))]
    async fn invoke(
        &self,
        call: &Invocation,
        limits: &ExecutionLimits,
    ) -> Result<InvokeOutput, InvokeError> {
        if !JS_IDENTIFIER.is_match(&call.function_name) {
            return Err(InvokeError::MissingFunction {
                name: call.function_name.clone(),
            });
        }

        let marker = Marker::new();
        let unit = build_unit(call, &marker)?;

        let case_dir = CaseDir::create(&self.work_dir).await?;
        let script = match case_dir.write("main.js", &unit).await {
            Ok(script) => script,
            Err(e) => {
                case_dir.remove().await;
                return Err(e);
            }
        };

        let output = sandbox::run_sandboxed(
            &self.node_path,
            &Self::node_args(&script, limits),
            case_dir.path(),
            limits,
            ResourceLimits::for_case(limits),
        )
        .await;
        case_dir.remove().await;

        let output = output?;
        tracing::debug!("Node finished: status={:?}", output.status);
        sandbox::extract_result(output, &marker, &call.function_name)
    }
}
