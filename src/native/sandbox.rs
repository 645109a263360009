use std::path::{Path, PathBuf};
use std::process::Stdio;

use lazy_static::lazy_static;
use regex::Regex;
use tokio::fs;
use tokio::process::Command;
use tokio::time::{Duration, Instant, timeout};
use uuid::Uuid;

use crate::constants::{MAX_ERROR_LEN, SANDBOX_GID, SANDBOX_UID};
use crate::core::domain::ExecutionLimits;
use crate::core::traits::invoker::{InvokeError, InvokeOutput};

lazy_static! {
    /// `TypeError: x is not a function`, `ZeroDivisionError: division by zero`
    static ref ERROR_LINE: Regex =
        Regex::new(r"^[A-Za-z_][\w.]*(Error|Exception|Interrupt)\b").unwrap();
}

/// Account a child switches to before it execs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SandboxUser {
    pub uid: u32,
    pub gid: u32,
}

impl SandboxUser {
    /// `nobody` when the harness runs as root. An unprivileged harness cannot
    /// switch users, and its children hold no privileges to drop.
    #[cfg(unix)]
    pub fn for_current_process() -> Option<Self> {
        if unsafe { libc::geteuid() } != 0 {
            return None;
        }
        Some(Self {
            uid: SANDBOX_UID,
            gid: SANDBOX_GID,
        })
    }

    #[cfg(not(unix))]
    pub fn for_current_process() -> Option<Self> {
        None
    }
}

/// Limits applied to the child before it execs.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResourceLimits {
    pub cpu_seconds: u64,
    pub file_size_bytes: u64,
    pub address_space_bytes: Option<u64>,
    /// `RLIMIT_NPROC`. The kernel counts it per real uid and ignores it for
    /// root, so it is only set together with `run_as`.
    pub max_processes: Option<u64>,
    pub run_as: Option<SandboxUser>,
}

impl ResourceLimits {
    pub fn for_case(limits: &ExecutionLimits) -> Self {
        let run_as = SandboxUser::for_current_process();
        Self {
            cpu_seconds: limits.time_ms.div_ceil(1000) + 1,
            file_size_bytes: limits.output_size_bytes.unwrap_or(1024 * 1024),
            address_space_bytes: None,
            max_processes: run_as.and(limits.pids_count),
            run_as,
        }
    }

    pub fn with_address_space(self, bytes: Option<u64>) -> Self {
        Self {
            address_space_bytes: bytes,
            ..self
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProcessOutput {
    pub status: Option<i32>,
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: u64,
}

/// Scratch directory holding the program of a single case.
#[derive(Debug)]
pub struct CaseDir {
    path: PathBuf,
}

impl CaseDir {
    pub async fn create(root: &Path) -> Result<Self, InvokeError> {
        let path = root.join(format!("case_{}", Uuid::new_v4()));
        fs::create_dir_all(&path)
            .await
            .map_err(|e| InvokeError::Internal {
                msg: format!("Failed to create case directory: {}", e),
            })?;
        // Readable by the sandbox user whatever the umask.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(|e| InvokeError::Internal {
                    msg: format!("Failed to open up case directory: {}", e),
                })?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, file_name: &str, contents: &str) -> Result<PathBuf, InvokeError> {
        let file = self.path.join(file_name);
        fs::write(&file, contents)
            .await
            .map_err(|e| InvokeError::Internal {
                msg: format!("Failed to write program file: {}", e),
            })?;
        Ok(file)
    }

    pub async fn remove(self) {
        if let Err(e) = fs::remove_dir_all(&self.path).await {
            tracing::warn!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

/// Markers the generated program prints in front of its verdict lines.
///
/// They are random per invocation so output printed by the submission
/// cannot be mistaken for a result. The same nonce names every identifier the
/// generated wrapper introduces, so none of them can collide with the
/// submission's own names.
#[derive(Clone, Debug)]
pub struct Marker {
    pub nonce: String,
    pub result: String,
    pub error: String,
    pub missing: String,
}

impl Marker {
    pub fn new() -> Self {
        let nonce = Uuid::new_v4().simple().to_string();
        Self {
            result: format!("__harness_result_{}__", nonce),
            error: format!("__harness_error_{}__", nonce),
            missing: format!("__harness_missing_{}__", nonce),
            nonce,
        }
    }

    /// Wrapper-private identifier, e.g. `__harness_fn_<nonce>`.
    pub fn ident(&self, name: &str) -> String {
        format!("__harness_{}_{}", name, self.nonce)
    }
}

impl Default for Marker {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `program args..` inside `work_dir` with a cleared environment,
/// resource limits and a wall-clock timeout. The whole process group is
/// killed when the timeout fires.
#[tracing::instrument(skip(limits, rlimits))]
pub async fn run_sandboxed(
    program: &Path,
    args: &[String],
    work_dir: &Path,
    limits: &ExecutionLimits,
    rlimits: ResourceLimits,
) -> Result<ProcessOutput, InvokeError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(work_dir)
        .env_clear()
        .env("HOME", work_dir)
        .env("LANG", "C.UTF-8")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(path) = std::env::var_os("PATH") {
        cmd.env("PATH", path);
    }
    apply_resource_limits(&mut cmd, rlimits);

    let start_time = Instant::now();
    let child = cmd.spawn().map_err(|e| InvokeError::Internal {
        msg: format!("Failed to spawn {}: {}", program.display(), e),
    })?;
    let pid = child.id();

    let output = match timeout(Duration::from_millis(limits.time_ms), child.wait_with_output()).await
    {
        Ok(output) => output.map_err(|e| InvokeError::Internal {
            msg: format!("Failed to wait for process: {}", e),
        })?,
        Err(_) => {
            // The child itself is killed on drop; its descendants share its group.
            kill_process_group(pid);
            return Err(InvokeError::TimeLimitExceeded {
                time_ms: limits.time_ms,
            });
        }
    };
    let execution_time_ms = start_time.elapsed().as_millis() as u64;

    if let Some(limit) = limits.output_size_bytes {
        if (output.stdout.len() + output.stderr.len()) as u64 > limit {
            return Err(InvokeError::OutputLimitExceeded { limit_bytes: limit });
        }
    }

    let signal = termination_signal(&output.status);
    if signal.is_some_and(is_limit_signal) {
        return Err(InvokeError::TimeLimitExceeded {
            time_ms: limits.time_ms,
        });
    }

    Ok(ProcessOutput {
        status: output.status.code(),
        signal,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        execution_time_ms,
    })
}

/// Splits the program output into the function's verdict and whatever the
/// submission printed itself.
pub fn extract_result(
    output: ProcessOutput,
    marker: &Marker,
    function_name: &str,
) -> Result<InvokeOutput, InvokeError> {
    let mut verdict = None;
    let mut user_lines = Vec::new();

    for line in output.stdout.lines() {
        if let Some(value) = line.strip_prefix(&marker.result) {
            verdict = Some(Ok(value.to_string()));
        } else if let Some(msg) = line.strip_prefix(&marker.error) {
            verdict = Some(Err(InvokeError::Threw {
                msg: truncate(msg.trim()),
            }));
        } else if line.starts_with(&marker.missing) {
            verdict = Some(Err(InvokeError::MissingFunction {
                name: function_name.to_string(),
            }));
        } else {
            user_lines.push(line);
        }
    }

    match verdict {
        Some(Ok(actual_output)) => Ok(InvokeOutput {
            actual_output,
            stdout: user_lines.join("\n").trim_end().to_string(),
            execution_time_ms: output.execution_time_ms,
        }),
        Some(Err(err)) => Err(err),
        None => Err(crash_error(&output)),
    }
}

/// Error for a program that died before printing a verdict, e.g. on a
/// syntax error in the submission.
fn crash_error(output: &ProcessOutput) -> InvokeError {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        return InvokeError::Threw {
            msg: match (output.status, output.signal) {
                (_, Some(signal)) => format!("Process terminated by signal {}", signal),
                (Some(code), _) => format!("Process exited with status {} without a result", code),
                _ => "Process exited without a result".to_string(),
            },
        };
    }

    let msg = stderr
        .lines()
        .find(|line| ERROR_LINE.is_match(line))
        .or_else(|| stderr.lines().rev().find(|line| !line.trim().is_empty()))
        .unwrap_or(stderr);
    InvokeError::Threw {
        msg: truncate(msg.trim()),
    }
}

fn truncate(msg: &str) -> String {
    if msg.len() <= MAX_ERROR_LEN {
        return msg.to_string();
    }
    let mut end = MAX_ERROR_LEN;
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &msg[..end])
}

/// Clamps to the current hard limit so an unprivileged parent never fails
/// the spawn by trying to raise it.
#[cfg(unix)]
macro_rules! set_rlimit {
    ($resource:expr, $value:expr) => {{
        let mut current = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        if unsafe { libc::getrlimit($resource, &mut current) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
        let value = ($value as libc::rlim_t).min(current.rlim_max);
        let limit = libc::rlimit {
            rlim_cur: value,
            rlim_max: value,
        };
        if unsafe { libc::setrlimit($resource, &limit) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }};
}

/// Runs in the forked child right before exec; only async-signal-safe calls.
#[cfg(unix)]
fn restrict_child(rlimits: ResourceLimits) -> std::io::Result<()> {
    if unsafe { libc::setsid() } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    set_rlimit!(libc::RLIMIT_CPU, rlimits.cpu_seconds);
    set_rlimit!(libc::RLIMIT_CORE, 0);
    set_rlimit!(libc::RLIMIT_FSIZE, rlimits.file_size_bytes);
    if let Some(bytes) = rlimits.address_space_bytes {
        set_rlimit!(libc::RLIMIT_AS, bytes);
    }
    if let Some(count) = rlimits.max_processes {
        set_rlimit!(libc::RLIMIT_NPROC, count);
    }
    Ok(())
}

/// The user switch (supplementary groups, then gid, then uid) happens in the
/// child before `restrict_child` runs, so the rlimits are lowered by the
/// sandbox user itself.
#[cfg(unix)]
fn apply_resource_limits(cmd: &mut Command, rlimits: ResourceLimits) {
    if let Some(user) = rlimits.run_as {
        cmd.uid(user.uid).gid(user.gid);
    }
    unsafe {
        cmd.pre_exec(move || restrict_child(rlimits));
    }
}

#[cfg(not(unix))]
fn apply_resource_limits(_cmd: &mut Command, _rlimits: ResourceLimits) {}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(unix)]
fn termination_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn termination_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// CPU limit hit, or killed by the kernel.
#[cfg(unix)]
fn is_limit_signal(signal: i32) -> bool {
    signal == libc::SIGXCPU || signal == libc::SIGKILL
}

#[cfg(not(unix))]
fn is_limit_signal(_signal: i32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(time_ms: u64) -> ExecutionLimits {
        ExecutionLimits {
            time_ms,
            memory_bytes: None,
            output_size_bytes: Some(1024),
            pids_count: None,
        }
    }

    fn output(stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            status: Some(0),
            signal: None,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            execution_time_ms: 7,
        }
    }

    fn work_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("coderunner-harness-test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    }

    #[test]
    fn test_extract_result_separates_user_output() {
        let marker = Marker::new();
        let stdout = format!("debug 1\ndebug 2\n\n{}[0,1]\n", marker.result);

        let result = extract_result(output(&stdout, ""), &marker, "twoSum").unwrap();

        assert_eq!(result.actual_output, "[0,1]");
        assert_eq!(result.stdout, "debug 1\ndebug 2");
        assert_eq!(result.execution_time_ms, 7);
    }

    #[test]
    fn test_extract_result_ignores_foreign_markers() {
        let marker = Marker::new();
        let forged = Marker::new();
        let stdout = format!("{}[9,9]\n{}[0,1]\n", forged.result, marker.result);

        let result = extract_result(output(&stdout, ""), &marker, "f").unwrap();

        assert_eq!(result.actual_output, "[0,1]");
        assert!(result.stdout.contains("[9,9]"));
    }

    #[test]
    fn test_extract_result_errors() {
        let marker = Marker::new();

        let threw = format!("\n{}RangeError: too deep\n", marker.error);
        assert_eq!(
            extract_result(output(&threw, ""), &marker, "f"),
            Err(InvokeError::Threw {
                msg: "RangeError: too deep".to_string()
            })
        );

        let missing = format!("\n{}\n", marker.missing);
        assert_eq!(
            extract_result(output(&missing, ""), &marker, "solve"),
            Err(InvokeError::MissingFunction {
                name: "solve".to_string()
            })
        );
    }

    #[test]
    fn test_crash_picks_error_line_from_stderr() {
        let marker = Marker::new();
        let node_stderr = "/tmp/case/main.js:1\nfunction f( {\n            ^\n\nSyntaxError: Unexpected token '{'\n    at wrapSafe (node:internal/modules/cjs/loader:1378:20)\n";
        let python_stderr = "Traceback (most recent call last):\n  File \"main.py\", line 4, in <module>\n    1 / 0\nZeroDivisionError: division by zero\n";

        assert_eq!(
            extract_result(output("", node_stderr), &marker, "f"),
            Err(InvokeError::Threw {
                msg: "SyntaxError: Unexpected token '{'".to_string()
            })
        );
        assert_eq!(
            extract_result(output("", python_stderr), &marker, "f"),
            Err(InvokeError::Threw {
                msg: "ZeroDivisionError: division by zero".to_string()
            })
        );
        assert!(matches!(
            extract_result(output("", ""), &marker, "f"),
            Err(InvokeError::Threw { .. })
        ));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(MAX_ERROR_LEN);
        let truncated = truncate(&long);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= MAX_ERROR_LEN + 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_sandboxed_captures_output() {
        let dir = work_dir();
        let out = run_sandboxed(
            Path::new("/bin/sh"),
            &["-c".to_string(), "echo out; echo err 1>&2; exit 3".to_string()],
            &dir,
            &limits(5000),
            ResourceLimits::for_case(&limits(5000)),
        )
        .await
        .unwrap();

        assert_eq!(out.status, Some(3));
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_sandboxed_replaces_environment() {
        let dir = work_dir();
        let out = run_sandboxed(
            Path::new("/bin/sh"),
            &["-c".to_string(), "echo \"[$HOME]\"; pwd".to_string()],
            &dir,
            &limits(5000),
            ResourceLimits::for_case(&limits(5000)),
        )
        .await
        .unwrap();

        let canonical = std::fs::canonicalize(&dir).unwrap();
        assert_eq!(
            out.stdout,
            format!("[{}]\n{}\n", dir.display(), canonical.display())
        );
        let _ = std::fs::remove_dir_all(dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_sandboxed_times_out() {
        let dir = work_dir();
        let start = Instant::now();
        let result = run_sandboxed(
            Path::new("/bin/sh"),
            &["-c".to_string(), "sleep 5".to_string()],
            &dir,
            &limits(200),
            ResourceLimits::for_case(&limits(200)),
        )
        .await;

        assert_eq!(result.unwrap_err(), InvokeError::TimeLimitExceeded { time_ms: 200 });
        assert!(start.elapsed() < Duration::from_secs(3));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_sandboxed_output_limit() {
        let dir = work_dir();
        let result = run_sandboxed(
            Path::new("/bin/sh"),
            &["-c".to_string(), "i=0; while [ $i -lt 200 ]; do echo 0123456789; i=$((i+1)); done".to_string()],
            &dir,
            &limits(5000),
            ResourceLimits::for_case(&limits(5000)),
        )
        .await;

        assert_eq!(
            result.unwrap_err(),
            InvokeError::OutputLimitExceeded { limit_bytes: 1024 }
        );
        let _ = std::fs::remove_dir_all(dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_sandboxed_caps_process_count() {
        if unsafe { libc::geteuid() } != 0 {
            eprintln!("skipping: the process cap needs a dedicated sandbox user");
            return;
        }
        let dir = work_dir();
        // A user of its own, so concurrently running tests do not count.
        let rlimits = ResourceLimits {
            max_processes: Some(8),
            run_as: Some(SandboxUser {
                uid: 65533,
                gid: 65533,
            }),
            ..ResourceLimits::for_case(&limits(3000))
        };

        let result = run_sandboxed(
            Path::new("/bin/sh"),
            &[
                "-c".to_string(),
                "i=0; while [ $i -lt 40 ]; do sleep 5 >/dev/null 2>&1 & i=$((i+1)); done; echo spawned".to_string(),
            ],
            &dir,
            &limits(3000),
            rlimits,
        )
        .await;

        match result {
            Ok(out) => {
                assert!(!out.stdout.contains("spawned"), "{:?}", out);
                assert_ne!(out.status, Some(0), "{:?}", out);
            }
            Err(err) => assert_eq!(err, InvokeError::TimeLimitExceeded { time_ms: 3000 }),
        }
        let _ = std::fs::remove_dir_all(dir);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_cap_requires_sandbox_user() {
        let limits = ExecutionLimits {
            pids_count: Some(64),
            ..limits(1000)
        };

        let rlimits = ResourceLimits::for_case(&limits);

        if unsafe { libc::geteuid() } == 0 {
            assert_eq!(
                rlimits.run_as,
                Some(SandboxUser {
                    uid: SANDBOX_UID,
                    gid: SANDBOX_GID
                })
            );
            assert_eq!(rlimits.max_processes, Some(64));
        } else {
            assert_eq!(rlimits.run_as, None);
            assert_eq!(rlimits.max_processes, None);
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_internal_error() {
        let dir = work_dir();
        let result = run_sandboxed(
            Path::new("/definitely/not/here"),
            &[],
            &dir,
            &limits(1000),
            ResourceLimits::for_case(&limits(1000)),
        )
        .await;

        assert!(matches!(result, Err(InvokeError::Internal { .. })));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_case_dir_lifecycle() {
        let root = work_dir();
        let case_dir = CaseDir::create(&root).await.unwrap();
        let file = case_dir.write("main.js", "1;").await.unwrap();
        assert!(file.exists());

        let path = case_dir.path().to_path_buf();
        case_dir.remove().await;
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(root);
    }
}
