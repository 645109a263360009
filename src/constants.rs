pub const DEFAULT_CASE_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_MEMORY_LIMIT_BYTES: u64 = 256 * 1024 * 1024;
pub const DEFAULT_OUTPUT_LIMIT_BYTES: u64 = 1024 * 1024;
pub const DEFAULT_BOOTSTRAP_TIMEOUT_MS: u64 = 10_000;
/// Leaves room for V8's worker threads, which count as processes.
pub const DEFAULT_PIDS_COUNT: u64 = 256;
/// `nobody`; children are moved to it when the harness runs as root.
pub const SANDBOX_UID: u32 = 65534;
pub const SANDBOX_GID: u32 = 65534;
pub const DEFAULT_WORK_DIR_NAME: &str = "coderunner-harness";

pub const CANCELLED_CASE_MSG: &str = "run cancelled before this case executed";
pub const CANCELLED_RUN_MSG: &str = "run cancelled";
pub const EMPTY_CASES_MSG: &str =
    "No test cases were supplied; refusing to report a vacuous pass";

/// Longest error text copied from a child's stderr into a result.
pub const MAX_ERROR_LEN: usize = 2048;
