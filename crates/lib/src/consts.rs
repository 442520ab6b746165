//! Crate-wide constants.

pub const APP_NAME: &str = "quire";

/// Upper bound on the captured log of one build job, in bytes.
pub const DEFAULT_LOG_CAP: usize = 200_000;

pub const DEFAULT_PASS_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOCK_WAIT_SECS: u64 = 600;

/// Exit status recorded for a process killed by its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = -9;

/// Exit status for a process that terminated without a code, or a job that
/// never reached a subprocess.
pub const NO_EXIT_CODE: i32 = -1;

/// Length of the hex prefix used for project keys in the artifact store.
pub const PROJECT_KEY_LEN: usize = 20;
