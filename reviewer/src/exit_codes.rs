//! Stable exit codes for reviewer CLI commands.

/// Command succeeded; for `review`, the run reached DONE.
pub const OK: i32 = 0;
/// Invalid request or config, or an unexpected error.
pub const INVALID: i32 = 1;
/// `reviewer review` ran but the pipeline halted in FAILED.
pub const FAILED: i32 = 2;
