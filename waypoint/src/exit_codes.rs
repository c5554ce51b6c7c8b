//! Stable exit codes for waypoint CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Unrecoverable failure: unreadable files, invalid config, unknown workflow.
pub const ERROR: i32 = 1;
/// `waypoint validate --strict` found at least one error.
pub const VALIDATION_FAILED: i32 = 3;
/// `waypoint loop-result` rejected a malformed or stale LOOP_RESULT.
pub const RECORD_REJECTED: i32 = 4;
