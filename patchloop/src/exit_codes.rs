//! Stable exit codes for patchloop CLI commands.

/// Command succeeded; for `patchloop run`, validation passed.
pub const OK: i32 = 0;
/// Command failed due to invalid config/usage or another fatal error.
pub const INVALID: i32 = 1;
/// `patchloop run` exhausted its attempt budget without passing validation.
pub const EXHAUSTED: i32 = 3;
