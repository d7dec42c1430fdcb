//! Stable exit codes for evolver CLI commands.

/// Run converged, or a non-run command succeeded.
pub const OK: i32 = 0;
/// Invalid problem/config/arguments or any other error.
pub const INVALID: i32 = 1;
/// `evolver run` used every generation without a perfect candidate.
pub const EXHAUSTED: i32 = 2;
/// `evolver run` was cancelled between generations.
pub const CANCELLED: i32 = 3;
