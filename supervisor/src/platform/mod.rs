//! Per-platform graceful exit requests
//!
//! Every backend exposes `request_exit`, which asks a child to stop and
//! reports whether the request was delivered (`false` when the child is
//! already gone). Escalation to a forced kill is common code in `process`.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::request_exit;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::request_exit;
