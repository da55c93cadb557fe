//! TerminateProcess backend
//!
//! Windows has no console-less graceful signal, so the request is the
//! termination itself and the poll that follows only observes the exit.

use std::io;
use tokio::process::Child;

pub fn request_exit(child: &mut Child) -> io::Result<bool> {
    if child.id().is_none() {
        return Ok(false);
    }
    child.start_kill().map(|()| true)
}
