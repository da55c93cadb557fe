//! SIGTERM backend

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io;
use tokio::process::Child;

pub fn request_exit(child: &mut Child) -> io::Result<bool> {
    let Some(pid) = child.id() else {
        return Ok(false);
    };
    let pid = i32::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(io::Error::from(e)),
    }
}
