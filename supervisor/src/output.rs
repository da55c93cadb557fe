//! Child process stdout/stderr routing
//!
//! - `Inherit`: the child writes straight to the supervisor's stdout/stderr
//! - `Discard`: output goes to the null device
//! - `Log`: output is piped and re-emitted line by line through tracing

use std::fmt;
use std::process::Stdio;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use shared::{link_debug, link_info, link_warn, Component};

use crate::error::SupervisorError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    #[default]
    Inherit,
    Discard,
    Log,
}

impl OutputMode {
    /// Configure stdio on a command before it is spawned
    pub fn configure(&self, command: &mut Command) {
        command.stdin(Stdio::null());
        match self {
            OutputMode::Inherit => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputMode::Discard => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
            OutputMode::Log => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }
    }

    /// Start consuming piped output so the child never blocks on a full pipe
    pub fn attach(&self, mut child: Child, label: &str) -> Child {
        if *self != OutputMode::Log {
            return child;
        }

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, label.to_string(), false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, label.to_string(), true));
        }
        child
    }
}

async fn forward_lines<R>(stream: R, label: String, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            link_warn!(Component::Supervisor, "[{}] {}", label, line);
        } else {
            link_info!(Component::Supervisor, "[{}] {}", label, line);
        }
    }
    link_debug!(Component::Supervisor, "Output of {} closed", label);
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Inherit => write!(f, "inherit"),
            OutputMode::Discard => write!(f, "discard"),
            OutputMode::Log => write!(f, "log"),
        }
    }
}

impl FromStr for OutputMode {
    type Err = SupervisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inherit" => Ok(OutputMode::Inherit),
            "discard" | "null" => Ok(OutputMode::Discard),
            "log" => Ok(OutputMode::Log),
            _ => Err(SupervisorError::InvalidOutputMode {
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output_mode() {
        assert_eq!("inherit".parse::<OutputMode>().unwrap(), OutputMode::Inherit);
        assert_eq!("LOG".parse::<OutputMode>().unwrap(), OutputMode::Log);
        assert_eq!("null".parse::<OutputMode>().unwrap(), OutputMode::Discard);
        assert!("console".parse::<OutputMode>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for mode in [OutputMode::Inherit, OutputMode::Discard, OutputMode::Log] {
            assert_eq!(mode.to_string().parse::<OutputMode>().unwrap(), mode);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_log_mode_drains_piped_output() {
        let mode = OutputMode::Log;
        let mut command = Command::new("sh");
        command.arg("-c").arg("echo out; echo err >&2");
        mode.configure(&mut command);

        let mut child = mode.attach(command.spawn().unwrap(), "echo");
        assert!(child.stdout.is_none());
        assert!(child.stderr.is_none());

        let status = child.wait().await.unwrap();
        assert!(status.success());
    }
}
