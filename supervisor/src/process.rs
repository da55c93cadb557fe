//! External process supervision
//!
//! A `Process` owns at most one child. Reads (`is_running`, `pid`,
//! `describe`) share the lock; `start` and `terminate` take it exclusively,
//! so a restart can never interleave with a status query. Dropping a
//! `Process` kills a child that is still running.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::RwLock;
use tokio::time::Instant;

use shared::{link_debug, link_info, link_warn, Component, TerminateConfig};

use crate::error::{SupervisorError, SupervisorResult};
use crate::output::OutputMode;
use crate::platform;

#[derive(Default)]
struct ProcessState {
    path: PathBuf,
    working_dir: PathBuf,
    args: Vec<String>,
    /// Mutex so readers can poll `try_wait` under the shared lock
    child: Option<Mutex<Child>>,
}

impl ProcessState {
    fn is_running(&self) -> bool {
        match &self.child {
            Some(child) => {
                let mut child = child.lock().unwrap_or_else(PoisonError::into_inner);
                matches!(child.try_wait(), Ok(None))
            }
            None => false,
        }
    }

    fn pid(&self) -> Option<u32> {
        self.child
            .as_ref()
            .and_then(|child| child.lock().unwrap_or_else(PoisonError::into_inner).id())
    }

    fn label(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Supervised external executable
pub struct Process {
    state: RwLock<ProcessState>,
    terminate: TerminateConfig,
    output: OutputMode,
}

impl Process {
    pub fn new() -> Self {
        Self::with_config(TerminateConfig::default())
    }

    pub fn with_config(terminate: TerminateConfig) -> Self {
        Self {
            state: RwLock::new(ProcessState::default()),
            terminate,
            output: OutputMode::default(),
        }
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn terminate_config(&self) -> &TerminateConfig {
        &self.terminate
    }

    /// Launch `path` with `args` in `working_dir` (empty for the current one).
    ///
    /// A child that is still running is terminated first; if that fails the
    /// call fails and nothing changes. The recorded path, arguments and
    /// working directory are only replaced once the new child has spawned.
    pub async fn start<P, I, S, W>(&self, path: P, args: I, working_dir: W) -> SupervisorResult<u32>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
        W: AsRef<Path>,
    {
        let path = path.as_ref().to_path_buf();
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let working_dir = working_dir.as_ref().to_path_buf();

        let mut state = self.state.write().await;
        if state.is_running() {
            link_info!(
                Component::Supervisor,
                "🔄 Stopping {} before starting {}",
                state.label(),
                path.display()
            );
            self.terminate_locked(&mut state).await?;
        }

        let mut command = Command::new(&path);
        command.args(&args).kill_on_drop(true);
        if !working_dir.as_os_str().is_empty() {
            command.current_dir(&working_dir);
        }
        self.output.configure(&mut command);

        let child = command
            .spawn()
            .map_err(|e| SupervisorError::spawn_failed(path.display().to_string(), e.to_string()))?;
        let pid = child.id().unwrap_or_default();

        *state = ProcessState {
            path,
            working_dir,
            args,
            child: None,
        };
        let child = self.output.attach(child, &state.label());
        state.child = Some(Mutex::new(child));

        link_info!(
            Component::Supervisor,
            "🚀 Started {} (PID: {})",
            state.path.display(),
            pid
        );
        Ok(pid)
    }

    /// True iff a child was started and has not exited yet. Never waits.
    pub async fn is_running(&self) -> bool {
        self.state.read().await.is_running()
    }

    /// OS process id of the current child, if one is held
    pub async fn pid(&self) -> Option<u32> {
        self.state.read().await.pid()
    }

    /// Ask the child to exit, then force it after the grace period.
    ///
    /// `Ok(())` means no child is running any more; calling it without a
    /// child is a no-op.
    pub async fn terminate(&self) -> SupervisorResult<()> {
        let mut state = self.state.write().await;
        self.terminate_locked(&mut state).await
    }

    /// `Process[Path: .., WorkingDir: .., Args: [a] [b] , Running: Yes]`
    pub async fn describe(&self) -> String {
        let state = self.state.read().await;
        let args: String = state.args.iter().map(|arg| format!("[{arg}] ")).collect();
        format!(
            "Process[Path: {}, WorkingDir: {}, Args: {}, Running: {}]",
            state.path.display(),
            state.working_dir.display(),
            args,
            if state.is_running() { "Yes" } else { "No" }
        )
    }

    async fn terminate_locked(&self, state: &mut ProcessState) -> SupervisorResult<()> {
        let Some(child) = state.child.take() else {
            return Ok(());
        };
        let mut child = child.into_inner().unwrap_or_else(PoisonError::into_inner);

        match self.stop_child(&mut child, &state.label()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                state.child = Some(Mutex::new(child));
                Err(e)
            }
        }
    }

    async fn stop_child(&self, child: &mut Child, label: &str) -> SupervisorResult<()> {
        if exited(child) {
            return Ok(());
        }
        let pid = child.id().unwrap_or_default();

        match platform::request_exit(child) {
            Ok(true) => {
                link_debug!(Component::Supervisor, "📤 Asked {} (PID: {}) to exit", label, pid);
                if self.wait_for_exit(child).await {
                    link_info!(Component::Supervisor, "🛑 {} (PID: {}) exited", label, pid);
                    return Ok(());
                }
                link_warn!(
                    Component::Supervisor,
                    "🔨 {} (PID: {}) still running after {:?}; killing",
                    label,
                    pid,
                    self.terminate.grace_period
                );
            }
            Ok(false) => {}
            Err(e) => {
                link_warn!(
                    Component::Supervisor,
                    "Exit request to {} (PID: {}) failed: {}; killing",
                    label,
                    pid,
                    e
                );
            }
        }

        match child.kill().await {
            Ok(()) => Ok(()),
            Err(_) if exited(child) => Ok(()),
            Err(e) => Err(SupervisorError::terminate_failed(pid, e.to_string())),
        }
    }

    /// Poll for exit until the grace period runs out
    async fn wait_for_exit(&self, child: &mut Child) -> bool {
        let deadline = Instant::now() + self.terminate.grace_period;
        loop {
            if exited(child) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.terminate.poll_interval.min(remaining).max(Duration::from_millis(1))).await;
        }
    }
}

impl Default for Process {
    fn default() -> Self {
        Self::new()
    }
}

/// Reaps the child when it has exited
fn exited(child: &mut Child) -> bool {
    !matches!(child.try_wait(), Ok(None))
}
