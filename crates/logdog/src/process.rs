use std::fs::OpenOptions;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

use crate::error::SpawnError;
use crate::types::ProcessSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminatePolicy {
	/// How long SIGTERM gets before escalating.
	pub grace: Duration,
	/// How long to wait for the reap after SIGKILL.
	pub reap: Duration,
}

impl Default for TerminatePolicy {
	fn default() -> Self {
		Self {
			grace: Duration::from_secs(5),
			reap: Duration::from_secs(2),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
	NotRunning,
	Exited,
	Killed,
	/// SIGKILL sent but the exit could not be confirmed in time.
	Unconfirmed,
}

/// Exactly one OS child, running in its own process group.
#[derive(Debug)]
pub struct ProcessHandle {
	child: Child,
	pid: u32,
}

impl ProcessHandle {
	/// Launch `spec.command` through `spec.shell -c`.
	pub fn spawn(spec: &ProcessSpec) -> Result<Self, SpawnError> {
		let spawn_error = |source: std::io::Error| SpawnError {
			command: spec.command.clone(),
			source,
		};

		let mut cmd = Command::new(&spec.shell);
		cmd.args(["-c", &spec.command])
			.stdin(Stdio::null())
			.process_group(0)
			.kill_on_drop(true);

		if let Some(dir) = &spec.working_dir {
			cmd.current_dir(dir);
		}
		for (key, val) in &spec.env {
			cmd.env(key, val);
		}

		if spec.capture_output {
			let file = OpenOptions::new()
				.create(true)
				.append(true)
				.open(&spec.log_file)
				.map_err(spawn_error)?;
			let err_file = file.try_clone().map_err(spawn_error)?;
			cmd.stdout(Stdio::from(file)).stderr(Stdio::from(err_file));
		} else {
			cmd.stdout(Stdio::null()).stderr(Stdio::null());
		}

		let child = cmd.spawn().map_err(spawn_error)?;
		let pid = child.id().ok_or_else(|| {
			spawn_error(std::io::Error::other("child exited before its pid was read"))
		})?;
		Ok(Self { child, pid })
	}

	pub fn pid(&self) -> u32 {
		self.pid
	}

	/// Non-destructive liveness check. Reaps the child if it has exited,
	/// so a dead child is never mistaken for a live zombie.
	pub fn probe_alive(&mut self) -> bool {
		match self.child.try_wait() {
			Ok(None) => true,
			Ok(Some(status)) => {
				tracing::debug!(pid = self.pid, "child exited: {}", describe(status));
				false
			}
			Err(e) => {
				tracing::warn!(pid = self.pid, "cannot query child status: {}", e);
				false
			}
		}
	}

	/// SIGTERM the process group, wait `grace`, then SIGKILL and wait `reap`.
	/// The group is signalled even when the leader is already gone, so
	/// background jobs of a dead shell go down with it. Consumes the handle
	/// whatever happens.
	pub async fn terminate(mut self, policy: TerminatePolicy) -> TerminateOutcome {
		let pgid = Pid::from_raw(self.pid as i32);

		if let Ok(Some(status)) = self.child.try_wait() {
			tracing::debug!(pid = self.pid, "leader already exited: {}", describe(status));
			if !group_alive(pgid) {
				return TerminateOutcome::Exited;
			}
			tracing::info!(pid = self.pid, "stopping leftover process group");
		} else {
			tracing::info!(pid = self.pid, "stopping process");
		}

		match killpg(pgid, Signal::SIGTERM) {
			Ok(()) => {}
			Err(Errno::ESRCH) => {
				let _ = self.child.start_kill();
			}
			Err(e) => {
				tracing::warn!(pid = self.pid, "SIGTERM failed: {}", e);
				let _ = self.child.start_kill();
			}
		}

		match tokio::time::timeout(policy.grace, self.wait_group(pgid)).await {
			Ok(()) => {
				tracing::info!(pid = self.pid, "process group stopped");
				return TerminateOutcome::Exited;
			}
			Err(_) => {
				tracing::warn!(
					pid = self.pid,
					"still running after {:?}, sending SIGKILL",
					policy.grace
				);
			}
		}

		let _ = killpg(pgid, Signal::SIGKILL);
		let _ = self.child.start_kill();

		match tokio::time::timeout(policy.reap, self.wait_group(pgid)).await {
			Ok(()) => {
				tracing::info!(pid = self.pid, "process group killed");
				TerminateOutcome::Killed
			}
			Err(_) => {
				tracing::error!(
					pid = self.pid,
					"process group may not have exited after SIGKILL"
				);
				TerminateOutcome::Unconfirmed
			}
		}
	}

	// Reap the leader, then poll until no member of the group is left.
	async fn wait_group(&mut self, pgid: Pid) {
		if let Err(e) = self.child.wait().await {
			tracing::warn!(pid = self.pid, "waiting for exit failed: {}", e);
		}
		while group_alive(pgid) {
			tokio::time::sleep(GROUP_POLL).await;
		}
	}
}

const GROUP_POLL: Duration = Duration::from_millis(50);

/// Whether any process is left in the group. `ESRCH` means it is empty.
fn group_alive(pgid: Pid) -> bool {
	!matches!(killpg(pgid, None), Err(Errno::ESRCH))
}

fn describe(status: ExitStatus) -> String {
	use std::os::unix::process::ExitStatusExt;
	match (status.code(), status.signal()) {
		(Some(code), _) => format!("exit {}", code),
		(None, Some(sig)) => format!("signal {}", sig),
		_ => "unknown status".to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn spec(command: &str, dir: &std::path::Path) -> ProcessSpec {
		ProcessSpec::new(
			"test",
			command,
			dir.join("test.log"),
			Duration::from_secs(60),
			Duration::from_secs(5),
		)
	}

	#[tokio::test]
	async fn spawn_and_terminate() {
		let dir = tempfile::tempdir().unwrap();
		let mut handle = ProcessHandle::spawn(&spec("sleep 30", dir.path())).unwrap();
		assert!(handle.pid() > 0);
		assert!(handle.probe_alive());

		let outcome = handle.terminate(TerminatePolicy::default()).await;
		assert_eq!(outcome, TerminateOutcome::Exited);
	}

	#[tokio::test]
	async fn probe_detects_exit() {
		let dir = tempfile::tempdir().unwrap();
		let mut handle = ProcessHandle::spawn(&spec("exit 3", dir.path())).unwrap();
		tokio::time::sleep(Duration::from_millis(300)).await;
		assert!(!handle.probe_alive());
	}

	#[tokio::test]
	async fn escalates_to_sigkill() {
		let dir = tempfile::tempdir().unwrap();
		let stubborn = spec("trap '' TERM; while true; do sleep 0.1; done", dir.path());
		let handle = ProcessHandle::spawn(&stubborn).unwrap();
		tokio::time::sleep(Duration::from_millis(200)).await;

		let policy = TerminatePolicy {
			grace: Duration::from_millis(300),
			reap: Duration::from_secs(2),
		};
		assert_eq!(handle.terminate(policy).await, TerminateOutcome::Killed);
	}

	#[tokio::test]
	async fn terminate_clears_group_after_leader_exit() {
		let dir = tempfile::tempdir().unwrap();
		let mut handle = ProcessHandle::spawn(&spec("sleep 300 & exit 0", dir.path())).unwrap();
		let pgid = Pid::from_raw(handle.pid() as i32);
		tokio::time::sleep(Duration::from_millis(300)).await;

		assert!(!handle.probe_alive());
		assert!(group_alive(pgid), "background sleep should still be running");

		let outcome = handle.terminate(TerminatePolicy::default()).await;
		assert_eq!(outcome, TerminateOutcome::Exited);
		assert!(!group_alive(pgid));
	}

	#[tokio::test]
	async fn missing_shell_is_spawn_error() {
		let dir = tempfile::tempdir().unwrap();
		let mut bad = spec("true", dir.path());
		bad.shell = "/nonexistent/logdog-shell".into();
		let err = ProcessHandle::spawn(&bad).unwrap_err();
		assert_eq!(err.command, "true");
	}

	#[tokio::test]
	async fn captures_output_into_log() {
		let dir = tempfile::tempdir().unwrap();
		let mut echo = spec("echo captured-line", dir.path());
		echo.capture_output = true;
		let handle = ProcessHandle::spawn(&echo).unwrap();
		tokio::time::sleep(Duration::from_millis(300)).await;
		handle.terminate(TerminatePolicy::default()).await;

		let text = std::fs::read_to_string(&echo.log_file).unwrap();
		assert!(text.contains("captured-line"), "log was: {}", text);
	}
}
