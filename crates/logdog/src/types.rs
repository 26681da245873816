use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// One supervised command, resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSpec {
	pub name: String,
	pub command: String,
	pub log_file: PathBuf,
	pub timeout: Duration,
	pub interval: Duration,
	pub shell: String,
	pub working_dir: Option<PathBuf>,
	pub env: HashMap<String, String>,
	/// Append the child's stdout/stderr to `log_file`.
	pub capture_output: bool,
}

impl ProcessSpec {
	pub fn new(
		name: impl Into<String>,
		command: impl Into<String>,
		log_file: impl Into<PathBuf>,
		timeout: Duration,
		interval: Duration,
	) -> Self {
		Self {
			name: name.into(),
			command: command.into(),
			log_file: log_file.into(),
			timeout,
			interval,
			shell: DEFAULT_SHELL.to_string(),
			working_dir: None,
			env: HashMap::new(),
			capture_output: false,
		}
	}
}

pub const DEFAULT_SHELL: &str = "sh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	NotStarted,
	Starting,
	Running,
	Unhealthy,
	Terminating,
	Stopped,
	Failed,
}

impl Phase {
	pub fn is_terminal(&self) -> bool {
		matches!(self, Phase::Stopped | Phase::Failed)
	}
}

impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Phase::NotStarted => "not started",
			Phase::Starting => "starting",
			Phase::Running => "running",
			Phase::Unhealthy => "unhealthy",
			Phase::Terminating => "terminating",
			Phase::Stopped => "stopped",
			Phase::Failed => "failed",
		};
		f.write_str(s)
	}
}

/// Why a running child is being replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
	LivenessLost,
	HealthTimeout { elapsed: Duration },
}

impl fmt::Display for RestartReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RestartReason::LivenessLost => write!(f, "process died"),
			RestartReason::HealthTimeout { elapsed } => {
				write!(f, "no log activity for {}s", elapsed.as_secs())
			}
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorStatus {
	pub name: String,
	pub phase: Phase,
	pub pid: Option<u32>,
	pub retry_count: u32,
	pub max_retries: u32,
	pub restarts: u32,
	pub last_change: SystemTime,
	pub last_failure: Option<SystemTime>,
}

/// Published by a monitor on every state transition worth reporting.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
	Started { pid: u32 },
	SpawnFailed { retry_count: u32, message: String },
	Restarting { reason: RestartReason, retry_count: u32 },
	RetriesForgiven { previous: u32 },
	ProbeFailed { message: String },
	Failed { retry_count: u32 },
	Stopped,
}
