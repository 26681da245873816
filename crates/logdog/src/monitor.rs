use std::time::{Duration, SystemTime};

use tokio::sync::{broadcast, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{MonitorError, SpawnError};
use crate::health::{self, Health, HealthTracker};
use crate::logs;
use crate::probe;
use crate::process::{ProcessHandle, TerminateOutcome, TerminatePolicy};
use crate::types::*;

pub const MAX_RETRIES: u32 = 3;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
	pub max_retries: u32,
	/// Backoff after a failed spawn is `retry_count * backoff_step`.
	pub backoff_step: Duration,
	/// Consecutive healthy checks that forgive earlier failures.
	pub stable_checks: u32,
	pub terminate: TerminatePolicy,
}

impl Default for RestartPolicy {
	fn default() -> Self {
		Self {
			max_retries: MAX_RETRIES,
			backoff_step: Duration::from_secs(5),
			stable_checks: 10,
			terminate: TerminatePolicy::default(),
		}
	}
}

pub fn backoff_delay(retry_count: u32, step: Duration) -> Duration {
	step * retry_count
}

pub struct Monitor {
	spec: ProcessSpec,
	policy: RestartPolicy,
	state: RwLock<MonitorState>,
	cancel: CancellationToken,
	events: broadcast::Sender<MonitorEvent>,
}

struct MonitorState {
	phase: Phase,
	child: Option<ProcessHandle>,
	health: HealthTracker,
	retry_count: u32,
	restarts: u32,
	stable_checks: u32,
	last_failure: Option<SystemTime>,
}

pub(crate) enum Step {
	Healthy,
	Skipped,
	Restart(RestartReason),
}

enum RestartFailure {
	Exhausted,
	Backoff(Duration),
}

impl Monitor {
	pub fn new(spec: ProcessSpec, policy: RestartPolicy, cancel: CancellationToken) -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		Self {
			spec,
			policy,
			state: RwLock::new(MonitorState {
				phase: Phase::NotStarted,
				child: None,
				health: HealthTracker::new(SystemTime::now()),
				retry_count: 0,
				restarts: 0,
				stable_checks: 0,
				last_failure: None,
			}),
			cancel,
			events,
		}
	}

	pub fn name(&self) -> &str {
		&self.spec.name
	}

	pub fn spec(&self) -> &ProcessSpec {
		&self.spec
	}

	pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
		self.events.subscribe()
	}

	/// Ask this monitor, and only this one, to stop.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	pub async fn status(&self) -> MonitorStatus {
		let state = self.state.read().await;
		MonitorStatus {
			name: self.spec.name.clone(),
			phase: state.phase,
			pid: state.child.as_ref().map(|c| c.pid()),
			retry_count: state.retry_count,
			max_retries: self.policy.max_retries,
			restarts: state.restarts,
			last_change: state.health.last_change(),
			last_failure: state.last_failure,
		}
	}

	/// Spawn the command, replacing any child that is still around.
	/// A failed spawn counts against the retry budget.
	pub async fn start(&self) -> Result<u32, SpawnError> {
		let result = self.launch().await;
		if let Err(e) = &result {
			let retry_count = {
				let mut state = self.state.write().await;
				state.retry_count = (state.retry_count + 1).min(self.policy.max_retries);
				state.retry_count
			};
			self.emit_spawn_failed(retry_count, e);
		}
		result
	}

	/// Stop the current child, if any. Safe to call repeatedly.
	pub async fn terminate_child(&self) -> TerminateOutcome {
		let child = self.state.write().await.child.take();
		match child {
			Some(handle) => handle.terminate(self.policy.terminate).await,
			None => TerminateOutcome::NotRunning,
		}
	}

	/// Supervise until cancelled (`Ok`) or out of retries (`Err`).
	pub async fn run(&self) -> Result<(), MonitorError> {
		let name = self.spec.name.as_str();
		tracing::info!(
			process = name,
			log = %self.spec.log_file.display(),
			timeout = ?self.spec.timeout,
			interval = ?self.spec.interval,
			max_retries = self.policy.max_retries,
			"starting monitor"
		);

		match logs::ensure_log_file(&self.spec.log_file) {
			Ok(true) => tracing::info!(process = name, "created log file {}", self.spec.log_file.display()),
			Ok(false) => {}
			Err(source) => {
				let err = MonitorError::Prepare {
					name: name.to_string(),
					path: self.spec.log_file.clone(),
					source,
				};
				tracing::error!(process = name, "{}", err);
				return self.finish(Err(err)).await;
			}
		}

		if let Err(e) = self.start().await {
			tracing::error!(process = name, "{}", e);
			let retry_count = self.state.read().await.retry_count;
			if retry_count >= self.policy.max_retries {
				return self.finish(Err(self.exhausted())).await;
			}
			if !self.backoff(retry_count).await {
				return self.finish(Ok(())).await;
			}
		}

		let interval = self.spec.interval;
		let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		let outcome = loop {
			tokio::select! {
				_ = self.cancel.cancelled() => break Ok(()),
				_ = ticker.tick() => {}
			}

			let reason = match self.check().await {
				Step::Restart(reason) => reason,
				Step::Healthy | Step::Skipped => continue,
			};

			match self.restart(reason).await {
				Ok(()) => {}
				Err(RestartFailure::Exhausted) => break Err(self.exhausted()),
				Err(RestartFailure::Backoff(delay)) => {
					tracing::info!(process = name, "waiting {:?} before next attempt", delay);
					if !self.sleep_or_cancel(delay).await {
						break Ok(());
					}
					ticker.reset();
				}
			}
		};

		self.finish(outcome).await
	}

	/// One control-loop tick: liveness first, then log activity.
	pub(crate) async fn check(&self) -> Step {
		let name = self.spec.name.as_str();

		let dead = {
			let mut state = self.state.write().await;
			let alive = state.child.as_mut().is_some_and(|c| c.probe_alive());
			if alive {
				None
			} else {
				state.stable_checks = 0;
				state.phase = Phase::Unhealthy;
				Some(state.child.take())
			}
		};
		if let Some(dead) = dead {
			tracing::warn!(process = name, "process is not running");
			// the leader is gone but its group may not be
			if let Some(handle) = dead {
				handle.terminate(self.policy.terminate).await;
			}
			return Step::Restart(RestartReason::LivenessLost);
		}

		let seen = match probe::probe(&self.spec.log_file).await {
			Ok(seen) => seen,
			Err(e) => {
				tracing::warn!(process = name, "log check failed: {}", e);
				let _ = self.events.send(MonitorEvent::ProbeFailed {
					message: e.to_string(),
				});
				return Step::Skipped;
			}
		};

		let mut state = self.state.write().await;
		let health = state.health.observe(seen, SystemTime::now(), self.spec.timeout);
		match health {
			Health::TimedOut { elapsed } => {
				state.stable_checks = 0;
				state.phase = Phase::Unhealthy;
				tracing::warn!(
					process = name,
					"no log activity for {}s (limit {}s)",
					elapsed.as_secs(),
					self.spec.timeout.as_secs()
				);
				Step::Restart(RestartReason::HealthTimeout { elapsed })
			}
			Health::Baseline => {
				tracing::debug!(process = name, size = seen.size, "log baseline recorded");
				self.record_healthy(&mut state, health);
				Step::Healthy
			}
			Health::Active => {
				tracing::debug!(process = name, size = seen.size, "log activity");
				self.record_healthy(&mut state, health);
				Step::Healthy
			}
			Health::Waiting { elapsed } => {
				if health::notice_due(elapsed) {
					tracing::info!(
						process = name,
						"waiting for log activity ({}s/{}s)",
						elapsed.as_secs(),
						self.spec.timeout.as_secs()
					);
				}
				self.record_healthy(&mut state, health);
				Step::Healthy
			}
		}
	}

	// Single place where earlier failures are forgiven: on fresh log
	// activity, or after `stable_checks` healthy checks in a row.
	fn record_healthy(&self, state: &mut MonitorState, health: Health) {
		state.phase = Phase::Running;
		state.stable_checks += 1;

		let stable = state.stable_checks >= self.policy.stable_checks;
		if stable {
			state.stable_checks = 0;
		}

		if (stable || health == Health::Active) && state.retry_count > 0 {
			let previous = state.retry_count;
			state.retry_count = 0;
			tracing::info!(process = self.spec.name.as_str(), previous, "retry counter reset");
			let _ = self.events.send(MonitorEvent::RetriesForgiven { previous });
		}
	}

	async fn restart(&self, reason: RestartReason) -> Result<(), RestartFailure> {
		let name = self.spec.name.as_str();
		let retry_count = {
			let mut state = self.state.write().await;
			if state.retry_count >= self.policy.max_retries {
				return Err(RestartFailure::Exhausted);
			}
			state.retry_count += 1;
			state.restarts += 1;
			state.stable_checks = 0;
			state.retry_count
		};

		tracing::warn!(
			process = name,
			reason = %reason,
			retry = retry_count,
			max_retries = self.policy.max_retries,
			"restarting"
		);
		let _ = self.events.send(MonitorEvent::Restarting { reason, retry_count });

		match self.launch().await {
			Ok(_) => Ok(()),
			Err(e) => {
				tracing::error!(process = name, "restart failed: {}", e);
				self.emit_spawn_failed(retry_count, &e);
				if retry_count >= self.policy.max_retries {
					Err(RestartFailure::Exhausted)
				} else {
					Err(RestartFailure::Backoff(backoff_delay(
						retry_count,
						self.policy.backoff_step,
					)))
				}
			}
		}
	}

	// Never hold the lock across a termination.
	async fn launch(&self) -> Result<u32, SpawnError> {
		let name = self.spec.name.as_str();
		let previous = {
			let mut state = self.state.write().await;
			state.phase = Phase::Starting;
			state.child.take()
		};
		if let Some(previous) = previous {
			previous.terminate(self.policy.terminate).await;
		}

		tracing::info!(process = name, "running: {}", self.spec.command);
		let spawned = ProcessHandle::spawn(&self.spec);
		let mut state = self.state.write().await;
		match spawned {
			Ok(handle) => {
				let pid = handle.pid();
				state.child = Some(handle);
				state.phase = Phase::Running;
				// retry_count stays until the new child proves itself
				state.health.rebase(SystemTime::now());
				tracing::info!(process = name, pid, "process started");
				let _ = self.events.send(MonitorEvent::Started { pid });
				Ok(pid)
			}
			Err(e) => {
				state.phase = Phase::Unhealthy;
				state.last_failure = Some(SystemTime::now());
				Err(e)
			}
		}
	}

	fn emit_spawn_failed(&self, retry_count: u32, e: &SpawnError) {
		let _ = self.events.send(MonitorEvent::SpawnFailed {
			retry_count,
			message: e.to_string(),
		});
	}

	async fn backoff(&self, retry_count: u32) -> bool {
		let delay = backoff_delay(retry_count, self.policy.backoff_step);
		tracing::info!(process = self.spec.name.as_str(), "waiting {:?} before next attempt", delay);
		self.sleep_or_cancel(delay).await
	}

	/// Returns `false` if cancelled before the delay elapsed.
	async fn sleep_or_cancel(&self, delay: Duration) -> bool {
		tokio::select! {
			_ = self.cancel.cancelled() => false,
			_ = tokio::time::sleep(delay) => true,
		}
	}

	fn exhausted(&self) -> MonitorError {
		MonitorError::RetriesExhausted {
			name: self.spec.name.clone(),
			retries: self.policy.max_retries,
		}
	}

	// Every exit path ends here: stop the loop's token, kill the child,
	// then publish the terminal phase.
	async fn finish(&self, outcome: Result<(), MonitorError>) -> Result<(), MonitorError> {
		let name = self.spec.name.as_str();
		if outcome.is_err() {
			self.cancel.cancel();
		}

		let child = {
			let mut state = self.state.write().await;
			state.phase = Phase::Terminating;
			state.child.take()
		};
		if let Some(handle) = child {
			handle.terminate(self.policy.terminate).await;
		}

		let mut state = self.state.write().await;

		match &outcome {
			Ok(()) => {
				state.phase = Phase::Stopped;
				tracing::info!(process = name, "monitor stopped");
				let _ = self.events.send(MonitorEvent::Stopped);
			}
			Err(e) => {
				state.phase = Phase::Failed;
				let last_failure = state
					.last_failure
					.and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
					.map(|d| d.as_secs());
				tracing::error!(
					process = name,
					retry = state.retry_count,
					last_failure_unix = ?last_failure,
					"{}; check the command and configuration",
					e
				);
				let _ = self.events.send(MonitorEvent::Failed {
					retry_count: state.retry_count,
				});
			}
		}
		outcome
	}
}
