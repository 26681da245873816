use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::MonitorError;
use crate::monitor::{Monitor, RestartPolicy};
use crate::types::{MonitorStatus, ProcessSpec};

/// Runs one [`Monitor`] per spec and shuts them all down together.
pub struct SupervisorGroup {
	monitors: Vec<Arc<Monitor>>,
	shutdown: CancellationToken,
	tasks: Vec<(Arc<Monitor>, JoinHandle<Result<(), MonitorError>>)>,
	started: bool,
}

#[derive(Debug)]
pub enum Outcome {
	Stopped,
	Failed(MonitorError),
	Panicked(String),
}

impl Outcome {
	pub fn is_failure(&self) -> bool {
		!matches!(self, Outcome::Stopped)
	}
}

#[derive(Debug)]
pub struct GroupReport {
	pub outcomes: Vec<(String, Outcome)>,
	pub shutdown_requested: bool,
}

impl GroupReport {
	pub fn all_failed(&self) -> bool {
		!self.outcomes.is_empty() && self.outcomes.iter().all(|(_, o)| o.is_failure())
	}
}

impl SupervisorGroup {
	pub fn new(specs: Vec<ProcessSpec>) -> Self {
		Self::with_policy(specs, RestartPolicy::default())
	}

	pub fn with_policy(specs: Vec<ProcessSpec>, policy: RestartPolicy) -> Self {
		let shutdown = CancellationToken::new();
		let monitors = specs
			.into_iter()
			.map(|spec| Arc::new(Monitor::new(spec, policy, shutdown.child_token())))
			.collect();
		Self {
			monitors,
			shutdown,
			tasks: Vec::new(),
			started: false,
		}
	}

	pub fn monitors(&self) -> &[Arc<Monitor>] {
		&self.monitors
	}

	pub fn get(&self, name: &str) -> Option<&Arc<Monitor>> {
		self.monitors.iter().find(|m| m.name() == name)
	}

	/// Token that cancels every monitor in the group when triggered.
	pub fn shutdown_token(&self) -> CancellationToken {
		self.shutdown.clone()
	}

	pub fn shutdown(&self) {
		self.shutdown.cancel();
	}

	/// Launch every monitor's control loop. Calling it twice is a no-op.
	pub fn start(&mut self) {
		if self.started {
			return;
		}
		self.started = true;

		for monitor in &self.monitors {
			let m = Arc::clone(monitor);
			let handle = tokio::spawn(async move { m.run().await });
			self.tasks.push((Arc::clone(monitor), handle));
		}
		tracing::info!(count = self.monitors.len(), "supervising processes");
	}

	/// Block until every monitor has stopped or failed.
	pub async fn wait_all(&mut self) -> GroupReport {
		let mut outcomes = Vec::with_capacity(self.tasks.len());
		for (monitor, handle) in self.tasks.drain(..) {
			let outcome = match handle.await {
				Ok(Ok(())) => Outcome::Stopped,
				Ok(Err(e)) => Outcome::Failed(e),
				Err(e) => {
					tracing::error!(process = monitor.name(), "monitor task panicked: {}", e);
					// the loop is gone, so nobody else will reap its child
					monitor.terminate_child().await;
					Outcome::Panicked(e.to_string())
				}
			};
			outcomes.push((monitor.name().to_string(), outcome));
		}
		GroupReport {
			outcomes,
			shutdown_requested: self.shutdown.is_cancelled(),
		}
	}

	pub async fn shutdown_and_wait(&mut self) -> GroupReport {
		self.shutdown();
		self.wait_all().await
	}

	pub async fn status(&self) -> Vec<MonitorStatus> {
		let mut result = Vec::with_capacity(self.monitors.len());
		for monitor in &self.monitors {
			result.push(monitor.status().await);
		}
		result
	}
}
