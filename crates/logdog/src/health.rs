//! Log-activity health classification.
//!
//! A process is considered healthy while its log file keeps growing or
//! being rewritten. Silence longer than the configured timeout is the only
//! unhealthy verdict; everything else is "keep waiting".

use std::time::{Duration, SystemTime};

use crate::probe::LogActivity;

const NOTICE_EVERY_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
	/// First observation; recorded, nothing to compare against yet.
	Baseline,
	/// File grew or was rewritten since the last check.
	Active,
	Waiting { elapsed: Duration },
	TimedOut { elapsed: Duration },
}

impl Health {
	pub fn is_healthy(&self) -> bool {
		!matches!(self, Health::TimedOut { .. })
	}
}

#[derive(Debug, Clone)]
pub struct HealthTracker {
	last_change: SystemTime,
	last_size: Option<u64>,
}

impl HealthTracker {
	pub fn new(now: SystemTime) -> Self {
		Self {
			last_change: now,
			last_size: None,
		}
	}

	pub fn last_change(&self) -> SystemTime {
		self.last_change
	}

	/// Restart the silence window, e.g. after a fresh spawn.
	pub fn rebase(&mut self, now: SystemTime) {
		self.last_change = now;
	}

	pub fn observe(&mut self, seen: LogActivity, now: SystemTime, timeout: Duration) -> Health {
		let Some(last_size) = self.last_size else {
			self.last_size = Some(seen.size);
			// an old mtime must not pull the window backwards
			if seen.modified > self.last_change {
				self.last_change = seen.modified;
			}
			return Health::Baseline;
		};

		if seen.size > last_size {
			self.last_change = now;
			self.last_size = Some(seen.size);
			return Health::Active;
		}

		if seen.modified > self.last_change {
			self.last_change = seen.modified;
			self.last_size = Some(seen.size);
			return Health::Active;
		}

		let elapsed = now.duration_since(self.last_change).unwrap_or_default();
		if elapsed > timeout {
			Health::TimedOut { elapsed }
		} else {
			Health::Waiting { elapsed }
		}
	}
}

/// Whether a "still waiting" notice should be printed for this much silence.
pub fn notice_due(elapsed: Duration) -> bool {
	let secs = elapsed.as_secs();
	secs > NOTICE_EVERY_SECS && secs % NOTICE_EVERY_SECS == 0
}

#[cfg(test)]
mod tests {
	use super::*;

	fn at(base: SystemTime, secs: u64) -> SystemTime {
		base + Duration::from_secs(secs)
	}

	fn seen(modified: SystemTime, size: u64) -> LogActivity {
		LogActivity { modified, size }
	}

	#[test]
	fn first_observation_is_baseline() {
		let t0 = SystemTime::now();
		let mut tracker = HealthTracker::new(t0);
		let health = tracker.observe(seen(t0, 100), at(t0, 1), Duration::from_secs(60));
		assert_eq!(health, Health::Baseline);
		assert!(health.is_healthy());
	}

	#[test]
	fn old_mtime_does_not_move_window_back() {
		let t0 = SystemTime::now();
		let mut tracker = HealthTracker::new(t0);
		let stale = t0 - Duration::from_secs(3600);
		tracker.observe(seen(stale, 10), t0, Duration::from_secs(60));
		assert_eq!(tracker.last_change(), t0);
	}

	#[test]
	fn growth_is_activity() {
		let t0 = SystemTime::now();
		let mut tracker = HealthTracker::new(t0);
		tracker.observe(seen(t0, 100), at(t0, 5), Duration::from_secs(60));

		let now = at(t0, 10);
		assert_eq!(tracker.observe(seen(t0, 150), now, Duration::from_secs(60)), Health::Active);
		assert_eq!(tracker.last_change(), now);
	}

	#[test]
	fn rewrite_without_growth_is_activity() {
		let t0 = SystemTime::now();
		let mut tracker = HealthTracker::new(t0);
		tracker.observe(seen(t0, 500), at(t0, 1), Duration::from_secs(60));

		let rewritten = at(t0, 7);
		let health = tracker.observe(seen(rewritten, 20), at(t0, 8), Duration::from_secs(60));
		assert_eq!(health, Health::Active);
		assert_eq!(tracker.last_change(), rewritten);

		// same mtime again is not new activity
		let health = tracker.observe(seen(rewritten, 20), at(t0, 9), Duration::from_secs(60));
		assert_eq!(health, Health::Waiting { elapsed: Duration::from_secs(2) });
	}

	#[test]
	fn timeout_boundary_is_exclusive() {
		let t0 = SystemTime::now();
		let timeout = Duration::from_secs(60);
		let mut tracker = HealthTracker::new(t0);
		tracker.observe(seen(t0, 0), t0, timeout);

		assert_eq!(
			tracker.observe(seen(t0, 0), at(t0, 59), timeout),
			Health::Waiting { elapsed: Duration::from_secs(59) }
		);
		assert_eq!(
			tracker.observe(seen(t0, 0), at(t0, 60), timeout),
			Health::Waiting { elapsed: timeout }
		);
		let past = at(t0, 60) + Duration::from_millis(1);
		assert!(!tracker.observe(seen(t0, 0), past, timeout).is_healthy());
	}

	#[test]
	fn rebase_restarts_window() {
		let t0 = SystemTime::now();
		let timeout = Duration::from_secs(3);
		let mut tracker = HealthTracker::new(t0);
		tracker.observe(seen(t0, 0), t0, timeout);
		assert!(!tracker.observe(seen(t0, 0), at(t0, 4), timeout).is_healthy());

		tracker.rebase(at(t0, 4));
		assert!(tracker.observe(seen(t0, 0), at(t0, 6), timeout).is_healthy());
	}

	#[test]
	fn notices_every_thirty_seconds() {
		assert!(!notice_due(Duration::from_secs(30)));
		assert!(!notice_due(Duration::from_secs(45)));
		assert!(notice_due(Duration::from_secs(60)));
		assert!(notice_due(Duration::from_millis(90_400)));
	}
}
