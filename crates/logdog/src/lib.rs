//! # logdog
//!
//! A minimal process watchdog.
//!
//! Each supervised command runs through `sh -c` and is restarted when it
//! dies or when its log file stops changing for longer than a timeout.
//! Restarts are bounded: after three failed attempts without recovering,
//! the monitor gives up and reports failure instead of retrying forever.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use logdog::{ProcessSpec, SupervisorGroup};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let spec = ProcessSpec::new(
//!     "web",
//!     "python3 app.py > /tmp/app.log 2>&1",
//!     "/tmp/app.log",
//!     Duration::from_secs(60),
//!     Duration::from_secs(5),
//! );
//!
//! let mut group = SupervisorGroup::new(vec![spec]);
//! group.start();
//!
//! tokio::signal::ctrl_c().await.unwrap();
//! let report = group.shutdown_and_wait().await;
//! assert!(report.shutdown_requested);
//! # }
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod logs;
pub mod monitor;
pub mod probe;
pub mod process;
pub mod supervisor;
pub mod types;

pub use error::{ConfigError, MonitorError, ProbeError, SpawnError};
pub use monitor::{Monitor, RestartPolicy, MAX_RETRIES};
pub use process::{ProcessHandle, TerminateOutcome, TerminatePolicy};
pub use supervisor::{GroupReport, Outcome, SupervisorGroup};
pub use types::*;
