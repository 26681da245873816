use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to launch `{command}`: {source}")]
pub struct SpawnError {
	pub command: String,
	#[source]
	pub source: io::Error,
}

/// The log file could not be stat'ed. Never a restart trigger on its own.
#[derive(Debug, Error)]
pub enum ProbeError {
	#[error("log file {} not found", .path.display())]
	NotFound { path: PathBuf },
	#[error("cannot read log file {}: {source}", .path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
}

/// Terminal outcome of a monitor that did not stop on request.
#[derive(Debug, Error)]
pub enum MonitorError {
	#[error("{name}: cannot prepare log file {}: {source}", .path.display())]
	Prepare {
		name: String,
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("{name}: giving up after {retries} failed restart attempts")]
	RetriesExhausted { name: String, retries: u32 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("cannot read {}: {source}", .path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("invalid TOML in {}: {source}", .path.display())]
	Toml {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},
	#[error("invalid YAML in {}: {source}", .path.display())]
	Yaml {
		path: PathBuf,
		#[source]
		source: serde_yaml::Error,
	},
	#[error("no processes to monitor in {}", .path.display())]
	Empty { path: PathBuf },
	#[error("{0}")]
	Invalid(String),
}
