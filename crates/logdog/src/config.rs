use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::{ProcessSpec, DEFAULT_SHELL};

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_INTERVAL_SECS: u64 = 5;

// ── config file (TOML or YAML) ───────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
	#[serde(default)]
	pub defaults: Defaults,
	#[serde(default)]
	pub processes: Vec<ProcessConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Defaults {
	#[serde(default = "default_timeout")]
	pub timeout: u64,
	#[serde(default = "default_interval")]
	pub interval: u64,
	#[serde(default = "default_shell")]
	pub shell: String,
}

impl Default for Defaults {
	fn default() -> Self {
		Self {
			timeout: default_timeout(),
			interval: default_interval(),
			shell: default_shell(),
		}
	}
}

fn default_timeout() -> u64 { DEFAULT_TIMEOUT_SECS }
fn default_interval() -> u64 { DEFAULT_INTERVAL_SECS }
fn default_shell() -> String { DEFAULT_SHELL.to_string() }

/// One entry of the `processes` list.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProcessConfig {
	pub name: String,
	pub command: String,
	pub log_file: PathBuf,
	pub timeout: Option<u64>,
	pub interval: Option<u64>,
	pub shell: Option<String>,
	pub working_dir: Option<PathBuf>,
	#[serde(default)]
	pub env: HashMap<String, String>,
	#[serde(default)]
	pub capture_output: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
	Toml,
	Yaml,
}

impl Format {
	pub fn from_path(path: &Path) -> Self {
		match path.extension().and_then(|e| e.to_str()) {
			Some("yaml") | Some("yml") => Format::Yaml,
			_ => Format::Toml,
		}
	}
}

pub fn parse(content: &str, format: Format, path: &Path) -> Result<ConfigFile, ConfigError> {
	match format {
		Format::Toml => toml::from_str(content).map_err(|source| ConfigError::Toml {
			path: path.to_path_buf(),
			source,
		}),
		Format::Yaml => serde_yaml::from_str(content).map_err(|source| ConfigError::Yaml {
			path: path.to_path_buf(),
			source,
		}),
	}
}

pub fn load(path: &Path) -> Result<Vec<ProcessSpec>, ConfigError> {
	let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
		path: path.to_path_buf(),
		source,
	})?;
	let file = parse(&content, Format::from_path(path), path)?;
	resolve(file, path)
}

pub fn resolve(file: ConfigFile, path: &Path) -> Result<Vec<ProcessSpec>, ConfigError> {
	if file.processes.is_empty() {
		return Err(ConfigError::Empty {
			path: path.to_path_buf(),
		});
	}

	let mut seen = HashSet::new();
	let mut specs = Vec::with_capacity(file.processes.len());
	for entry in file.processes {
		if !seen.insert(entry.name.clone()) {
			return Err(ConfigError::Invalid(format!(
				"duplicate process name '{}'",
				entry.name
			)));
		}
		specs.push(entry.into_spec(&file.defaults)?);
	}
	Ok(specs)
}

impl ProcessConfig {
	pub fn into_spec(self, defaults: &Defaults) -> Result<ProcessSpec, ConfigError> {
		let name = self.name.trim().to_string();
		if name.is_empty() {
			return Err(ConfigError::Invalid("process name must not be empty".into()));
		}
		if self.command.trim().is_empty() {
			return Err(ConfigError::Invalid(format!("{}: command must not be empty", name)));
		}
		if self.log_file.as_os_str().is_empty() {
			return Err(ConfigError::Invalid(format!("{}: log_file must not be empty", name)));
		}

		let timeout = self.timeout.unwrap_or(defaults.timeout);
		if timeout == 0 {
			return Err(ConfigError::Invalid(format!("{}: timeout must be positive", name)));
		}
		let interval = checked_interval(&name, self.interval.unwrap_or(defaults.interval));
		warn_if_tight(&name, timeout, interval);

		Ok(ProcessSpec {
			name,
			command: self.command,
			log_file: self.log_file,
			timeout: Duration::from_secs(timeout),
			interval: Duration::from_secs(interval),
			shell: self.shell.unwrap_or_else(|| defaults.shell.clone()),
			working_dir: self.working_dir,
			env: self.env,
			capture_output: self.capture_output,
		})
	}
}

// ── single-process mode ──────────────────────────────────────────────────────

/// Build a spec from `command log_file [timeout] [interval]`. Bad optional
/// values fall back to the defaults with a warning.
pub fn single(
	command: &str,
	log_file: &Path,
	timeout: Option<&str>,
	interval: Option<&str>,
) -> Result<ProcessSpec, ConfigError> {
	let name = derive_name(command)
		.ok_or_else(|| ConfigError::Invalid("command must not be empty".into()))?;
	if log_file.as_os_str().is_empty() {
		return Err(ConfigError::Invalid("log file must not be empty".into()));
	}

	let timeout = parse_seconds(timeout, "timeout", DEFAULT_TIMEOUT_SECS);
	let interval = parse_seconds(interval, "interval", DEFAULT_INTERVAL_SECS);
	warn_if_tight(&name, timeout, interval);

	Ok(ProcessSpec::new(
		name,
		command,
		log_file,
		Duration::from_secs(timeout),
		Duration::from_secs(interval),
	))
}

fn derive_name(command: &str) -> Option<String> {
	let first = command.split_whitespace().next()?;
	let base = Path::new(first)
		.file_name()
		.map(|n| n.to_string_lossy().to_string())
		.unwrap_or_else(|| first.to_string());
	Some(base)
}

fn parse_seconds(raw: Option<&str>, what: &str, default: u64) -> u64 {
	let Some(raw) = raw else { return default };
	match raw.trim().parse::<u64>() {
		Ok(n) if n > 0 => n,
		_ => {
			tracing::warn!("invalid {} '{}', using default {}s", what, raw, default);
			default
		}
	}
}

fn checked_interval(name: &str, interval: u64) -> u64 {
	if interval < 1 {
		tracing::warn!(process = name, "interval {}s is too small, using 1s", interval);
		1
	} else {
		interval
	}
}

fn warn_if_tight(name: &str, timeout: u64, interval: u64) {
	if timeout <= interval {
		tracing::warn!(
			process = name,
			"timeout ({}s) does not exceed interval ({}s); expect frequent restarts",
			timeout,
			interval
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const TOML_CONFIG: &str = r#"
[defaults]
timeout = 120

[[processes]]
name = "web"
command = "python3 app.py > /tmp/web.log 2>&1"
log_file = "/tmp/web.log"
interval = 10

[[processes]]
name = "worker"
command = "./worker"
log_file = "/var/log/worker.log"
timeout = 30
shell = "bash"
capture_output = true
env = { RUST_LOG = "debug" }
"#;

	const YAML_CONFIG: &str = r#"
processes:
  - name: "WebServer"
    command: "python3 app.py"
    log_file: "/tmp/app.log"
    timeout: 60
    interval: 5
"#;

	fn path(name: &str) -> PathBuf {
		PathBuf::from(name)
	}

	#[test]
	fn format_from_extension() {
		assert_eq!(Format::from_path(&path("a.yaml")), Format::Yaml);
		assert_eq!(Format::from_path(&path("a.yml")), Format::Yaml);
		assert_eq!(Format::from_path(&path("a.toml")), Format::Toml);
		assert_eq!(Format::from_path(&path("noext")), Format::Toml);
	}

	#[test]
	fn toml_applies_defaults() {
		let file = parse(TOML_CONFIG, Format::Toml, &path("c.toml")).unwrap();
		let specs = resolve(file, &path("c.toml")).unwrap();
		assert_eq!(specs.len(), 2);

		assert_eq!(specs[0].name, "web");
		assert_eq!(specs[0].timeout, Duration::from_secs(120));
		assert_eq!(specs[0].interval, Duration::from_secs(10));
		assert_eq!(specs[0].shell, "sh");
		assert!(!specs[0].capture_output);

		assert_eq!(specs[1].timeout, Duration::from_secs(30));
		assert_eq!(specs[1].interval, Duration::from_secs(DEFAULT_INTERVAL_SECS));
		assert_eq!(specs[1].shell, "bash");
		assert!(specs[1].capture_output);
		assert_eq!(specs[1].env.get("RUST_LOG").map(String::as_str), Some("debug"));
	}

	#[test]
	fn yaml_matches_record_layout() {
		let file = parse(YAML_CONFIG, Format::Yaml, &path("c.yaml")).unwrap();
		let specs = resolve(file, &path("c.yaml")).unwrap();
		assert_eq!(specs[0].name, "WebServer");
		assert_eq!(specs[0].log_file, path("/tmp/app.log"));
		assert_eq!(specs[0].timeout, Duration::from_secs(60));
		assert_eq!(specs[0].interval, Duration::from_secs(5));
	}

	#[test]
	fn empty_list_is_rejected() {
		let file = parse("processes = []", Format::Toml, &path("c.toml")).unwrap();
		assert!(matches!(resolve(file, &path("c.toml")), Err(ConfigError::Empty { .. })));
	}

	#[test]
	fn duplicate_names_are_rejected() {
		let content = r#"
[[processes]]
name = "a"
command = "true"
log_file = "/tmp/a.log"

[[processes]]
name = "a"
command = "true"
log_file = "/tmp/b.log"
"#;
		let file = parse(content, Format::Toml, &path("c.toml")).unwrap();
		let err = resolve(file, &path("c.toml")).unwrap_err();
		assert!(err.to_string().contains("duplicate"), "got {}", err);
	}

	#[test]
	fn zero_timeout_is_invalid_zero_interval_is_clamped() {
		let entry = ProcessConfig {
			name: "x".into(),
			command: "true".into(),
			log_file: path("/tmp/x.log"),
			timeout: Some(0),
			interval: None,
			shell: None,
			working_dir: None,
			env: HashMap::new(),
			capture_output: false,
		};
		assert!(entry.clone().into_spec(&Defaults::default()).is_err());

		let entry = ProcessConfig {
			timeout: Some(10),
			interval: Some(0),
			..entry
		};
		let spec = entry.into_spec(&Defaults::default()).unwrap();
		assert_eq!(spec.interval, Duration::from_secs(1));
	}

	#[test]
	fn tight_timeout_only_warns() {
		let entry = ProcessConfig {
			name: "x".into(),
			command: "true".into(),
			log_file: path("/tmp/x.log"),
			timeout: Some(2),
			interval: Some(5),
			shell: None,
			working_dir: None,
			env: HashMap::new(),
			capture_output: false,
		};
		assert!(entry.into_spec(&Defaults::default()).is_ok());
	}

	#[test]
	fn malformed_toml_reports_path() {
		let err = parse("processes = [", Format::Toml, &path("broken.toml")).unwrap_err();
		assert!(err.to_string().contains("broken.toml"));
	}

	#[test]
	fn single_mode_defaults() {
		let spec = single("python3 app.py > /tmp/app.log 2>&1", &path("/tmp/app.log"), None, None)
			.unwrap();
		assert_eq!(spec.name, "python3");
		assert_eq!(spec.timeout, Duration::from_secs(60));
		assert_eq!(spec.interval, Duration::from_secs(5));
	}

	#[test]
	fn single_mode_bad_numbers_fall_back() {
		let spec = single("/usr/bin/java -jar app.jar", &path("/var/log/app.log"), Some("abc"), Some("-3"))
			.unwrap();
		assert_eq!(spec.name, "java");
		assert_eq!(spec.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
		assert_eq!(spec.interval, Duration::from_secs(DEFAULT_INTERVAL_SECS));

		let spec = single("app", &path("app.log"), Some("120"), Some("10")).unwrap();
		assert_eq!(spec.timeout, Duration::from_secs(120));
		assert_eq!(spec.interval, Duration::from_secs(10));
	}

	#[test]
	fn single_mode_rejects_blank_command() {
		assert!(single("   ", &path("app.log"), None, None).is_err());
	}
}
