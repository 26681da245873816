mod signals;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use owo_colors::OwoColorize;
use tracing::Level;

use logdog::{config, ConfigError, GroupReport, Outcome, ProcessSpec, SupervisorGroup, MAX_RETRIES};

/// Restart commands that die or stop writing to their log.
#[derive(Debug, Parser)]
#[command(name = "logdog", version)]
#[command(after_help = "examples:\n  \
	logdog --config logdog.toml\n  \
	logdog \"python3 app.py > /tmp/app.log 2>&1\" /tmp/app.log\n  \
	logdog \"java -jar app.jar\" /var/log/app.log 120 10")]
struct Cli {
	/// Supervise every process listed in a TOML or YAML file
	#[arg(short, long, value_name = "FILE")]
	config: Option<PathBuf>,

	/// Validate the configuration, print it, and exit
	#[arg(long)]
	check: bool,

	/// Debug logging
	#[arg(short, long, conflicts_with = "quiet")]
	verbose: bool,

	/// Only warnings and errors
	#[arg(short, long)]
	quiet: bool,

	/// Shell command to supervise (single-process mode)
	#[arg(required_unless_present = "config", conflicts_with = "config")]
	command: Option<String>,

	/// Log file whose growth proves the command is alive
	#[arg(required_unless_present = "config")]
	log_file: Option<PathBuf>,

	/// Seconds without log activity before restarting [default: 60]
	timeout: Option<String>,

	/// Seconds between checks [default: 5]
	interval: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();

	let level = if cli.verbose {
		Level::DEBUG
	} else if cli.quiet {
		Level::WARN
	} else {
		Level::INFO
	};
	tracing_subscriber::fmt().with_max_level(level).with_target(false).init();

	let specs = match load_specs(&cli) {
		Ok(specs) => specs,
		Err(e) => {
			eprintln!("{} {}", "error:".red().bold(), e);
			// --check is a pass/fail gate
			return ExitCode::from(if cli.check { 1 } else { 2 });
		}
	};

	if cli.check {
		print_specs(&specs);
		return ExitCode::SUCCESS;
	}

	print_banner(&specs);

	let mut group = SupervisorGroup::new(specs);
	group.start();

	let watcher = tokio::spawn(signals::watch(
		group.shutdown_token(),
		group.monitors().to_vec(),
	));

	let report = group.wait_all().await;
	watcher.abort();

	print_summary(&report);

	if !report.shutdown_requested && report.all_failed() {
		ExitCode::from(1)
	} else {
		ExitCode::SUCCESS
	}
}

fn load_specs(cli: &Cli) -> Result<Vec<ProcessSpec>, ConfigError> {
	if let Some(path) = &cli.config {
		return config::load(path);
	}
	match (&cli.command, &cli.log_file) {
		(Some(command), Some(log_file)) => Ok(vec![config::single(
			command,
			log_file,
			cli.timeout.as_deref(),
			cli.interval.as_deref(),
		)?]),
		_ => Err(ConfigError::Invalid(
			"a command and a log file are required without --config".into(),
		)),
	}
}

fn print_specs(specs: &[ProcessSpec]) {
	eprintln!("{} {} process(es) configured", "ok".green().bold(), specs.len());
	for spec in specs {
		eprintln!();
		eprintln!("  {}", spec.name.bold());
		eprintln!("    command   {}", spec.command);
		eprintln!("    log file  {}", spec.log_file.display());
		eprintln!("    timeout   {}s", spec.timeout.as_secs());
		eprintln!("    interval  {}s", spec.interval.as_secs());
		if spec.shell != logdog::DEFAULT_SHELL {
			eprintln!("    shell     {}", spec.shell);
		}
		if let Some(dir) = &spec.working_dir {
			eprintln!("    dir       {}", dir.display());
		}
		if spec.capture_output {
			eprintln!("    output    captured into log file");
		}
	}
}

fn print_banner(specs: &[ProcessSpec]) {
	eprintln!(
		"{} {}: watching {} process(es), up to {} restarts each",
		"logdog".bold(),
		env!("CARGO_PKG_VERSION"),
		specs.len(),
		MAX_RETRIES
	);
	for spec in specs {
		eprintln!(
			"  {} {} {}",
			spec.name.cyan().bold(),
			spec.log_file.display().dimmed(),
			format!(
				"(timeout {}s, every {}s)",
				spec.timeout.as_secs(),
				spec.interval.as_secs()
			)
			.dimmed()
		);
	}
	eprintln!("{}", "press Ctrl+C to stop".dimmed());
}

fn print_summary(report: &GroupReport) {
	eprintln!();
	for (name, outcome) in &report.outcomes {
		match outcome {
			Outcome::Stopped => eprintln!("  {} {} stopped", "✓".green(), name.bold()),
			Outcome::Failed(e) => eprintln!("  {} {} {}", "✗".red(), name.bold(), e.red()),
			Outcome::Panicked(msg) => {
				eprintln!("  {} {} crashed: {}", "✗".red(), name.bold(), msg.red())
			}
		}
	}
}
