use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

/// Create the log file (and its directory) if it does not exist yet.
/// Returns `true` when the file had to be created.
pub fn ensure_log_file(path: &Path) -> io::Result<bool> {
	if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
		fs::create_dir_all(dir)?;
	}
	if path.exists() {
		return Ok(false);
	}
	OpenOptions::new().create(true).append(true).open(path)?;
	Ok(true)
}
