use std::io;
use std::path::Path;
use std::time::SystemTime;

use crate::error::ProbeError;

/// Modification time and size of a log file at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogActivity {
	pub modified: SystemTime,
	pub size: u64,
}

pub async fn probe(path: &Path) -> Result<LogActivity, ProbeError> {
	let meta = tokio::fs::metadata(path).await.map_err(|e| read_error(path, e))?;
	let modified = meta.modified().map_err(|e| read_error(path, e))?;
	Ok(LogActivity {
		modified,
		size: meta.len(),
	})
}

fn read_error(path: &Path, e: io::Error) -> ProbeError {
	match e.kind() {
		io::ErrorKind::NotFound => ProbeError::NotFound {
			path: path.to_path_buf(),
		},
		_ => ProbeError::Io {
			path: path.to_path_buf(),
			source: e,
		},
	}
}
