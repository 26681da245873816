use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use logdog::Monitor;

/// SIGINT/SIGTERM cancel the whole group; SIGUSR1 logs a status line per process.
pub async fn watch(shutdown: CancellationToken, monitors: Vec<Arc<Monitor>>) {
	let (mut sigterm, mut sigint, mut sigusr1) = match (
		signal(SignalKind::terminate()),
		signal(SignalKind::interrupt()),
		signal(SignalKind::user_defined1()),
	) {
		(Ok(t), Ok(i), Ok(u)) => (t, i, u),
		_ => {
			tracing::warn!("cannot install signal handlers, falling back to Ctrl+C only");
			if tokio::signal::ctrl_c().await.is_ok() {
				tracing::info!("received Ctrl+C, stopping all monitors");
				shutdown.cancel();
			}
			return;
		}
	};

	loop {
		tokio::select! {
			_ = sigterm.recv() => {
				tracing::info!("received SIGTERM, stopping all monitors");
				break;
			}
			_ = sigint.recv() => {
				tracing::info!("received SIGINT, stopping all monitors");
				break;
			}
			_ = sigusr1.recv() => log_status(&monitors).await,
			_ = shutdown.cancelled() => return,
		}
	}
	shutdown.cancel();
}

async fn log_status(monitors: &[Arc<Monitor>]) {
	for monitor in monitors {
		let status = monitor.status().await;
		tracing::info!(
			process = status.name.as_str(),
			phase = %status.phase,
			pid = ?status.pid,
			retry = status.retry_count,
			max_retries = status.max_retries,
			restarts = status.restarts,
			"status"
		);
	}
}
