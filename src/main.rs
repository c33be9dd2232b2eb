use std::sync::Arc;

use scuffle_foundations::bootstrap::{bootstrap, Bootstrap};
use scuffle_foundations::runtime;
use scuffle_foundations::settings::cli::Matches;
use tokio::signal::unix::SignalKind;

use self::config::Config;

impl Bootstrap for Config {
	type Settings = Self;

	fn runtime_mode(&self) -> scuffle_foundations::bootstrap::RuntimeSettings {
		self.runtime.clone()
	}

	fn telemetry_config(&self) -> Option<scuffle_foundations::telemetry::settings::TelemetrySettings> {
		Some(self.telemetry.clone())
	}
}

mod config;
mod container;
mod coordinator;
mod global;
mod pipeline;
mod queue;
mod store;
mod task;
#[cfg(test)]
mod tests;
mod tool;
mod workspace;

#[bootstrap]
async fn main(cfg: Matches<Config>) {
	tracing::info!("starting emote transcoder");

	// Require a health check to be registered
	scuffle_foundations::telemetry::server::require_health_check();

	let global = Arc::new({
		match global::Global::new(cfg.settings).await {
			Ok(global) => global,
			Err(err) => {
				tracing::error!("error setting up global: {err}");
				std::process::exit(1);
			}
		}
	});

	scuffle_foundations::telemetry::server::register_health_check(global.clone());

	let handle = runtime::spawn(coordinator::start(global.clone()));

	let mut signal = scuffle_foundations::signal::SignalHandler::new()
		.with_signal(SignalKind::interrupt())
		.with_signal(SignalKind::terminate());

	tokio::select! {
		_ = signal.recv() => {
			tracing::info!("received signal, shutting down");
		}
		result = handle => {
			match result {
				Ok(Ok(())) => {
					tracing::warn!("coordinator stopped unexpectedly without error");
				},
				Ok(Err(err)) => tracing::error!("coordinator failed: {err}"),
				Err(err) => tracing::error!("coordinator task panicked: {err}"),
			}
		}
	}

	let handle = scuffle_foundations::context::Handler::global();

	tokio::select! {
		_ = signal.recv() => {
			tracing::warn!("received signal again, forcing exit");
		},
		r = tokio::time::timeout(std::time::Duration::from_secs(60), handle.shutdown()) => {
			if r.is_err() {
				tracing::warn!("shutdown timed out, forcing exit");
			} else {
				tracing::info!("emote transcoder stopped");
			}
		}
	}

	std::process::exit(0);
}
