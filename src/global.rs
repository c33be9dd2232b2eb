use anyhow::Context;
use scuffle_foundations::telemetry::server::HealthCheck;
use scuffle_foundations::BootstrapResult;

use crate::config::Config;
use crate::queue::{build_queue, AnyQueue};
use crate::store::{build_store, AnyStore, ObjectStore};

pub struct Global {
	config: Config,
	store: AnyStore,
	queue: AnyQueue,
}

impl Global {
	pub async fn new(config: Config) -> BootstrapResult<Self> {
		const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);

		tracing::debug!("setting up object store");

		let store = tokio::time::timeout(DEFAULT_TIMEOUT, build_store(&config.store))
			.await
			.context("store timeout")?
			.context("store")?;

		tracing::debug!("setting up message queue");

		let queue = tokio::time::timeout(DEFAULT_TIMEOUT, build_queue(&config.queue))
			.await
			.context("queue timeout")?
			.context("queue")?;

		Ok(Self { config, store, queue })
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn store(&self) -> &AnyStore {
		&self.store
	}

	pub fn queue(&self) -> &AnyQueue {
		&self.queue
	}
}

impl HealthCheck for Global {
	fn check(&self) -> std::pin::Pin<Box<dyn futures::prelude::Future<Output = bool> + Send + '_>> {
		Box::pin(async {
			if let Err(err) = self.store().list_buckets().await {
				tracing::error!("object store check failed: {err}");
				return false;
			}

			true
		})
	}
}
