//! Integration-shaped tests driving the coordinator end to end against the in-memory
//! queue and object store.

mod coordinator;

pub(crate) async fn test_global() -> std::sync::Arc<crate::global::Global> {
	let config = crate::config::Config::default();
	std::sync::Arc::new(crate::global::Global::new(config).await.expect("global setup"))
}
