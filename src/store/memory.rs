use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::RwLock;

use super::{ObjectLocation, ObjectStore, StoreError, UploadOptions};
use crate::config::MemoryStoreConfig;

#[derive(Debug, Clone)]
struct MemoryObject {
	data: Bytes,
	_options: UploadOptions,
}

/// An in-memory object store, for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryStore {
	objects: RwLock<HashMap<(String, String), MemoryObject>>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MemoryStoreError {
	#[error("not found")]
	NotFound,
}

impl MemoryStore {
	pub fn new(_config: &MemoryStoreConfig) -> Self {
		tracing::debug!("setting up memory object store");
		Self::default()
	}
}

impl ObjectStore for MemoryStore {
	#[tracing::instrument(skip(self), name = "MemoryStore::download_file", err)]
	async fn download_file(&self, location: &ObjectLocation) -> Result<Bytes, StoreError> {
		self.objects
			.read()
			.await
			.get(&(location.bucket.clone(), location.key.clone()))
			.map(|object| object.data.clone())
			.ok_or(StoreError::Memory(MemoryStoreError::NotFound))
	}

	#[tracing::instrument(skip(self, data), name = "MemoryStore::upload_file", err, fields(size = data.len()))]
	async fn upload_file(&self, location: &ObjectLocation, data: Bytes, options: UploadOptions) -> Result<(), StoreError> {
		self.objects.write().await.insert(
			(location.bucket.clone(), location.key.clone()),
			MemoryObject { data, _options: options },
		);

		Ok(())
	}

	async fn list_buckets(&self) -> Result<(), StoreError> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn round_trips_uploaded_data() {
		let store = MemoryStore::new(&MemoryStoreConfig {});
		let location = ObjectLocation {
			bucket: "bucket".into(),
			key: "key".into(),
		};

		store
			.upload_file(&location, Bytes::from_static(b"hello"), UploadOptions::default())
			.await
			.unwrap();

		let data = store.download_file(&location).await.unwrap();
		assert_eq!(&data[..], b"hello");
	}

	#[tokio::test]
	async fn missing_object_is_not_found() {
		let store = MemoryStore::new(&MemoryStoreConfig {});
		let location = ObjectLocation {
			bucket: "bucket".into(),
			key: "missing".into(),
		};

		assert!(matches!(
			store.download_file(&location).await,
			Err(StoreError::Memory(MemoryStoreError::NotFound))
		));
	}
}
