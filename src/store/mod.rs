//! Object store abstraction: download inputs, upload outputs, health-check.

use bytes::Bytes;

use self::memory::{MemoryStore, MemoryStoreError};
use self::s3::{S3Store, S3StoreError};
use crate::config::StoreConfig;

pub mod memory;
pub mod s3;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("s3: {0}")]
	S3(#[from] S3StoreError),
	#[error("memory: {0}")]
	Memory(#[from] MemoryStoreError),
	#[error("not found")]
	NotFound,
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
	pub acl: Option<String>,
	pub cache_control: Option<String>,
	pub content_type: Option<String>,
}

#[derive(Debug)]
pub struct ObjectLocation {
	pub bucket: String,
	pub key: String,
}

/// A store the worker can download task inputs from and upload outputs to.
pub trait ObjectStore {
	/// Download the full contents of an object.
	fn download_file(&self, location: &ObjectLocation) -> impl std::future::Future<Output = Result<Bytes, StoreError>> + Send;

	/// Upload an object, overwriting any existing object at the same location.
	fn upload_file(
		&self,
		location: &ObjectLocation,
		data: Bytes,
		options: UploadOptions,
	) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

	/// Used only for health checks.
	fn list_buckets(&self) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug)]
pub enum AnyStore {
	S3(S3Store),
	Memory(MemoryStore),
}

impl ObjectStore for AnyStore {
	async fn download_file(&self, location: &ObjectLocation) -> Result<Bytes, StoreError> {
		match self {
			AnyStore::S3(store) => store.download_file(location).await,
			AnyStore::Memory(store) => store.download_file(location).await,
		}
	}

	async fn upload_file(&self, location: &ObjectLocation, data: Bytes, options: UploadOptions) -> Result<(), StoreError> {
		match self {
			AnyStore::S3(store) => store.upload_file(location, data, options).await,
			AnyStore::Memory(store) => store.upload_file(location, data, options).await,
		}
	}

	async fn list_buckets(&self) -> Result<(), StoreError> {
		match self {
			AnyStore::S3(store) => store.list_buckets().await,
			AnyStore::Memory(store) => store.list_buckets().await,
		}
	}
}

pub async fn build_store(config: &StoreConfig) -> Result<AnyStore, StoreError> {
	match config {
		StoreConfig::S3(s3) => Ok(AnyStore::S3(S3Store::new(s3).await?)),
		StoreConfig::Memory(memory) => Ok(AnyStore::Memory(MemoryStore::new(memory))),
	}
}
