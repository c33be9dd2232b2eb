use aws_config::{AppName, Region, SdkConfig};
use aws_sdk_s3::config::{Credentials, SharedCredentialsProvider};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_runtime_api::client::result::SdkError;
use bytes::Bytes;
use scuffle_foundations::service_info;

use super::{ObjectLocation, ObjectStore, StoreError, UploadOptions};
use crate::config::S3StoreConfig;

#[derive(Debug)]
pub struct S3Store {
	client: aws_sdk_s3::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum S3StoreError {
	#[error("s3: {0}")]
	S3Error(#[from] aws_sdk_s3::Error),
	#[error("byte stream: {0}")]
	ByteStreamError(#[from] aws_smithy_types::byte_stream::error::Error),
	#[error("get object: {0}")]
	GetObject(#[from] SdkError<GetObjectError, HttpResponse>),
	#[error("put object: {0}")]
	PutObject(#[from] SdkError<PutObjectError, HttpResponse>),
}

impl S3Store {
	#[tracing::instrument(skip(config), name = "S3Store::new", err)]
	pub async fn new(config: &S3StoreConfig) -> Result<Self, S3StoreError> {
		tracing::debug!("setting up s3 object store");

		let mut builder = SdkConfig::builder();
		builder.set_app_name(Some(AppName::new(service_info!().name).unwrap()));
		builder.set_region(Some(Region::new(config.region.clone())));
		builder.set_credentials_provider(Some(SharedCredentialsProvider::new(Credentials::new(
			config.access_key.clone(),
			config.secret_key.clone(),
			None,
			None,
			"ConfiguredCredentialsProvider",
		))));

		if let Some(endpoint) = &config.endpoint {
			builder.set_endpoint_url(Some(endpoint.clone()));
		}

		let sdk_config = builder.build();
		let mut s3_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
		if config.path_style {
			s3_builder = s3_builder.force_path_style(true);
		}

		Ok(Self {
			client: aws_sdk_s3::Client::from_conf(s3_builder.build()),
		})
	}
}

impl ObjectStore for S3Store {
	#[tracing::instrument(skip(self), name = "S3Store::download_file", err)]
	async fn download_file(&self, location: &ObjectLocation) -> Result<Bytes, StoreError> {
		let result = self
			.client
			.get_object()
			.bucket(&location.bucket)
			.key(&location.key)
			.send()
			.await
			.map_err(S3StoreError::from)?;

		Ok(result.body.collect().await.map_err(S3StoreError::from)?.into_bytes())
	}

	#[tracing::instrument(skip(self, data), name = "S3Store::upload_file", err)]
	async fn upload_file(&self, location: &ObjectLocation, data: Bytes, options: UploadOptions) -> Result<(), StoreError> {
		let mut req = self
			.client
			.put_object()
			.bucket(&location.bucket)
			.key(&location.key)
			.body(data.into());

		if let Some(acl) = options.acl {
			req = req.acl(acl.as_str().into());
		}
		if let Some(cache_control) = options.cache_control {
			req = req.cache_control(cache_control);
		}
		if let Some(content_type) = options.content_type {
			req = req.content_type(content_type);
		}

		req.send().await.map_err(S3StoreError::from)?;

		Ok(())
	}

	#[tracing::instrument(skip(self), name = "S3Store::list_buckets", err)]
	async fn list_buckets(&self) -> Result<(), StoreError> {
		self.client.list_buckets().send().await.map_err(S3StoreError::from)?;
		Ok(())
	}
}
