//! Cloud queue (AWS SQS-compatible) broker back-end.
//!
//! Lease extension maps onto `ChangeMessageVisibility`, so unlike the AMQP back-end this
//! one genuinely implements [`QueueMessage::extend`].

use std::collections::HashMap;
use std::time::Duration;

use aws_config::{Region, SdkConfig};
use aws_sdk_sqs::operation::change_message_visibility::ChangeMessageVisibilityError;
use aws_sdk_sqs::operation::delete_message::DeleteMessageError;
use aws_sdk_sqs::operation::receive_message::ReceiveMessageError;
use aws_sdk_sqs::operation::send_message::SendMessageError;
use aws_sdk_sqs::types::MessageAttributeValue;
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_runtime_api::client::result::SdkError;
use futures::stream::BoxStream;

use super::{MessageHeaders, MessageQueue, PublishMessage, QueueError, QueueMessage};
use crate::config::SqsQueueConfig;

#[derive(Debug, thiserror::Error)]
pub enum SqsQueueError {
	#[error("receive message: {0}")]
	Receive(#[from] SdkError<ReceiveMessageError, HttpResponse>),
	#[error("delete message: {0}")]
	Delete(#[from] SdkError<DeleteMessageError, HttpResponse>),
	#[error("change message visibility: {0}")]
	ChangeVisibility(#[from] SdkError<ChangeMessageVisibilityError, HttpResponse>),
	#[error("send message: {0}")]
	Send(#[from] SdkError<SendMessageError, HttpResponse>),
}

const CONTENT_TYPE_ATTR: &str = "ContentType";
const REPLY_TO_ATTR: &str = "ReplyTo";

#[derive(Debug)]
pub struct SqsQueue {
	client: aws_sdk_sqs::Client,
}

impl SqsQueue {
	pub async fn new(config: &SqsQueueConfig) -> Result<Self, SqsQueueError> {
		tracing::debug!("setting up sqs queue");

		let mut builder = SdkConfig::builder();
		builder.set_region(Some(Region::new(config.region.clone())));
		if let Some(endpoint) = &config.endpoint {
			builder.set_endpoint_url(Some(endpoint.clone()));
		}

		Ok(Self {
			client: aws_sdk_sqs::Client::new(&builder.build()),
		})
	}
}

#[derive(Debug)]
pub struct SqsMessage {
	client: aws_sdk_sqs::Client,
	queue_url: String,
	receipt_handle: String,
	id: String,
	body: Vec<u8>,
	headers: MessageHeaders,
}

impl QueueMessage for SqsMessage {
	fn id(&self) -> &str {
		&self.id
	}

	fn body(&self) -> &[u8] {
		&self.body
	}

	fn headers(&self) -> &MessageHeaders {
		&self.headers
	}

	async fn ack(&self) -> Result<(), QueueError> {
		self.client
			.delete_message()
			.queue_url(&self.queue_url)
			.receipt_handle(&self.receipt_handle)
			.send()
			.await
			.map_err(SqsQueueError::from)?;
		Ok(())
	}

	async fn nack(&self) -> Result<(), QueueError> {
		self.client
			.change_message_visibility()
			.queue_url(&self.queue_url)
			.receipt_handle(&self.receipt_handle)
			.visibility_timeout(0)
			.send()
			.await
			.map_err(SqsQueueError::from)?;
		Ok(())
	}

	async fn extend(&self, duration: Duration) -> Result<(), QueueError> {
		self.client
			.change_message_visibility()
			.queue_url(&self.queue_url)
			.receipt_handle(&self.receipt_handle)
			.visibility_timeout(duration.as_secs() as i32)
			.send()
			.await
			.map_err(SqsQueueError::from)?;
		Ok(())
	}
}

impl MessageQueue for SqsQueue {
	#[tracing::instrument(skip(self), name = "SqsQueue::subscribe", err)]
	async fn subscribe(
		&self,
		queue: &str,
		wait_time_seconds: i32,
	) -> Result<BoxStream<'static, Result<SqsMessage, QueueError>>, QueueError> {
		let client = self.client.clone();
		let queue_url = queue.to_string();

		let stream = async_stream::stream! {
			loop {
				let result = client
					.receive_message()
					.queue_url(&queue_url)
					.wait_time_seconds(wait_time_seconds)
					.max_number_of_messages(10)
					.message_attribute_names("All")
					.send()
					.await
					.map_err(SqsQueueError::from);

				let response = match result {
					Ok(response) => response,
					Err(err) => {
						yield Err(QueueError::from(err));
						return;
					}
				};

				let messages = response.messages.unwrap_or_default();

				if messages.is_empty() {
					continue;
				}

				for message in messages {
					let Some(receipt_handle) = message.receipt_handle.clone() else { continue };
					let id = message.message_id.clone().unwrap_or_default();
					let body = message.body.clone().unwrap_or_default().into_bytes();

					let attrs = message.message_attributes.clone().unwrap_or_default();
					let headers = MessageHeaders {
						content_type: string_attr(&attrs, CONTENT_TYPE_ATTR),
						reply_to: string_attr(&attrs, REPLY_TO_ATTR),
					};

					yield Ok(SqsMessage {
						client: client.clone(),
						queue_url: queue_url.clone(),
						receipt_handle,
						id,
						body,
						headers,
					});
				}
			}
		};

		Ok(Box::pin(stream))
	}

	#[tracing::instrument(skip(self, message), name = "SqsQueue::publish", err)]
	async fn publish(&self, message: PublishMessage) -> Result<(), QueueError> {
		let body = String::from_utf8_lossy(&message.body).into_owned();

		let mut attrs = HashMap::new();
		attrs.insert(
			CONTENT_TYPE_ATTR.to_string(),
			MessageAttributeValue::builder()
				.data_type("String")
				.string_value(message.content_type)
				.build()
				.expect("data_type and string_value are both set"),
		);

		self.client
			.send_message()
			.queue_url(&message.queue)
			.message_body(body)
			.set_message_attributes(Some(attrs))
			.send()
			.await
			.map_err(SqsQueueError::from)?;

		Ok(())
	}
}

fn string_attr(attrs: &HashMap<String, MessageAttributeValue>, key: &str) -> Option<String> {
	attrs.get(key).and_then(|value| value.string_value().map(|s| s.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn string_attr_reads_present_key() {
		let mut attrs = HashMap::new();
		attrs.insert(
			CONTENT_TYPE_ATTR.to_string(),
			MessageAttributeValue::builder()
				.data_type("String")
				.string_value("application/json")
				.build()
				.unwrap(),
		);

		assert_eq!(string_attr(&attrs, CONTENT_TYPE_ATTR), Some("application/json".to_string()));
		assert_eq!(string_attr(&attrs, REPLY_TO_ATTR), None);
	}
}
