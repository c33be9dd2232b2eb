//! In-memory queue, for tests and local development.
//!
//! Each named queue is an unbounded mpsc channel shared behind a registry keyed by name;
//! `subscribe` drains it directly rather than polling, so there is no `wait_time_seconds`
//! behavior to emulate. Ack/nack/extend are all no-ops: messages are removed from the
//! channel the moment they are received, so there is nothing left to negatively
//! acknowledge or extend a lease on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{MessageHeaders, MessageQueue, PublishMessage, QueueError, QueueMessage};
use crate::config::MemoryQueueConfig;

#[derive(Debug, Clone, thiserror::Error)]
pub enum MemoryQueueError {
	#[error("queue {0} has no subscriber")]
	NoSubscriber(String),
}

type Registry = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<MemoryMessage>>>>;

#[derive(Debug, Default)]
pub struct MemoryQueue {
	registry: Registry,
}

impl MemoryQueue {
	pub fn new(_config: &MemoryQueueConfig) -> Self {
		tracing::debug!("setting up memory queue");
		Self::default()
	}
}

#[derive(Debug, Clone)]
pub struct MemoryMessage {
	id: String,
	body: Vec<u8>,
	headers: MessageHeaders,
}

impl MemoryMessage {
	pub fn new(id: impl Into<String>, body: impl Into<Vec<u8>>, headers: MessageHeaders) -> Self {
		Self {
			id: id.into(),
			body: body.into(),
			headers,
		}
	}
}

impl QueueMessage for MemoryMessage {
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
		Ok(())
	}

	async fn nack(&self) -> Result<(), QueueError> {
		Ok(())
	}

	async fn extend(&self, _duration: Duration) -> Result<(), QueueError> {
		Ok(())
	}
}

impl MessageQueue for MemoryQueue {
	async fn subscribe(
		&self,
		queue: &str,
		_wait_time_seconds: i32,
	) -> Result<BoxStream<'static, Result<MemoryMessage, QueueError>>, QueueError> {
		let (tx, rx) = mpsc::unbounded_channel();
		self.registry.lock().await.insert(queue.to_string(), tx);

		use futures::StreamExt;
		Ok(UnboundedReceiverStream::new(rx).map(Ok).boxed())
	}

	async fn publish(&self, message: PublishMessage) -> Result<(), QueueError> {
		let registry = self.registry.lock().await;
		let sender = registry
			.get(&message.queue)
			.ok_or_else(|| MemoryQueueError::NoSubscriber(message.queue.clone()))?;

		sender
			.send(MemoryMessage {
				id: uuid::Uuid::new_v4().to_string(),
				body: message.body.to_vec(),
				headers: MessageHeaders {
					content_type: Some(message.content_type),
					reply_to: None,
				},
			})
			.map_err(|_| MemoryQueueError::NoSubscriber(message.queue.clone()))?;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use futures::StreamExt;

	use super::*;

	#[tokio::test]
	async fn publish_reaches_subscriber() {
		let queue = MemoryQueue::new(&MemoryQueueConfig {});

		let mut stream = queue.subscribe("jobs", 0).await.unwrap();

		queue
			.publish(PublishMessage {
				queue: "jobs".to_string(),
				body: bytes::Bytes::from_static(b"{}"),
				content_type: "application/json".to_string(),
				delivery_mode: super::super::DeliveryMode::Persistent,
				timestamp: chrono::Utc::now(),
			})
			.await
			.unwrap();

		let message = stream.next().await.unwrap().unwrap();
		assert_eq!(message.body(), b"{}");
		assert_eq!(message.headers().content_type.as_deref(), Some("application/json"));
	}

	#[tokio::test]
	async fn publish_without_subscriber_errors() {
		let queue = MemoryQueue::new(&MemoryQueueConfig {});

		let err = queue
			.publish(PublishMessage {
				queue: "nobody-home".to_string(),
				body: bytes::Bytes::new(),
				content_type: "application/json".to_string(),
				delivery_mode: super::super::DeliveryMode::Persistent,
				timestamp: chrono::Utc::now(),
			})
			.await
			.unwrap_err();

		assert!(matches!(err, QueueError::Memory(MemoryQueueError::NoSubscriber(_))));
	}
}
