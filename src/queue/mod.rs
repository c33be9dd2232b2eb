//! Message queue abstraction: subscribe for task messages, publish result replies.
//!
//! Two real back-ends are supported (AMQP via `lapin`, a cloud queue via `aws-sdk-sqs`)
//! plus an in-memory mock for tests. Lease extension is optional per the wire contract:
//! a back-end that cannot extend a message's invisibility window returns
//! [`QueueError::ExtendUnimplemented`], which callers are expected to tolerate.

use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;

pub mod amqp;
pub mod memory;
pub mod sqs;

use self::amqp::{AmqpMessage, AmqpQueue, AmqpQueueError};
use self::memory::{MemoryMessage, MemoryQueue, MemoryQueueError};
use self::sqs::{SqsMessage, SqsQueue, SqsQueueError};
use crate::config::QueueConfig;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
	#[error("amqp: {0}")]
	Amqp(#[from] AmqpQueueError),
	#[error("sqs: {0}")]
	Sqs(#[from] SqsQueueError),
	#[error("memory: {0}")]
	Memory(#[from] MemoryQueueError),
	#[error("lease extension is not implemented by this broker")]
	ExtendUnimplemented,
}

impl QueueError {
	/// True for the sentinel that callers are expected to treat as a no-op rather than a failure.
	pub fn is_extend_unimplemented(&self) -> bool {
		matches!(self, QueueError::ExtendUnimplemented)
	}
}

#[derive(Debug, Clone, Default)]
pub struct MessageHeaders {
	pub content_type: Option<String>,
	pub reply_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
	NonPersistent,
	Persistent,
}

#[derive(Debug, Clone)]
pub struct PublishMessage {
	pub queue: String,
	pub body: Bytes,
	pub content_type: String,
	pub delivery_mode: DeliveryMode,
	pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A single delivered message, bound to whichever broker connection produced it.
pub trait QueueMessage: Send + Sync {
	fn id(&self) -> &str;

	fn body(&self) -> &[u8];

	fn headers(&self) -> &MessageHeaders;

	/// Acknowledge the message, removing it from the queue permanently.
	fn ack(&self) -> impl std::future::Future<Output = Result<(), QueueError>> + Send;

	/// Negatively acknowledge the message, making it available for redelivery.
	fn nack(&self) -> impl std::future::Future<Output = Result<(), QueueError>> + Send;

	/// Extend the message's invisibility window by `duration`. Returns
	/// [`QueueError::ExtendUnimplemented`] on a broker that has no such concept.
	fn extend(&self, duration: Duration) -> impl std::future::Future<Output = Result<(), QueueError>> + Send;
}

pub trait MessageQueue {
	/// Subscribe to `queue`, returning a lazy stream of messages. The stream ending
	/// (either cleanly or with an error) means the caller should back off and resubscribe.
	fn subscribe(
		&self,
		queue: &str,
		wait_time_seconds: i32,
	) -> impl std::future::Future<Output = Result<BoxStream<'static, Result<AnyMessage, QueueError>>, QueueError>> + Send;

	fn publish(&self, message: PublishMessage) -> impl std::future::Future<Output = Result<(), QueueError>> + Send;
}

#[derive(Debug)]
pub enum AnyQueue {
	Amqp(AmqpQueue),
	Sqs(SqsQueue),
	Memory(MemoryQueue),
}

#[derive(Debug)]
pub enum AnyMessage {
	Amqp(AmqpMessage),
	Sqs(SqsMessage),
	Memory(MemoryMessage),
}

impl QueueMessage for AnyMessage {
	fn id(&self) -> &str {
		match self {
			AnyMessage::Amqp(m) => m.id(),
			AnyMessage::Sqs(m) => m.id(),
			AnyMessage::Memory(m) => m.id(),
		}
	}

	fn body(&self) -> &[u8] {
		match self {
			AnyMessage::Amqp(m) => m.body(),
			AnyMessage::Sqs(m) => m.body(),
			AnyMessage::Memory(m) => m.body(),
		}
	}

	fn headers(&self) -> &MessageHeaders {
		match self {
			AnyMessage::Amqp(m) => m.headers(),
			AnyMessage::Sqs(m) => m.headers(),
			AnyMessage::Memory(m) => m.headers(),
		}
	}

	async fn ack(&self) -> Result<(), QueueError> {
		match self {
			AnyMessage::Amqp(m) => m.ack().await,
			AnyMessage::Sqs(m) => m.ack().await,
			AnyMessage::Memory(m) => m.ack().await,
		}
	}

	async fn nack(&self) -> Result<(), QueueError> {
		match self {
			AnyMessage::Amqp(m) => m.nack().await,
			AnyMessage::Sqs(m) => m.nack().await,
			AnyMessage::Memory(m) => m.nack().await,
		}
	}

	async fn extend(&self, duration: Duration) -> Result<(), QueueError> {
		match self {
			AnyMessage::Amqp(m) => m.extend(duration).await,
			AnyMessage::Sqs(m) => m.extend(duration).await,
			AnyMessage::Memory(m) => m.extend(duration).await,
		}
	}
}

impl MessageQueue for AnyQueue {
	async fn subscribe(
		&self,
		queue: &str,
		wait_time_seconds: i32,
	) -> Result<BoxStream<'static, Result<AnyMessage, QueueError>>, QueueError> {
		use futures::StreamExt;

		match self {
			AnyQueue::Amqp(q) => Ok(q
				.subscribe(queue, wait_time_seconds)
				.await?
				.map(|item| item.map(AnyMessage::Amqp))
				.boxed()),
			AnyQueue::Sqs(q) => Ok(q
				.subscribe(queue, wait_time_seconds)
				.await?
				.map(|item| item.map(AnyMessage::Sqs))
				.boxed()),
			AnyQueue::Memory(q) => Ok(q
				.subscribe(queue, wait_time_seconds)
				.await?
				.map(|item| item.map(AnyMessage::Memory))
				.boxed()),
		}
	}

	async fn publish(&self, message: PublishMessage) -> Result<(), QueueError> {
		match self {
			AnyQueue::Amqp(q) => q.publish(message).await,
			AnyQueue::Sqs(q) => q.publish(message).await,
			AnyQueue::Memory(q) => q.publish(message).await,
		}
	}
}

pub async fn build_queue(config: &QueueConfig) -> Result<AnyQueue, QueueError> {
	match config {
		QueueConfig::Amqp(amqp) => Ok(AnyQueue::Amqp(AmqpQueue::new(amqp).await?)),
		QueueConfig::Sqs(sqs) => Ok(AnyQueue::Sqs(SqsQueue::new(sqs).await?)),
		QueueConfig::Memory(memory) => Ok(AnyQueue::Memory(MemoryQueue::new(memory))),
	}
}
