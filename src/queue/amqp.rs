//! Classic AMQP (RabbitMQ-compatible) broker back-end.
//!
//! AMQP has no native visibility-extension primitive: a consumed-but-unacked message
//! simply stays invisible to other consumers until acked, nacked, or the connection
//! drops. [`AmqpMessage::extend`] therefore returns the "unimplemented" sentinel.

use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection, ConnectionProperties};

use super::{DeliveryMode, MessageHeaders, MessageQueue, PublishMessage, QueueError, QueueMessage};
use crate::config::AmqpQueueConfig;

#[derive(Debug, thiserror::Error)]
pub enum AmqpQueueError {
	#[error("lapin: {0}")]
	Lapin(#[from] lapin::Error),
}

#[derive(Debug)]
pub struct AmqpQueue {
	uri: String,
	properties: ConnectionProperties,
}

impl AmqpQueue {
	pub async fn new(config: &AmqpQueueConfig) -> Result<Self, AmqpQueueError> {
		tracing::debug!("setting up amqp queue");

		Ok(Self {
			uri: config.uri.clone(),
			properties: ConnectionProperties::default(),
		})
	}
}

#[derive(Debug)]
pub struct AmqpMessage {
	acker: Acker,
	id: String,
	body: Vec<u8>,
	headers: MessageHeaders,
}

impl QueueMessage for AmqpMessage {
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
		self.acker.ack(BasicAckOptions::default()).await.map_err(AmqpQueueError::from)?;
		Ok(())
	}

	async fn nack(&self) -> Result<(), QueueError> {
		self.acker
			.nack(BasicNackOptions {
				requeue: true,
				..Default::default()
			})
			.await
			.map_err(AmqpQueueError::from)?;
		Ok(())
	}

	async fn extend(&self, _duration: Duration) -> Result<(), QueueError> {
		Err(QueueError::ExtendUnimplemented)
	}
}

impl MessageQueue for AmqpQueue {
	#[tracing::instrument(skip(self), name = "AmqpQueue::subscribe", err)]
	async fn subscribe(
		&self,
		queue: &str,
		_wait_time_seconds: i32,
	) -> Result<BoxStream<'static, Result<AmqpMessage, QueueError>>, QueueError> {
		let conn = Connection::connect(&self.uri, self.properties.clone())
			.await
			.map_err(AmqpQueueError::from)?;
		let channel = conn.create_channel().await.map_err(AmqpQueueError::from)?;

		let consumer = channel
			.basic_consume(
				queue,
				"emote-transcoder",
				BasicConsumeOptions::default(),
				FieldTable::default(),
			)
			.await
			.map_err(AmqpQueueError::from)?;

		let stream = consumer.map(move |delivery| {
			let delivery = delivery.map_err(AmqpQueueError::from)?;
			let properties = delivery.properties.clone();

			let content_type = properties.content_type().as_ref().map(|s| s.to_string());
			let reply_to = properties.reply_to().as_ref().map(|s| s.to_string());
			let id = properties
				.correlation_id()
				.as_ref()
				.map(|s| s.to_string())
				.unwrap_or_else(|| delivery.delivery_tag.to_string());

			Ok(AmqpMessage {
				acker: delivery.acker,
				id,
				body: delivery.data,
				headers: MessageHeaders { content_type, reply_to },
			})
		});

		Ok(stream.boxed())
	}

	#[tracing::instrument(skip(self, message), name = "AmqpQueue::publish", err)]
	async fn publish(&self, message: PublishMessage) -> Result<(), QueueError> {
		let conn = Connection::connect(&self.uri, self.properties.clone())
			.await
			.map_err(AmqpQueueError::from)?;
		let channel = conn.create_channel().await.map_err(AmqpQueueError::from)?;

		let properties = BasicProperties::default()
			.with_content_type(message.content_type.into())
			.with_timestamp(message.timestamp.timestamp() as u64)
			.with_delivery_mode(match message.delivery_mode {
				DeliveryMode::Persistent => 2,
				DeliveryMode::NonPersistent => 1,
			});

		channel
			.basic_publish(
				"",
				&message.queue,
				BasicPublishOptions::default(),
				&message.body,
				properties,
			)
			.await
			.map_err(AmqpQueueError::from)?
			.await
			.map_err(AmqpQueueError::from)?;

		Ok(())
	}
}
