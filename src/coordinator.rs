//! Job Coordinator (§4.1): subscribes to the jobs queue, admits work under the
//! "N-1 gate" protocol, extends message leases while a task runs, and acknowledges,
//! negatively acknowledges, or replies based on the pipeline's outcome.
//!
//! Admission: two semaphores, `slots` (capacity N) and `gate` (capacity N-1). A message
//! is only accepted once a `slot` is free; after dispatching it, the receiver takes one
//! `gate` token before looping back to receive the next message. Completed tasks release
//! their `slot` and post a token to `gate`. This guarantees at least one worker stays idle
//! whenever the receiver is waiting on `gate`, leaving headroom for lease extension and
//! for graceful shutdown under load.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use scuffle_foundations::context::Context;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::global::Global;
use crate::pipeline;
use crate::queue::{AnyMessage, DeliveryMode, MessageQueue, PublishMessage, QueueMessage};
use crate::task::{ResultState, Task, TaskResult};

const LEASE_INTERVAL: Duration = Duration::from_secs(15);
const LEASE_EXTENSION: Duration = Duration::from_secs(30);
const RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(5);

pub async fn start(global: Arc<Global>) -> anyhow::Result<()> {
	let mut concurrency = global.config().concurrency;
	if concurrency == 0 {
		concurrency = num_cpus::get();
	}
	let concurrency = concurrency.max(1);

	let slots = Arc::new(Semaphore::new(concurrency));
	let gate = Arc::new(Semaphore::new(concurrency - 1));

	let queue_name = global.config().queue.jobs_queue().to_string();
	let wait_time_seconds = global.config().queue.wait_time_seconds();

	let ctx = Context::global();

	while !ctx.is_done() {
		let mut messages = match global.queue().subscribe(&queue_name, wait_time_seconds).await {
			Ok(stream) => stream,
			Err(err) => {
				tracing::error!("failed to subscribe to {queue_name}: {err}");
				tokio::time::sleep(RESUBSCRIBE_BACKOFF).await;
				continue;
			}
		};

		'receive: loop {
			let next = tokio::select! {
				_ = ctx.done() => break 'receive,
				outcome = AssertUnwindSafe(receive_next(&mut messages)).catch_unwind() => outcome,
			};

			let next = match next {
				Ok(next) => next,
				Err(panic) => {
					tracing::error!("panic while receiving from jobs queue: {}", describe_panic(&panic));
					break 'receive;
				}
			};

			let message = match next {
				Some(Ok(message)) => message,
				Some(Err(err)) => {
					tracing::warn!("jobs queue stream error: {err}");
					break 'receive;
				}
				None => break 'receive,
			};

			let permit = tokio::select! {
				_ = ctx.done() => break 'receive,
				permit = slots.clone().acquire_owned() => permit.expect("slots semaphore is never closed"),
			};

			tokio::spawn(dispatch(ctx.clone(), global.clone(), gate.clone(), permit, message));

			tokio::select! {
				_ = ctx.done() => break 'receive,
				permit = gate.clone().acquire_owned() => permit.expect("gate semaphore is never closed").forget(),
			}
		}

		if ctx.is_done() {
			break;
		}

		tracing::warn!(backoff = ?RESUBSCRIBE_BACKOFF, "jobs queue subscription ended, resubscribing");
		tokio::time::sleep(RESUBSCRIBE_BACKOFF).await;
	}

	Ok(())
}

async fn receive_next(messages: &mut BoxStream<'static, Result<AnyMessage, crate::queue::QueueError>>) -> Option<Result<AnyMessage, crate::queue::QueueError>> {
	messages.next().await
}

/// Runs `handle_message`, panic-guarded so that `gate.add_permits(1)` always runs: a
/// leaked gate permit would eventually starve the receiver's `gate.acquire_owned()` and
/// deadlock intake.
async fn dispatch(ctx: Context, global: Arc<Global>, gate: Arc<Semaphore>, _slot: OwnedSemaphorePermit, message: AnyMessage) {
	if let Err(panic) = AssertUnwindSafe(handle_message(&ctx, &global, &message)).catch_unwind().await {
		tracing::error!(message_id = %message.id(), "panic in dispatch: {}", describe_panic(&panic));
	}
	gate.add_permits(1);
}

pub(crate) async fn handle_message(ctx: &Context, global: &Arc<Global>, message: &AnyMessage) {
	let reply_to = message.headers().reply_to.clone();

	let task = match parse_message(message) {
		Some(task) => task,
		None => {
			if let Err(err) = message.ack().await {
				tracing::error!(message_id = %message.id(), "failed to ack rejected message: {err}");
			}
			return;
		}
	};

	tracing::info!(task_id = %task.id, "processing task");

	let mut result = run_task(ctx, global, &task, message).await;
	let succeeded = result.state == ResultState::Success;

	if succeeded {
		if let Err(err) = message.ack().await {
			tracing::error!(task_id = %task.id, "failed to ack message: {err}");
			result.append_note(format!("failed to ack message: {err}"));
		}
	} else if let Err(err) = message.nack().await {
		tracing::error!(task_id = %task.id, "failed to nack message: {err}");
		result.append_note(format!("failed to nack message: {err}"));
	}

	if let Some(reply_to) = reply_to.filter(|s| !s.is_empty()) {
		if let Err(panic) = AssertUnwindSafe(publish_reply(global, &reply_to, &result)).catch_unwind().await {
			tracing::error!(task_id = %result.id, "panic while publishing result reply: {}", describe_panic(&panic));
		}
	}
}

fn parse_message(message: &AnyMessage) -> Option<Task> {
	if message.headers().content_type.as_deref() != Some("application/json") {
		return None;
	}
	serde_json::from_slice(message.body()).ok()
}

/// Runs the pipeline for `task`, extending the message's lease every 15s and enforcing
/// its processing-time limit, modeled as a select loop over lease-tick, deadline, and
/// pipeline-completion futures (dropping the pipeline future is what cancels it).
async fn run_task(ctx: &Context, global: &Arc<Global>, task: &Task, message: &AnyMessage) -> TaskResult {
	let mut result = TaskResult::new(task);

	let deadline = (task.limits.max_processing_time > 0).then(|| Duration::from_secs(task.limits.max_processing_time));
	let time_limit = async move {
		match deadline {
			Some(duration) => tokio::time::sleep(duration).await,
			None => std::future::pending().await,
		}
	};
	tokio::pin!(time_limit);

	let mut interval = tokio::time::interval_at(Instant::now() + LEASE_INTERVAL, LEASE_INTERVAL);
	let mut process = Box::pin(AssertUnwindSafe(pipeline::run(ctx, global, task, &mut result)).catch_unwind());

	loop {
		tokio::select! {
			_ = interval.tick() => {
				match AssertUnwindSafe(message.extend(LEASE_EXTENSION)).catch_unwind().await {
					Ok(Ok(())) => {}
					Ok(Err(err)) => {
						if !err.is_extend_unimplemented() {
							tracing::warn!(task_id = %task.id, "lease extension failed, cancelling task: {err}");
							drop(process);
							result.fail(format!("lease extension failed: {err}"));
							return result;
						}
					}
					Err(panic) => {
						let reason = describe_panic(&panic);
						tracing::error!(task_id = %task.id, "panic while extending lease, cancelling task: {reason}");
						drop(process);
						result.fail(format!("panic while extending lease: {reason}"));
						return result;
					}
				}
			}
			_ = &mut time_limit => {
				tracing::warn!(task_id = %task.id, "task exceeded its maximum processing time");
				drop(process);
				result.fail("task exceeded its maximum processing time");
				return result;
			}
			outcome = &mut process => {
				drop(process);
				match outcome {
					Ok(Ok(())) => result.succeed(),
					Ok(Err(err)) => result.fail(err.to_string()),
					Err(panic) => result.fail(describe_panic(&panic)),
				}
				return result;
			}
		}
	}
}

fn describe_panic(panic: &(dyn std::any::Any + Send)) -> String {
	if let Some(message) = panic.downcast_ref::<&str>() {
		format!("task panicked: {message}")
	} else if let Some(message) = panic.downcast_ref::<String>() {
		format!("task panicked: {message}")
	} else {
		"task panicked".to_string()
	}
}

async fn publish_reply(global: &Arc<Global>, reply_to: &str, result: &TaskResult) {
	let body = match serde_json::to_vec(result) {
		Ok(body) => body,
		Err(err) => {
			tracing::error!(task_id = %result.id, "failed to encode result reply: {err}");
			return;
		}
	};

	let message = PublishMessage {
		queue: reply_to.to_string(),
		body: body.into(),
		content_type: "application/json".to_string(),
		delivery_mode: DeliveryMode::Persistent,
		timestamp: chrono::Utc::now(),
	};

	if let Err(err) = global.queue().publish(message).await {
		tracing::warn!(task_id = %result.id, reply_to, "failed to publish result reply: {err}");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::queue::MessageHeaders;

	fn message(content_type: Option<&str>, body: &[u8]) -> AnyMessage {
		AnyMessage::Memory(crate::queue::memory::MemoryMessage::new(
			"msg-1",
			body.to_vec(),
			MessageHeaders {
				content_type: content_type.map(str::to_string),
				reply_to: None,
			},
		))
	}

	#[test]
	fn rejects_non_json_content_type() {
		let msg = message(Some("text/plain"), br#"{"id":"t"}"#);
		assert!(parse_message(&msg).is_none());
	}

	#[test]
	fn rejects_missing_content_type() {
		let msg = message(None, br#"{"id":"t"}"#);
		assert!(parse_message(&msg).is_none());
	}

	#[test]
	fn rejects_malformed_json() {
		let msg = message(Some("application/json"), b"not json");
		assert!(parse_message(&msg).is_none());
	}

	#[test]
	fn accepts_well_formed_task() {
		let body = serde_json::json!({
			"id": "task-1",
			"flags": 127,
			"input": {"bucket": "in", "key": "k.gif"},
			"output": {"bucket": "out"},
		});
		let msg = message(Some("application/json"), serde_json::to_vec(&body).unwrap().as_slice());
		let task = parse_message(&msg).expect("valid task should parse");
		assert_eq!(task.id, "task-1");
	}
}
