use scuffle_foundations::context::Context;
use serde_json::json;

use crate::queue::memory::MemoryMessage;
use crate::queue::{AnyMessage, MessageHeaders, MessageQueue, QueueMessage};
use crate::store::ObjectStore;
use crate::task::ResultState;

async fn next_reply(global: &std::sync::Arc<crate::global::Global>, queue: &str) -> crate::task::TaskResult {
	let mut stream = global.queue().subscribe(queue, 0).await.expect("subscribe");

	tokio::time::timeout(std::time::Duration::from_secs(1), async {
		use futures::StreamExt;
		let message = stream.next().await.expect("stream closed").expect("delivery error");
		serde_json::from_slice(message.body()).expect("reply body is a valid Result")
	})
	.await
	.expect("no reply was published within the timeout")
}

fn json_message(reply_to: Option<&str>, body: serde_json::Value) -> AnyMessage {
	AnyMessage::Memory(MemoryMessage::new(
		"msg-1",
		serde_json::to_vec(&body).unwrap(),
		MessageHeaders {
			content_type: Some("application/json".to_string()),
			reply_to: reply_to.map(str::to_string),
		},
	))
}

#[tokio::test]
async fn bad_content_type_is_dropped_without_a_result() {
	let global = super::test_global().await;
	let ctx = Context::global();

	let msg = AnyMessage::Memory(MemoryMessage::new(
		"msg-1",
		b"irrelevant".to_vec(),
		MessageHeaders {
			content_type: Some("text/plain".to_string()),
			reply_to: Some("replies".to_string()),
		},
	));

	// Subscribe to the reply queue first: a classification error must never publish to it.
	let mut stream = global.queue().subscribe("replies", 0).await.unwrap();

	crate::coordinator::handle_message(&ctx, &global, &msg).await;

	use futures::StreamExt;
	let result = tokio::time::timeout(std::time::Duration::from_millis(200), stream.next()).await;
	assert!(result.is_err(), "no Result should be published for a rejected message");
}

#[tokio::test]
async fn missing_input_object_produces_a_failed_result() {
	let global = super::test_global().await;
	let ctx = Context::global();

	let msg = json_message(
		Some("replies"),
		json!({
			"id": "task-missing-input",
			"flags": 127,
			"input": {"bucket": "in", "key": "does-not-exist.gif"},
			"output": {"bucket": "out"},
			"scales": [1],
		}),
	);

	let reply_fut = next_reply(&global, "replies");
	crate::coordinator::handle_message(&ctx, &global, &msg).await;
	let result = reply_fut.await;

	assert_eq!(result.id, "task-missing-input");
	assert_eq!(result.state, ResultState::Failed);
	assert!(result.finished_at.is_some());
	assert!(result.started_at <= result.finished_at.unwrap());
	assert!(!result.message.is_empty());
}

#[tokio::test]
async fn unsupported_container_fails_without_reuploading_to_the_reupload_locator() {
	// An input that downloads fine but isn't a recognized container (here, plain text)
	// must fail at Detect, before any tool invocation -- independent of which native
	// tools happen to be installed in the environment running the test.
	let global = super::test_global().await;
	let ctx = Context::global();

	let location = crate::store::ObjectLocation {
		bucket: "in".to_string(),
		key: "source.bin".to_string(),
	};
	global
		.store()
		.upload_file(
			&location,
			bytes::Bytes::from_static(b"not a recognized media container"),
			crate::store::UploadOptions::default(),
		)
		.await
		.unwrap();

	let msg = json_message(
		Some("replies"),
		json!({
			"id": "task-unsupported",
			"flags": 8,
			"input": {"bucket": "in", "key": "source.bin"},
			"output": {"bucket": "out"},
			"scales": [1],
		}),
	);

	let reply_fut = next_reply(&global, "replies");
	crate::coordinator::handle_message(&ctx, &global, &msg).await;
	let result = reply_fut.await;

	assert_eq!(result.id, "task-unsupported");
	assert_eq!(result.state, ResultState::Failed);
	assert!(result.message.contains("unsupported"), "message was: {}", result.message);
}
