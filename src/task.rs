//! Wire-level job and result types exchanged with the broker.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

bitflags! {
	/// Which output formats a [`Task`] should produce.
	///
	/// Mirrors the integer bitmask used by the calling services: callers may send
	/// a raw integer and expect the same values back out in [`Result`] messages.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
	#[serde(transparent)]
	pub struct TaskFlags: u32 {
		const GIF = 1;
		const WEBP = 2;
		const AVIF = 4;
		const PNG = 8;
		const PNG_STATIC = 16;
		const WEBP_STATIC = 32;
		const AVIF_STATIC = 64;
		const ALL = 127;
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeRatio {
	#[default]
	Nothing,
	Stretch,
	PaddingRightBottom,
	PaddingLeftBottom,
	PaddingRightTop,
	PaddingLeftTop,
	PaddingCenter,
}

impl ResizeRatio {
	/// The flag value `resize_png` understands for this policy.
	pub fn as_tool_flag(&self) -> &'static str {
		match self {
			ResizeRatio::Nothing | ResizeRatio::Stretch => "Stretch",
			ResizeRatio::PaddingRightBottom => "PaddingRightBottom",
			ResizeRatio::PaddingLeftBottom => "PaddingLeftBottom",
			ResizeRatio::PaddingRightTop => "PaddingRightTop",
			ResizeRatio::PaddingLeftTop => "PaddingLeftTop",
			ResizeRatio::PaddingCenter => "PaddingCenter",
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Reupload {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default)]
	pub key: String,
	#[serde(default)]
	pub bucket: String,
	#[serde(default)]
	pub acl: String,
	#[serde(default)]
	pub cache_control: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInput {
	pub bucket: String,
	pub key: String,
	#[serde(default)]
	pub reupload: Reupload,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskOutput {
	#[serde(default)]
	pub prefix: String,
	#[serde(default)]
	pub acl: String,
	pub bucket: String,
	#[serde(default)]
	pub cache_control: String,
	#[serde(default)]
	pub exclude_file_extension: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Limits {
	/// Seconds. Zero means unbounded.
	#[serde(default)]
	pub max_processing_time: u64,
	#[serde(default)]
	pub max_frame_count: u32,
	#[serde(default)]
	pub max_width: u32,
	#[serde(default)]
	pub max_height: u32,
}

fn default_max_dim() -> u32 {
	96
}

fn default_max_height() -> u32 {
	32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
	pub id: String,
	pub flags: TaskFlags,
	pub input: TaskInput,
	pub output: TaskOutput,
	#[serde(default = "default_max_dim")]
	pub smallest_max_width: u32,
	#[serde(default = "default_max_height")]
	pub smallest_max_height: u32,
	#[serde(default)]
	pub resize_ratio: ResizeRatio,
	#[serde(default)]
	pub scales: Vec<u32>,
	#[serde(default)]
	pub limits: Limits,
	#[serde(default)]
	pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ResultState {
	Success = 1,
	Failed = 2,
}

impl std::fmt::Display for ResultState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ResultState::Success => write!(f, "SUCCESS"),
			ResultState::Failed => write!(f, "FAILED"),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileDescriptor {
	pub name: String,
	pub sha3: String,
	pub content_type: String,
	pub size: u64,
	pub key: String,
	pub bucket: String,
	pub acl: String,
	pub cache_control: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub frame_count: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub width: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
	pub id: String,
	pub started_at: chrono::DateTime<chrono::Utc>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
	pub state: ResultState,
	#[serde(default)]
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub image_input: Option<FileDescriptor>,
	#[serde(default)]
	pub image_outputs: Vec<FileDescriptor>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub archive_output: Option<FileDescriptor>,
	#[serde(default)]
	pub metadata: serde_json::Value,
}

impl TaskResult {
	pub fn new(task: &Task) -> Self {
		Self {
			id: task.id.clone(),
			started_at: chrono::Utc::now(),
			finished_at: None,
			state: ResultState::Failed,
			message: String::new(),
			image_input: None,
			image_outputs: Vec::new(),
			archive_output: None,
			metadata: task.metadata.clone(),
		}
	}

	pub fn succeed(&mut self) {
		self.state = ResultState::Success;
		self.message.clear();
		self.finished_at = Some(chrono::Utc::now());
	}

	pub fn fail(&mut self, message: impl Into<String>) {
		self.state = ResultState::Failed;
		self.message = message.into();
		self.finished_at = Some(chrono::Utc::now());
	}

	/// Appends `note` to `message` without touching `state`, for noteworthy failures
	/// (e.g. a broker ack/nack error) that shouldn't overwrite an already-decided outcome.
	pub fn append_note(&mut self, note: impl std::fmt::Display) {
		if self.message.is_empty() {
			self.message = note.to_string();
		} else {
			self.message = format!("{}; {note}", self.message);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn flags_roundtrip_through_json() {
		let json = serde_json::json!(127u32);
		let flags: TaskFlags = serde_json::from_value(json).unwrap();
		assert_eq!(flags, TaskFlags::ALL);
		assert_eq!(serde_json::to_value(flags).unwrap(), serde_json::json!(127));
	}

	#[test]
	fn defaults_apply_when_fields_are_omitted() {
		let raw = serde_json::json!({
			"id": "abc",
			"flags": 3,
			"input": {"bucket": "in", "key": "k.gif"},
			"output": {"bucket": "out"},
		});
		let task: Task = serde_json::from_value(raw).unwrap();
		assert_eq!(task.smallest_max_width, 96);
		assert_eq!(task.smallest_max_height, 32);
		assert!(task.scales.is_empty());
		assert_eq!(task.resize_ratio, ResizeRatio::Nothing);
	}

	#[test]
	fn result_state_serializes_as_integer() {
		assert_eq!(serde_json::to_value(ResultState::Success).unwrap(), serde_json::json!(1));
		assert_eq!(serde_json::to_value(ResultState::Failed).unwrap(), serde_json::json!(2));
	}

	#[test]
	fn append_note_leaves_state_untouched() {
		let task = Task {
			id: "t".into(),
			flags: TaskFlags::ALL,
			input: TaskInput {
				bucket: "b".into(),
				key: "k".into(),
				reupload: Default::default(),
			},
			output: Default::default(),
			smallest_max_width: 96,
			smallest_max_height: 32,
			resize_ratio: Default::default(),
			scales: vec![],
			limits: Default::default(),
			metadata: serde_json::Value::Null,
		};
		let mut result = TaskResult::new(&task);
		result.succeed();

		result.append_note("failed to ack message: broker unreachable");

		assert_eq!(result.state, ResultState::Success);
		assert_eq!(result.message, "failed to ack message: broker unreachable");

		result.append_note("failed to publish reply: timed out");
		assert_eq!(result.message, "failed to ack message: broker unreachable; failed to publish reply: timed out");
	}
}
