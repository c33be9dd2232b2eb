//! The transcoding pipeline: Download → Detect → ExtractFrames → Resize → Encode →
//! Cleanup-input → Archive → Upload.

use std::sync::Arc;

use scuffle_foundations::context::Context;

use sha3::{Digest, Sha3_512};

use crate::container::Container;
use crate::global::Global;
use crate::store::{ObjectLocation, ObjectStore, StoreError, UploadOptions};
use crate::task::{FileDescriptor, Task, TaskResult};
use crate::tool::ToolError;
use crate::workspace::{Workspace, WorkspaceError};

mod archive;
mod encode;
mod extract;
mod probe;
mod resize;
mod upload;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
	#[error("workspace: {0}")]
	Workspace(#[from] WorkspaceError),
	#[error("object store: {0}")]
	Store(#[from] StoreError),
	#[error("tool: {0}")]
	Tool(#[from] ToolError),
	#[error("io: {0}")]
	Io(#[from] std::io::Error),
	#[error("gif decode: {0}")]
	Gif(#[from] gif::DecodingError),
	#[error("zip: {0}")]
	Zip(#[from] zip::result::ZipError),
	#[error("unsupported image format")]
	UnsupportedFormat,
	#[error("file has too many frames ({count} where the limit is {limit})")]
	TooManyFrames { count: u32, limit: u32 },
	#[error("file is too wide ({width} where the limit is {limit})")]
	TooWide { width: u32, limit: u32 },
	#[error("file is too tall ({height} where the limit is {limit})")]
	TooTall { height: u32, limit: u32 },
	#[error("upload: {0}")]
	Upload(#[from] upload::UploadErrors),
}

/// Runs every stage of the pipeline for `task`, writing progress into `result`.
///
/// Returns `Ok(())` on success; the caller (the coordinator) is responsible for
/// translating a returned error into a FAILED [`TaskResult`].
#[tracing::instrument(skip_all, fields(task_id = %task.id), err)]
pub async fn run(ctx: &Context, global: &Arc<Global>, task: &Task, result: &mut TaskResult) -> Result<(), PipelineError> {
	let tools = &global.config().tools;
	let workspace = Workspace::create(&global.config().workspace_root)?;

	tracing::debug!(root = %workspace.root().display(), "created workspace");

	let input_bytes = download(global, task).await?;

	if task.input.reupload.enabled {
		reupload_input(global, task, &input_bytes).await?;
	}

	let container = Container::detect(&input_bytes).ok_or(PipelineError::UnsupportedFormat)?;

	result.image_input = Some(describe_input(task, container, &input_bytes));

	std::fs::write(workspace.input_file(), &input_bytes)?;
	drop(input_bytes);

	let delays = extract::extract_frames(ctx, tools, &workspace, container).await?;
	let frame_count = delays.len().max(1) as u32;

	let (width, height) = probe::dimensions(ctx, tools, &workspace.input_dir().join("0000.png")).await?;

	if let Some(descriptor) = result.image_input.as_mut() {
		descriptor.width = Some(width);
		descriptor.height = Some(height);
		descriptor.frame_count = Some(frame_count);
	}

	enforce_limits(task, frame_count, width, height)?;

	let geometry = resize::target_geometry(task, width, height);
	resize::resize_frames(ctx, tools, &workspace, frame_count, &task.scales, &geometry).await?;

	let animated = frame_count > 1;
	encode::encode_outputs(ctx, tools, &workspace, task, animated, frame_count, &delays).await?;

	workspace.cleanup_input()?;

	archive::build_archive(&workspace)?;

	upload::upload_all(ctx, global, task, &workspace, result).await?;

	Ok(())
}

async fn download(global: &Arc<Global>, task: &Task) -> Result<bytes::Bytes, PipelineError> {
	let location = ObjectLocation {
		bucket: task.input.bucket.clone(),
		key: task.input.key.clone(),
	};

	Ok(global.store().download_file(&location).await?)
}

async fn reupload_input(global: &Arc<Global>, task: &Task, bytes: &bytes::Bytes) -> Result<(), PipelineError> {
	let reupload = &task.input.reupload;
	let location = ObjectLocation {
		bucket: reupload.bucket.clone(),
		key: reupload.key.clone(),
	};
	let options = UploadOptions {
		acl: Some(reupload.acl.clone()),
		cache_control: Some(reupload.cache_control.clone()),
		content_type: None,
	};

	Ok(global.store().upload_file(&location, bytes.clone(), options).await?)
}

/// Describes the raw downloaded input. Reflects the reupload locator when the task
/// persists the original, since that is where these exact bytes end up; otherwise
/// the source locator is used for reference only (nothing is uploaded there).
fn describe_input(task: &Task, container: Container, bytes: &bytes::Bytes) -> FileDescriptor {
	let mut hasher = Sha3_512::new();
	hasher.update(bytes);
	let sha3 = hex::encode(hasher.finalize());

	let name = task.input.key.rsplit('/').next().unwrap_or(&task.input.key).to_string();

	let (key, bucket, acl, cache_control) = if task.input.reupload.enabled {
		(
			task.input.reupload.key.clone(),
			task.input.reupload.bucket.clone(),
			task.input.reupload.acl.clone(),
			task.input.reupload.cache_control.clone(),
		)
	} else {
		(task.input.key.clone(), task.input.bucket.clone(), String::new(), String::new())
	};

	FileDescriptor {
		name,
		sha3,
		content_type: container.content_type().to_string(),
		size: bytes.len() as u64,
		key,
		bucket,
		acl,
		cache_control,
		frame_count: None,
		width: None,
		height: None,
	}
}

fn enforce_limits(task: &Task, frame_count: u32, width: u32, height: u32) -> Result<(), PipelineError> {
	let limits = &task.limits;

	if limits.max_frame_count > 0 && frame_count > limits.max_frame_count {
		return Err(PipelineError::TooManyFrames {
			count: frame_count,
			limit: limits.max_frame_count,
		});
	}

	if limits.max_width > 0 && width > limits.max_width {
		return Err(PipelineError::TooWide { width, limit: limits.max_width });
	}

	if limits.max_height > 0 && height > limits.max_height {
		return Err(PipelineError::TooTall { height, limit: limits.max_height });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::task::{Limits, TaskFlags, TaskInput, TaskOutput};

	fn task_with_limits(limits: Limits) -> Task {
		Task {
			id: "t".into(),
			flags: TaskFlags::ALL,
			input: TaskInput {
				bucket: "b".into(),
				key: "k.gif".into(),
				reupload: Default::default(),
			},
			output: TaskOutput::default(),
			smallest_max_width: 96,
			smallest_max_height: 32,
			resize_ratio: Default::default(),
			scales: vec![1],
			limits,
			metadata: serde_json::Value::Null,
		}
	}

	#[test]
	fn zero_limits_are_unbounded() {
		let task = task_with_limits(Limits::default());
		assert!(enforce_limits(&task, 500, 4000, 4000).is_ok());
	}

	#[test]
	fn frame_count_over_the_limit_is_rejected() {
		let task = task_with_limits(Limits {
			max_frame_count: 2,
			..Default::default()
		});
		let err = enforce_limits(&task, 3, 10, 10).unwrap_err();
		assert!(matches!(err, PipelineError::TooManyFrames { count: 3, limit: 2 }));
	}

	#[test]
	fn frame_count_at_the_limit_is_accepted() {
		let task = task_with_limits(Limits {
			max_frame_count: 3,
			..Default::default()
		});
		assert!(enforce_limits(&task, 3, 10, 10).is_ok());
	}

	#[test]
	fn width_over_the_limit_is_rejected() {
		let task = task_with_limits(Limits {
			max_width: 100,
			..Default::default()
		});
		let err = enforce_limits(&task, 1, 101, 10).unwrap_err();
		assert!(matches!(err, PipelineError::TooWide { width: 101, limit: 100 }));
	}

	#[test]
	fn height_over_the_limit_is_rejected() {
		let task = task_with_limits(Limits {
			max_height: 100,
			..Default::default()
		});
		let err = enforce_limits(&task, 1, 10, 101).unwrap_err();
		assert!(matches!(err, PipelineError::TooTall { height: 101, limit: 100 }));
	}

	#[test]
	fn describe_input_uses_the_reupload_locator_when_reupload_is_enabled() {
		let mut task = task_with_limits(Limits::default());
		task.input.reupload = crate::task::Reupload {
			enabled: true,
			key: "archive/k.gif".into(),
			bucket: "archive-bucket".into(),
			acl: "public-read".into(),
			cache_control: "max-age=3600".into(),
		};

		let descriptor = describe_input(&task, Container::Gif, &bytes::Bytes::from_static(b"gif bytes"));

		assert_eq!(descriptor.bucket, "archive-bucket");
		assert_eq!(descriptor.key, "archive/k.gif");
		assert_eq!(descriptor.acl, "public-read");
		assert_eq!(descriptor.content_type, "image/gif");
		assert_eq!(descriptor.size, 9);
		assert!(!descriptor.sha3.is_empty());
	}

	#[test]
	fn describe_input_uses_the_source_locator_when_reupload_is_disabled() {
		let task = task_with_limits(Limits::default());
		let descriptor = describe_input(&task, Container::Gif, &bytes::Bytes::from_static(b"gif bytes"));

		assert_eq!(descriptor.bucket, "b");
		assert_eq!(descriptor.key, "k.gif");
		assert_eq!(descriptor.acl, "");
	}
}

