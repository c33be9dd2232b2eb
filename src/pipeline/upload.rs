//! Hashes, probes, and uploads every artifact under `results/` plus the archive, in
//! parallel, accumulating descriptors and errors under a shared lock.

use std::sync::{Arc, Mutex};

use scuffle_foundations::context::Context;
use sha3::{Digest, Sha3_512};

use super::probe;
use super::PipelineError;
use crate::config::ToolsConfig;
use crate::container::Container;
use crate::global::Global;
use crate::store::{ObjectLocation, ObjectStore, UploadOptions};
use crate::task::{FileDescriptor, Task, TaskResult};
use crate::workspace::Workspace;

#[derive(Debug)]
pub struct UploadErrors(pub Vec<String>);

impl std::fmt::Display for UploadErrors {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} artifact(s) failed to upload: {}", self.0.len(), self.0.join("; "))
	}
}

impl std::error::Error for UploadErrors {}

struct Accumulated {
	image_outputs: Vec<FileDescriptor>,
	archive_output: Option<FileDescriptor>,
	errors: Vec<String>,
}

#[tracing::instrument(skip_all, err)]
pub async fn upload_all(
	ctx: &Context,
	global: &Arc<Global>,
	task: &Task,
	workspace: &Workspace,
	result: &mut TaskResult,
) -> Result<(), PipelineError> {
	let mut files = Vec::new();
	for entry in walkdir::WalkDir::new(workspace.results_dir()).into_iter().filter_map(Result::ok) {
		if entry.file_type().is_file() {
			files.push(entry.path().to_path_buf());
		}
	}
	files.push(workspace.archive_path());

	let accumulated = Mutex::new(Accumulated {
		image_outputs: Vec::new(),
		archive_output: None,
		errors: Vec::new(),
	});

	let jobs = files.into_iter().map(|path| {
		let accumulated = &accumulated;
		async move {
			match upload_one(ctx, global, task, &path).await {
				Ok(UploadedArtifact::Archive(descriptor)) => {
					accumulated.lock().unwrap().archive_output = Some(descriptor);
				}
				Ok(UploadedArtifact::Image(descriptor)) => {
					accumulated.lock().unwrap().image_outputs.push(descriptor);
				}
				Err(err) => {
					accumulated.lock().unwrap().errors.push(format!("{}: {err}", path.display()));
				}
			}
		}
	});

	futures::future::join_all(jobs).await;

	let accumulated = accumulated.into_inner().unwrap();

	result.image_outputs = accumulated.image_outputs;
	result.archive_output = accumulated.archive_output;

	if !accumulated.errors.is_empty() {
		return Err(PipelineError::Upload(UploadErrors(accumulated.errors)));
	}

	Ok(())
}

enum UploadedArtifact {
	Image(FileDescriptor),
	Archive(FileDescriptor),
}

async fn upload_one(ctx: &Context, global: &Arc<Global>, task: &Task, path: &std::path::Path) -> Result<UploadedArtifact, PipelineError> {
	let bytes = tokio::fs::read(path).await?;

	let mut hasher = Sha3_512::new();
	hasher.update(&bytes);
	let sha3 = hex::encode(hasher.finalize());

	let container = Container::detect(&bytes).ok_or(PipelineError::UnsupportedFormat)?;
	let content_type = container.content_type().to_string();

	let basename = path.file_name().and_then(|n| n.to_str()).unwrap_or("artifact").to_string();
	let (mut key, mut name) = (join_key(&task.output.prefix, &basename), basename.clone());

	if task.output.exclude_file_extension {
		if let Some(stripped) = key.strip_suffix(".webp") {
			key = stripped.to_string();
		}
		if let Some(stripped) = name.strip_suffix(".webp") {
			name = stripped.to_string();
		}
	}

	let size = bytes.len() as u64;

	let descriptor_base = FileDescriptor {
		name,
		sha3,
		content_type: content_type.clone(),
		size,
		key: key.clone(),
		bucket: task.output.bucket.clone(),
		acl: task.output.acl.clone(),
		cache_control: task.output.cache_control.clone(),
		frame_count: None,
		width: None,
		height: None,
	};

	let location = ObjectLocation {
		bucket: task.output.bucket.clone(),
		key: key.clone(),
	};
	let options = UploadOptions {
		acl: Some(task.output.acl.clone()),
		cache_control: Some(task.output.cache_control.clone()),
		content_type: Some(content_type),
	};

	global.store().upload_file(&location, bytes::Bytes::from(bytes), options).await?;

	if container == Container::Zip {
		return Ok(UploadedArtifact::Archive(descriptor_base));
	}

	let tools = &global.config().tools;
	let (width, height, frame_count) = probe_dimensions(ctx, tools, container, path).await?;

	Ok(UploadedArtifact::Image(FileDescriptor {
		frame_count: Some(frame_count),
		width: Some(width),
		height: Some(height),
		..descriptor_base
	}))
}

async fn probe_dimensions(ctx: &Context, tools: &ToolsConfig, container: Container, path: &std::path::Path) -> Result<(u32, u32, u32), PipelineError> {
	match container {
		Container::Gif | Container::Png => probe::encoded_raster_info(ctx, tools, path).await,
		Container::Webp | Container::Avif => probe::encoded_container_info(ctx, tools, path).await,
		_ => Ok((0, 0, 1)),
	}
}

fn join_key(prefix: &str, basename: &str) -> String {
	if prefix.is_empty() {
		basename.to_string()
	} else {
		format!("{}/{}", prefix.trim_end_matches('/'), basename)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn join_key_without_prefix_is_bare_basename() {
		assert_eq!(join_key("", "1x.png"), "1x.png");
	}

	#[test]
	fn join_key_with_prefix_joins_with_slash() {
		assert_eq!(join_key("emotes/123", "1x.png"), "emotes/123/1x.png");
	}

	#[test]
	fn join_key_trims_trailing_slash_in_prefix() {
		assert_eq!(join_key("emotes/123/", "1x.png"), "emotes/123/1x.png");
	}
}
