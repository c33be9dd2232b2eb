//! Runs the external native tools (`ffmpeg`, `ffprobe`, `dump_png`, `resize_png`,
//! `convert_png`, `gifsicle`, `optipng`) as cancellable child processes.
//!
//! The pipeline never parses these tools' formats itself here; it only captures their
//! combined stdout+stderr and surfaces the tool name plus that output on failure. Callers
//! own parsing the stdout half of that output and are expected to treat a parse failure
//! the same way as a nonzero exit.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use scuffle_foundations::context::Context;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
	#[error("failed to spawn {tool}: {source}")]
	Spawn { tool: String, source: std::io::Error },
	#[error("{tool} exited with {status}: {output}")]
	NonZeroExit {
		tool: String,
		status: ExitStatus,
		output: String,
	},
	#[error("{tool} was cancelled")]
	Cancelled { tool: String },
	#[error("failed to parse {tool} output: {reason}\n--- output ---\n{output}")]
	UnparseableOutput { tool: String, reason: String, output: String },
	#[error("io error running {tool}: {source}")]
	Io { tool: String, source: std::io::Error },
}

/// The outcome of a tool invocation: exit status plus combined stdout+stderr.
pub struct ToolOutput {
	pub tool: String,
	pub stdout: String,
}

impl ToolOutput {
	pub fn parse_err(&self, reason: impl std::fmt::Display) -> ToolError {
		ToolError::UnparseableOutput {
			tool: self.tool.clone(),
			reason: reason.to_string(),
			output: self.stdout.clone(),
		}
	}
}

/// Runs `tool` with `args`, under `ctx`'s cancellation, in `cwd` if given.
///
/// Stdout and stderr are merged into a single captured stream, mirroring how the real
/// tools interleave diagnostics and data on either descriptor depending on flags.
#[tracing::instrument(skip(ctx, args), fields(tool = %tool, args = ?args))]
pub async fn run(ctx: &Context, tool: &str, args: &[&str], cwd: Option<&Path>) -> Result<ToolOutput, ToolError> {
	let mut command = Command::new(tool);
	command
		.args(args)
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.kill_on_drop(true);

	if let Some(cwd) = cwd {
		command.current_dir(cwd);
	}

	let mut child = command.spawn().map_err(|source| ToolError::Spawn {
		tool: tool.to_string(),
		source,
	})?;

	let mut stdout = child.stdout.take().expect("stdout piped");
	let mut stderr = child.stderr.take().expect("stderr piped");

	let output_fut = async {
		let mut stdout_buf = Vec::new();
		let mut stderr_buf = Vec::new();

		let (stdout_res, stderr_res) = tokio::join!(stdout.read_to_end(&mut stdout_buf), stderr.read_to_end(&mut stderr_buf));
		stdout_res.map_err(|source| ToolError::Io {
			tool: tool.to_string(),
			source,
		})?;
		stderr_res.map_err(|source| ToolError::Io {
			tool: tool.to_string(),
			source,
		})?;

		let status = child.wait().await.map_err(|source| ToolError::Io {
			tool: tool.to_string(),
			source,
		})?;

		Ok::<_, ToolError>((status, stdout_buf, stderr_buf))
	};

	tokio::select! {
		result = output_fut => {
			let (status, stdout_buf, stderr_buf) = result?;
			let stdout = String::from_utf8_lossy(&stdout_buf).into_owned();

			if !status.success() {
				let mut combined = stdout.clone();
				combined.push_str(&String::from_utf8_lossy(&stderr_buf));

				return Err(ToolError::NonZeroExit {
					tool: tool.to_string(),
					status,
					output: combined,
				});
			}

			Ok(ToolOutput { tool: tool.to_string(), stdout })
		}
		_ = ctx.done() => {
			Err(ToolError::Cancelled { tool: tool.to_string() })
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn captures_stdout() {
		let ctx = Context::global();
		let output = run(&ctx, "echo", &["hello"], None).await.unwrap();
		assert!(output.stdout.contains("hello"));
	}

	#[tokio::test]
	async fn nonzero_exit_is_an_error() {
		let ctx = Context::global();
		let err = run(&ctx, "false", &[], None).await.unwrap_err();
		assert!(matches!(err, ToolError::NonZeroExit { .. }));
	}

	#[tokio::test]
	async fn missing_binary_is_a_spawn_error() {
		let ctx = Context::global();
		let err = run(&ctx, "definitely-not-a-real-binary", &[], None).await.unwrap_err();
		assert!(matches!(err, ToolError::Spawn { .. }));
	}
}
