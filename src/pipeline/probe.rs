//! Thin wrappers around `ffprobe` invocations shared by extraction and upload.

use std::path::Path;

use scuffle_foundations::context::Context;

use super::PipelineError;
use crate::config::ToolsConfig;
use crate::tool;

/// Probes `png`'s width/height via `ffprobe`.
pub async fn dimensions(ctx: &Context, tools: &ToolsConfig, png: &Path) -> Result<(u32, u32), PipelineError> {
	let path = png.to_string_lossy().into_owned();
	let output = tool::run(
		ctx,
		&tools.ffprobe,
		&[
			"-v",
			"error",
			"-select_streams",
			"v",
			"-of",
			"default=noprint_wrappers=1:nokey=1",
			"-show_entries",
			"stream=width,height",
			&path,
		],
		None,
	)
	.await?;

	let mut lines = output.stdout.lines();
	let width: u32 = lines
		.next()
		.and_then(|l| l.trim().parse().ok())
		.ok_or_else(|| output.parse_err("missing width"))?;
	let height: u32 = lines
		.next()
		.and_then(|l| l.trim().parse().ok())
		.ok_or_else(|| output.parse_err("missing height"))?;

	Ok((width, height))
}

/// Probes `input`'s `r_frame_rate` as `(numerator, denominator)`.
pub async fn frame_rate(ctx: &Context, tools: &ToolsConfig, input: &Path) -> Result<(u64, u64), PipelineError> {
	let path = input.to_string_lossy().into_owned();
	let output = tool::run(
		ctx,
		&tools.ffprobe,
		&[
			"-v",
			"error",
			"-select_streams",
			"v",
			"-of",
			"default=noprint_wrappers=1:nokey=1",
			"-show_entries",
			"stream=r_frame_rate",
			&path,
		],
		None,
	)
	.await?;

	let line = output.stdout.lines().next().ok_or_else(|| output.parse_err("missing r_frame_rate"))?;
	let (num, den) = line
		.trim()
		.split_once('/')
		.ok_or_else(|| output.parse_err("r_frame_rate is not a fraction"))?;

	let num: u64 = num.parse().map_err(|_| output.parse_err("invalid r_frame_rate numerator"))?;
	let den: u64 = den.parse().map_err(|_| output.parse_err("invalid r_frame_rate denominator"))?;

	Ok((num, den))
}

/// Probes an already-encoded gif/png output for `(width, height, frame_count)`.
pub async fn encoded_raster_info(ctx: &Context, tools: &ToolsConfig, path: &Path) -> Result<(u32, u32, u32), PipelineError> {
	let path_str = path.to_string_lossy().into_owned();
	let output = tool::run(
		ctx,
		&tools.ffprobe,
		&[
			"-v",
			"error",
			"-select_streams",
			"v:0",
			"-count_packets",
			"-show_entries",
			"stream=width,height,nb_read_packets",
			"-of",
			"csv=p=0",
			&path_str,
		],
		None,
	)
	.await?;

	let line = output.stdout.lines().next().ok_or_else(|| output.parse_err("empty ffprobe output"))?;
	let mut parts = line.trim().split(',');

	let width: u32 = parts
		.next()
		.and_then(|s| s.parse().ok())
		.ok_or_else(|| output.parse_err("missing width"))?;
	let height: u32 = parts
		.next()
		.and_then(|s| s.parse().ok())
		.ok_or_else(|| output.parse_err("missing height"))?;
	let frame_count: u32 = parts
		.next()
		.and_then(|s| s.parse().ok())
		.ok_or_else(|| output.parse_err("missing frame count"))?;

	Ok((width, height, frame_count))
}

/// Probes an already-encoded webp/avif output for `(width, height, frame_count)` via
/// `dump_png --info`.
pub async fn encoded_container_info(ctx: &Context, tools: &ToolsConfig, path: &Path) -> Result<(u32, u32, u32), PipelineError> {
	let path_str = path.to_string_lossy().into_owned();
	let output = tool::run(ctx, &tools.dump_png, &["--info", "-i", &path_str], None).await?;

	let line = output.stdout.lines().nth(1).ok_or_else(|| output.parse_err("missing info line"))?;
	let mut parts = line.trim().split(',');

	let width: u32 = parts
		.next()
		.and_then(|s| s.parse().ok())
		.ok_or_else(|| output.parse_err("missing width"))?;
	let height: u32 = parts
		.next()
		.and_then(|s| s.parse().ok())
		.ok_or_else(|| output.parse_err("missing height"))?;
	let frame_count: u32 = parts
		.next()
		.and_then(|s| s.parse().ok())
		.ok_or_else(|| output.parse_err("missing frame count"))?;

	Ok((width, height, frame_count))
}
