//! Frame extraction: materializes per-frame PNGs under `input/` and derives a
//! per-frame delay vector (in centiseconds).

use std::path::Path;

use scuffle_foundations::context::Context;

use super::PipelineError;
use crate::config::ToolsConfig;
use crate::container::Container;
use crate::tool;
use crate::workspace::Workspace;

pub async fn extract_frames(
	ctx: &Context,
	tools: &ToolsConfig,
	workspace: &Workspace,
	container: Container,
) -> Result<Vec<u32>, PipelineError> {
	let input_file = workspace.input_file();
	let input_dir = workspace.input_dir();

	match container {
		Container::Webp | Container::Avif => dump_png_frames(ctx, tools, &input_file, &input_dir).await,
		Container::Gif => {
			let bytes = std::fs::read(&input_file)?;
			let delays = gif_delays(&bytes)?;
			run_ffmpeg_dump(ctx, tools, &input_file, &input_dir).await?;
			Ok(delays)
		}
		Container::Zip => Err(PipelineError::UnsupportedFormat),
		_ => {
			run_ffmpeg_dump(ctx, tools, &input_file, &input_dir).await?;
			let frame_count = count_frames(&input_dir)?;

			if frame_count <= 1 {
				return Ok(vec![0; frame_count.max(1) as usize]);
			}

			let (num, den) = super::probe::frame_rate(ctx, tools, &input_file).await?;
			let delay = ((100.0 * den as f64 / num as f64).round() as u32).max(2);
			Ok(vec![delay; frame_count as usize])
		}
	}
}

/// Parses `dump_png`'s stdout: from line index 3 onward, `"index,delay"`.
async fn dump_png_frames(ctx: &Context, tools: &ToolsConfig, input: &Path, out_dir: &Path) -> Result<Vec<u32>, PipelineError> {
	let input = input.to_string_lossy().into_owned();
	let out_dir = out_dir.to_string_lossy().into_owned();

	let output = tool::run(ctx, &tools.dump_png, &["-i", &input, "-o", &out_dir], None).await?;

	let mut delays = Vec::new();
	for line in output.stdout.lines().skip(3) {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}

		let (_, delay) = line.split_once(',').ok_or_else(|| output.parse_err("expected \"index,delay\""))?;
		let delay: u32 = delay.trim().parse().map_err(|_| output.parse_err("non-integer delay"))?;
		delays.push(delay);
	}

	Ok(delays)
}

async fn run_ffmpeg_dump(ctx: &Context, tools: &ToolsConfig, input: &Path, out_dir: &Path) -> Result<(), PipelineError> {
	let input = input.to_string_lossy().into_owned();
	let pattern = out_dir.join("%04d.png");
	let pattern = pattern.to_string_lossy().into_owned();

	tool::run(
		ctx,
		&tools.ffmpeg,
		&[
			"-v",
			"error",
			"-nostats",
			"-hide_banner",
			"-i",
			&input,
			"-vsync",
			"0",
			"-f",
			"image2",
			"-start_number",
			"0",
			&pattern,
		],
		None,
	)
	.await?;

	Ok(())
}

fn count_frames(dir: &Path) -> std::io::Result<u32> {
	let mut count = 0;
	for entry in std::fs::read_dir(dir)? {
		let entry = entry?;
		if entry.path().extension().is_some_and(|ext| ext == "png") {
			count += 1;
		}
	}
	Ok(count)
}

/// Decodes a gif's per-frame delays. `delay ≤ 1` becomes `10` (browsers treat 100fps
/// gifs as 10fps); `delay ≤ 2` becomes `2`.
fn gif_delays(bytes: &[u8]) -> Result<Vec<u32>, PipelineError> {
	let mut options = gif::DecodeOptions::new();
	options.set_color_output(gif::ColorOutput::Indexed);

	let mut decoder = options.read_info(std::io::Cursor::new(bytes))?;
	let mut delays = Vec::new();

	while let Some(frame) = decoder.read_next_frame()? {
		let delay = frame.delay as u32;
		delays.push(if delay <= 1 {
			10
		} else if delay <= 2 {
			2
		} else {
			delay
		});
	}

	Ok(delays)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dump_png_delay_parsing_skips_header_lines() {
		let stdout = "header\nheader\nheader\n0,10\n1,20\n".to_string();
		let output = tool::ToolOutput {
			tool: "dump_png".into(),
			stdout,
		};

		let mut delays = Vec::new();
		for line in output.stdout.lines().skip(3) {
			let (_, delay) = line.split_once(',').unwrap();
			delays.push(delay.trim().parse::<u32>().unwrap());
		}

		assert_eq!(delays, vec![10, 20]);
	}
}
