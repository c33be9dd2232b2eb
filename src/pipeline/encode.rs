//! Encoding, optimization, and output-matrix gating (§4.4).

use scuffle_foundations::context::Context;

use super::PipelineError;
use crate::config::ToolsConfig;
use crate::task::{Task, TaskFlags};
use crate::tool;
use crate::workspace::Workspace;

pub async fn encode_outputs(
	ctx: &Context,
	tools: &ToolsConfig,
	workspace: &Workspace,
	task: &Task,
	animated: bool,
	frame_count: u32,
	delays: &[u32],
) -> Result<(), PipelineError> {
	let suffix = if animated { "_static" } else { "" };

	for &scale in &task.scales {
		if animated {
			encode_animated(ctx, tools, workspace, task.flags, frame_count, delays, scale).await?;
		}

		encode_static(ctx, tools, workspace, task.flags, animated, suffix, scale).await?;
	}

	Ok(())
}

async fn encode_animated(
	ctx: &Context,
	tools: &ToolsConfig,
	workspace: &Workspace,
	flags: TaskFlags,
	frame_count: u32,
	delays: &[u32],
	scale: u32,
) -> Result<(), PipelineError> {
	let avif = flags.contains(TaskFlags::AVIF);
	let webp = flags.contains(TaskFlags::WEBP);
	let gif = flags.contains(TaskFlags::GIF);

	if !avif && !webp && !gif {
		return Ok(());
	}

	let threads = num_cpus::get().to_string();
	let mut args: Vec<String> = vec!["-t".to_string(), threads];

	for frame in 0..frame_count {
		let delay = delays.get(frame as usize).copied().unwrap_or(10);
		let delay = if delay <= 1 { 10 } else { delay };

		args.push("-d".to_string());
		args.push(delay.to_string());
		args.push("-i".to_string());
		args.push(
			workspace
				.variants_dir()
				.join(format!("{frame:04}_{scale}x.png"))
				.to_string_lossy()
				.into_owned(),
		);
	}

	let gif_path = workspace.results_dir().join(format!("{scale}x.gif"));

	if avif {
		args.push("-o".to_string());
		args.push(workspace.results_dir().join(format!("{scale}x.avif")).to_string_lossy().into_owned());
	}
	if webp {
		args.push("-o".to_string());
		args.push(workspace.results_dir().join(format!("{scale}x.webp")).to_string_lossy().into_owned());
	}
	if gif {
		args.push("-o".to_string());
		args.push(gif_path.to_string_lossy().into_owned());
	}

	let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
	tool::run(ctx, &tools.convert_png, &arg_refs, None).await?;

	if gif {
		let path = gif_path.to_string_lossy().into_owned();
		tool::run(ctx, &tools.gifsicle, &["-O3", "--colors", "256", "-b", &path], None).await?;
	}

	Ok(())
}

async fn encode_static(
	ctx: &Context,
	tools: &ToolsConfig,
	workspace: &Workspace,
	flags: TaskFlags,
	source_animated: bool,
	suffix: &str,
	scale: u32,
) -> Result<(), PipelineError> {
	let avif = wants_static(flags, TaskFlags::AVIF, TaskFlags::AVIF_STATIC, source_animated);
	let webp = wants_static(flags, TaskFlags::WEBP, TaskFlags::WEBP_STATIC, source_animated);
	let png = wants_static(flags, TaskFlags::PNG, TaskFlags::PNG_STATIC, source_animated);

	if !avif && !webp && !png {
		return Ok(());
	}

	let frame0 = workspace.variants_dir().join(format!("0000_{scale}x.png"));

	if avif || webp {
		let threads = num_cpus::get().to_string();
		let mut args: Vec<String> = vec![
			"-t".to_string(),
			threads,
			"-d".to_string(),
			"0".to_string(),
			"-i".to_string(),
			frame0.to_string_lossy().into_owned(),
		];

		if avif {
			args.push("-o".to_string());
			args.push(
				workspace
					.results_dir()
					.join(format!("{scale}x{suffix}.avif"))
					.to_string_lossy()
					.into_owned(),
			);
		}
		if webp {
			args.push("-o".to_string());
			args.push(
				workspace
					.results_dir()
					.join(format!("{scale}x{suffix}.webp"))
					.to_string_lossy()
					.into_owned(),
			);
		}

		let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
		tool::run(ctx, &tools.convert_png, &arg_refs, None).await?;
	}

	if png {
		let out_path = workspace.results_dir().join(format!("{scale}x{suffix}.png"));
		std::fs::copy(&frame0, &out_path)?;

		let path = out_path.to_string_lossy().into_owned();
		tool::run(ctx, &tools.optipng, &["-o6", &path], None).await?;
	}

	Ok(())
}

fn wants_static(flags: TaskFlags, plain: TaskFlags, static_flag: TaskFlags, source_animated: bool) -> bool {
	if source_animated {
		flags.contains(static_flag)
	} else {
		flags.contains(plain)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn animated_source_static_output_gated_by_the_static_flag() {
		assert!(wants_static(TaskFlags::AVIF_STATIC, TaskFlags::AVIF, TaskFlags::AVIF_STATIC, true));
		assert!(!wants_static(TaskFlags::AVIF, TaskFlags::AVIF, TaskFlags::AVIF_STATIC, true));
	}

	#[test]
	fn static_source_static_output_gated_by_the_plain_flag() {
		assert!(wants_static(TaskFlags::WEBP, TaskFlags::WEBP, TaskFlags::WEBP_STATIC, false));
		assert!(!wants_static(TaskFlags::WEBP_STATIC, TaskFlags::WEBP, TaskFlags::WEBP_STATIC, false));
	}

	#[test]
	fn all_flags_produce_every_static_variant_regardless_of_source() {
		for source_animated in [true, false] {
			assert!(wants_static(TaskFlags::ALL, TaskFlags::PNG, TaskFlags::PNG_STATIC, source_animated));
			assert!(wants_static(TaskFlags::ALL, TaskFlags::WEBP, TaskFlags::WEBP_STATIC, source_animated));
			assert!(wants_static(TaskFlags::ALL, TaskFlags::AVIF, TaskFlags::AVIF_STATIC, source_animated));
		}
	}
}
