//! Target geometry computation and the `resize_png` invocation.

use scuffle_foundations::context::Context;

use super::PipelineError;
use crate::config::ToolsConfig;
use crate::task::{ResizeRatio, Task};
use crate::tool;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy)]
pub struct Geometry {
	pub width: u32,
	pub height: u32,
	pub resize_ratio: ResizeRatio,
}

/// Computes the base (1x) target dimensions and the effective resize policy.
///
/// When the task's policy is [`ResizeRatio::Nothing`] (the default), the source is
/// scaled down proportionally to fit within `smallest_max_width`/`smallest_max_height`
/// and the effective policy becomes `Stretch` for the tool invocation. Any other
/// policy passes through untouched, at the probed dimensions.
pub fn target_geometry(task: &Task, width: u32, height: u32) -> Geometry {
	if task.resize_ratio != ResizeRatio::Nothing {
		return Geometry {
			width,
			height,
			resize_ratio: task.resize_ratio,
		};
	}

	let smw = task.smallest_max_width;
	let smh = task.smallest_max_height;

	let (mut w, mut h) = (width as f64, height as f64);

	if (smw as f64) < w {
		h *= smw as f64 / w;
		w = smw as f64;
	}
	if (smh as f64) < h {
		w *= smh as f64 / h;
		h = smh as f64;
	}

	Geometry {
		width: w.round() as u32,
		height: h.round() as u32,
		resize_ratio: ResizeRatio::Stretch,
	}
}

/// Resizes every extracted frame to every requested scale in a single `resize_png`
/// invocation, producing `variants/<frame>_<scale>x.png`.
pub async fn resize_frames(
	ctx: &Context,
	tools: &ToolsConfig,
	workspace: &Workspace,
	frame_count: u32,
	scales: &[u32],
	geometry: &Geometry,
) -> Result<(), PipelineError> {
	if scales.is_empty() {
		return Ok(());
	}

	let threads = num_cpus::get().to_string();
	let ratio_flag = geometry.resize_ratio.as_tool_flag();

	let mut args: Vec<String> = vec!["-t".to_string(), threads];

	for frame in 0..frame_count {
		let input_path = workspace.input_dir().join(format!("{frame:04}.png"));
		args.push("-i".to_string());
		args.push(input_path.to_string_lossy().into_owned());

		for &scale in scales {
			let out_width = geometry.width * scale;
			let out_height = geometry.height * scale;
			let out_path = workspace.variants_dir().join(format!("{frame:04}_{scale}x.png"));

			args.push("-r".to_string());
			args.push(out_width.to_string());
			args.push(out_height.to_string());
			args.push("--resize-ratio".to_string());
			args.push(ratio_flag.to_string());
			args.push("-o".to_string());
			args.push(out_path.to_string_lossy().into_owned());
		}
	}

	let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
	tool::run(ctx, &tools.resize_png, &arg_refs, None).await?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::task::TaskInput;

	fn task(smw: u32, smh: u32, resize_ratio: ResizeRatio) -> Task {
		Task {
			id: "t".into(),
			flags: crate::task::TaskFlags::ALL,
			input: TaskInput {
				bucket: "b".into(),
				key: "k".into(),
				reupload: Default::default(),
			},
			output: Default::default(),
			smallest_max_width: smw,
			smallest_max_height: smh,
			resize_ratio,
			scales: vec![1],
			limits: Default::default(),
			metadata: serde_json::Value::Null,
		}
	}

	#[test]
	fn shrinks_proportionally_to_fit_both_dimensions() {
		let t = task(96, 32, ResizeRatio::Nothing);
		let geometry = target_geometry(&t, 200, 100);
		assert_eq!(geometry.width, 64);
		assert_eq!(geometry.height, 32);
		assert_eq!(geometry.resize_ratio, ResizeRatio::Stretch);
	}

	#[test]
	fn leaves_dimensions_within_bounds_unchanged() {
		let t = task(96, 32, ResizeRatio::Nothing);
		let geometry = target_geometry(&t, 50, 20);
		assert_eq!(geometry.width, 50);
		assert_eq!(geometry.height, 20);
	}

	#[test]
	fn passes_through_explicit_resize_ratio() {
		let t = task(96, 32, ResizeRatio::PaddingCenter);
		let geometry = target_geometry(&t, 200, 100);
		assert_eq!(geometry.width, 200);
		assert_eq!(geometry.height, 100);
		assert_eq!(geometry.resize_ratio, ResizeRatio::PaddingCenter);
	}
}
