//! Deterministic `emote.zip` assembly: walk `results/` then `variants/`.

use std::fs::File;
use std::io::{Read, Write};

use zip::write::FileOptions;
use zip::ZipWriter;

use super::PipelineError;
use crate::workspace::Workspace;

pub fn build_archive(workspace: &Workspace) -> Result<(), PipelineError> {
	let mut entries = Vec::new();
	collect_files(&workspace.results_dir(), workspace.root(), &mut entries);
	collect_files(&workspace.variants_dir(), workspace.root(), &mut entries);
	entries.sort();

	let file = File::create(workspace.archive_path())?;
	let mut writer = ZipWriter::new(file);
	let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

	for (relative, absolute) in &entries {
		writer.start_file(relative, options)?;
		let mut contents = Vec::new();
		File::open(absolute)?.read_to_end(&mut contents)?;
		writer.write_all(&contents)?;
	}

	writer.finish()?;

	Ok(())
}

fn collect_files(dir: &std::path::Path, root: &std::path::Path, out: &mut Vec<(String, std::path::PathBuf)>) {
	for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(Result::ok) {
		if !entry.file_type().is_file() {
			continue;
		}

		let relative = entry
			.path()
			.strip_prefix(root)
			.unwrap_or(entry.path())
			.to_string_lossy()
			.replace(std::path::MAIN_SEPARATOR, "/");

		out.push((relative, entry.path().to_path_buf()));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn archive_contains_results_and_variants_with_stable_names() {
		let tmp = tempfile::tempdir().unwrap();
		let workspace = Workspace::create(tmp.path()).unwrap();

		std::fs::write(workspace.results_dir().join("1x.png"), b"result").unwrap();
		std::fs::write(workspace.variants_dir().join("0000_1x.png"), b"variant").unwrap();

		build_archive(&workspace).unwrap();

		let file = File::open(workspace.archive_path()).unwrap();
		let mut zip = zip::ZipArchive::new(file).unwrap();

		let mut names: Vec<String> = (0..zip.len()).map(|i| zip.by_index(i).unwrap().name().to_string()).collect();
		names.sort();

		assert_eq!(names, vec!["results/1x.png".to_string(), "variants/0000_1x.png".to_string()]);
	}
}
