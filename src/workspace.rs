//! Per-task scratch directory: `input/`, `variants/`, `results/`, and `emote.zip`.

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
#[error("workspace io: {0}")]
pub struct WorkspaceError(#[from] std::io::Error);

#[derive(Debug)]
pub struct Workspace {
	root: PathBuf,
}

impl Workspace {
	/// Creates a fresh UUID-named directory under `under_root`, mode 0700, with its
	/// three subdirectories already present.
	pub fn create(under_root: &Path) -> Result<Self, WorkspaceError> {
		let root = under_root.join(uuid::Uuid::new_v4().to_string());

		std::fs::create_dir_all(&root)?;
		set_private(&root)?;

		std::fs::create_dir(root.join("input"))?;
		std::fs::create_dir(root.join("variants"))?;
		std::fs::create_dir(root.join("results"))?;

		Ok(Self { root })
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn input_dir(&self) -> PathBuf {
		self.root.join("input")
	}

	pub fn variants_dir(&self) -> PathBuf {
		self.root.join("variants")
	}

	pub fn results_dir(&self) -> PathBuf {
		self.root.join("results")
	}

	pub fn archive_path(&self) -> PathBuf {
		self.root.join("emote.zip")
	}

	/// The raw downloaded input, written once at the start of the run.
	pub fn input_file(&self) -> PathBuf {
		self.root.join("source")
	}

	/// Removes `input/` and the raw input file, leaving `variants/`, `results/`, and
	/// `emote.zip` alone. Called before archiving so the input never ends up in the zip.
	pub fn cleanup_input(&self) -> Result<(), WorkspaceError> {
		let input_dir = self.input_dir();
		if input_dir.exists() {
			std::fs::remove_dir_all(&input_dir)?;
		}

		let input_file = self.input_file();
		if input_file.exists() {
			std::fs::remove_file(&input_file)?;
		}

		Ok(())
	}
}

impl Drop for Workspace {
	fn drop(&mut self) {
		if let Err(err) = std::fs::remove_dir_all(&self.root) {
			if err.kind() != std::io::ErrorKind::NotFound {
				tracing::warn!(root = %self.root.display(), "failed to remove workspace: {err}");
			}
		}
	}
}

#[cfg(unix)]
fn set_private(path: &Path) -> std::io::Result<()> {
	use std::os::unix::fs::PermissionsExt;
	std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn set_private(_path: &Path) -> std::io::Result<()> {
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn creates_expected_layout() {
		let tmp = tempfile::tempdir().unwrap();
		let workspace = Workspace::create(tmp.path()).unwrap();

		assert!(workspace.input_dir().is_dir());
		assert!(workspace.variants_dir().is_dir());
		assert!(workspace.results_dir().is_dir());
	}

	#[test]
	fn cleanup_input_removes_only_input() {
		let tmp = tempfile::tempdir().unwrap();
		let workspace = Workspace::create(tmp.path()).unwrap();
		std::fs::write(workspace.input_dir().join("0000.png"), b"x").unwrap();
		std::fs::write(workspace.results_dir().join("1x.png"), b"y").unwrap();

		workspace.cleanup_input().unwrap();

		assert!(!workspace.input_dir().exists());
		assert!(workspace.results_dir().join("1x.png").exists());
	}

	#[test]
	fn drop_removes_the_whole_workspace() {
		let tmp = tempfile::tempdir().unwrap();
		let root = {
			let workspace = Workspace::create(tmp.path()).unwrap();
			workspace.root().to_path_buf()
		};

		assert!(!root.exists());
	}
}
