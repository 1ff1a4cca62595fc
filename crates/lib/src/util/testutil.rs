//! Test utilities for aigogo-lib.
//!
//! Helpers for building source trees, fake virtual environments and projects
//! inside temporary directories.

use std::fs;
use std::path::{Path, PathBuf};

/// Write `files` (relative path, contents) under `root`, creating parents.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
  for (rel, content) in files {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
  }
}

/// Create `<root>/venv/lib/<python>/site-packages` and return `(venv, site_packages)`.
pub fn fake_venv(root: &Path, python: &str) -> (PathBuf, PathBuf) {
  let venv = root.join("venv");
  let site_packages = venv.join("lib").join(python).join("site-packages");
  fs::create_dir_all(&site_packages).unwrap();
  (venv, site_packages)
}

/// Create `<root>/project/.aigogo/imports` and return the project root.
pub fn fake_project(root: &Path) -> PathBuf {
  let project = root.join("project");
  fs::create_dir_all(project.join(".aigogo").join("imports")).unwrap();
  project
}

/// Restore write permission under `path` so `TempDir` can clean up.
pub fn thaw(path: &Path) {
  crate::platform::immutable::thaw_tree(path).unwrap();
}

/// Root ignores permission bits, so write-denial assertions only hold for other users.
#[cfg(unix)]
pub fn running_as_root() -> bool {
  rustix::process::geteuid().is_root()
}

#[cfg(not(unix))]
pub fn running_as_root() -> bool {
  false
}
