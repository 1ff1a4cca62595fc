//! Write-protection for stored package trees.
//!
//! After a package is committed to the store its tree is frozen so that
//! consumers importing straight out of the store cannot modify it by accident.
//! This is a safety net, not a security boundary: the owner can always chmod
//! the tree back.
//!
//! ## Platform Behavior
//!
//! - **Unix**: files become 0444 (0555 if any execute bit was set), directories 0555
//! - **Other platforms**: no-op, there are no POSIX permission bits to strip

use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

/// Error during freeze/thaw operations.
#[derive(Debug, thiserror::Error)]
pub enum ImmutableError {
  #[error("failed to set permissions on {path}: {source}")]
  SetPermissions {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to read metadata for {path}: {source}")]
  Metadata {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to traverse directory {path}: {source}")]
  WalkDir {
    path: String,
    #[source]
    source: walkdir::Error,
  },
}

/// Recursively strip write permission from everything under `path`.
///
/// Entries are visited deepest-first so a directory is only locked after its
/// contents. Per-entry failures are logged and skipped; only a failure to
/// traverse the tree is returned.
pub fn freeze_tree(path: &Path) -> Result<(), ImmutableError> {
  if !path.exists() {
    return Ok(());
  }

  if !cfg!(unix) {
    debug!(path = ?path, "no permission bits on this platform, skipping freeze");
    return Ok(());
  }

  debug!(path = ?path, "freezing store tree");

  for entry in WalkDir::new(path).contents_first(true) {
    let entry = entry.map_err(|e| ImmutableError::WalkDir {
      path: path.display().to_string(),
      source: e,
    })?;

    if let Err(e) = set_entry_writable(entry.path(), false) {
      warn!(path = ?entry.path(), error = %e, "failed to freeze entry, continuing");
    }
  }

  Ok(())
}

/// Recursively restore owner write permission under `path`.
///
/// Needed before a frozen tree can be deleted: removing an entry requires a
/// writable parent directory. Directories are visited before their contents.
pub fn thaw_tree(path: &Path) -> Result<(), ImmutableError> {
  if !path.exists() || !cfg!(unix) {
    return Ok(());
  }

  debug!(path = ?path, "thawing store tree");

  for entry in WalkDir::new(path) {
    let entry = entry.map_err(|e| ImmutableError::WalkDir {
      path: path.display().to_string(),
      source: e,
    })?;

    if let Err(e) = set_entry_writable(entry.path(), true) {
      warn!(path = ?entry.path(), error = %e, "failed to thaw entry, continuing");
    }
  }

  Ok(())
}

#[cfg(unix)]
fn set_entry_writable(path: &Path, writable: bool) -> Result<(), ImmutableError> {
  use std::os::unix::fs::PermissionsExt;

  // symlink_metadata: never chmod through a link into somebody else's tree
  let metadata = std::fs::symlink_metadata(path).map_err(|e| ImmutableError::Metadata {
    path: path.display().to_string(),
    source: e,
  })?;

  if metadata.file_type().is_symlink() {
    return Ok(());
  }

  let current_mode = metadata.permissions().mode();
  let traversable = metadata.is_dir() || (current_mode & 0o111 != 0);

  let new_mode = match (traversable, writable) {
    (true, false) => 0o555,
    (false, false) => 0o444,
    (true, true) => 0o755,
    (false, true) => 0o644,
  };

  let mut perms = metadata.permissions();
  perms.set_mode(new_mode);
  std::fs::set_permissions(path, perms).map_err(|e| ImmutableError::SetPermissions {
    path: path.display().to_string(),
    source: e,
  })
}

#[cfg(not(unix))]
fn set_entry_writable(_path: &Path, _writable: bool) -> Result<(), ImmutableError> {
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::TempDir;

  use super::*;

  #[test]
  fn freeze_nonexistent_path_succeeds() {
    let temp = TempDir::new().unwrap();
    assert!(freeze_tree(&temp.path().join("does-not-exist")).is_ok());
    assert!(thaw_tree(&temp.path().join("does-not-exist")).is_ok());
  }

  #[test]
  #[cfg(unix)]
  fn freeze_prevents_write() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("test.txt");
    fs::write(&file, "original").unwrap();

    freeze_tree(temp.path()).unwrap();

    assert!(fs::metadata(&file).unwrap().permissions().readonly());
    if !crate::util::testutil::running_as_root() {
      assert!(fs::write(&file, "modified").is_err());
    }

    thaw_tree(temp.path()).unwrap();
  }

  #[test]
  #[cfg(unix)]
  fn freeze_sets_store_modes() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let subdir = temp.path().join("pkg");
    fs::create_dir(&subdir).unwrap();
    let data = subdir.join("data.py");
    fs::write(&data, "x = 1").unwrap();
    let script = subdir.join("run.sh");
    fs::write(&script, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    freeze_tree(temp.path()).unwrap();

    fn mode(p: &Path) -> u32 {
      fs::metadata(p).unwrap().permissions().mode() & 0o777
    }
    assert_eq!(mode(&data), 0o444);
    assert_eq!(mode(&script), 0o555);
    assert_eq!(mode(&subdir), 0o555);

    // Still readable and traversable
    assert_eq!(fs::read_to_string(&data).unwrap(), "x = 1");

    thaw_tree(temp.path()).unwrap();
  }

  #[test]
  #[cfg(unix)]
  fn thaw_allows_write_and_delete() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let tree = temp.path().join("tree");
    fs::create_dir(&tree).unwrap();
    let file = tree.join("data.txt");
    fs::write(&file, "content").unwrap();

    freeze_tree(&tree).unwrap();
    thaw_tree(&tree).unwrap();

    assert_eq!(fs::metadata(&file).unwrap().permissions().mode() & 0o777, 0o644);
    fs::write(&file, "modified").unwrap();
    fs::remove_dir_all(&tree).unwrap();
  }

  #[test]
  #[cfg(unix)]
  fn freeze_does_not_follow_symlinks() {
    let temp = TempDir::new().unwrap();
    let outside = temp.path().join("outside.txt");
    fs::write(&outside, "keep writable").unwrap();

    let tree = temp.path().join("tree");
    fs::create_dir(&tree).unwrap();
    std::os::unix::fs::symlink(&outside, tree.join("link")).unwrap();

    freeze_tree(&tree).unwrap();

    assert!(!fs::metadata(&outside).unwrap().permissions().readonly());

    thaw_tree(&tree).unwrap();
  }
}
