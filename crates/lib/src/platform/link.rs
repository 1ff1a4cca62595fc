//! Directory links that point into the store.
//!
//! - **Unix**: symbolic links
//! - **Windows**: directory symlinks, falling back to junctions when symlinks
//!   need privileges the user lacks

use std::fs;
use std::io;
use std::path::Path;

#[cfg(windows)]
use tracing::debug;

/// Create a directory link at `link` pointing to `target`.
#[cfg(unix)]
pub fn create_dir_link(target: &Path, link: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

/// Create a directory link at `link` pointing to `target`.
///
/// Junctions require an absolute target with no `..` components.
#[cfg(windows)]
pub fn create_dir_link(target: &Path, link: &Path) -> io::Result<()> {
  if std::os::windows::fs::symlink_dir(target, link).is_ok() {
    return Ok(());
  }

  let absolute = dunce::canonicalize(target)?;
  debug!(target = %absolute.display(), link = %link.display(), "symlink unavailable, creating junction");
  junction::create(&absolute, link)
}

/// True for symlinks and, on Windows, junctions.
pub fn is_dir_link(path: &Path) -> bool {
  let Ok(meta) = fs::symlink_metadata(path) else {
    return false;
  };

  if meta.file_type().is_symlink() {
    return true;
  }

  #[cfg(windows)]
  if junction::exists(path).unwrap_or(false) {
    return true;
  }

  false
}

/// Remove a directory link without touching what it points to.
///
/// Missing links are ignored.
pub fn remove_dir_link(link: &Path) -> io::Result<()> {
  if fs::symlink_metadata(link).is_err() {
    return Ok(());
  }

  // Windows directory symlinks and junctions are removed as directories
  #[cfg(windows)]
  if fs::remove_dir(link).is_ok() {
    return Ok(());
  }

  match fs::remove_file(link) {
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    other => other,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn link_resolves_to_target() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    fs::create_dir(&target).unwrap();
    fs::write(target.join("mod.py"), "x = 1").unwrap();
    let link = temp.path().join("link");

    create_dir_link(&target, &link).unwrap();

    assert!(is_dir_link(&link));
    assert!(!is_dir_link(&target));
    assert_eq!(fs::read_to_string(link.join("mod.py")).unwrap(), "x = 1");
  }

  #[test]
  fn remove_keeps_target_contents() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    fs::create_dir(&target).unwrap();
    fs::write(target.join("keep.txt"), "kept").unwrap();
    let link = temp.path().join("link");
    create_dir_link(&target, &link).unwrap();

    remove_dir_link(&link).unwrap();

    assert!(fs::symlink_metadata(&link).is_err());
    assert!(target.join("keep.txt").exists());
  }

  #[test]
  fn remove_missing_link_is_ok() {
    let temp = TempDir::new().unwrap();
    remove_dir_link(&temp.path().join("nothing")).unwrap();
  }

  #[test]
  fn plain_directory_is_not_a_link() {
    let temp = TempDir::new().unwrap();
    assert!(!is_dir_link(temp.path()));
  }
}
