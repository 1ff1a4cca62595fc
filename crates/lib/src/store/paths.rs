use std::path::{Path, PathBuf};

use crate::consts::{FILES_DIRNAME, HASH_ALGORITHM, MANIFEST_FILENAME, SHARD_PREFIX_LEN};
use crate::platform::paths::app_home;
use crate::util::hash::PackageHash;

/// Environment variable overriding the store root.
pub const STORE_ENV: &str = "AIGOGO_STORE";

/// Resolve the production store root: `$AIGOGO_STORE`, else `<home>/.aigogo/store`.
pub fn default_store_root() -> Option<PathBuf> {
  if let Some(path) = std::env::var_os(STORE_ENV).filter(|v| !v.is_empty()) {
    return Some(PathBuf::from(path));
  }

  app_home().map(|home| home.join("store"))
}

/// `<root>/sha256`
pub fn objects_dir(root: &Path) -> PathBuf {
  root.join(HASH_ALGORITHM)
}

/// `<root>/sha256/<hash[0:2]>/<hash>`, a pure function of the hash.
pub fn object_dir(root: &Path, hash: &PackageHash) -> PathBuf {
  let hex = hash.as_str();
  objects_dir(root).join(&hex[..SHARD_PREFIX_LEN]).join(hex)
}

pub fn files_dir(object_dir: &Path) -> PathBuf {
  object_dir.join(FILES_DIRNAME)
}

pub fn manifest_path(object_dir: &Path) -> PathBuf {
  object_dir.join(MANIFEST_FILENAME)
}

/// Staging area for in-flight puts. Lives under the root so the final rename
/// never crosses a filesystem boundary.
pub fn staging_dir(root: &Path) -> PathBuf {
  root.join("tmp")
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use temp_env::with_vars;

  #[test]
  fn object_dir_is_sharded_by_prefix() {
    let hash: PackageHash = format!("ab{}", "0".repeat(62)).parse().unwrap();
    let dir = object_dir(Path::new("/store"), &hash);
    assert_eq!(
      dir,
      PathBuf::from("/store").join("sha256").join("ab").join(hash.as_str())
    );
  }

  #[test]
  fn integrity_prefix_maps_to_same_dir() {
    let hex = "cd".repeat(32);
    let plain: PackageHash = hex.parse().unwrap();
    let prefixed: PackageHash = format!("sha256:{}", hex).parse().unwrap();
    assert_eq!(object_dir(Path::new("/s"), &plain), object_dir(Path::new("/s"), &prefixed));
  }

  #[test]
  #[serial]
  fn env_var_overrides_default_root() {
    with_vars([(STORE_ENV, Some("/custom/store"))], || {
      assert_eq!(default_store_root(), Some(PathBuf::from("/custom/store")));
    })
  }

  #[test]
  #[serial]
  #[cfg(not(windows))]
  fn default_root_is_under_home() {
    with_vars([(STORE_ENV, None), ("HOME", Some("/home/user"))], || {
      assert_eq!(default_store_root(), Some(PathBuf::from("/home/user/.aigogo/store")));
    })
  }
}
