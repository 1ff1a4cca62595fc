//! Content-addressed package store.
//!
//! A package is a set of files plus an opaque manifest blob, addressed by the
//! SHA-256 of both (see [`crate::util::hash::hash_package`]). Entries are
//! immutable once committed and only ever removed by an explicit [`Store::delete`].
//!
//! # Layout
//!
//! ```text
//! <root>/
//! ├── sha256/
//! │   └── <hash[0:2]>/
//! │       └── <hash>/
//! │           ├── files/          # payload, frozen read-only
//! │           └── aigogo.json     # manifest blob
//! ├── tmp/                        # staging for in-flight puts
//! └── .lock                       # advisory lock (see store_lock)
//! ```
//!
//! A put is staged under `tmp/` and renamed into place as its last step, so an
//! entry that [`Store::exists`] reports is always complete.

pub mod paths;
mod types;

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::consts::{FILES_DIRNAME, MANIFEST_FILENAME};
use crate::platform::immutable::{freeze_tree, thaw_tree};
use crate::store_lock::{LockMode, StoreLock, StoreLockError};
use crate::util::hash::{PackageHash, hash_package};

pub use types::{StoreError, StoredPackage};

/// Handle to a store rooted at an explicit directory.
#[derive(Debug, Clone)]
pub struct Store {
  root: PathBuf,
}

impl Store {
  /// Open (creating if needed) a store at `root`.
  pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
    let root = root.into();
    fs::create_dir_all(&root).map_err(|e| StoreError::CreateDir {
      path: root.clone(),
      source: e,
    })?;
    Ok(Self { root })
  }

  /// Open the production store (`$AIGOGO_STORE` or `~/.aigogo/store`).
  pub fn open_default() -> Result<Self, StoreError> {
    let root = paths::default_store_root().ok_or(StoreError::NoStoreRoot)?;
    Self::new(root)
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Location of `hash` whether or not it is present.
  pub fn object_path(&self, hash: &PackageHash) -> PathBuf {
    paths::object_dir(&self.root, hash)
  }

  /// Take the advisory store lock for the duration of an operation.
  pub fn lock(&self, mode: LockMode, command: &str) -> Result<StoreLock, StoreLockError> {
    StoreLock::acquire(&self.root, mode, command)
  }

  pub fn exists(&self, hash: &PackageHash) -> bool {
    self.object_path(hash).is_dir()
  }

  /// Store `files` (relative to `source_dir`) together with `manifest`.
  ///
  /// Returns the content hash. If the package is already present nothing is
  /// written. On any failure the staging directory is removed and the store is
  /// left as it was.
  pub fn put<S: AsRef<str>>(&self, source_dir: &Path, files: &[S], manifest: &[u8]) -> Result<PackageHash, StoreError> {
    let files = normalize_file_list(files)?;

    let hash = hash_package(source_dir, &files, manifest)?;
    let target = self.object_path(&hash);

    if target.is_dir() {
      debug!(hash = %hash, "package already stored");
      return Ok(hash);
    }

    info!(hash = %hash, files = files.len(), source = %source_dir.display(), "storing package");

    let staging_root = paths::staging_dir(&self.root);
    fs::create_dir_all(&staging_root).map_err(|e| StoreError::CreateDir {
      path: staging_root.clone(),
      source: e,
    })?;

    // Dropping the TempDir removes whatever was staged, including on early return.
    let staging = tempfile::Builder::new()
      .prefix("put-")
      .tempdir_in(&staging_root)
      .map_err(|e| StoreError::CreateDir {
        path: staging_root.clone(),
        source: e,
      })?;

    if let Err(e) = populate(staging.path(), source_dir, &files, manifest) {
      warn!(hash = %hash, error = %e, "put failed, discarding staged files");
      return Err(e);
    }

    if let Some(shard) = target.parent() {
      fs::create_dir_all(shard).map_err(|e| StoreError::CreateDir {
        path: shard.to_path_buf(),
        source: e,
      })?;
    }

    match fs::rename(staging.path(), &target) {
      Ok(()) => {}
      // Another writer committed identical content first
      Err(_) if target.is_dir() => {
        debug!(hash = %hash, "package committed concurrently");
        return Ok(hash);
      }
      Err(e) => {
        return Err(StoreError::Commit { path: target, source: e });
      }
    }

    info!(hash = %hash, path = %target.display(), "package stored");
    Ok(hash)
  }

  pub fn get(&self, hash: &PackageHash) -> Result<StoredPackage, StoreError> {
    let root = self.object_path(hash);
    if !root.is_dir() {
      return Err(StoreError::NotFound { hash: hash.clone() });
    }

    Ok(StoredPackage {
      hash: hash.clone(),
      files_dir: paths::files_dir(&root),
      manifest: paths::manifest_path(&root),
      root,
    })
  }

  /// Write-protect a stored package. See [`crate::platform::immutable`].
  pub fn freeze(&self, hash: &PackageHash) -> Result<(), StoreError> {
    let pkg = self.get(hash)?;
    debug!(hash = %hash, "freezing package");
    freeze_tree(&pkg.root)?;
    Ok(())
  }

  /// Relative paths of every file in the package payload, `/`-separated and sorted.
  pub fn list_files(&self, hash: &PackageHash) -> Result<Vec<String>, StoreError> {
    let pkg = self.get(hash)?;
    let mut files = Vec::new();

    for entry in WalkDir::new(&pkg.files_dir).sort_by_file_name() {
      let entry = entry.map_err(|e| StoreError::Walk {
        path: pkg.files_dir.clone(),
        source: e,
      })?;

      if entry.file_type().is_dir() {
        continue;
      }

      let rel = entry.path().strip_prefix(&pkg.files_dir).unwrap_or(entry.path());
      files.push(to_slash(rel));
    }

    files.sort();
    Ok(files)
  }

  /// Enumerate every committed package.
  pub fn list(&self) -> Result<Vec<PackageHash>, StoreError> {
    let objects = paths::objects_dir(&self.root);
    if !objects.is_dir() {
      return Ok(Vec::new());
    }

    let mut hashes = Vec::new();
    for entry in WalkDir::new(&objects).min_depth(2).max_depth(2) {
      let entry = entry.map_err(|e| StoreError::Walk {
        path: objects.clone(),
        source: e,
      })?;

      if !entry.file_type().is_dir() {
        continue;
      }

      match entry.file_name().to_str().map(str::parse::<PackageHash>) {
        Some(Ok(hash)) => hashes.push(hash),
        _ => warn!(path = %entry.path().display(), "ignoring unrecognized store entry"),
      }
    }

    hashes.sort();
    Ok(hashes)
  }

  /// Parse the stored manifest blob as JSON.
  pub fn read_manifest(&self, hash: &PackageHash) -> Result<serde_json::Value, StoreError> {
    let pkg = self.get(hash)?;
    let data = fs::read(&pkg.manifest).map_err(|e| StoreError::Read {
      path: pkg.manifest.clone(),
      source: e,
    })?;

    serde_json::from_slice(&data).map_err(|e| StoreError::ManifestParse {
      path: pkg.manifest,
      source: e,
    })
  }

  /// Recompute the content hash of a stored package and compare it with its address.
  ///
  /// Detects out-of-band modification of the store. Not performed by [`Store::get`].
  pub fn verify(&self, hash: &PackageHash) -> Result<bool, StoreError> {
    let files = self.list_files(hash)?;
    let pkg = self.get(hash)?;
    let manifest = fs::read(&pkg.manifest).map_err(|e| StoreError::Read {
      path: pkg.manifest.clone(),
      source: e,
    })?;

    let actual = hash_package(&pkg.files_dir, &files, &manifest)?;
    if actual != *hash {
      warn!(expected = %hash, actual = %actual, "stored package failed verification");
      return Ok(false);
    }

    Ok(true)
  }

  /// Remove a package. Only ever caller-initiated; the store never evicts.
  pub fn delete(&self, hash: &PackageHash) -> Result<(), StoreError> {
    let pkg = self.get(hash)?;

    info!(hash = %hash, path = %pkg.root.display(), "deleting package");

    thaw_tree(&pkg.root)?;
    fs::remove_dir_all(&pkg.root).map_err(|e| StoreError::Remove {
      path: pkg.root.clone(),
      source: e,
    })?;

    // Drop the shard directory once its last entry is gone; a non-empty shard stays.
    if let Some(shard) = pkg.root.parent()
      && let Err(e) = fs::remove_dir(shard)
      && e.kind() != io::ErrorKind::NotFound
    {
      debug!(shard = %shard.display(), error = %e, "shard directory kept");
    }

    Ok(())
  }
}

/// Copy the payload and manifest into a fresh staging directory.
fn populate<S: AsRef<str>>(staging: &Path, source_dir: &Path, files: &[S], manifest: &[u8]) -> Result<(), StoreError> {
  let files_root = staging.join(FILES_DIRNAME);
  fs::create_dir_all(&files_root).map_err(|e| StoreError::CreateDir {
    path: files_root.clone(),
    source: e,
  })?;

  for file in files {
    let rel = file.as_ref();
    let from = source_dir.join(rel);
    let to = files_root.join(rel);

    if let Some(parent) = to.parent() {
      fs::create_dir_all(parent).map_err(|e| StoreError::CreateDir {
        path: parent.to_path_buf(),
        source: e,
      })?;
    }

    // fs::copy carries the source permission bits over
    fs::copy(&from, &to).map_err(|e| StoreError::Copy { from, to, source: e })?;
  }

  let manifest_path = staging.join(MANIFEST_FILENAME);
  fs::write(&manifest_path, manifest).map_err(|e| StoreError::Write {
    path: manifest_path,
    source: e,
  })
}

/// Rewrite each entry as its plain components joined by `/`, sorted and
/// deduplicated, so one file set has exactly one spelling.
///
/// Entries that are empty, absolute, or contain `.`/`..` components are rejected.
fn normalize_file_list<S: AsRef<str>>(files: &[S]) -> Result<Vec<String>, StoreError> {
  let mut normalized = Vec::with_capacity(files.len());

  for file in files {
    let rel = file.as_ref();
    let path = Path::new(rel);
    let valid = !rel.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)));

    if !valid {
      return Err(StoreError::InvalidPath { path: rel.to_string() });
    }

    normalized.push(to_slash(path));
  }

  normalized.sort_unstable();
  normalized.dedup();
  Ok(normalized)
}

fn to_slash(path: &Path) -> String {
  path
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}
