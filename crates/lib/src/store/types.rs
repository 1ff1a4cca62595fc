use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::platform::immutable::ImmutableError;
use crate::util::hash::{HashReadError, InvalidHash, PackageHash};

/// Handle to a committed package in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredPackage {
  pub hash: PackageHash,
  /// `<root>/sha256/<xx>/<hash>`
  pub root: PathBuf,
  /// Payload tree, `<root>/.../files`
  pub files_dir: PathBuf,
  /// Manifest blob, `<root>/.../aigogo.json`
  pub manifest: PathBuf,
}

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("package not found in store: {hash}")]
  NotFound { hash: PackageHash },

  #[error(transparent)]
  InvalidHash(#[from] InvalidHash),

  #[error("invalid file path {path:?}: must be relative and stay inside the source directory")]
  InvalidPath { path: String },

  #[error("no store root configured: set AIGOGO_STORE or HOME")]
  NoStoreRoot,

  #[error("failed to compute content hash: {0}")]
  Hash(#[from] HashReadError),

  #[error("failed to create directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to copy {from} to {to}: {source}")]
  Copy {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to commit {path}: {source}")]
  Commit {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to remove {path}: {source}")]
  Remove {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to walk {path}: {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to parse manifest {path}: {source}")]
  ManifestParse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error(transparent)]
  Immutable(#[from] ImmutableError),
}
