//! Hashing utilities for the content-addressed package store.
//!
//! This module provides:
//! - `PackageHash`: the validated 64-character identity of a stored package
//! - `hash_package()`: the deterministic digest over a file set plus its manifest

use std::fs;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::{HASH_ALGORITHM, HASH_HEX_LEN, MANIFEST_SENTINEL};

/// The content hash identifying a stored package.
///
/// Always a lowercase, 64-character hex-encoded SHA-256 digest. Parsing accepts
/// the `sha256:` integrity prefix used by lock records and uppercase hex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageHash(String);

impl PackageHash {
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// The `sha256:<hex>` form recorded in lock files.
  pub fn integrity(&self) -> String {
    format!("{}:{}", HASH_ALGORITHM, self.0)
  }
}

impl std::fmt::Display for PackageHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid package hash {value:?}: expected {HASH_HEX_LEN} hex characters")]
pub struct InvalidHash {
  pub value: String,
}

impl FromStr for PackageHash {
  type Err = InvalidHash;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let raw = s.trim();
    let hex_part = raw
      .strip_prefix(HASH_ALGORITHM)
      .and_then(|rest| rest.strip_prefix(':'))
      .unwrap_or(raw);

    if hex_part.len() != HASH_HEX_LEN || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
      return Err(InvalidHash { value: s.to_string() });
    }

    Ok(PackageHash(hex_part.to_ascii_lowercase()))
  }
}

impl TryFrom<String> for PackageHash {
  type Error = InvalidHash;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<PackageHash> for String {
  fn from(hash: PackageHash) -> Self {
    hash.0
  }
}

/// Error while reading inputs for a package hash.
#[derive(Debug, thiserror::Error)]
#[error("failed to read {path}: {source}")]
pub struct HashReadError {
  pub path: String,
  #[source]
  pub source: std::io::Error,
}

/// Compute the content hash of a package.
///
/// Files are fed in sorted path order as `path NUL contents NUL`, followed by
/// `__manifest__ NUL manifest`. The caller's enumeration order never matters,
/// a renamed file addresses a different object, and manifest-only edits change
/// the hash.
///
/// `files` are paths relative to `root`, hashed byte for byte as given. Callers
/// pass them in canonical form (plain components joined by `/`, no repeats) so
/// one file set has one address; [`crate::store::Store::put`] does this.
pub fn hash_package<S: AsRef<str>>(root: &Path, files: &[S], manifest: &[u8]) -> Result<PackageHash, HashReadError> {
  let mut sorted: Vec<&str> = files.iter().map(AsRef::as_ref).collect();
  sorted.sort_unstable();

  let mut hasher = Sha256::new();
  for rel in sorted {
    let path = root.join(rel);
    hasher.update(rel.as_bytes());
    hasher.update([0u8]);
    feed_file(&mut hasher, &path)?;
    hasher.update([0u8]);
  }

  hasher.update(MANIFEST_SENTINEL);
  hasher.update([0u8]);
  hasher.update(manifest);

  Ok(PackageHash(hex::encode(hasher.finalize())))
}

fn feed_file(hasher: &mut Sha256, path: &Path) -> Result<(), HashReadError> {
  let read_err = |e: std::io::Error| HashReadError {
    path: path.display().to_string(),
    source: e,
  };

  let mut file = fs::File::open(path).map_err(read_err)?;
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(read_err)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::tempdir;

  fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
  }

  #[test]
  fn matches_reference_digest() {
    let temp = tempdir().unwrap();
    write(temp.path(), "a.x", "1");

    let hash = hash_package(temp.path(), &["a.x"], b"{}").unwrap();

    let mut expected = Sha256::new();
    expected.update(b"a.x\x001\x00__manifest__\x00{}");
    assert_eq!(hash.as_str(), hex::encode(expected.finalize()));
  }

  #[test]
  fn hash_ignores_enumeration_order() {
    let temp = tempdir().unwrap();
    write(temp.path(), "a.x", "1");
    write(temp.path(), "b.x", "2");

    let h1 = hash_package(temp.path(), &["a.x", "b.x"], b"{}").unwrap();
    let h2 = hash_package(temp.path(), &["b.x", "a.x"], b"{}").unwrap();
    assert_eq!(h1, h2);
  }

  #[test]
  fn hash_changes_with_content() {
    let temp = tempdir().unwrap();
    write(temp.path(), "a.x", "1");
    let h1 = hash_package(temp.path(), &["a.x"], b"{}").unwrap();

    write(temp.path(), "a.x", "2");
    let h2 = hash_package(temp.path(), &["a.x"], b"{}").unwrap();
    assert_ne!(h1, h2);
  }

  #[test]
  fn hash_changes_with_path() {
    let temp = tempdir().unwrap();
    write(temp.path(), "a.x", "same");
    write(temp.path(), "b.x", "same");

    let h1 = hash_package(temp.path(), &["a.x"], b"{}").unwrap();
    let h2 = hash_package(temp.path(), &["b.x"], b"{}").unwrap();
    assert_ne!(h1, h2);
  }

  #[test]
  fn hash_changes_with_manifest() {
    let temp = tempdir().unwrap();
    write(temp.path(), "a.x", "1");

    let h1 = hash_package(temp.path(), &["a.x"], b"{}").unwrap();
    let h2 = hash_package(temp.path(), &["a.x"], b"{ }").unwrap();
    assert_ne!(h1, h2);
  }

  #[test]
  fn separators_prevent_path_content_ambiguity() {
    // "ab" + "c" and "a" + "bc" would collide without the NUL separators
    let t1 = tempdir().unwrap();
    write(t1.path(), "ab", "c");
    let t2 = tempdir().unwrap();
    write(t2.path(), "a", "bc");

    let h1 = hash_package(t1.path(), &["ab"], b"").unwrap();
    let h2 = hash_package(t2.path(), &["a"], b"").unwrap();
    assert_ne!(h1, h2);
  }

  #[test]
  fn missing_file_reports_path() {
    let temp = tempdir().unwrap();
    let err = hash_package(temp.path(), &["gone.py"], b"{}").unwrap_err();
    assert!(err.path.ends_with("gone.py"));
  }

  #[test]
  fn parse_accepts_integrity_prefix_and_uppercase() {
    let hex = "AB".repeat(32);
    let hash: PackageHash = format!("sha256:{}", hex).parse().unwrap();
    assert_eq!(hash.as_str(), "ab".repeat(32));
    assert_eq!(hash.integrity(), format!("sha256:{}", "ab".repeat(32)));
  }

  #[test]
  fn parse_rejects_short_and_non_hex() {
    assert!("abc123".parse::<PackageHash>().is_err());
    assert!("zz".repeat(32).parse::<PackageHash>().is_err());
    assert!("md5:".to_string().parse::<PackageHash>().is_err());
  }

  #[test]
  fn serde_roundtrips_through_string() {
    let hash: PackageHash = "0f".repeat(32).parse().unwrap();
    let json = serde_json::to_string(&hash).unwrap();
    assert_eq!(json, format!("\"{}\"", "0f".repeat(32)));

    let bad = serde_json::from_str::<PackageHash>("\"nothex\"");
    assert!(bad.is_err());
  }
}
