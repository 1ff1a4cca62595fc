//! Implementation of the `aigogo store` commands.
//!
//! Mutating commands hold the store lock exclusively; read-only commands hold
//! it shared so they never observe a concurrent delete halfway through.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use aigogo_lib::store::{Store, StoreError};
use aigogo_lib::store_lock::{LockMode, StoreLock};
use aigogo_lib::util::hash::PackageHash;

use crate::output::{
  OutputFormat, format_bytes, print_error, print_info, print_json, print_stat, print_success, symbols, truncate_hash,
};
use crate::prompts::confirm;

#[derive(Subcommand, Debug)]
pub enum StoreCommand {
  /// Add a directory to the store and print its hash
  Put {
    /// Directory containing the package files
    dir: std::path::PathBuf,

    /// Manifest file stored alongside the files
    #[arg(short, long)]
    manifest: std::path::PathBuf,

    /// Files to store, relative to DIR (default: every file under DIR)
    files: Vec<String>,
  },

  /// List stored packages
  Ls,

  /// List the files of a stored package
  Files { hash: String },

  /// Show a stored package and its manifest
  Show { hash: String },

  /// Recompute a stored package's hash and compare it with its address
  Verify { hash: String },

  /// Delete a stored package
  Rm {
    hash: String,

    /// Skip confirmation prompt
    #[arg(long)]
    force: bool,
  },
}

pub fn cmd_store(command: StoreCommand, output: OutputFormat) -> Result<()> {
  let store = Store::open_default().context("Failed to open package store")?;

  match command {
    StoreCommand::Put { dir, manifest, files } => cmd_put(&store, &dir, &manifest, files, output),
    StoreCommand::Ls => cmd_ls(&store, output),
    StoreCommand::Files { hash } => cmd_files(&store, &parse_hash(&hash)?, output),
    StoreCommand::Show { hash } => cmd_show(&store, &parse_hash(&hash)?, output),
    StoreCommand::Verify { hash } => cmd_verify(&store, &parse_hash(&hash)?, output),
    StoreCommand::Rm { hash, force } => cmd_rm(&store, &parse_hash(&hash)?, force, output),
  }
}

#[derive(Serialize)]
struct PutResult {
  hash: PackageHash,
  integrity: String,
  path: String,
  files: usize,
}

#[derive(Serialize)]
struct ShowResult {
  hash: PackageHash,
  path: String,
  files: Vec<String>,
  size_bytes: u64,
  manifest: serde_json::Value,
}

#[derive(Serialize)]
struct VerifyResult {
  hash: PackageHash,
  valid: bool,
}

#[derive(Serialize)]
struct RemoveResult {
  hash: PackageHash,
  removed: bool,
}

fn parse_hash(value: &str) -> Result<PackageHash> {
  value.parse().with_context(|| format!("'{}' is not a package hash", value))
}

fn lock(store: &Store, mode: LockMode, command: &str) -> Result<StoreLock> {
  store.lock(mode, command).context("Failed to acquire store lock")
}

fn cmd_put(store: &Store, dir: &Path, manifest: &Path, files: Vec<String>, output: OutputFormat) -> Result<()> {
  if !dir.is_dir() {
    bail!("Package directory not found: {}", dir.display());
  }

  let manifest_bytes = fs::read(manifest).with_context(|| format!("Failed to read manifest {}", manifest.display()))?;

  let files = if files.is_empty() {
    collect_files(dir, manifest)?
  } else {
    files
  };

  if files.is_empty() {
    bail!("No files to store in {}", dir.display());
  }

  let _lock = lock(store, LockMode::Exclusive, "store put")?;

  let hash = store.put(dir, &files, &manifest_bytes)?;
  store.freeze(&hash)?;

  let path = store.object_path(&hash);
  if output.is_json() {
    print_json(&PutResult {
      integrity: hash.integrity(),
      hash,
      path: path.display().to_string(),
      files: files.len(),
    })?;
  } else {
    print_success(&format!("Stored {}", hash));
    print_stat("Files", &files.len().to_string());
    print_stat("Path", &path.display().to_string());
  }

  Ok(())
}

/// Every regular file under `dir`, relative and `/`-separated, minus the manifest.
fn collect_files(dir: &Path, manifest: &Path) -> Result<Vec<String>> {
  let manifest = dunce::canonicalize(manifest).ok();
  let mut files = Vec::new();

  for entry in WalkDir::new(dir).sort_by_file_name() {
    let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
    if !entry.file_type().is_file() {
      continue;
    }

    if manifest.is_some() && dunce::canonicalize(entry.path()).ok() == manifest {
      debug!(path = %entry.path().display(), "skipping manifest");
      continue;
    }

    let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
    let rel = rel
      .components()
      .map(|c| c.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/");
    files.push(rel);
  }

  Ok(files)
}

fn cmd_ls(store: &Store, output: OutputFormat) -> Result<()> {
  let _lock = lock(store, LockMode::Shared, "store ls")?;
  let hashes = store.list()?;

  if output.is_json() {
    return print_json(&hashes);
  }

  if hashes.is_empty() {
    print_info("Store is empty");
    return Ok(());
  }

  for hash in &hashes {
    println!("{}", hash);
  }
  println!();
  print_stat("Packages", &hashes.len().to_string());

  Ok(())
}

fn cmd_files(store: &Store, hash: &PackageHash, output: OutputFormat) -> Result<()> {
  let _lock = lock(store, LockMode::Shared, "store files")?;
  let files = store.list_files(hash)?;

  if output.is_json() {
    return print_json(&files);
  }

  for file in &files {
    println!("{}", file);
  }

  Ok(())
}

fn cmd_show(store: &Store, hash: &PackageHash, output: OutputFormat) -> Result<()> {
  let _lock = lock(store, LockMode::Shared, "store show")?;
  let pkg = store.get(hash)?;
  let files = store.list_files(hash)?;
  let manifest = store.read_manifest(hash)?;
  let size_bytes = dir_size(&pkg.files_dir);

  if output.is_json() {
    return print_json(&ShowResult {
      hash: hash.clone(),
      path: pkg.root.display().to_string(),
      files,
      size_bytes,
      manifest,
    });
  }

  print_success(&format!("Package {}", truncate_hash(hash.as_str())));
  print_stat("Hash", hash.as_str());
  print_stat("Path", &pkg.root.display().to_string());
  print_stat("Size", &format_bytes(size_bytes));
  print_stat("Files", &files.len().to_string());
  for file in &files {
    println!("    {} {}", symbols::INFO, file);
  }
  println!();
  println!("{}", serde_json::to_string_pretty(&manifest)?);

  Ok(())
}

fn cmd_verify(store: &Store, hash: &PackageHash, output: OutputFormat) -> Result<()> {
  let _lock = lock(store, LockMode::Shared, "store verify")?;
  let valid = store.verify(hash)?;

  if output.is_json() {
    print_json(&VerifyResult {
      hash: hash.clone(),
      valid,
    })?;
  } else if valid {
    print_success(&format!("{} is intact", truncate_hash(hash.as_str())));
  } else {
    print_error(&format!("{} does not match its content", truncate_hash(hash.as_str())));
  }

  if !valid {
    bail!("Package {} failed verification", hash);
  }

  Ok(())
}

fn cmd_rm(store: &Store, hash: &PackageHash, force: bool, output: OutputFormat) -> Result<()> {
  if !store.exists(hash) {
    return Err(StoreError::NotFound { hash: hash.clone() }.into());
  }

  if !confirm(&format!("Delete package {}?", truncate_hash(hash.as_str())), force)? {
    if output.is_json() {
      print_json(&RemoveResult {
        hash: hash.clone(),
        removed: false,
      })?;
    } else {
      print_info("Cancelled");
    }
    return Ok(());
  }

  let _lock = lock(store, LockMode::Exclusive, "store rm")?;
  store.delete(hash)?;

  if output.is_json() {
    print_json(&RemoveResult {
      hash: hash.clone(),
      removed: true,
    })?;
  } else {
    print_success(&format!("Deleted {}", hash));
  }

  Ok(())
}

fn dir_size(path: &Path) -> u64 {
  WalkDir::new(path)
    .into_iter()
    .filter_map(|e| e.ok())
    .filter(|e| e.file_type().is_file())
    .filter_map(|e| e.metadata().ok())
    .map(|m| m.len())
    .sum()
}
