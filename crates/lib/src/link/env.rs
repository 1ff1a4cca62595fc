//! Discovery of the active Python environment.
//!
//! This is the only place that reads ambient process state. [`EnvProbe::from_env`]
//! snapshots `VIRTUAL_ENV` and `AIGOGO_PYTHON`; [`EnvProbe::detect`] turns that
//! snapshot into an [`EnvDescriptor`] the linker can act on.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::types::{DiscoveryError, EnvDescriptor};

/// Marker set by `activate` scripts of virtual environments.
pub const VIRTUAL_ENV: &str = "VIRTUAL_ENV";

/// Overrides the interpreter queried when no virtual environment is active.
pub const PYTHON_ENV: &str = "AIGOGO_PYTHON";

pub const DEFAULT_INTERPRETER: &str = "python3";

const PURELIB_QUERY: &str = "import sysconfig; print(sysconfig.get_path('purelib'))";

/// Inputs for environment discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvProbe {
  pub virtual_env: Option<PathBuf>,
  pub interpreter: String,
}

impl EnvProbe {
  pub fn new(virtual_env: Option<PathBuf>, interpreter: impl Into<String>) -> Self {
    Self {
      virtual_env,
      interpreter: interpreter.into(),
    }
  }

  /// Snapshot the calling process's environment.
  pub fn from_env() -> Self {
    let virtual_env = std::env::var_os(VIRTUAL_ENV)
      .filter(|v| !v.is_empty())
      .map(PathBuf::from);
    let interpreter = std::env::var(PYTHON_ENV)
      .ok()
      .filter(|v| !v.is_empty())
      .unwrap_or_else(|| DEFAULT_INTERPRETER.to_string());

    Self::new(virtual_env, interpreter)
  }

  /// Locate the package directory of the active environment.
  ///
  /// An active virtual environment without a `site-packages` directory is an
  /// error; it never falls through to the system interpreter, which would
  /// install into the wrong place.
  pub fn detect(&self) -> Result<EnvDescriptor, DiscoveryError> {
    if let Some(venv) = &self.virtual_env {
      let package_dir = find_venv_site_packages(venv)?;
      info!(venv = %venv.display(), site_packages = %package_dir.display(), "using virtual environment");
      return Ok(EnvDescriptor::virtual_env(venv, package_dir));
    }

    let package_dir = query_purelib(&self.interpreter)?;
    info!(interpreter = %self.interpreter, site_packages = %package_dir.display(), "using system environment");
    Ok(EnvDescriptor::system(&self.interpreter, package_dir))
  }
}

/// Find `site-packages` inside a virtual environment.
///
/// POSIX layouts are `<venv>/lib/pythonX.Y/site-packages`; Windows layouts are
/// `<venv>/Lib/site-packages`. When several interpreter versions are present
/// the first in sorted order wins.
pub fn find_venv_site_packages(venv: &Path) -> Result<PathBuf, DiscoveryError> {
  let base = glob::Pattern::escape(&venv.to_string_lossy());
  let patterns = [
    format!("{}/lib/python*/site-packages", base),
    format!("{}/Lib/site-packages", base),
  ];

  for pattern in &patterns {
    let Ok(paths) = glob::glob(pattern) else {
      continue;
    };

    let mut matches: Vec<PathBuf> = paths.filter_map(Result::ok).filter(|p| p.is_dir()).collect();
    matches.sort();

    if let Some(first) = matches.into_iter().next() {
      debug!(pattern = %pattern, site_packages = %first.display(), "matched virtualenv site-packages");
      return Ok(first);
    }
  }

  Err(DiscoveryError::NoSitePackages {
    venv: venv.to_path_buf(),
  })
}

/// Ask the interpreter for its `purelib` install path and check it exists.
pub fn query_purelib(interpreter: &str) -> Result<PathBuf, DiscoveryError> {
  debug!(interpreter, "querying interpreter for purelib");

  let output = Command::new(interpreter)
    .args(["-c", PURELIB_QUERY])
    .output()
    .map_err(|e| DiscoveryError::InterpreterNotFound {
      interpreter: interpreter.to_string(),
      source: e,
    })?;

  if !output.status.success() {
    return Err(DiscoveryError::InterpreterFailed {
      interpreter: interpreter.to_string(),
      status: output.status.code(),
      stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    });
  }

  let reported = String::from_utf8_lossy(&output.stdout).trim().to_string();
  if reported.is_empty() || reported == "None" {
    return Err(DiscoveryError::EmptyPurelib {
      interpreter: interpreter.to_string(),
    });
  }

  let path = PathBuf::from(reported);
  if !path.is_dir() {
    return Err(DiscoveryError::MissingPackageDir { path });
  }

  Ok(path)
}
