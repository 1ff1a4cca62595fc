use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Which kind of environment a descriptor points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvKind {
  /// An activated virtual environment rooted at `root`.
  Virtual { root: PathBuf },
  /// The interpreter's own installation, as reported by `interpreter`.
  System { interpreter: String },
}

/// The environment a graft writes into, captured once by [`super::EnvProbe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvDescriptor {
  pub kind: EnvKind,
  /// Directory the runtime scans for path configuration files (`site-packages`).
  pub package_dir: PathBuf,
}

impl EnvDescriptor {
  pub fn virtual_env(root: impl Into<PathBuf>, package_dir: impl Into<PathBuf>) -> Self {
    Self {
      kind: EnvKind::Virtual { root: root.into() },
      package_dir: package_dir.into(),
    }
  }

  pub fn system(interpreter: impl Into<String>, package_dir: impl Into<PathBuf>) -> Self {
    Self {
      kind: EnvKind::System {
        interpreter: interpreter.into(),
      },
      package_dir: package_dir.into(),
    }
  }
}

/// A graft as written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathGraft {
  /// The path configuration file inside the environment.
  pub pth_path: PathBuf,
  /// Absolute imports directory recorded in that file.
  pub imports_dir: PathBuf,
  /// Tracking record inside the project naming `pth_path`.
  pub record_path: PathBuf,
}

/// The active environment could not be located.
///
/// These reflect misconfiguration rather than transient faults and are never
/// retried; [`DiscoveryError::remediation`] says what the user should do.
#[derive(Debug, Error)]
pub enum DiscoveryError {
  #[error("no site-packages directory found in virtual environment {venv}")]
  NoSitePackages { venv: PathBuf },

  #[error("failed to run {interpreter}: {source}")]
  InterpreterNotFound {
    interpreter: String,
    #[source]
    source: io::Error,
  },

  #[error("{interpreter} exited with {status:?} while querying site-packages: {stderr}")]
  InterpreterFailed {
    interpreter: String,
    status: Option<i32>,
    stderr: String,
  },

  #[error("{interpreter} reported an empty site-packages path")]
  EmptyPurelib { interpreter: String },

  #[error("site-packages directory does not exist: {path}")]
  MissingPackageDir { path: PathBuf },
}

impl DiscoveryError {
  pub fn remediation(&self) -> &'static str {
    match self {
      DiscoveryError::NoSitePackages { .. } => {
        "the active virtual environment looks broken; recreate it or deactivate it to use the system interpreter"
      }
      DiscoveryError::InterpreterNotFound { .. } => {
        "install python3, activate a virtual environment, or point AIGOGO_PYTHON at an interpreter"
      }
      DiscoveryError::InterpreterFailed { .. } | DiscoveryError::EmptyPurelib { .. } => {
        "check that the interpreter runs and that `import sysconfig` works, or activate a virtual environment"
      }
      DiscoveryError::MissingPackageDir { .. } => {
        "the interpreter's site-packages directory is missing; activate a virtual environment instead"
      }
    }
  }
}

/// Errors that can occur while grafting or un-grafting.
#[derive(Debug, Error)]
pub enum LinkError {
  #[error("failed to locate the active Python environment: {0}")]
  Discovery(#[from] DiscoveryError),

  #[error("failed to resolve imports directory {path}: {source}")]
  ResolveImports {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write path configuration {path}: {source}")]
  WritePth {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to remove path configuration {path}: {source}")]
  RemovePth {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read tracking record {path}: {source}")]
  ReadRecord {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write tracking record {path}: {source}")]
  WriteRecord {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to remove tracking record {path}: {source}")]
  RemoveRecord {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

impl LinkError {
  /// Discovery failures need environment-specific advice rather than an I/O report.
  pub fn is_discovery(&self) -> bool {
    matches!(self, LinkError::Discovery(_))
  }
}
