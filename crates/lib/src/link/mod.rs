//! Import linking: grafting a project's imports directory into Python.
//!
//! Python reads every `*.pth` file in `site-packages` at startup and appends
//! each directory listed in it to `sys.path`. A graft writes one such file,
//! `aigogo.pth`, naming the project's absolute imports directory. That is the
//! only change made to the environment.
//!
//! The environment active at install time may be gone or different by the time
//! the project is uninstalled, so the graft also writes a tracking record into
//! the project naming the exact `.pth` file. Un-grafting reads the record and
//! never runs discovery again.
//!
//! # Layout
//!
//! ```text
//! <project>/.aigogo/
//! ├── imports/             # grafted directory
//! └── .pth-location        # "<site-packages>/aigogo.pth\n"
//! <site-packages>/
//! └── aigogo.pth           # "<project>/.aigogo/imports\n"
//! ```

mod env;
mod types;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::consts::{PTH_FILENAME, PTH_LOCATION_FILENAME};
use crate::imports::{app_dir, imports_dir};

pub use env::{DEFAULT_INTERPRETER, EnvProbe, PYTHON_ENV, VIRTUAL_ENV, find_venv_site_packages, query_purelib};
pub use types::{DiscoveryError, EnvDescriptor, EnvKind, LinkError, PathGraft};

/// Grafts projects into one discovered environment.
#[derive(Debug, Clone)]
pub struct Linker {
  env: EnvDescriptor,
}

impl Linker {
  pub fn new(env: EnvDescriptor) -> Self {
    Self { env }
  }

  /// Probe the calling process's environment and build a linker for it.
  pub fn for_active_env() -> Result<Self, LinkError> {
    Ok(Self::new(EnvProbe::from_env().detect()?))
  }

  /// The `.pth` file this linker writes.
  pub fn pth_path(&self) -> PathBuf {
    self.env.package_dir.join(PTH_FILENAME)
  }

  /// Register `<project>/.aigogo/imports` with the environment.
  ///
  /// Re-grafting overwrites the `.pth` file. If the project was previously
  /// grafted into a different environment, that older `.pth` file is removed
  /// first so at most one graft per project exists, unless another project
  /// has since taken it over.
  pub fn graft(&self, project_root: &Path) -> Result<PathGraft, LinkError> {
    let imports = resolve_imports_dir(project_root)?;
    let pth_path = self.pth_path();
    let record_path = record_path(project_root);

    if let Some(previous) = load_record(&record_path)?
      && previous != pth_path
    {
      info!(previous = %previous.display(), "removing graft from previous environment");
      remove_owned_pth(&previous, &[imports.clone()])?;
    }

    info!(
      pth = %pth_path.display(),
      imports = %imports.display(),
      "grafting imports directory"
    );

    write_line(&pth_path, &imports).map_err(|e| LinkError::WritePth {
      path: pth_path.clone(),
      source: e,
    })?;

    if let Err(e) = save_record(&record_path, &pth_path) {
      // Without a record the graft could never be found again; take it back.
      warn!(pth = %pth_path.display(), error = %e, "failed to record graft, rolling back");
      if let Err(rollback) = remove_if_present(&pth_path) {
        warn!(pth = %pth_path.display(), error = %rollback, "failed to roll back graft");
      }
      return Err(e);
    }

    Ok(PathGraft {
      pth_path,
      imports_dir: imports,
      record_path,
    })
  }

  /// Reverse a previous graft of `project_root`, wherever it was made.
  ///
  /// A missing tracking record or an already-deleted `.pth` file is not an error.
  /// The `.pth` file is only deleted while it still names this project's
  /// imports directory; a file another project has re-grafted is left alone.
  /// The record is always removed. Returns the `.pth` path when a graft of
  /// this project was undone.
  pub fn ungraft(project_root: &Path) -> Result<Option<PathBuf>, LinkError> {
    let record_path = record_path(project_root);

    let Some(pth_path) = load_record(&record_path)? else {
      debug!(project = %project_root.display(), "no graft recorded, nothing to undo");
      remove_if_present(&record_path).map_err(|e| LinkError::RemoveRecord {
        path: record_path.clone(),
        source: e,
      })?;
      return Ok(None);
    };

    let removed = remove_owned_pth(&pth_path, &imports_candidates(project_root))?;

    remove_if_present(&record_path).map_err(|e| LinkError::RemoveRecord {
      path: record_path.clone(),
      source: e,
    })?;

    Ok(removed.then_some(pth_path))
  }

  /// The `.pth` file recorded for `project_root`, if the project is grafted.
  pub fn grafted_pth(project_root: &Path) -> Result<Option<PathBuf>, LinkError> {
    load_record(&record_path(project_root))
  }
}

/// `<project>/.aigogo/.pth-location`
pub fn record_path(project_root: &Path) -> PathBuf {
  app_dir(project_root).join(PTH_LOCATION_FILENAME)
}

fn resolve_imports_dir(project_root: &Path) -> Result<PathBuf, LinkError> {
  let dir = imports_dir(project_root);
  let resolve_err = |e: io::Error| LinkError::ResolveImports {
    path: dir.clone(),
    source: e,
  };

  fs::create_dir_all(&dir).map_err(resolve_err)?;
  dunce::canonicalize(&dir).map_err(resolve_err)
}

/// Spellings of the project's imports directory a `.pth` file of ours may hold.
fn imports_candidates(project_root: &Path) -> Vec<PathBuf> {
  let dir = imports_dir(project_root);
  match dunce::canonicalize(&dir) {
    Ok(canonical) if canonical != dir => vec![canonical, dir],
    _ => vec![dir],
  }
}

/// Delete `pth_path` if it still names one of `imports`.
///
/// Returns whether the file was ours. A file that is already gone counts as ours.
fn remove_owned_pth(pth_path: &Path, imports: &[PathBuf]) -> Result<bool, LinkError> {
  let remove_err = |e: io::Error| LinkError::RemovePth {
    path: pth_path.to_path_buf(),
    source: e,
  };

  let content = match fs::read_to_string(pth_path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
    Err(e) => return Err(remove_err(e)),
  };

  let named = Path::new(content.trim());
  if !imports.iter().any(|dir| dir == named) {
    info!(
      pth = %pth_path.display(),
      names = %named.display(),
      "graft now belongs to another project, leaving it in place"
    );
    return Ok(false);
  }

  info!(pth = %pth_path.display(), "removing graft");
  remove_if_present(pth_path).map_err(remove_err)?;
  Ok(true)
}

/// Read the tracking record. Absent or blank records mean "not grafted".
fn load_record(record_path: &Path) -> Result<Option<PathBuf>, LinkError> {
  let content = match fs::read_to_string(record_path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(e) => {
      return Err(LinkError::ReadRecord {
        path: record_path.to_path_buf(),
        source: e,
      });
    }
  };

  let trimmed = content.trim();
  if trimmed.is_empty() {
    return Ok(None);
  }

  Ok(Some(PathBuf::from(trimmed)))
}

/// Write the tracking record atomically (temp file, then rename).
fn save_record(record_path: &Path, pth_path: &Path) -> Result<(), LinkError> {
  let write_err = |e: io::Error| LinkError::WriteRecord {
    path: record_path.to_path_buf(),
    source: e,
  };

  let dir = record_path.parent().unwrap_or(Path::new("."));
  fs::create_dir_all(dir).map_err(write_err)?;

  let temp_path = record_path.with_extension("tmp");
  write_line(&temp_path, pth_path).map_err(write_err)?;
  fs::rename(&temp_path, record_path).map_err(write_err)?;

  debug!(record = %record_path.display(), pth = %pth_path.display(), "graft recorded");
  Ok(())
}

fn write_line(path: &Path, value: &Path) -> io::Result<()> {
  let mut line = value.to_string_lossy().into_owned();
  line.push('\n');
  fs::write(path, line)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
  match fs::remove_file(path) {
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    other => other,
  }
}
