//! The per-project imports directory.
//!
//! Stored packages are exposed to a project through links under
//! `<project>/.aigogo/imports/`, grouped in one namespace per language:
//!
//! ```text
//! <project>/.aigogo/imports/
//! ├── aigogo/                 # Python: `from aigogo.my_utils import ...`
//! │   └── my_utils -> <store>/sha256/ab/<hash>/files
//! └── @aigogo/                # JavaScript: `require('@aigogo/my-utils')`
//!     └── my-utils -> <store>/sha256/cd/<hash>/files
//! ```
//!
//! Links point straight into the store, so nothing here ever holds package
//! content. Cleaning the directory removes links only.
//!
//! Node has no `.pth` equivalent, so JavaScript projects get
//! `<project>/.aigogo/register.js` instead: preloading it adds the imports
//! directory to `NODE_PATH` for that process.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::{APP_DIR, APP_NAME, IMPORTS_DIRNAME, REGISTER_SCRIPT_FILENAME};
use crate::platform::link::{create_dir_link, is_dir_link, remove_dir_link};

/// `<project>/.aigogo`
pub fn app_dir(project_root: &Path) -> PathBuf {
  project_root.join(APP_DIR)
}

/// `<project>/.aigogo/imports`
pub fn imports_dir(project_root: &Path) -> PathBuf {
  app_dir(project_root).join(IMPORTS_DIRNAME)
}

/// `<project>/.aigogo/register.js`
pub fn register_script_path(project_root: &Path) -> PathBuf {
  app_dir(project_root).join(REGISTER_SCRIPT_FILENAME)
}

const REGISTER_SCRIPT: &str = r#"// Generated by aigogo. Preload with `node --require ./.aigogo/register.js`
// or `require('./.aigogo/register')` to resolve '@aigogo/*' packages.
const path = require('path');
const Module = require('module');

const imports = path.join(__dirname, 'imports');
const current = process.env.NODE_PATH ? process.env.NODE_PATH.split(path.delimiter) : [];

if (!current.includes(imports)) {
  process.env.NODE_PATH = [imports, ...current].join(path.delimiter);
  Module._initPaths();
}
"#;

/// Write the Node register script for `project_root`, replacing any older copy.
///
/// The script resolves the imports directory relative to itself, so it keeps
/// working if the project is moved. Returns the script path.
pub fn install_register_script(project_root: &Path) -> Result<PathBuf, ImportsError> {
  let script = register_script_path(project_root);
  let write_err = |e: io::Error| ImportsError::WriteScript {
    path: script.clone(),
    source: e,
  };

  fs::create_dir_all(app_dir(project_root)).map_err(write_err)?;

  let temp_path = script.with_extension("js.tmp");
  fs::write(&temp_path, REGISTER_SCRIPT).map_err(write_err)?;
  if let Err(e) = fs::rename(&temp_path, &script) {
    if let Err(cleanup) = fs::remove_file(&temp_path) {
      warn!(path = %temp_path.display(), error = %cleanup, "failed to remove partial register script");
    }
    return Err(write_err(e));
  }

  info!(script = %script.display(), "installed register script");
  Ok(script)
}

/// Remove the Node register script. Returns whether one was present.
pub fn remove_register_script(project_root: &Path) -> Result<bool, ImportsError> {
  let script = register_script_path(project_root);
  match fs::remove_file(&script) {
    Ok(()) => {
      info!(script = %script.display(), "removed register script");
      Ok(true)
    }
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(ImportsError::Remove { path: script, source: e }),
  }
}

/// Target language of a package, deciding its namespace and link naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  Python,
  JavaScript,
}

impl Language {
  /// Directory under `imports/` that holds this language's links.
  pub fn namespace(&self) -> String {
    match self {
      Language::Python => APP_NAME.to_string(),
      Language::JavaScript => format!("@{}", APP_NAME),
    }
  }

  /// Name of the link for `package` inside the namespace.
  pub fn link_name(&self, package: &str) -> String {
    match self {
      Language::Python => normalize_name(package),
      Language::JavaScript => package.to_string(),
    }
  }
}

impl fmt::Display for Language {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Language::Python => write!(f, "python"),
      Language::JavaScript => write!(f, "javascript"),
    }
  }
}

impl FromStr for Language {
  type Err = ImportsError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "python" => Ok(Language::Python),
      "javascript" | "typescript" => Ok(Language::JavaScript),
      _ => Err(ImportsError::UnknownLanguage(s.to_string())),
    }
  }
}

/// Turn a package name into a valid Python module name.
///
/// `my-utils` and `my.utils` become `my_utils`; names that cannot start an
/// identifier gain a leading `_`; any other invalid character becomes `_`.
pub fn normalize_name(name: &str) -> String {
  let mut normalized = name.replace(['-', '.'], "_");

  if let Some(first) = normalized.chars().next()
    && !(first.is_ascii_alphabetic() || first == '_')
  {
    normalized.insert(0, '_');
  }

  normalized
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
    .collect()
}

#[derive(Debug, Error)]
pub enum ImportsError {
  #[error("unsupported language: {0} (expected python, javascript or typescript)")]
  UnknownLanguage(String),

  #[error("invalid package name: {0:?}")]
  InvalidName(String),

  #[error("package files not found: {0}")]
  MissingTarget(PathBuf),

  #[error("failed to create directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to link {link} -> {target}: {source}")]
  Link {
    target: PathBuf,
    link: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write register script {path}: {source}")]
  WriteScript {
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
}

/// Handle on one project's imports directory.
#[derive(Debug, Clone)]
pub struct ImportsDir {
  path: PathBuf,
}

impl ImportsDir {
  pub fn new(project_root: &Path) -> Self {
    Self {
      path: imports_dir(project_root),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn namespace_dir(&self, language: Language) -> PathBuf {
    self.path.join(language.namespace())
  }

  /// Create the namespace directory for `language`.
  pub fn setup_namespace(&self, language: Language) -> Result<PathBuf, ImportsError> {
    let dir = self.namespace_dir(language);
    fs::create_dir_all(&dir).map_err(|e| ImportsError::CreateDir {
      path: dir.clone(),
      source: e,
    })?;
    debug!(language = %language, path = %dir.display(), "namespace ready");
    Ok(dir)
  }

  /// Link `package` to `files_root` inside the language namespace.
  ///
  /// An existing link of the same name is replaced. Returns the link path.
  pub fn link_package(&self, package: &str, language: Language, files_root: &Path) -> Result<PathBuf, ImportsError> {
    let link_name = language.link_name(package);
    if link_name.is_empty() || link_name.contains(['/', '\\']) || link_name == "." || link_name == ".." {
      return Err(ImportsError::InvalidName(package.to_string()));
    }

    if !files_root.is_dir() {
      return Err(ImportsError::MissingTarget(files_root.to_path_buf()));
    }

    let namespace = self.setup_namespace(language)?;
    let link = namespace.join(&link_name);

    if fs::symlink_metadata(&link).is_ok() {
      debug!(link = %link.display(), "replacing existing link");
      remove_entry(&link)?;
    }

    create_dir_link(files_root, &link).map_err(|e| ImportsError::Link {
      target: files_root.to_path_buf(),
      link: link.clone(),
      source: e,
    })?;

    info!(package, language = %language, link = %link.display(), "linked package");
    Ok(link)
  }

  /// Remove every link and namespace. The store is never touched.
  pub fn clean(&self) -> Result<(), ImportsError> {
    if fs::symlink_metadata(&self.path).is_err() {
      return Ok(());
    }

    remove_links_under(&self.path)?;
    fs::remove_dir_all(&self.path).map_err(|e| ImportsError::Remove {
      path: self.path.clone(),
      source: e,
    })?;

    info!(path = %self.path.display(), "cleaned imports directory");
    Ok(())
  }
}

/// Unlink every link beneath `dir` before anything recursive runs, so a
/// directory walk can never descend into the store through a junction.
fn remove_links_under(dir: &Path) -> Result<(), ImportsError> {
  let entries = fs::read_dir(dir).map_err(|e| ImportsError::Remove {
    path: dir.to_path_buf(),
    source: e,
  })?;

  for entry in entries {
    let entry = entry.map_err(|e| ImportsError::Remove {
      path: dir.to_path_buf(),
      source: e,
    })?;
    let path = entry.path();

    if is_dir_link(&path) {
      remove_entry(&path)?;
    } else if path.is_dir() {
      remove_links_under(&path)?;
    }
  }

  Ok(())
}

fn remove_entry(path: &Path) -> Result<(), ImportsError> {
  let result = if is_dir_link(path) {
    remove_dir_link(path)
  } else if path.is_dir() {
    fs::remove_dir_all(path)
  } else {
    fs::remove_file(path)
  };

  result.map_err(|e| ImportsError::Remove {
    path: path.to_path_buf(),
    source: e,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{fake_project, write_tree};
  use tempfile::TempDir;

  fn package_files(root: &Path) -> PathBuf {
    let files = root.join("store-files");
    write_tree(&files, &[("__init__.py", ""), ("util.py", "def f(): pass\n")]);
    files
  }

  #[test]
  fn normalize_replaces_separators() {
    assert_eq!(normalize_name("my-utils"), "my_utils");
    assert_eq!(normalize_name("my.utils"), "my_utils");
    assert_eq!(normalize_name("already_ok"), "already_ok");
  }

  #[test]
  fn normalize_fixes_leading_digit() {
    assert_eq!(normalize_name("3d-tools"), "_3d_tools");
  }

  #[test]
  fn normalize_replaces_invalid_chars() {
    assert_eq!(normalize_name("a b+c"), "a_b_c");
    assert_eq!(normalize_name("@scope"), "__scope");
  }

  #[test]
  fn language_parsing() {
    assert_eq!("python".parse::<Language>().unwrap(), Language::Python);
    assert_eq!("JavaScript".parse::<Language>().unwrap(), Language::JavaScript);
    assert_eq!("typescript".parse::<Language>().unwrap(), Language::JavaScript);
    assert!(matches!("ruby".parse::<Language>(), Err(ImportsError::UnknownLanguage(_))));
  }

  #[test]
  fn namespaces_per_language() {
    let temp = TempDir::new().unwrap();
    let imports = ImportsDir::new(temp.path());

    let py = imports.setup_namespace(Language::Python).unwrap();
    let js = imports.setup_namespace(Language::JavaScript).unwrap();

    assert!(py.ends_with(Path::new(".aigogo").join("imports").join("aigogo")));
    assert!(js.ends_with(Path::new(".aigogo").join("imports").join("@aigogo")));
    assert!(py.is_dir() && js.is_dir());
  }

  #[test]
  fn python_link_uses_normalized_name() {
    let temp = TempDir::new().unwrap();
    let project = fake_project(temp.path());
    let files = package_files(temp.path());
    let imports = ImportsDir::new(&project);

    let link = imports.link_package("my-utils", Language::Python, &files).unwrap();

    assert_eq!(link, imports.path().join("aigogo").join("my_utils"));
    assert!(link.join("util.py").exists());
  }

  #[test]
  fn javascript_link_keeps_name() {
    let temp = TempDir::new().unwrap();
    let project = fake_project(temp.path());
    let files = package_files(temp.path());
    let imports = ImportsDir::new(&project);

    let link = imports.link_package("my-utils", Language::JavaScript, &files).unwrap();
    assert_eq!(link, imports.path().join("@aigogo").join("my-utils"));
  }

  #[test]
  fn relink_replaces_existing_link() {
    let temp = TempDir::new().unwrap();
    let project = fake_project(temp.path());
    let old = temp.path().join("old");
    write_tree(&old, &[("old.py", "")]);
    let new = package_files(temp.path());
    let imports = ImportsDir::new(&project);

    imports.link_package("pkg", Language::Python, &old).unwrap();
    let link = imports.link_package("pkg", Language::Python, &new).unwrap();

    assert!(link.join("util.py").exists());
    assert!(!link.join("old.py").exists());
    assert!(old.join("old.py").exists());
  }

  #[test]
  fn link_rejects_missing_target() {
    let temp = TempDir::new().unwrap();
    let imports = ImportsDir::new(temp.path());
    let err = imports
      .link_package("pkg", Language::Python, &temp.path().join("nope"))
      .unwrap_err();
    assert!(matches!(err, ImportsError::MissingTarget(_)));
  }

  #[test]
  fn link_rejects_path_like_names() {
    let temp = TempDir::new().unwrap();
    let files = package_files(temp.path());
    let imports = ImportsDir::new(temp.path());

    for name in ["", "../escape", ".."] {
      let err = imports.link_package(name, Language::JavaScript, &files).unwrap_err();
      assert!(matches!(err, ImportsError::InvalidName(_)), "accepted {name:?}");
    }
  }

  #[test]
  fn clean_removes_links_but_not_targets() {
    let temp = TempDir::new().unwrap();
    let project = fake_project(temp.path());
    let files = package_files(temp.path());
    let imports = ImportsDir::new(&project);
    imports.link_package("a", Language::Python, &files).unwrap();
    imports.link_package("b", Language::JavaScript, &files).unwrap();

    imports.clean().unwrap();

    assert!(!imports.path().exists());
    assert!(files.join("util.py").exists());
    assert!(files.join("__init__.py").exists());
  }

  #[test]
  fn register_script_points_node_at_imports() {
    let temp = TempDir::new().unwrap();
    let project = fake_project(temp.path());

    let script = install_register_script(&project).unwrap();

    assert_eq!(script, project.join(".aigogo").join("register.js"));
    let content = fs::read_to_string(&script).unwrap();
    assert!(content.contains("path.join(__dirname, 'imports')"));
    assert!(content.contains("process.env.NODE_PATH"));
    assert!(content.contains("Module._initPaths()"));
  }

  #[test]
  fn register_script_install_is_repeatable() {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("bare");
    fs::create_dir_all(&project).unwrap();

    install_register_script(&project).unwrap();
    install_register_script(&project).unwrap();

    let mut names: Vec<String> = fs::read_dir(app_dir(&project))
      .unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
      .collect();
    names.sort();
    assert_eq!(names, vec!["register.js"]);
  }

  #[test]
  fn remove_register_script_reports_presence() {
    let temp = TempDir::new().unwrap();
    let project = fake_project(temp.path());
    install_register_script(&project).unwrap();

    assert!(remove_register_script(&project).unwrap());
    assert!(!register_script_path(&project).exists());
    assert!(!remove_register_script(&project).unwrap());
  }

  #[test]
  fn clean_leaves_register_script() {
    let temp = TempDir::new().unwrap();
    let project = fake_project(temp.path());
    let script = install_register_script(&project).unwrap();

    ImportsDir::new(&project).clean().unwrap();

    assert!(script.exists());
  }

  #[test]
  fn clean_missing_dir_is_ok() {
    let temp = TempDir::new().unwrap();
    ImportsDir::new(temp.path()).clean().unwrap();
  }
}
