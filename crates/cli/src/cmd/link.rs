//! Implementation of the `aigogo link` and `aigogo unlink` commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;

use aigogo_lib::imports::{ImportsDir, Language, install_register_script, remove_register_script};
use aigogo_lib::link::{LinkError, Linker};
use aigogo_lib::store::Store;
use aigogo_lib::store_lock::LockMode;
use aigogo_lib::util::hash::PackageHash;

use crate::output::{OutputFormat, print_info, print_json, print_stat, print_success, print_warning};

/// One `NAME=HASH:LANGUAGE` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PackageArg {
  name: String,
  hash: PackageHash,
  language: Language,
}

impl PackageArg {
  fn parse(value: &str) -> Result<Self> {
    let (name, rest) = value
      .split_once('=')
      .ok_or_else(|| anyhow!("Expected NAME=HASH:LANGUAGE, got '{}'", value))?;
    let (hash, language) = rest
      .rsplit_once(':')
      .ok_or_else(|| anyhow!("Missing language in '{}'", value))?;

    if name.is_empty() {
      bail!("Missing package name in '{}'", value);
    }

    Ok(Self {
      name: name.to_string(),
      hash: hash.parse()?,
      language: language.parse()?,
    })
  }
}

#[derive(Serialize)]
struct LinkedPackage {
  name: String,
  language: Language,
  hash: PackageHash,
  link: String,
}

#[derive(Serialize)]
struct LinkResult {
  imports_dir: String,
  packages: Vec<LinkedPackage>,
  pth_path: Option<String>,
  register_script: Option<String>,
}

#[derive(Serialize)]
struct UnlinkResult {
  removed_pth: Option<String>,
  removed_register_script: bool,
  imports_dir: String,
}

/// Link exactly the requested packages into the project.
///
/// The imports directory is cleaned first, so packages dropped from the
/// request since the last run lose their links.
pub fn cmd_link(project: &Path, packages: &[String], output: OutputFormat) -> Result<()> {
  let requested = packages
    .iter()
    .map(|p| PackageArg::parse(p))
    .collect::<Result<Vec<_>>>()?;

  let project = project_root(project)?;
  let imports = ImportsDir::new(&project);
  let mut linked = Vec::new();

  imports.clean().context("Failed to clean imports directory")?;

  if !requested.is_empty() {
    let store = Store::open_default().context("Failed to open package store")?;
    let _lock = store
      .lock(LockMode::Shared, "link")
      .context("Failed to acquire store lock")?;

    for arg in &requested {
      let pkg = store
        .get(&arg.hash)
        .with_context(|| format!("Package {} is not in the store", arg.name))?;
      let link = imports.link_package(&arg.name, arg.language, &pkg.files_dir)?;

      linked.push(LinkedPackage {
        name: arg.name.clone(),
        language: arg.language,
        hash: arg.hash.clone(),
        link: link.display().to_string(),
      });
    }
  }

  // Python is the only runtime with an environment-level registration
  let wants_python = requested.is_empty() || requested.iter().any(|s| s.language == Language::Python);
  let pth_path = if wants_python {
    imports.setup_namespace(Language::Python)?;
    graft(&project)?
  } else {
    None
  };

  let wants_node = requested.iter().any(|s| s.language == Language::JavaScript);
  let register_script = if wants_node {
    register_node(&project, &imports)
  } else {
    remove_register_script(&project)?;
    None
  };

  if output.is_json() {
    return print_json(&LinkResult {
      imports_dir: imports.path().display().to_string(),
      packages: linked,
      pth_path: pth_path.map(|p| p.display().to_string()),
      register_script: register_script.map(|p| p.display().to_string()),
    });
  }

  for pkg in &linked {
    print_success(&format!("Linked {} ({})", pkg.name, pkg.language));
    match pkg.language {
      Language::Python => print_stat("import", &format!("from aigogo.{} import ...", pkg.language.link_name(&pkg.name))),
      Language::JavaScript => print_stat("import", &format!("import ... from '@aigogo/{}'", pkg.name)),
    }
  }

  if let Some(pth) = &pth_path {
    print_success(&format!("Python path configured via {}", pth.display()));
  }

  if register_script.is_some() {
    print_success("Node path configured via .aigogo/register.js");
    print_stat("require", "require('./.aigogo/register')");
    print_stat("preload", "node --require ./.aigogo/register.js app.js");
  }

  Ok(())
}

/// Install the Node register script.
///
/// A failure still leaves the links usable through `NODE_PATH`, so it is
/// reported with that fallback instead of failing the command.
fn register_node(project: &Path, imports: &ImportsDir) -> Option<PathBuf> {
  match install_register_script(project) {
    Ok(script) => Some(script),
    Err(e) => {
      print_warning(&format!("Could not install register script: {}", e));
      print_info(&format!(
        "Set NODE_PATH instead: export NODE_PATH=\"{}:$NODE_PATH\"",
        imports.path().display()
      ));
      None
    }
  }
}

/// Graft the project into the active Python environment.
///
/// Discovery failures leave the links usable through `PYTHONPATH`, so they
/// are reported with remediation instead of failing the command.
fn graft(project: &Path) -> Result<Option<PathBuf>> {
  let linker = match Linker::for_active_env() {
    Ok(linker) => linker,
    Err(LinkError::Discovery(e)) => {
      print_warning(&format!("Could not auto-configure Python path: {}", e));
      print_info(e.remediation());
      print_info(&format!(
        "Or add the imports directory to PYTHONPATH: {}",
        ImportsDir::new(project).path().display()
      ));
      return Ok(None);
    }
    Err(e) => return Err(e.into()),
  };

  let graft = linker.graft(project)?;
  Ok(Some(graft.pth_path))
}

pub fn cmd_unlink(project: &Path, output: OutputFormat) -> Result<()> {
  let project = project_root(project)?;
  let removed = Linker::ungraft(&project)?;

  let removed_script = remove_register_script(&project)?;

  let imports = ImportsDir::new(&project);
  imports.clean()?;

  if output.is_json() {
    return print_json(&UnlinkResult {
      removed_pth: removed.map(|p| p.display().to_string()),
      removed_register_script: removed_script,
      imports_dir: imports.path().display().to_string(),
    });
  }

  match removed {
    Some(pth) => print_success(&format!("Removed {}", pth.display())),
    None => print_info("No Python path configuration to remove"),
  }
  if removed_script {
    print_success("Removed .aigogo/register.js");
  }
  print_success(&format!("Cleaned {}", imports.path().display()));

  Ok(())
}

fn project_root(path: &Path) -> Result<PathBuf> {
  if !path.is_dir() {
    bail!("Project directory not found: {}", path.display());
  }
  dunce::canonicalize(path).with_context(|| format!("Failed to resolve {}", path.display()))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn hex() -> String {
    "ab".repeat(32)
  }

  #[test]
  fn parses_package_arg() {
    let arg = PackageArg::parse(&format!("my-utils=sha256:{}:python", hex())).unwrap();
    assert_eq!(arg.name, "my-utils");
    assert_eq!(arg.hash.as_str(), hex());
    assert_eq!(arg.language, Language::Python);
  }

  #[test]
  fn typescript_maps_to_javascript() {
    let arg = PackageArg::parse(&format!("ui={}:typescript", hex())).unwrap();
    assert_eq!(arg.language, Language::JavaScript);
  }

  #[test]
  fn rejects_malformed_args() {
    let bad = [
      "nohash".to_string(),
      format!("={}:python", hex()),
      "x=abc:python".to_string(),
      format!("x={}", hex()),
      format!("x={}:ruby", hex()),
    ];
    for arg in &bad {
      assert!(PackageArg::parse(arg).is_err(), "accepted {arg:?}");
    }
  }
}
