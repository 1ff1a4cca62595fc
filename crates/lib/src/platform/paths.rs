use std::path::PathBuf;

use crate::consts::APP_DIR;

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("USERPROFILE").filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("HOME").filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// Returns `<home>/.aigogo`, the per-user application directory
pub fn app_home() -> Option<PathBuf> {
  home_dir().map(|home| home.join(APP_DIR))
}

#[cfg(test)]
#[cfg(not(windows))]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn app_home_is_under_home() {
    temp_env::with_var("HOME", Some("/home/user"), || {
      assert_eq!(app_home(), Some(PathBuf::from("/home/user/.aigogo")));
    });
  }

  #[test]
  #[serial]
  fn empty_home_is_unset() {
    temp_env::with_var("HOME", Some(""), || {
      assert_eq!(home_dir(), None);
    });
  }
}
