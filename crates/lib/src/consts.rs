/// Application name used for directory names and on-disk markers.
pub const APP_NAME: &str = "aigogo";

/// Hidden per-user and per-project directory name.
pub const APP_DIR: &str = ".aigogo";

/// Algorithm directory under the store root; also the integrity prefix in lock records.
pub const HASH_ALGORITHM: &str = "sha256";

/// Number of leading hash characters used to shard store directories.
pub const SHARD_PREFIX_LEN: usize = 2;

/// Length of a hex-encoded SHA-256 digest.
pub const HASH_HEX_LEN: usize = 64;

/// Manifest file name inside a stored package.
pub const MANIFEST_FILENAME: &str = "aigogo.json";

/// Directory holding the payload inside a stored package.
pub const FILES_DIRNAME: &str = "files";

/// Label fed to the digest between the payload files and the manifest bytes.
pub const MANIFEST_SENTINEL: &[u8] = b"__manifest__";

/// Path configuration file written into a Python environment.
pub const PTH_FILENAME: &str = "aigogo.pth";

/// Tracking record (inside `<project>/.aigogo/`) naming the `.pth` file that was written.
pub const PTH_LOCATION_FILENAME: &str = ".pth-location";

/// Imports directory name inside `<project>/.aigogo/`.
pub const IMPORTS_DIRNAME: &str = "imports";

/// Node preload script (inside `<project>/.aigogo/`) that puts the imports directory on `NODE_PATH`.
pub const REGISTER_SCRIPT_FILENAME: &str = "register.js";
