//! Platform-specific filesystem behavior: well-known directories, directory
//! links and write-protection of stored trees.

pub mod immutable;
pub mod link;
pub mod paths;
