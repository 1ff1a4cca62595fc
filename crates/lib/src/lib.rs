//! aigogo-lib: local package store and import linking for aigogo
//!
//! This crate provides the building blocks behind the `aigogo` CLI:
//! - `Store`: content-addressable, write-protected package storage keyed by SHA-256
//! - `Linker`: grafts a project's imports directory into a Python environment via `.pth`
//! - `ImportsDir`: per-project namespaces of links into the store
//! - `StoreLock`: advisory locking for processes sharing one store

pub mod consts;
pub mod imports;
pub mod link;
pub mod platform;
pub mod store;
pub mod store_lock;
pub mod util;
