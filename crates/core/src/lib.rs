//! symbridge-core
//!
//! Core library for merging PDB debug information into an analyzed program database.
//!
//! This crate defines the backend-neutral debug-info model, PDB identity verification, the
//! SQLite program database, the per-program analysis slot, both parser backends and the
//! pipeline that ties them together.
//!
//! All substantive logic lives here so it is fully testable and reusable from multiple
//! frontends; the `symbridge` CLI is a thin shell around it.

pub mod cancel;
pub mod db;
pub mod diagnostics;
pub mod identity;
pub mod model;
#[cfg(feature = "pe-import")]
pub mod pe;
pub mod program;
pub mod scheduler;
pub mod services;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
