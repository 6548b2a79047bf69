//! Program database integration and project layout definitions.
//!
//! The program database is a SQLite file holding what the analyzed program already knows
//! about itself (image base, memory blocks, options) plus the type/symbol store that PDB
//! loads merge into:
//! - `ProgramLayout`: computed paths for project directories/files.
//! - `ProgramConfig`: serializable project metadata and PDB load defaults.
//! - `ProgramDb`: a small SQLite wrapper with versioned schema migrations.
//! - `StoreTransaction`: the transactional mutation entry point for types and symbols.

pub mod config;
pub mod context;
pub mod layout;
pub mod models;
pub mod program_db;
pub mod util;

pub use config::*;
pub use context::*;
pub use layout::*;
pub use models::*;
pub use program_db::*;
pub use util::*;
