use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::db::{open_program_db, ProgramConfig, ProgramLayout};
use crate::program::Program;

/// Convenience wrapper bundling layout, config, db path, and an open Program.
#[derive(Debug)]
pub struct ProgramContext {
    pub layout: ProgramLayout,
    pub config: ProgramConfig,
    pub db_path: PathBuf,
    pub program: Program,
}

impl ProgramContext {
    /// Load project config and open the program database for a given root.
    pub fn from_root(root: impl AsRef<Path>) -> Result<Self> {
        let layout = ProgramLayout::new(root);
        let (config, db_path, db) = open_program_db(&layout)?;
        let program = Program::new(config.name.clone(), db);
        Ok(Self { layout, config, db_path, program })
    }
}
