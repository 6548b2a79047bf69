use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::db::{ProgramConfig, ProgramDb, ProgramLayout};

pub fn load_program_config(layout: &ProgramLayout) -> Result<ProgramConfig> {
    let path = &layout.project_config_path;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read project config at {}", path.display()))?;
    serde_json::from_str(&text).context("Failed to parse project config JSON")
}

pub fn save_program_config(layout: &ProgramLayout, config: &ProgramConfig) -> Result<()> {
    let path = &layout.project_config_path;
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write project config: {}", path.display()))
}

/// Load the config and open (migrating if needed) the database it points at.
pub fn open_program_db(layout: &ProgramLayout) -> Result<(ProgramConfig, PathBuf, ProgramDb)> {
    let config = load_program_config(layout)?;
    let db_path = layout.resolve_db_path(&config.db.path);
    let db = ProgramDb::open(&db_path)
        .with_context(|| format!("Failed to open program database at {}", db_path.display()))?;
    Ok((config, db_path, db))
}
