use serde::{Deserialize, Serialize};

use crate::services::pipeline::LoadSettings;

pub const CONFIG_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Usually relative to the project root.
    pub path: String,
}

/// Contents of `.symbridge/program.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramConfig {
    pub name: String,
    pub description: Option<String>,
    /// Version of this file's format.
    pub config_version: String,
    pub db: DbConfig,
    /// Defaults for PDB loads; CLI flags override individual fields.
    #[serde(default)]
    pub load: LoadSettings,
}

impl ProgramConfig {
    pub fn new(name: impl Into<String>, db_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            config_version: CONFIG_VERSION.to_string(),
            db: DbConfig { path: db_path.into() },
            load: LoadSettings::default(),
        }
    }
}
