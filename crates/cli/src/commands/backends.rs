use anyhow::Result;
use serde::Serialize;

use symbridge_core::services::backends::dia_dump::DUMP_TOOL_ENV;
use symbridge_core::services::{BackendSelection, SelectedBackend};

#[derive(Debug, Serialize)]
pub struct BackendInfo {
    pub name: String,
    pub description: String,
    pub version: Option<String>,
    pub default: bool,
}

fn describe(selection: BackendSelection) -> String {
    match selection {
        BackendSelection::LegacyInterop => format!(
            "External dump tool emitting JSON (--dump-tool, {DUMP_TOOL_ENV}, or pdb-dump on PATH)"
        ),
        BackendSelection::UniversalReader => {
            "Built-in MSF/PDB reader; runs on any host".to_string()
        }
    }
}

/// List PDB parser backends known to this binary.
pub fn list_backends_command(json: bool) -> Result<()> {
    let entries: Vec<BackendInfo> = BackendSelection::ALL
        .iter()
        .map(|&selection| {
            let backend = SelectedBackend::new(selection, None);
            BackendInfo {
                name: selection.as_str().to_string(),
                description: describe(selection),
                version: backend.as_backend().version(),
                default: selection == BackendSelection::default(),
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Backends:");
    for entry in entries {
        let marker = if entry.default { " (default)" } else { "" };
        let version = entry.version.as_deref().unwrap_or("unavailable");
        println!("- {}{marker}: {} [{version}]", entry.name, entry.description);
    }

    Ok(())
}
