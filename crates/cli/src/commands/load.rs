use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use symbridge_core::cancel::CancelToken;
use symbridge_core::db::ProgramContext;
use symbridge_core::scheduler::AnalysisScheduler;
use symbridge_core::services::{
    ApplicatorRestrictions, AutoConfirm, BackendSelection, ConfirmationProvider, LoadRequest,
    LoadSettings, PdbLoader, PipelineOutcome, PipelineState,
};

use crate::canonicalize_or_current;
use crate::commands::prompt::{ConsoleConfirmation, ConsoleReportSink};

/// Per-invocation overrides for `load-pdb`.
///
/// Precedence: flags, then `--settings` file, then the `load` section of the program config.
#[derive(Debug, Clone, Default)]
pub struct LoadPdbArgs {
    pub pdb: PathBuf,
    pub backend: Option<BackendSelection>,
    pub dump_tool: Option<PathBuf>,
    pub restrictions: Option<ApplicatorRestrictions>,
    pub settings_file: Option<PathBuf>,
    pub slot_timeout_ms: Option<u64>,
    /// `None` prompts on the console when identities mismatch.
    pub confirm: Option<bool>,
    pub record_runs: Option<bool>,
    pub skip_hash: bool,
    pub json: bool,
}

pub fn load_pdb_command(root: &str, args: &LoadPdbArgs) -> Result<PipelineOutcome> {
    let root_path = canonicalize_or_current(root)?;
    let ctx = ProgramContext::from_root(&root_path)?;
    let settings = resolve_load_settings(&ctx.config.load, args)?;

    let mut request = LoadRequest::new(&args.pdb);
    if !args.skip_hash && args.pdb.is_file() {
        request = request.with_hash(crate::sha256_file(&args.pdb)?);
    }

    let scheduler = AnalysisScheduler::new(settings.scheduler_options());
    let confirm: Box<dyn ConfirmationProvider> = match args.confirm {
        Some(answer) => Box::new(AutoConfirm(answer)),
        None => Box::new(ConsoleConfirmation),
    };
    let report = ConsoleReportSink::new(&ctx.layout.reports_dir);
    let loader = PdbLoader { scheduler: &scheduler, confirm: confirm.as_ref(), report: &report };

    let outcome = loader
        .run(&ctx.program, &request, &settings, &CancelToken::new())
        .with_context(|| format!("Failed to load PDB {}", args.pdb.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&args.pdb, &outcome);
    }

    if outcome.state == PipelineState::Failed {
        bail!("PDB load failed for {}", args.pdb.display());
    }
    Ok(outcome)
}

fn print_outcome(pdb: &Path, outcome: &PipelineOutcome) {
    let state = match (outcome.state, outcome.cancelled) {
        (PipelineState::Done, true) => "cancelled (partial results kept)",
        (PipelineState::Done, false) => "done",
        (PipelineState::Aborted, _) => "aborted",
        (PipelineState::Failed, _) => "failed",
        (other, _) => other.as_str(),
    };
    println!("PDB load of {} via {}: {state}", pdb.display(), outcome.backend);
    if let Some(applied) = &outcome.applied {
        println!(
            "  Types: {} added, {} existing",
            applied.types_added, applied.types_existing
        );
        println!(
            "  Symbols: {} added, {} existing, {} outside memory",
            applied.symbols_added, applied.symbols_existing, applied.symbols_skipped
        );
        println!("  Lines: {}  Comments: {}", applied.lines_added, applied.comments_added);
        if applied.records_filtered > 0 {
            println!("  Filtered by restrictions: {}", applied.records_filtered);
        }
    }
    if let Some(demangled) = &outcome.demangled {
        println!(
            "  Demangled: {} of {} ({} failed)",
            demangled.demangled, demangled.examined, demangled.failed
        );
    }
    if !outcome.messages.is_empty() {
        println!("  Messages: {}", outcome.messages.len());
    }
}

/// Merge the configured load settings with a settings file and explicit flags.
pub fn resolve_load_settings(base: &LoadSettings, args: &LoadPdbArgs) -> Result<LoadSettings> {
    let mut settings = match &args.settings_file {
        Some(path) => {
            let overlay = read_settings_file(path)?;
            let mut merged = serde_json::to_value(base)?;
            merge_json(&mut merged, overlay);
            serde_json::from_value(merged)
                .with_context(|| format!("Invalid load settings in {}", path.display()))?
        }
        None => base.clone(),
    };

    if let Some(backend) = args.backend {
        settings.backend = backend;
    }
    if let Some(tool) = &args.dump_tool {
        settings.dump_tool = Some(tool.clone());
    }
    if let Some(restrictions) = &args.restrictions {
        settings.applicator.restrictions = restrictions.clone();
    }
    if let Some(timeout) = args.slot_timeout_ms {
        settings.slot_timeout_ms = Some(timeout);
    }
    if let Some(record) = args.record_runs {
        settings.record_runs = record;
    }
    Ok(settings)
}

/// Read a JSON or YAML settings document. `.json` files are parsed as JSON, anything else as YAML.
pub fn read_settings_file(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    let value: Value = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&text).context("Failed to parse settings JSON")?
    } else {
        serde_yaml::from_str(&text).context("Failed to parse settings YAML")?
    };
    if !value.is_object() {
        bail!("Settings file {} must contain a mapping", path.display());
    }
    Ok(value)
}

/// Objects merge key by key; any other overlay value replaces the base.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symbridge_core::model::RecordKind;

    fn args_with_settings(path: PathBuf) -> LoadPdbArgs {
        LoadPdbArgs { settings_file: Some(path), ..Default::default() }
    }

    #[test]
    fn yaml_settings_override_only_the_keys_they_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("load.yaml");
        fs::write(&path, "applicator:\n  restrictions: [data_type]\nslot_timeout_ms: 250\n")
            .unwrap();

        let base = LoadSettings { backend: BackendSelection::LegacyInterop, ..Default::default() };
        let settings = resolve_load_settings(&base, &args_with_settings(path)).unwrap();

        assert_eq!(settings.backend, BackendSelection::LegacyInterop);
        assert_eq!(settings.slot_timeout_ms, Some(250));
        assert!(settings.applicator.restrictions.allows(RecordKind::DataType));
        assert!(!settings.applicator.restrictions.allows(RecordKind::PublicSymbol));
        assert_eq!(settings.applicator.check_interval, base.applicator.check_interval);
    }

    #[test]
    fn flags_win_over_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("load.json");
        fs::write(&path, r#"{"backend": "legacy-interop", "record_runs": false}"#).unwrap();

        let args = LoadPdbArgs {
            backend: Some(BackendSelection::UniversalReader),
            ..args_with_settings(path)
        };
        let settings = resolve_load_settings(&LoadSettings::default(), &args).unwrap();
        assert_eq!(settings.backend, BackendSelection::UniversalReader);
        assert!(!settings.record_runs);
    }

    #[test]
    fn non_mapping_settings_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("load.yaml");
        fs::write(&path, "- just\n- a list\n").unwrap();
        let err = resolve_load_settings(&LoadSettings::default(), &args_with_settings(path))
            .unwrap_err();
        assert!(err.to_string().contains("must contain a mapping"));
    }
}
