use symbridge_core::db::{
    save_program_config, ProgramConfig, ProgramContext, ProgramInfo, ProgramLayout,
};
use symbridge_core::services::{ApplicatorRestrictions, BackendSelection};

#[test]
fn program_context_loads_config_and_db() {
    let temp = tempfile::tempdir().unwrap();
    let layout = ProgramLayout::new(temp.path());
    std::fs::create_dir_all(&layout.meta_dir).unwrap();

    let config = ProgramConfig::new("CtxProgram", layout.db_path_relative_string());
    save_program_config(&layout, &config).unwrap();

    let ctx = ProgramContext::from_root(temp.path()).expect("context");
    assert_eq!(ctx.config.name, "CtxProgram");
    assert!(ctx.db_path.is_file());
    assert_eq!(ctx.program.name(), "CtxProgram");

    // DB should be initialized and usable.
    ctx.program.read(|db| db.list_symbols()).expect("list symbols");
    assert_eq!(ctx.program.read(|db| db.program_info()).unwrap(), None::<ProgramInfo>);
}

#[test]
fn load_settings_survive_the_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let layout = ProgramLayout::new(temp.path());
    std::fs::create_dir_all(&layout.meta_dir).unwrap();

    let mut config = ProgramConfig::new("Settings", layout.db_path_relative_string());
    config.load.backend = BackendSelection::LegacyInterop;
    config.load.applicator.restrictions = ApplicatorRestrictions::public_symbols_only();
    config.load.slot_timeout_ms = Some(500);
    save_program_config(&layout, &config).unwrap();

    let ctx = ProgramContext::from_root(temp.path()).unwrap();
    assert_eq!(ctx.config.load, config.load);
}

#[test]
fn config_without_load_section_uses_defaults() {
    let temp = tempfile::tempdir().unwrap();
    let layout = ProgramLayout::new(temp.path());
    std::fs::create_dir_all(&layout.meta_dir).unwrap();
    std::fs::write(
        &layout.project_config_path,
        r#"{"name": "Bare", "description": null, "config_version": "0.1.0",
            "db": {"path": ".symbridge/program.db"}}"#,
    )
    .unwrap();

    let ctx = ProgramContext::from_root(temp.path()).unwrap();
    assert_eq!(ctx.config.load.backend, BackendSelection::UniversalReader);
    assert!(ctx.config.load.record_runs);
}

#[test]
fn missing_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let err = ProgramContext::from_root(temp.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to read project config"));
}
