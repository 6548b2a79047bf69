use symbridge::commands::{
    init_program_command, list_runs_command, load_pdb_command, program_info_command,
    set_option_command, InitProgramOptions, LoadPdbArgs,
};
use symbridge_core::db::{ProgramContext, ProgramLayout};
use tempfile::tempdir;

fn root_of(dir: &tempfile::TempDir) -> String {
    dir.path().to_string_lossy().to_string()
}

#[test]
fn init_program_refuses_to_overwrite() {
    let temp = tempdir().unwrap();
    let root = root_of(&temp);
    init_program_command(&root, Some("Once".into()), InitProgramOptions::default()).unwrap();
    let err =
        init_program_command(&root, Some("Twice".into()), InitProgramOptions::default()).unwrap_err();
    assert!(err.to_string().contains("Program already initialized"), "unexpected error: {err}");
}

#[test]
fn init_program_rejects_two_identity_kinds() {
    let temp = tempdir().unwrap();
    let options = InitProgramOptions {
        pdb_guid: Some("3F2504E0-4F89-11D3-9A0C-0305E82C3301".into()),
        pdb_signature: Some(0x1234),
        ..Default::default()
    };
    let err = init_program_command(&root_of(&temp), None, options).unwrap_err();
    assert!(err.to_string().contains("either --pdb-guid or --pdb-signature"));
    assert!(!ProgramLayout::new(temp.path()).project_config_path.exists());
}

#[test]
fn init_program_records_signature_identity() {
    let temp = tempdir().unwrap();
    let options = InitProgramOptions {
        image_base: Some(0x40_0000),
        pdb_signature: Some(0xDEAD_BEEF),
        pdb_age: Some(4),
        ..Default::default()
    };
    init_program_command(&root_of(&temp), Some("legacy.exe".into()), options).unwrap();

    let ctx = ProgramContext::from_root(temp.path()).unwrap();
    let identity = ctx.program.read(|db| db.expected_identity()).unwrap().unwrap();
    assert_eq!(identity.age, 4);
    assert_eq!(ctx.program.read(|db| db.image_base()).unwrap(), 0x40_0000);
}

#[test]
fn program_info_errors_when_config_corrupt() {
    let temp = tempdir().unwrap();
    let root = root_of(&temp);
    init_program_command(&root, Some("Corrupt".into()), InitProgramOptions::default()).unwrap();
    std::fs::write(ProgramLayout::new(temp.path()).project_config_path, "not-json").unwrap();
    let err = program_info_command(&root, true).unwrap_err();
    assert!(err.to_string().contains("Failed to parse project config JSON"));
}

#[test]
fn set_option_requires_a_program() {
    let temp = tempdir().unwrap();
    let err = set_option_command(&root_of(&temp), "Analyzers", "Demangler Microsoft", "false")
        .unwrap_err();
    assert!(err.to_string().contains("Failed to read project config"));
}

#[test]
fn load_pdb_reports_missing_settings_file() {
    let temp = tempdir().unwrap();
    let root = root_of(&temp);
    init_program_command(&root, None, InitProgramOptions::default()).unwrap();

    let args = LoadPdbArgs {
        pdb: temp.path().join("app.pdb"),
        settings_file: Some(temp.path().join("missing.yaml")),
        ..Default::default()
    };
    let err = load_pdb_command(&root, &args).unwrap_err();
    assert!(err.to_string().contains("Failed to read settings file"));
    list_runs_command(&root, false).unwrap();
}

#[test]
fn load_pdb_fails_for_missing_debug_file() {
    let temp = tempdir().unwrap();
    let root = root_of(&temp);
    init_program_command(&root, None, InitProgramOptions::default()).unwrap();

    let args = LoadPdbArgs {
        pdb: temp.path().join("absent.pdb"),
        confirm: Some(false),
        ..Default::default()
    };
    let err = load_pdb_command(&root, &args).unwrap_err();
    assert!(err.to_string().contains("PDB load failed"));

    let ctx = ProgramContext::from_root(temp.path()).unwrap();
    let runs = ctx.program.read(|db| db.list_load_runs()).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].debug_file_hash, None);
}
