use std::fs;
use std::path::Path;

use symbridge::{
    canonicalize_or_current, infer_program_name, parse_address, parse_memory_block, sha256_file,
};
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_resolves_existing_path() {
    let tmp = tempdir().expect("tempdir");
    let subdir = tmp.path().join("nested");
    fs::create_dir_all(&subdir).expect("create nested");

    let result = canonicalize_or_current(subdir.to_str().unwrap()).expect("canonicalize nested");
    assert_eq!(result, subdir.canonicalize().expect("canonicalize subdir"));
}

#[test]
fn canonicalize_or_current_joins_missing_relative_path_to_cwd() {
    let result = canonicalize_or_current("does-not-exist-yet").expect("resolve");
    assert!(result.is_absolute());
    assert!(result.ends_with("does-not-exist-yet"));
}

#[test]
fn infer_program_name_uses_last_path_component() {
    assert_eq!(infer_program_name(Path::new("/tmp/game-client")), "game-client");
    assert_eq!(infer_program_name(Path::new("/")), "unnamed-program");
}

#[test]
fn addresses_accept_hex_and_decimal() {
    assert_eq!(parse_address("0x140000000").unwrap(), 0x1_4000_0000);
    assert_eq!(parse_address("0X1_000").unwrap(), 0x1000);
    assert_eq!(parse_address("4096").unwrap(), 4096);
    assert!(parse_address("0xZZ").is_err());
}

#[test]
fn memory_blocks_parse_name_and_range() {
    let block = parse_memory_block(".text:0x1000-0x2000").unwrap();
    assert_eq!(block.name, ".text");
    assert_eq!((block.start, block.end), (0x1000, 0x2000));

    assert!(parse_memory_block(".text").is_err());
    assert!(parse_memory_block(":0x1000-0x2000").is_err());
    let err = parse_memory_block(".bss:0x2000-0x1000").unwrap_err();
    assert!(err.to_string().contains("end must be greater than start"));
}

#[test]
fn sha256_file_hashes_contents() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("app.pdb");
    fs::write(&path, b"abc").unwrap();
    assert_eq!(
        sha256_file(&path).unwrap(),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    assert!(sha256_file(&tmp.path().join("missing.pdb")).is_err());
}
