use symbridge_core::services::BackendSelection;
use symbridge_core::version;

#[test]
fn version_is_non_empty() {
    let v = version();
    assert!(!v.is_empty());
}

#[test]
fn universal_reader_is_the_default_backend() {
    assert_eq!(BackendSelection::default(), BackendSelection::UniversalReader);
}
