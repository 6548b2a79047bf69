use std::path::Path;

/// Helper to print whether a directory exists.
pub fn print_dir_status(label: &str, path: &Path) {
    let exists = path.is_dir();
    println!("  {label}: {} ({})", if exists { "OK" } else { "MISSING" }, path.display());
}
