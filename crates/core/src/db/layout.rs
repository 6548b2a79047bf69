use std::path::{Path, PathBuf};

/// Where a program project keeps its files, relative to a chosen root.
///
/// Pure path arithmetic; frontends create the directories.
#[derive(Debug, Clone)]
pub struct ProgramLayout {
    pub root: PathBuf,
    /// `.symbridge` metadata directory.
    pub meta_dir: PathBuf,
    /// `.symbridge/program.json`.
    pub project_config_path: PathBuf,
    /// Default program database location (`.symbridge/program.db`).
    pub db_path: PathBuf,
    /// Saved load reports.
    pub reports_dir: PathBuf,
}

impl ProgramLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let meta_dir = root.join(".symbridge");
        Self {
            project_config_path: meta_dir.join("program.json"),
            db_path: meta_dir.join("program.db"),
            reports_dir: root.join("reports"),
            meta_dir,
            root,
        }
    }

    /// Default database path as stored in a fresh config: relative to `root` when possible.
    pub fn db_path_relative_string(&self) -> String {
        let path = self.db_path.strip_prefix(&self.root).unwrap_or(&self.db_path);
        path.to_string_lossy().to_string()
    }

    /// Resolve a configured database path; relative paths are taken from `root`.
    pub fn resolve_db_path(&self, configured: &str) -> PathBuf {
        let configured = Path::new(configured);
        if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            self.root.join(configured)
        }
    }
}
