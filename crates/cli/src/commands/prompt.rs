//! Console implementations of the loader's operator collaborators.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use symbridge_core::services::{ConfirmationProvider, ReportSink};

/// Asks on stderr and reads the answer from stdin. End of input counts as "no".
#[derive(Debug, Default)]
pub struct ConsoleConfirmation;

impl ConfirmationProvider for ConsoleConfirmation {
    fn ask_yes_no(&self, title: &str, message: &str) -> bool {
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "{title}");
        let _ = writeln!(stderr, "{message}");
        let _ = write!(stderr, "[y/N] ");
        let _ = stderr.flush();
        drop(stderr);

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => parse_answer(&answer),
        }
    }
}

pub fn parse_answer(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Prints reports to stderr and keeps a copy under the program's reports directory.
#[derive(Debug)]
pub struct ConsoleReportSink {
    reports_dir: PathBuf,
    saved: Mutex<Vec<PathBuf>>,
}

impl ConsoleReportSink {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self { reports_dir: reports_dir.into(), saved: Mutex::new(Vec::new()) }
    }

    /// Report files written so far.
    pub fn saved(&self) -> Vec<PathBuf> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn save(&self, title: &str, summary: &str, full_log: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.reports_dir)?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let path = unique_path(&self.reports_dir, &format!("pdb-load-{stamp}"));
        fs::write(&path, format!("{title}\n{summary}\n\n{full_log}\n"))?;
        Ok(path)
    }
}

fn unique_path(dir: &Path, stem: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{stem}.log"));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}-{n}.log"));
        n += 1;
    }
    candidate
}

impl ReportSink for ConsoleReportSink {
    fn show(&self, title: &str, summary: &str, full_log: &str) {
        eprintln!("== {title} ==");
        eprintln!("{summary}");
        if !full_log.is_empty() {
            eprintln!("{full_log}");
        }
        match self.save(title, summary, full_log) {
            Ok(path) => {
                eprintln!("Report saved to {}", path.display());
                self.saved.lock().unwrap_or_else(PoisonError::into_inner).push(path);
            }
            Err(e) => {
                tracing::warn!(error = %e, dir = %self.reports_dir.display(), "could not save report")
            }
        }
    }
}
