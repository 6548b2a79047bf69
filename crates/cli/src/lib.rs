use std::env;
use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use sha2::{Digest, Sha256};
use symbridge_core::db::MemoryBlock;

pub mod commands;
pub mod logging;

/// Canonicalize the root path if possible, falling back to the given string
/// relative to the current working directory.
pub fn canonicalize_or_current(root: &str) -> Result<PathBuf> {
    let path = Path::new(root);
    if path == Path::new(".") {
        Ok(env::current_dir().context("Failed to get current directory")?)
    } else {
        // The path may not exist yet (init-program creates it).
        match path.canonicalize() {
            Ok(p) => Ok(p),
            Err(_) => {
                let cwd = env::current_dir().context("Failed to get current directory")?;
                Ok(cwd.join(path))
            }
        }
    }
}

/// Infer a program name from the root path.
///
/// If the root has no final component (e.g., `/`), fallback to `unnamed-program`.
pub fn infer_program_name(root: &Path) -> String {
    root.file_name().and_then(|os_str| os_str.to_str()).unwrap_or("unnamed-program").to_string()
}

/// Compute the SHA-256 hash of a file and return it as a hex string.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read file for hashing: {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest = hasher.finalize();
    Ok(format!("{:x}", digest))
}

/// Parse an address given as `0x`-prefixed hex or plain decimal.
pub fn parse_address(value: &str) -> Result<u64> {
    let trimmed = value.trim().replace('_', "");
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed.map_err(|e| anyhow!("Invalid address '{value}': {e}"))
}

/// Parse a memory block given as `name:start-end` (end exclusive).
pub fn parse_memory_block(value: &str) -> Result<MemoryBlock> {
    let (name, range) = value
        .split_once(':')
        .ok_or_else(|| anyhow!("Invalid memory block '{value}': expected name:start-end"))?;
    let (start, end) = range
        .split_once('-')
        .ok_or_else(|| anyhow!("Invalid memory block '{value}': expected name:start-end"))?;
    let start = parse_address(start)?;
    let end = parse_address(end)?;
    if name.is_empty() {
        bail!("Invalid memory block '{value}': name is empty");
    }
    if end <= start {
        bail!("Invalid memory block '{value}': end must be greater than start");
    }
    Ok(MemoryBlock::new(name, start, end))
}
