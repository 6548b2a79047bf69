use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use symbridge_core::db::{
    save_program_config, MemoryBlock, ProgramConfig, ProgramContext, ProgramDb, ProgramInfo,
    ProgramLayout,
};
use symbridge_core::identity::PdbIdentity;
use symbridge_core::services::LoadSettings;

use crate::commands::print_dir_status;
use crate::{canonicalize_or_current, infer_program_name};

/// Program attributes supplied on the command line. Explicit values win over
/// what an imported executable declares.
#[derive(Debug, Clone, Default)]
pub struct InitProgramOptions {
    pub exe: Option<PathBuf>,
    pub image_base: Option<u64>,
    pub blocks: Vec<MemoryBlock>,
    pub pdb_guid: Option<String>,
    pub pdb_signature: Option<u32>,
    pub pdb_age: Option<u32>,
    pub pdb_file: Option<String>,
}

impl InitProgramOptions {
    fn expected_pdb(&self) -> Result<Option<PdbIdentity>> {
        let age = self.pdb_age.unwrap_or(1);
        let identity = match (&self.pdb_guid, self.pdb_signature) {
            (Some(_), Some(_)) => bail!("Use either --pdb-guid or --pdb-signature, not both"),
            (Some(guid), None) => PdbIdentity::from_guid(guid, age),
            (None, Some(signature)) => PdbIdentity::from_signature(signature, age),
            (None, None) => return Ok(None),
        };
        Ok(Some(match &self.pdb_file {
            Some(file) => identity.with_file(file.clone()),
            None => identity,
        }))
    }
}

#[derive(Serialize)]
pub struct ProgramInfoSnapshot {
    pub name: String,
    pub root: String,
    pub config_file: String,
    pub config_version: String,
    pub db_path: String,
    pub reports_dir: String,
    pub program: Option<ProgramInfo>,
    pub memory_blocks: Vec<MemoryBlock>,
    pub load: LoadSettings,
    pub counts: StoreCounts,
}

#[derive(Serialize)]
pub struct StoreCounts {
    pub types: usize,
    pub symbols: usize,
    pub comments: usize,
    pub lines: usize,
    pub load_runs: usize,
}

/// Initialize a program project at `root`.
pub fn init_program_command(
    root: &str,
    name: Option<String>,
    options: InitProgramOptions,
) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let layout = ProgramLayout::new(&root_path);
    if layout.project_config_path.exists() {
        bail!("Program already initialized at {}", layout.project_config_path.display());
    }

    let (mut info, mut blocks) = match &options.exe {
        Some(exe) => import_executable(exe)?,
        None => {
            let fallback = name.clone().unwrap_or_else(|| infer_program_name(&root_path));
            (ProgramInfo::new(fallback, 0), Vec::new())
        }
    };
    if let Some(name) = &name {
        info.name = name.clone();
    }
    if let Some(base) = options.image_base {
        blocks = rebase_blocks(&blocks, info.image_base, base)?;
        info.image_base = base;
    }
    if !options.blocks.is_empty() {
        blocks = options.blocks.clone();
    }
    if let Some(identity) = options.expected_pdb()? {
        info.expected_pdb = Some(identity);
    }

    fs::create_dir_all(&layout.meta_dir)
        .with_context(|| format!("Failed to create meta dir: {}", layout.meta_dir.display()))?;
    fs::create_dir_all(&layout.reports_dir).with_context(|| {
        format!("Failed to create reports dir: {}", layout.reports_dir.display())
    })?;

    let config = ProgramConfig::new(info.name.clone(), layout.db_path_relative_string());
    save_program_config(&layout, &config)?;

    let mut db = ProgramDb::open(&layout.db_path).with_context(|| {
        format!("Failed to open program database at {}", layout.db_path.display())
    })?;
    db.initialize_program(&info, &blocks).context("Failed to record program attributes")?;

    println!("Initialized program '{}' at {}", info.name, root_path.display());
    println!("  Image base: 0x{:X}", info.image_base);
    println!("  Memory blocks: {}", blocks.len());
    match &info.expected_pdb {
        Some(identity) => println!("  Expected PDB: {} (age {})", identity.unique_id, identity.age),
        None => println!("  Expected PDB: (none)"),
    }
    Ok(())
}

/// Move blocks laid out for `from` so they keep their offsets relative to `to`.
fn rebase_blocks(blocks: &[MemoryBlock], from: u64, to: u64) -> Result<Vec<MemoryBlock>> {
    blocks
        .iter()
        .map(|block| {
            let moved = block
                .start
                .checked_sub(from)
                .zip(block.end.checked_sub(from))
                .and_then(|(start, end)| Some((to.checked_add(start)?, to.checked_add(end)?)));
            match moved {
                Some((start, end)) => Ok(MemoryBlock::new(block.name.clone(), start, end)),
                None => bail!(
                    "Memory block {} (0x{:X}-0x{:X}) cannot be moved from image base 0x{from:X} to 0x{to:X}",
                    block.name,
                    block.start,
                    block.end
                ),
            }
        })
        .collect()
}

#[cfg(feature = "pe-import")]
fn import_executable(exe: &std::path::Path) -> Result<(ProgramInfo, Vec<MemoryBlock>)> {
    let imported = symbridge_core::pe::import_program(exe)
        .with_context(|| format!("Failed to import executable {}", exe.display()))?;
    Ok((imported.info, imported.blocks))
}

#[cfg(not(feature = "pe-import"))]
fn import_executable(exe: &std::path::Path) -> Result<(ProgramInfo, Vec<MemoryBlock>)> {
    bail!("Cannot import {}: built without PE import support", exe.display())
}

/// Show program attributes, load defaults and store counts.
pub fn program_info_command(root: &str, json: bool) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let ctx = ProgramContext::from_root(&root_path)?;

    let (program, memory_blocks, snapshot, runs) = ctx.program.read(|db| -> Result<_> {
        Ok((db.program_info()?, db.memory_blocks()?, db.snapshot()?, db.list_load_runs()?))
    })?;

    let info = ProgramInfoSnapshot {
        name: ctx.config.name.clone(),
        root: root_path.display().to_string(),
        config_file: ctx.layout.project_config_path.display().to_string(),
        config_version: ctx.config.config_version.clone(),
        db_path: ctx.db_path.display().to_string(),
        reports_dir: ctx.layout.reports_dir.display().to_string(),
        program,
        memory_blocks,
        load: ctx.config.load.clone(),
        counts: StoreCounts {
            types: snapshot.types.len(),
            symbols: snapshot.symbols.len(),
            comments: snapshot.comments.len(),
            lines: snapshot.lines.len(),
            load_runs: runs.len(),
        },
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Program: {}", info.name);
    println!("  Root: {}", info.root);
    println!("  Config: {} (version {})", info.config_file, info.config_version);
    println!("  Database: {}", info.db_path);
    print_dir_status("Reports", &ctx.layout.reports_dir);
    match &info.program {
        Some(program) => {
            println!("  Image base: 0x{:X}", program.image_base);
            match &program.expected_pdb {
                Some(identity) => {
                    println!(
                        "  Expected PDB: {} (age {}) {}",
                        identity.unique_id,
                        identity.age,
                        identity.file.as_deref().unwrap_or("")
                    )
                }
                None => println!("  Expected PDB: (none)"),
            }
        }
        None => println!("  Program attributes: (not recorded)"),
    }
    println!("  Memory blocks:");
    for block in &info.memory_blocks {
        println!("    {:<10} 0x{:X}-0x{:X}", block.name, block.start, block.end);
    }
    println!("  Load backend: {}", info.load.backend);
    println!(
        "  Store: {} types, {} symbols, {} comments, {} lines; {} load runs",
        info.counts.types,
        info.counts.symbols,
        info.counts.comments,
        info.counts.lines,
        info.counts.load_runs
    );
    Ok(())
}

/// Set a program option (e.g. `Analyzers` / `Demangler Microsoft`).
pub fn set_option_command(root: &str, category: &str, name: &str, value: &str) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let ctx = ProgramContext::from_root(&root_path)?;
    ctx.program
        .read(|db| db.set_option(category, name, value))
        .with_context(|| format!("Failed to set option {category}/{name}"))?;
    println!("Set {category} / {name} = {value}");
    Ok(())
}
