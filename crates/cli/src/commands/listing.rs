use anyhow::Result;

use symbridge_core::db::ProgramContext;

use crate::canonicalize_or_current;

fn open(root: &str) -> Result<ProgramContext> {
    let root_path = canonicalize_or_current(root)?;
    ProgramContext::from_root(&root_path)
}

/// List data types in the program store.
pub fn list_types_command(root: &str, json: bool) -> Result<()> {
    let ctx = open(root)?;
    let types = ctx.program.read(|db| db.list_data_types())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&types)?);
        return Ok(());
    }
    if types.is_empty() {
        println!("Types: (none)");
        return Ok(());
    }

    println!("Types:");
    for ty in types {
        let layout = if ty.is_placeholder() {
            " (placeholder)".to_string()
        } else {
            format!(" size={}", ty.size)
        };
        println!("- {} {}{layout}", ty.kind.as_str(), ty.name);
        for member in ty.members {
            if member.type_name.is_empty() {
                println!("    +{:<6} {}", member.offset, member.name);
            } else {
                println!("    +{:<6} {}: {}", member.offset, member.name, member.type_name);
            }
        }
    }
    Ok(())
}

/// List symbols in address order, with demangled names when present.
pub fn list_symbols_command(root: &str, json: bool) -> Result<()> {
    let ctx = open(root)?;
    let symbols = ctx.program.read(|db| db.list_symbols())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&symbols)?);
        return Ok(());
    }
    if symbols.is_empty() {
        println!("Symbols: (none)");
        return Ok(());
    }

    println!("Symbols:");
    for symbol in symbols {
        match &symbol.demangled {
            Some(demangled) => println!(
                "- 0x{:X} {:<8} {:<6} {} => {demangled}",
                symbol.address, symbol.kind, symbol.scope, symbol.name
            ),
            None => println!(
                "- 0x{:X} {:<8} {:<6} {}",
                symbol.address, symbol.kind, symbol.scope, symbol.name
            ),
        }
    }
    Ok(())
}

/// List recorded PDB load runs, oldest first.
pub fn list_runs_command(root: &str, json: bool) -> Result<()> {
    let ctx = open(root)?;
    let runs = ctx.program.read(|db| db.list_load_runs())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    if runs.is_empty() {
        println!("PDB load runs: (none)");
        return Ok(());
    }

    println!("PDB load runs:");
    for run in runs {
        println!(
            "- {} [{}] via {}{} ({} messages, {} -> {})",
            run.debug_file,
            run.status.as_str(),
            run.backend,
            run.backend_version.map(|v| format!(" {v}")).unwrap_or_default(),
            run.message_count,
            run.started_at,
            run.finished_at
        );
    }
    Ok(())
}
