use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use symbridge::commands::{
    init_program_command, list_backends_command, list_runs_command, list_symbols_command,
    list_types_command, load_pdb_command, program_info_command, set_option_command,
    InitProgramOptions, LoadPdbArgs,
};
use symbridge::{logging, parse_address, parse_memory_block};
use symbridge_core::db::MemoryBlock;
use symbridge_core::services::{ApplicatorRestrictions, BackendSelection};

/// Merge PDB debug information into an analyzed program database.
///
/// This CLI is a thin wrapper around `symbridge-core` (exposed in code as `symbridge_core`).
/// All substantive logic lives in the library so it can be tested thoroughly
/// and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "symbridge",
    version,
    about = "Merge PDB debug information into an analyzed program database",
    long_about = None
)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a program project at the given root.
    ///
    /// This will:
    /// - Create a `.symbridge` metadata directory and a `reports` directory.
    /// - Write a `.symbridge/program.json` config file.
    /// - Record image base, memory blocks and the expected PDB identity in the program database.
    InitProgram {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Optional program name. Defaults to the executable's file name or the root directory.
        #[arg(long)]
        name: Option<String>,

        /// Import image base, sections and the CodeView PDB reference from a PE executable.
        #[arg(long)]
        exe: Option<PathBuf>,

        /// Preferred load address (hex with 0x prefix, or decimal).
        #[arg(long, value_parser = parse_address)]
        image_base: Option<u64>,

        /// Memory block as name:start-end (end exclusive). Repeatable.
        #[arg(long = "block", value_parser = parse_memory_block)]
        blocks: Vec<MemoryBlock>,

        /// Expected PDB GUID.
        #[arg(long)]
        pdb_guid: Option<String>,

        /// Expected PDB 2.0 signature (hex or decimal).
        #[arg(long, value_parser = parse_signature)]
        pdb_signature: Option<u32>,

        /// Expected PDB age. Defaults to 1 when a GUID or signature is given.
        #[arg(long)]
        pdb_age: Option<u32>,

        /// Expected PDB file name, as recorded by the linker.
        #[arg(long)]
        pdb_file: Option<String>,
    },

    /// Show program attributes, load defaults and store counts.
    ProgramInfo {
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable output.
        #[arg(long)]
        json: bool,
    },

    /// Set a program option, e.g. `--category Analyzers --name "Demangler Microsoft" --value false`.
    SetOption {
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long)]
        category: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        value: String,
    },

    /// Load a PDB file into the program.
    LoadPdb {
        #[arg(long, default_value = ".")]
        root: String,

        /// Path to the PDB file.
        #[arg(long)]
        pdb: PathBuf,

        /// Parser backend: universal-reader (default) or legacy-interop.
        #[arg(long)]
        backend: Option<BackendSelection>,

        /// Dump tool used by the legacy-interop backend.
        #[arg(long)]
        dump_tool: Option<PathBuf>,

        /// Record restriction preset: none, data-types-only, public-symbols-only, exclude-all.
        #[arg(long)]
        restrictions: Option<ApplicatorRestrictions>,

        /// JSON or YAML file overriding the configured load settings.
        #[arg(long = "settings")]
        settings_file: Option<PathBuf>,

        /// Give up waiting for the analysis slot after this many milliseconds.
        #[arg(long)]
        slot_timeout_ms: Option<u64>,

        /// Load even when the PDB does not match the program.
        #[arg(long, conflicts_with = "no")]
        yes: bool,

        /// Abort when the PDB does not match the program.
        #[arg(long)]
        no: bool,

        /// Do not record this run in the load history.
        #[arg(long)]
        no_record: bool,

        /// Skip hashing the PDB file.
        #[arg(long)]
        skip_hash: bool,

        /// Emit the run outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List data types in the program store.
    ListTypes {
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long)]
        json: bool,
    },

    /// List symbols in the program store.
    ListSymbols {
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long)]
        json: bool,
    },

    /// List recorded PDB load runs.
    ListRuns {
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long)]
        json: bool,
    },

    /// List available PDB parser backends.
    ListBackends {
        #[arg(long)]
        json: bool,
    },
}

fn parse_signature(value: &str) -> Result<u32> {
    let raw = parse_address(value)?;
    u32::try_from(raw).with_context(|| format!("Signature '{value}' does not fit in 32 bits"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;

    let Some(command) = cli.command else {
        println!("symbridge v{}", symbridge_core::version());
        println!("Run `symbridge --help` for available commands.");
        return Ok(());
    };

    match command {
        Command::InitProgram {
            root,
            name,
            exe,
            image_base,
            blocks,
            pdb_guid,
            pdb_signature,
            pdb_age,
            pdb_file,
        } => {
            let options = InitProgramOptions {
                exe,
                image_base,
                blocks,
                pdb_guid,
                pdb_signature,
                pdb_age,
                pdb_file,
            };
            init_program_command(&root, name, options)?
        }
        Command::ProgramInfo { root, json } => program_info_command(&root, json)?,
        Command::SetOption { root, category, name, value } => {
            set_option_command(&root, &category, &name, &value)?
        }
        Command::LoadPdb {
            root,
            pdb,
            backend,
            dump_tool,
            restrictions,
            settings_file,
            slot_timeout_ms,
            yes,
            no,
            no_record,
            skip_hash,
            json,
        } => {
            let confirm = match (yes, no) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let args = LoadPdbArgs {
                pdb,
                backend,
                dump_tool,
                restrictions,
                settings_file,
                slot_timeout_ms,
                confirm,
                record_runs: no_record.then_some(false),
                skip_hash,
                json,
            };
            load_pdb_command(&root, &args)?;
        }
        Command::ListTypes { root, json } => list_types_command(&root, json)?,
        Command::ListSymbols { root, json } => list_symbols_command(&root, json)?,
        Command::ListRuns { root, json } => list_runs_command(&root, json)?,
        Command::ListBackends { json } => list_backends_command(json)?,
    }

    Ok(())
}
