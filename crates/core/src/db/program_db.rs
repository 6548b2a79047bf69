use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use thiserror::Error;

use crate::db::{
    CommentRow, LineRow, MemoryBlock, PdbLoadRunRecord, PdbLoadStatus, ProgramInfo,
    ProgramOptions, StoreSnapshot, SymbolRow,
};
use crate::identity::{PdbIdentity, PdbUniqueId};
use crate::model::{MemberRecord, SymbolRecord, TypeKind, TypeRecord};

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 4;

/// Error type for program database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },

    /// Member layout column could not be encoded or decoded.
    #[error("Corrupt member layout for data type '{name}': {source}")]
    MemberLayout { name: String, source: serde_json::Error },

    #[error("Program information has not been initialized")]
    MissingProgramInfo,
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// SQLite-backed program database.
///
/// This is a thin wrapper around `rusqlite::Connection` that is responsible for:
/// - Opening/creating the DB file.
/// - Applying schema migrations.
/// - Reading program attributes and options.
/// - Handing out [`StoreTransaction`]s, the only way to mutate the type/symbol store.
#[derive(Debug)]
pub struct ProgramDb {
    conn: Connection,
}

impl ProgramDb {
    /// Open (or create) a program database at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Open a private in-memory database (used by tests and scratch imports).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Record program attributes and replace the memory map.
    pub fn initialize_program(&mut self, info: &ProgramInfo, blocks: &[MemoryBlock]) -> DbResult<()> {
        let tx = self.conn.transaction()?;
        let (guid, signature, age, file) = match &info.expected_pdb {
            Some(id) => {
                let (guid, signature) = match &id.unique_id {
                    PdbUniqueId::Guid(g) => (Some(g.clone()), None),
                    PdbUniqueId::Signature(s) => (None, Some(*s as i64)),
                };
                (guid, signature, Some(id.age as i64), id.file.clone())
            }
            None => (None, None, None, None),
        };
        tx.execute(
            r#"
            INSERT OR REPLACE INTO program_info (id, name, image_base, pdb_guid, pdb_signature, pdb_age, pdb_file)
            VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![info.name, info.image_base as i64, guid, signature, age, file],
        )?;
        tx.execute("DELETE FROM memory_blocks", [])?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO memory_blocks (name, start, end_exclusive)
                VALUES (?1, ?2, ?3)
                "#,
            )?;
            for block in blocks {
                stmt.execute(params![block.name, block.start as i64, block.end as i64])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Load program attributes, if the program has been initialized.
    pub fn program_info(&self) -> DbResult<Option<ProgramInfo>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT name, image_base, pdb_guid, pdb_signature, pdb_age, pdb_file
                FROM program_info
                WHERE id = 1
                "#,
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)? as u64,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(name, image_base, guid, signature, age, file)| {
            let unique_id = match (guid, signature) {
                (Some(g), _) => Some(PdbUniqueId::guid(&g)),
                (None, Some(s)) => Some(PdbUniqueId::Signature(s as u32)),
                (None, None) => None,
            };
            let expected_pdb = unique_id.map(|unique_id| PdbIdentity {
                unique_id,
                age: age.unwrap_or(0) as u32,
                file,
            });
            ProgramInfo { name, image_base, expected_pdb }
        }))
    }

    pub fn image_base(&self) -> DbResult<u64> {
        self.program_info()?.map(|info| info.image_base).ok_or(DbError::MissingProgramInfo)
    }

    pub fn expected_identity(&self) -> DbResult<Option<PdbIdentity>> {
        Ok(self.program_info()?.and_then(|info| info.expected_pdb))
    }

    /// List memory blocks ordered by start address.
    pub fn memory_blocks(&self) -> DbResult<Vec<MemoryBlock>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT name, start, end_exclusive
            FROM memory_blocks
            ORDER BY start
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MemoryBlock {
                name: row.get(0)?,
                start: row.get::<_, i64>(1)? as u64,
                end: row.get::<_, i64>(2)? as u64,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Read every option stored under `category`.
    pub fn options(&self, category: &str) -> DbResult<ProgramOptions> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT name, value FROM options
            WHERE category = ?1
            "#,
        )?;
        let rows = stmt.query_map(params![category], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut options = ProgramOptions { category: category.to_string(), ..Default::default() };
        for row in rows {
            let (name, value) = row?;
            options.values.insert(name, value);
        }
        Ok(options)
    }

    pub fn set_option(&self, category: &str, name: &str, value: &str) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO options (category, name, value)
            VALUES (?1, ?2, ?3)
            "#,
            params![category, name, value],
        )?;
        Ok(())
    }

    /// Start a store transaction. Dropping it without [`StoreTransaction::commit`] rolls back.
    pub fn begin(&mut self) -> DbResult<StoreTransaction<'_>> {
        Ok(StoreTransaction { tx: self.conn.transaction()? })
    }

    /// List all data types (ordered by name).
    pub fn list_data_types(&self) -> DbResult<Vec<TypeRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT name, kind, size, members
            FROM data_types
            ORDER BY name
            "#,
        )?;
        let rows = stmt.query_map([], map_type_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(decode_type_row(row?)?);
        }
        Ok(out)
    }

    /// List all symbols (ordered by address, then name).
    pub fn list_symbols(&self) -> DbResult<Vec<SymbolRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT address, name, kind, scope, size, demangled
            FROM symbols
            ORDER BY address, name
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SymbolRow {
                address: row.get::<_, i64>(0)? as u64,
                name: row.get(1)?,
                kind: row.get(2)?,
                scope: row.get(3)?,
                size: row.get::<_, Option<i64>>(4)?.map(|v| v as u64),
                demangled: row.get(5)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn list_comments(&self) -> DbResult<Vec<CommentRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT address, text FROM comments
            ORDER BY address, text
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CommentRow { address: row.get::<_, i64>(0)? as u64, text: row.get(1)? })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn list_line_numbers(&self) -> DbResult<Vec<LineRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT address, file, line FROM line_numbers
            ORDER BY address, file, line
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LineRow {
                address: row.get::<_, i64>(0)? as u64,
                file: row.get(1)?,
                line: row.get::<_, i64>(2)? as u32,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Capture the whole type/symbol store.
    pub fn snapshot(&self) -> DbResult<StoreSnapshot> {
        Ok(StoreSnapshot {
            types: self.list_data_types()?,
            symbols: self.list_symbols()?,
            comments: self.list_comments()?,
            lines: self.list_line_numbers()?,
        })
    }

    /// Insert a PDB load run record and return its row id.
    pub fn insert_load_run(&self, record: &PdbLoadRunRecord) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO pdb_load_runs (debug_file, debug_file_hash, backend, backend_version, status, message_count, started_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.debug_file,
                record.debug_file_hash,
                record.backend,
                record.backend_version,
                record.status.as_str(),
                record.message_count as i64,
                record.started_at,
                record.finished_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// List PDB load runs in insertion order.
    pub fn list_load_runs(&self) -> DbResult<Vec<PdbLoadRunRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT debug_file, debug_file_hash, backend, backend_version, status, message_count, started_at, finished_at
            FROM pdb_load_runs
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(4)?;
            Ok(PdbLoadRunRecord {
                debug_file: row.get(0)?,
                debug_file_hash: row.get(1)?,
                backend: row.get(2)?,
                backend_version: row.get(3)?,
                status: status.parse::<PdbLoadStatus>().map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        4,
                        "status".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?,
                message_count: row.get::<_, i64>(5)? as u32,
                started_at: row.get(6)?,
                finished_at: row.get(7)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// Outcome of offering a data type to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeInsert {
    Added,
    /// An identical (or more complete) definition is already present.
    Existing,
    /// A forward-declaration placeholder was completed.
    Replaced,
    Conflict { existing: TypeRecord },
}

/// Write transaction over the type/symbol store.
///
/// All inserts are idempotent: offering the same record twice leaves one row.
pub struct StoreTransaction<'a> {
    tx: Transaction<'a>,
}

impl StoreTransaction<'_> {
    pub fn upsert_type(&self, record: &TypeRecord) -> DbResult<TypeInsert> {
        let existing = self
            .tx
            .query_row(
                "SELECT name, kind, size, members FROM data_types WHERE name = ?1",
                params![record.name],
                map_type_row,
            )
            .optional()?;

        let Some(existing) = existing else {
            self.tx.execute(
                r#"
                INSERT INTO data_types (name, kind, size, members)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    record.name,
                    record.kind.as_str(),
                    record.size as i64,
                    encode_members(record)?
                ],
            )?;
            return Ok(TypeInsert::Added);
        };
        let existing = decode_type_row(existing)?;

        if existing == *record {
            return Ok(TypeInsert::Existing);
        }
        if existing.kind != record.kind {
            return Ok(TypeInsert::Conflict { existing });
        }
        // A layout-only record (members not parsed) never overrides a fuller one.
        if record.is_placeholder() || (record.size == existing.size && record.members.is_empty()) {
            return Ok(TypeInsert::Existing);
        }
        if existing.is_placeholder() || (existing.size == record.size && existing.members.is_empty()) {
            self.tx.execute(
                "UPDATE data_types SET size = ?1, members = ?2 WHERE name = ?3",
                params![record.size as i64, encode_members(record)?, record.name],
            )?;
            return Ok(TypeInsert::Replaced);
        }
        Ok(TypeInsert::Conflict { existing })
    }

    /// Place a symbol at an absolute address. Returns `false` when it was already present.
    pub fn add_symbol(&self, address: u64, record: &SymbolRecord) -> DbResult<bool> {
        let scope = match record.scope {
            crate::model::SymbolScope::Public => "public",
            crate::model::SymbolScope::Global => "global",
        };
        let changed = self.tx.execute(
            r#"
            INSERT OR IGNORE INTO symbols (address, name, kind, scope, size)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                address as i64,
                record.name,
                record.kind.as_str(),
                scope,
                record.size.map(|s| s as i64)
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn add_line(&self, address: u64, file: &str, line: u32) -> DbResult<bool> {
        let changed = self.tx.execute(
            r#"
            INSERT OR IGNORE INTO line_numbers (address, file, line)
            VALUES (?1, ?2, ?3)
            "#,
            params![address as i64, file, line as i64],
        )?;
        Ok(changed > 0)
    }

    pub fn add_comment(&self, address: u64, text: &str) -> DbResult<bool> {
        let changed = self.tx.execute(
            r#"
            INSERT OR IGNORE INTO comments (address, text)
            VALUES (?1, ?2)
            "#,
            params![address as i64, text],
        )?;
        Ok(changed > 0)
    }

    /// Symbols without a demangled form whose address lies in `[start, end)`.
    pub fn symbols_pending_demangle(&self, start: u64, end: u64) -> DbResult<Vec<(i64, String)>> {
        let mut stmt = self.tx.prepare(
            r#"
            SELECT id, name FROM symbols
            WHERE demangled IS NULL AND address >= ?1 AND address < ?2
            ORDER BY address, name
            "#,
        )?;
        let rows = stmt.query_map(params![start as i64, end as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn set_demangled(&self, symbol_id: i64, demangled: &str) -> DbResult<()> {
        self.tx.execute(
            "UPDATE symbols SET demangled = ?1 WHERE id = ?2",
            params![demangled, symbol_id],
        )?;
        Ok(())
    }

    pub fn commit(self) -> DbResult<()> {
        self.tx.commit()?;
        Ok(())
    }
}

type RawTypeRow = (String, String, i64, String);

fn map_type_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawTypeRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_type_row((name, kind, size, members): RawTypeRow) -> DbResult<TypeRecord> {
    let members: Vec<MemberRecord> = serde_json::from_str(&members)
        .map_err(|source| DbError::MemberLayout { name: name.clone(), source })?;
    Ok(TypeRecord {
        kind: TypeKind::parse(&kind).unwrap_or(TypeKind::Struct),
        name,
        size: size as u64,
        members,
    })
}

fn encode_members(record: &TypeRecord) -> DbResult<String> {
    serde_json::to_string(&record.members)
        .map_err(|source| DbError::MemberLayout { name: record.name.clone(), source })
}

/// Apply schema migrations to bring the database to the latest version.
///
/// We use `PRAGMA user_version` as the schema version indicator.
///
/// Version map:
/// - 0: no schema
/// - 1: program_info and memory_blocks
/// - 2: options
/// - 3: type/symbol store (data_types, symbols, comments, line_numbers)
/// - 4: pdb_load_runs history
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    // Reject DBs created with a newer schema than we support.
    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS program_info (
                id            INTEGER PRIMARY KEY CHECK (id = 1),
                name          TEXT NOT NULL,
                image_base    INTEGER NOT NULL,
                pdb_guid      TEXT,
                pdb_signature INTEGER,
                pdb_age       INTEGER,
                pdb_file      TEXT
            );

            CREATE TABLE IF NOT EXISTS memory_blocks (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                name          TEXT NOT NULL,
                start         INTEGER NOT NULL,
                end_exclusive INTEGER NOT NULL
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS options (
                category TEXT NOT NULL,
                name     TEXT NOT NULL,
                value    TEXT NOT NULL,
                PRIMARY KEY(category, name)
            );

            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
        current_version = 2;
    }

    if current_version < 3 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS data_types (
                name    TEXT PRIMARY KEY,
                kind    TEXT NOT NULL,
                size    INTEGER NOT NULL,
                members TEXT NOT NULL DEFAULT '[]'
            );
            CREATE TABLE IF NOT EXISTS symbols (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                address   INTEGER NOT NULL,
                name      TEXT NOT NULL,
                kind      TEXT NOT NULL,
                scope     TEXT NOT NULL DEFAULT 'public',
                size      INTEGER,
                demangled TEXT,
                UNIQUE(address, name)
            );
            CREATE TABLE IF NOT EXISTS comments (
                address INTEGER NOT NULL,
                text    TEXT NOT NULL,
                PRIMARY KEY(address, text)
            );
            CREATE TABLE IF NOT EXISTS line_numbers (
                address INTEGER NOT NULL,
                file    TEXT NOT NULL,
                line    INTEGER NOT NULL,
                PRIMARY KEY(address, file, line)
            );
            PRAGMA user_version = 3;
            COMMIT;
            "#,
        )?;
        current_version = 3;
    }

    if current_version < 4 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS pdb_load_runs (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                debug_file      TEXT NOT NULL,
                debug_file_hash TEXT,
                backend         TEXT NOT NULL,
                backend_version TEXT,
                status          TEXT NOT NULL,
                message_count   INTEGER NOT NULL DEFAULT 0,
                started_at      TEXT NOT NULL,
                finished_at     TEXT NOT NULL
            );
            PRAGMA user_version = 4;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
