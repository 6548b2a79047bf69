use std::fs::File;
use std::io;
use std::path::Path;

use pdb::{FallibleIterator, TypeData, TypeFinder, TypeIndex, PDB};

use crate::cancel::{CancelToken, Checkpoint};
use crate::identity::PdbIdentity;
use crate::model::{
    MemberRecord, ParsedDebugInfo, SymbolKind, SymbolRecord, SymbolScope, TypeKind, TypeRecord,
};
use crate::services::backends::{BackendError, DebugInfoBackend, ReaderOptions};

// Pointer chains deeper than this are rendered as an opaque type index.
const MAX_TYPE_NAME_DEPTH: usize = 8;

/// Self-contained backend reading MSF/PDB files in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdbReaderBackend;

impl PdbReaderBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DebugInfoBackend for PdbReaderBackend {
    fn name(&self) -> &'static str {
        "universal-reader"
    }

    fn version(&self) -> Option<String> {
        Some(format!("symbridge-core {}", env!("CARGO_PKG_VERSION")))
    }

    fn read_identity(&self, debug_file: &Path) -> Result<PdbIdentity, BackendError> {
        let mut pdb = open(debug_file)?;
        let info = pdb.pdb_information().map_err(|e| map_pdb_error(debug_file, e))?;
        let dbi = pdb.debug_information().map_err(|e| map_pdb_error(debug_file, e))?;
        // The DBI age is what the executable's CodeView record was stamped with.
        let age = dbi.age().unwrap_or(info.age);
        Ok(PdbIdentity::from_guid(&info.guid.to_string(), age)
            .with_file(debug_file.display().to_string()))
    }

    fn parse(
        &self,
        debug_file: &Path,
        options: &ReaderOptions,
        cancel: &CancelToken,
    ) -> Result<ParsedDebugInfo, BackendError> {
        let mut pdb = open(debug_file)?;
        let mut checkpoint = Checkpoint::new(cancel, options.check_interval);
        let mut parsed = ParsedDebugInfo::default();

        read_symbols(&mut pdb, debug_file, &mut checkpoint, &mut parsed)?;
        read_types(&mut pdb, debug_file, options, &mut checkpoint, &mut parsed)?;

        tracing::debug!(
            types = parsed.types.len(),
            symbols = parsed.symbols.len(),
            file = %debug_file.display(),
            "pdb read complete"
        );
        Ok(parsed)
    }
}

fn open(debug_file: &Path) -> Result<PDB<'static, File>, BackendError> {
    if !debug_file.is_file() {
        return Err(BackendError::MissingDebugFile(debug_file.to_path_buf()));
    }
    let file = File::open(debug_file).map_err(|e| BackendError::io(debug_file, e))?;
    PDB::open(file).map_err(|e| map_pdb_error(debug_file, e))
}

fn map_pdb_error(debug_file: &Path, err: pdb::Error) -> BackendError {
    match err {
        // A short read means the file is truncated, not that the disk failed.
        pdb::Error::IoError(source) if source.kind() != io::ErrorKind::UnexpectedEof => {
            BackendError::io(debug_file, source)
        }
        other => BackendError::MalformedDebugFile(format!("{}: {other}", debug_file.display())),
    }
}

fn read_symbols(
    pdb: &mut PDB<'static, File>,
    debug_file: &Path,
    checkpoint: &mut Checkpoint<'_>,
    parsed: &mut ParsedDebugInfo,
) -> Result<(), BackendError> {
    let err = |e| map_pdb_error(debug_file, e);
    let address_map = pdb.address_map().map_err(err)?;

    let globals = pdb.global_symbols().map_err(err)?;
    let mut symbols = globals.iter();
    while let Some(symbol) = symbols.next().map_err(err)? {
        if checkpoint.tick() {
            return Err(BackendError::Cancelled);
        }
        if let Some(record) = symbol_record(&symbol, &address_map) {
            parsed.symbols.push(record);
        }
    }

    // Procedures live in the per-module streams; the global stream only references them.
    let dbi = pdb.debug_information().map_err(err)?;
    let mut modules = dbi.modules().map_err(err)?;
    while let Some(module) = modules.next().map_err(err)? {
        let Some(info) = pdb.module_info(&module).map_err(err)? else {
            continue;
        };
        let mut module_symbols = info.symbols().map_err(err)?;
        while let Some(symbol) = module_symbols.next().map_err(err)? {
            if checkpoint.tick() {
                return Err(BackendError::Cancelled);
            }
            if let Some(record) = symbol_record(&symbol, &address_map) {
                parsed.symbols.push(record);
            }
        }
    }
    Ok(())
}

fn symbol_record(symbol: &pdb::Symbol<'_>, address_map: &pdb::AddressMap<'_>) -> Option<SymbolRecord> {
    let (name, offset, size, kind, scope) = match symbol.parse().ok()? {
        pdb::SymbolData::Public(data) => {
            let kind = if data.function {
                SymbolKind::Function
            } else if data.code {
                SymbolKind::Label
            } else {
                SymbolKind::Data
            };
            (data.name, data.offset, None, kind, SymbolScope::Public)
        }
        pdb::SymbolData::Data(data) => {
            (data.name, data.offset, None, SymbolKind::Data, SymbolScope::Global)
        }
        pdb::SymbolData::Procedure(procedure) => (
            procedure.name,
            procedure.offset,
            Some(u64::from(procedure.len)),
            SymbolKind::Function,
            SymbolScope::Global,
        ),
        _ => return None,
    };
    let rva = offset.to_rva(address_map)?;
    Some(SymbolRecord {
        name: name.to_string().into_owned(),
        rva: u64::from(rva.0),
        size,
        kind,
        scope,
    })
}

fn read_types(
    pdb: &mut PDB<'static, File>,
    debug_file: &Path,
    options: &ReaderOptions,
    checkpoint: &mut Checkpoint<'_>,
    parsed: &mut ParsedDebugInfo,
) -> Result<(), BackendError> {
    let err = |e| map_pdb_error(debug_file, e);
    let type_information = pdb.type_information().map_err(err)?;
    let mut finder = type_information.finder();
    let mut types = type_information.iter();

    while let Some(typ) = types.next().map_err(err)? {
        finder.update(&types);
        if checkpoint.tick() {
            return Err(BackendError::Cancelled);
        }
        let Ok(data) = typ.parse() else { continue };
        let (name, kind, size, fields, forward) = match data {
            TypeData::Class(class) => {
                let kind = match class.kind {
                    pdb::ClassKind::Struct => TypeKind::Struct,
                    _ => TypeKind::Class,
                };
                (
                    class.name,
                    kind,
                    u64::from(class.size),
                    class.fields,
                    class.properties.forward_reference(),
                )
            }
            TypeData::Union(union) => (
                union.name,
                TypeKind::Union,
                u64::from(union.size),
                Some(union.fields),
                union.properties.forward_reference(),
            ),
            TypeData::Enumeration(enumeration) => (
                enumeration.name,
                TypeKind::Enum,
                0,
                Some(enumeration.fields),
                enumeration.properties.forward_reference(),
            ),
            _ => continue,
        };

        let name = name.to_string().into_owned();
        if name.starts_with("<unnamed-") || name.starts_with("<anonymous-") {
            continue;
        }
        let members = match fields {
            Some(fields) if options.parse_members && !forward => collect_members(&finder, fields),
            _ => Vec::new(),
        };
        let size = if forward { 0 } else { size };
        parsed.types.push(TypeRecord { name, kind, size, members });
    }
    Ok(())
}

fn collect_members(finder: &TypeFinder<'_>, fields: TypeIndex) -> Vec<MemberRecord> {
    let mut members = Vec::new();
    let mut next = Some(fields);
    while let Some(index) = next.take() {
        let Ok(TypeData::FieldList(list)) = finder.find(index).and_then(|t| t.parse()) else {
            break;
        };
        for field in list.fields {
            match field {
                TypeData::Member(member) => members.push(MemberRecord {
                    name: member.name.to_string().into_owned(),
                    offset: u64::from(member.offset),
                    type_name: type_name(finder, member.field_type, 0),
                }),
                TypeData::Enumerate(value) => members.push(MemberRecord {
                    name: value.name.to_string().into_owned(),
                    offset: variant_value(&value.value),
                    type_name: String::new(),
                }),
                _ => {}
            }
        }
        next = list.continuation;
    }
    members
}

fn type_name(finder: &TypeFinder<'_>, index: TypeIndex, depth: usize) -> String {
    if depth > MAX_TYPE_NAME_DEPTH {
        return format!("type#{:#x}", index.0);
    }
    match finder.find(index).and_then(|t| t.parse()) {
        Ok(TypeData::Primitive(primitive)) => {
            let base = format!("{:?}", primitive.kind).to_ascii_lowercase();
            if primitive.indirection.is_some() {
                format!("{base}*")
            } else {
                base
            }
        }
        Ok(TypeData::Class(class)) => class.name.to_string().into_owned(),
        Ok(TypeData::Union(union)) => union.name.to_string().into_owned(),
        Ok(TypeData::Enumeration(enumeration)) => enumeration.name.to_string().into_owned(),
        Ok(TypeData::Pointer(pointer)) => {
            format!("{}*", type_name(finder, pointer.underlying_type, depth + 1))
        }
        Ok(TypeData::Modifier(modifier)) => type_name(finder, modifier.underlying_type, depth + 1),
        Ok(TypeData::Array(array)) => {
            format!("{}[]", type_name(finder, array.element_type, depth + 1))
        }
        _ => format!("type#{:#x}", index.0),
    }
}

fn variant_value(value: &pdb::Variant) -> u64 {
    match *value {
        pdb::Variant::U8(v) => u64::from(v),
        pdb::Variant::U16(v) => u64::from(v),
        pdb::Variant::U32(v) => u64::from(v),
        pdb::Variant::U64(v) => v,
        pdb::Variant::I8(v) => v as u64,
        pdb::Variant::I16(v) => v as u64,
        pdb::Variant::I32(v) => v as u64,
        pdb::Variant::I64(v) => v as u64,
    }
}
