//! Backend-neutral model of parsed debug information.
//!
//! Both parser backends produce a [`ParsedDebugInfo`]; the applicator consumes it without
//! knowing which backend (or which on-disk format) it came from.

use serde::{Deserialize, Serialize};

/// Record categories the applicator can be restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    DataType,
    PublicSymbol,
    GlobalSymbol,
    LineNumber,
    Comment,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::DataType,
        RecordKind::PublicSymbol,
        RecordKind::GlobalSymbol,
        RecordKind::LineNumber,
        RecordKind::Comment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::DataType => "data_type",
            RecordKind::PublicSymbol => "public_symbol",
            RecordKind::GlobalSymbol => "global_symbol",
            RecordKind::LineNumber => "line_number",
            RecordKind::Comment => "comment",
        }
    }
}

/// Kind of a composite or alias data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Struct,
    Class,
    Union,
    Enum,
    Typedef,
}

impl TypeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeKind::Struct => "struct",
            TypeKind::Class => "class",
            TypeKind::Union => "union",
            TypeKind::Enum => "enum",
            TypeKind::Typedef => "typedef",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "struct" => Some(TypeKind::Struct),
            "class" => Some(TypeKind::Class),
            "union" => Some(TypeKind::Union),
            "enum" => Some(TypeKind::Enum),
            "typedef" => Some(TypeKind::Typedef),
            _ => None,
        }
    }
}

/// A member (field or enumerator) of a data type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub name: String,
    pub offset: u64,
    #[serde(default)]
    pub type_name: String,
}

/// A data type definition keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRecord {
    pub name: String,
    pub kind: TypeKind,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub members: Vec<MemberRecord>,
}

impl TypeRecord {
    /// Forward declarations carry a name but no layout.
    pub fn is_placeholder(&self) -> bool {
        self.size == 0 && self.members.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Data,
    Label,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Data => "data",
            SymbolKind::Label => "label",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "function" => SymbolKind::Function,
            "data" => SymbolKind::Data,
            _ => SymbolKind::Label,
        }
    }
}

/// Whether a symbol came from the public symbol table or the global symbol stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolScope {
    #[default]
    Public,
    Global,
}

impl SymbolScope {
    pub fn record_kind(self) -> RecordKind {
        match self {
            SymbolScope::Public => RecordKind::PublicSymbol,
            SymbolScope::Global => RecordKind::GlobalSymbol,
        }
    }
}

/// A symbol located relative to the image base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub name: String,
    pub rva: u64,
    #[serde(default)]
    pub size: Option<u64>,
    pub kind: SymbolKind,
    #[serde(default)]
    pub scope: SymbolScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRecord {
    pub rva: u64,
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub rva: u64,
    pub text: String,
}

/// Everything a backend extracted from one debug file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDebugInfo {
    #[serde(default)]
    pub types: Vec<TypeRecord>,
    #[serde(default)]
    pub symbols: Vec<SymbolRecord>,
    #[serde(default)]
    pub lines: Vec<LineRecord>,
    #[serde(default)]
    pub comments: Vec<CommentRecord>,
}

impl ParsedDebugInfo {
    pub fn record_count(&self) -> usize {
        self.types.len() + self.symbols.len() + self.lines.len() + self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_types_have_no_layout() {
        let fwd = TypeRecord { name: "Foo".into(), kind: TypeKind::Struct, size: 0, members: vec![] };
        assert!(fwd.is_placeholder());
        let full = TypeRecord { size: 4, ..fwd.clone() };
        assert!(!full.is_placeholder());
    }

    #[test]
    fn symbol_scope_maps_to_record_kind() {
        assert_eq!(SymbolScope::Public.record_kind(), RecordKind::PublicSymbol);
        assert_eq!(SymbolScope::Global.record_kind(), RecordKind::GlobalSymbol);
    }
}
