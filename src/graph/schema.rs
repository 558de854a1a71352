//! Graph vocabulary: node labels, relationship types, and the property
//! columns each of them declares for bulk loading.
//!
//! Stores only accept bulk loads for targets whose columns were declared up
//! front (see [`crate::store::GraphStore::has_schema`]); the tables here are
//! what the CLI declares before a run. Row-wise upserts do not depend on them.

use super::PropertyValue;
use serde::{Deserialize, Serialize};

/// Label for the repository root node.
pub const LABEL_PROJECT: &str = "Project";
/// Label for directory nodes.
pub const LABEL_FOLDER: &str = "Folder";
/// Label for source file nodes.
pub const LABEL_FILE: &str = "File";
/// Label for free functions.
pub const LABEL_FUNCTION: &str = "Function";
/// Label for functions defined inside a class body.
pub const LABEL_METHOD: &str = "Method";
/// Label for classes, structs, and enums.
pub const LABEL_CLASS: &str = "Class";
/// Label for interfaces and traits.
pub const LABEL_INTERFACE: &str = "Interface";
/// Label for import targets outside the ingested file set.
pub const LABEL_EXTERNAL: &str = "External";

/// Project/Folder contains Folder/File.
pub const REL_CONTAINS: &str = "CONTAINS";
/// File defines a symbol.
pub const REL_DEFINES: &str = "DEFINES";
/// Class owns a method.
pub const REL_HAS_METHOD: &str = "HAS_METHOD";
/// Definition calls another definition.
pub const REL_CALLS: &str = "CALLS";
/// File imports a file or an external module.
pub const REL_IMPORTS: &str = "IMPORTS";

/// Storage type of a declared property column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// UTF-8 text.
    Text,
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// `true` / `false`.
    Bool,
}

impl ColumnType {
    /// Lowercase name used in store declarations.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Bool => "bool",
        }
    }

    /// Parse a name produced by [`ColumnType::as_str`].
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "text" => Some(ColumnType::Text),
            "int" => Some(ColumnType::Int),
            "float" => Some(ColumnType::Float),
            "bool" => Some(ColumnType::Bool),
            _ => None,
        }
    }

    /// Convert one artifact field to a typed value.
    ///
    /// An empty field is null for every type.
    pub fn coerce(&self, field: &str) -> Result<PropertyValue, String> {
        if field.is_empty() {
            return Ok(PropertyValue::Null);
        }
        match self {
            ColumnType::Text => Ok(PropertyValue::Text(field.to_string())),
            ColumnType::Int => field
                .parse::<i64>()
                .map(PropertyValue::Int)
                .map_err(|_| format!("'{}' is not an int", field)),
            ColumnType::Float => field
                .parse::<f64>()
                .map(PropertyValue::Float)
                .map_err(|_| format!("'{}' is not a float", field)),
            ColumnType::Bool => match field {
                "true" => Ok(PropertyValue::Bool(true)),
                "false" => Ok(PropertyValue::Bool(false)),
                _ => Err(format!("'{}' is not a bool", field)),
            },
        }
    }
}

/// A declared property column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Property key.
    pub name: &'static str,
    /// Storage type.
    pub ty: ColumnType,
}

const fn text(name: &'static str) -> Column {
    Column {
        name,
        ty: ColumnType::Text,
    }
}

const fn int(name: &'static str) -> Column {
    Column {
        name,
        ty: ColumnType::Int,
    }
}

const fn boolean(name: &'static str) -> Column {
    Column {
        name,
        ty: ColumnType::Bool,
    }
}

const SYMBOL_COLUMNS: &[Column] = &[
    text("name"),
    text("file_path"),
    int("start_line"),
    int("end_line"),
    text("language"),
    text("parent"),
];

/// Declared property columns per node label.
pub const NODE_SCHEMAS: &[(&str, &[Column])] = &[
    (LABEL_PROJECT, &[text("name"), text("root")]),
    (LABEL_FOLDER, &[text("name"), text("path")]),
    (
        LABEL_FILE,
        &[
            text("name"),
            text("path"),
            text("language"),
            text("content_hash"),
            int("line_count"),
            int("size"),
        ],
    ),
    (LABEL_FUNCTION, SYMBOL_COLUMNS),
    (LABEL_METHOD, SYMBOL_COLUMNS),
    (LABEL_CLASS, SYMBOL_COLUMNS),
    (LABEL_INTERFACE, SYMBOL_COLUMNS),
    (LABEL_EXTERNAL, &[text("name"), boolean("external"), text("scope")]),
];

/// Declared property columns per relationship type.
pub const RELATIONSHIP_SCHEMAS: &[(&str, &[Column])] = &[
    (REL_CONTAINS, &[]),
    (REL_DEFINES, &[]),
    (REL_HAS_METHOD, &[]),
    (REL_CALLS, &[int("line"), text("callee_name")]),
    (
        REL_IMPORTS,
        &[
            text("local_name"),
            text("exported_name"),
            text("import_type"),
            text("specifier"),
            boolean("resolved"),
        ],
    ),
];

/// Declared columns for a node label, if the label is known.
pub fn node_columns(label: &str) -> Option<&'static [Column]> {
    NODE_SCHEMAS
        .iter()
        .find(|(l, _)| *l == label)
        .map(|(_, columns)| *columns)
}

/// Declared columns for a relationship type, if the type is known.
pub fn relationship_columns(rel_type: &str) -> Option<&'static [Column]> {
    RELATIONSHIP_SCHEMAS
        .iter()
        .find(|(t, _)| *t == rel_type)
        .map(|(_, columns)| *columns)
}
