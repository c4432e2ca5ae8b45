//! Semantic type mapping
//!
//! Converts each semantic field type into the idiomatic declaration for a
//! given output kind. The table is keyed by `(semantic tag, output kind)`
//! and is pluggable: deployments can insert or override entries before
//! building the engine. An unmapped combination is a hard error, never a
//! silently wrong type.

use std::collections::HashMap;

use crate::error::TemplateError;
use crate::model::FieldType;

/// Mapping function from a concrete field type to a target declaration
pub type MapFn = fn(&FieldType) -> String;

/// Pluggable mapping table keyed by `(semantic type tag, output kind)`
#[derive(Debug, Clone)]
pub struct TypeMap {
    table: HashMap<(String, String), MapFn>,
}

/// Output kinds whose declarations are Python
const PYTHON_KINDS: &[&str] = &["backend-model", "api-schema", "backend-test"];

/// Output kinds whose declarations are TypeScript
const TYPESCRIPT_KINDS: &[&str] = &["frontend-component"];

const SEMANTIC_TAGS: &[&str] = &[
    "string",
    "integer",
    "decimal",
    "boolean",
    "datetime",
    "enum",
    "foreign-key",
];

impl TypeMap {
    /// Empty table; every lookup fails until entries are inserted
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Default table covering the built-in output kinds
    pub fn with_defaults() -> Self {
        let mut map = Self::empty();
        for kind in PYTHON_KINDS {
            for tag in SEMANTIC_TAGS {
                map.insert(tag, kind, python_declaration);
            }
        }
        for kind in TYPESCRIPT_KINDS {
            for tag in SEMANTIC_TAGS {
                map.insert(tag, kind, typescript_declaration);
            }
        }
        map
    }

    /// Insert or override one `(semantic tag, output kind)` entry
    pub fn insert(&mut self, semantic: &str, kind: &str, f: MapFn) {
        self.table
            .insert((semantic.to_string(), kind.to_string()), f);
    }

    /// Declaration for `field_type` in `kind`, or `UnsupportedType`
    pub fn declaration(&self, field_type: &FieldType, kind: &str) -> Result<String, TemplateError> {
        self.table
            .get(&(field_type.tag().to_string(), kind.to_string()))
            .map(|f| f(field_type))
            .ok_or_else(|| TemplateError::UnsupportedType {
                semantic: field_type.to_string(),
                kind: kind.to_string(),
            })
    }

    /// Whether any entry exists for this output kind
    pub fn supports_kind(&self, kind: &str) -> bool {
        self.table.keys().any(|(_, k)| k == kind)
    }
}

impl Default for TypeMap {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn python_declaration(field_type: &FieldType) -> String {
    match field_type {
        FieldType::String { .. } => "str".to_string(),
        FieldType::Integer => "int".to_string(),
        FieldType::Decimal { .. } => "Decimal".to_string(),
        FieldType::Boolean => "bool".to_string(),
        FieldType::DateTime => "datetime".to_string(),
        FieldType::Enum { values } => {
            let literals: Vec<String> = values.iter().map(|v| format!("\"{}\"", v)).collect();
            format!("Literal[{}]", literals.join(", "))
        }
        FieldType::ForeignKey { .. } => "int".to_string(),
    }
}

fn typescript_declaration(field_type: &FieldType) -> String {
    match field_type {
        FieldType::String { .. } => "string".to_string(),
        FieldType::Integer => "number".to_string(),
        // fixed-point decimals travel as strings to avoid float loss
        FieldType::Decimal { .. } => "string".to_string(),
        FieldType::Boolean => "boolean".to_string(),
        FieldType::DateTime => "string".to_string(),
        FieldType::Enum { values } => values
            .iter()
            .map(|v| format!("\"{}\"", v))
            .collect::<Vec<_>>()
            .join(" | "),
        FieldType::ForeignKey { .. } => "number".to_string(),
    }
}
