//! Core data model for appforge
//!
//! Defines the normalized, strongly-typed Domain Model produced by the
//! parser and consumed by the validator and template engine:
//! - `DomainConfig`: root value object, immutable once validated
//! - `EntityConfig` / `FieldConfig`: entities and their typed fields
//! - `FieldType`: closed set of semantic field types
//! - Declarative specs (`WorkflowSpec`, `EndpointSpec`, ...) passed to
//!   templates as opaque context

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Event names a workflow trigger may reference
pub const KNOWN_EVENTS: &[&str] = &["create", "update", "delete", "status_change", "schedule"];

/// Semantic field type, parsed from its textual form at configuration
/// parse time. Anything outside this closed set is rejected up front so
/// opaque type strings never reach templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// `string(max_length)`; bare `string` defaults to 255
    String { max_length: u32 },
    /// `integer`
    Integer,
    /// `decimal(precision,scale)`
    Decimal { precision: u8, scale: u8 },
    /// `boolean`
    Boolean,
    /// `datetime`
    DateTime,
    /// `enum(a,b,c)`
    Enum { values: Vec<String> },
    /// `foreign-key(Entity)`
    ForeignKey { entity: String },
}

impl FieldType {
    /// Target entity name if this is a foreign key
    pub fn foreign_key_target(&self) -> Option<&str> {
        match self {
            FieldType::ForeignKey { entity } => Some(entity),
            _ => None,
        }
    }

    /// Whether values of this type have well-defined equality semantics
    ///
    /// `unique` constraints require equality; fixed-point decimals do not
    /// carry it portably across target languages.
    pub fn has_equality(&self) -> bool {
        !matches!(self, FieldType::Decimal { .. })
    }

    /// Short tag used as the type-mapping table key (no parameters)
    pub fn tag(&self) -> &'static str {
        match self {
            FieldType::String { .. } => "string",
            FieldType::Integer => "integer",
            FieldType::Decimal { .. } => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::DateTime => "datetime",
            FieldType::Enum { .. } => "enum",
            FieldType::ForeignKey { .. } => "foreign-key",
        }
    }

    /// Whether `value` is coercible to this type (for `default` checks)
    pub fn accepts_default(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match self {
            FieldType::String { .. } => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Decimal { .. } => value.is_number() || value.is_string(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::DateTime => value.is_string(),
            FieldType::Enum { values } => match value {
                Value::String(s) => values.iter().any(|v| v == s),
                _ => false,
            },
            // FK defaults are opaque ids; strings and integers both occur
            FieldType::ForeignKey { .. } => value.is_string() || value.is_i64() || value.is_u64(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String { max_length } => write!(f, "string({})", max_length),
            FieldType::Integer => write!(f, "integer"),
            FieldType::Decimal { precision, scale } => {
                write!(f, "decimal({},{})", precision, scale)
            }
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::DateTime => write!(f, "datetime"),
            FieldType::Enum { values } => write!(f, "enum({})", values.join(",")),
            FieldType::ForeignKey { entity } => write!(f, "foreign-key({})", entity),
        }
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (head, args) = match s.find('(') {
            Some(open) => {
                let close = s
                    .rfind(')')
                    .filter(|&c| c == s.len() - 1)
                    .ok_or_else(|| format!("unbalanced parentheses in '{}'", s))?;
                (s[..open].trim(), Some(s[open + 1..close].trim()))
            }
            None => (s, None),
        };

        match (head, args) {
            ("string", None) => Ok(FieldType::String { max_length: 255 }),
            ("string", Some(len)) => {
                let max_length: u32 = len
                    .parse()
                    .map_err(|_| format!("invalid string length '{}'", len))?;
                Ok(FieldType::String { max_length })
            }
            ("integer", None) => Ok(FieldType::Integer),
            ("decimal", Some(args)) => {
                let mut parts = args.split(',').map(str::trim);
                let precision = parts
                    .next()
                    .and_then(|p| p.parse().ok())
                    .ok_or_else(|| format!("invalid decimal precision in '{}'", s))?;
                let scale = parts
                    .next()
                    .and_then(|p| p.parse().ok())
                    .ok_or_else(|| format!("invalid decimal scale in '{}'", s))?;
                if parts.next().is_some() {
                    return Err(format!("decimal takes two parameters, got '{}'", args));
                }
                Ok(FieldType::Decimal { precision, scale })
            }
            ("boolean", None) => Ok(FieldType::Boolean),
            ("datetime", None) => Ok(FieldType::DateTime),
            ("enum", Some(args)) => {
                let values: Vec<String> = args
                    .split(',')
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect();
                Ok(FieldType::Enum { values })
            }
            ("foreign-key", Some(entity)) if !entity.is_empty() => Ok(FieldType::ForeignKey {
                entity: entity.to_string(),
            }),
            _ => Err(format!("unknown field type '{}'", s)),
        }
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FieldType::from_str(&s).map_err(D::Error::custom)
    }
}

/// A single entity field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub unique: bool,

    #[serde(default)]
    pub indexed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl FieldConfig {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            unique: false,
            indexed: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// An entity definition with its ordered fields
///
/// `extends`/`replace` markers are resolved away by the parser; this type
/// is always fully merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,

    /// Physical storage name (table/collection); defaults to the
    /// snake_cased entity name
    pub storage_name: String,

    pub fields: Vec<FieldConfig>,
}

impl EntityConfig {
    pub fn field(&self, name: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields carrying a foreign key, with their target entity names
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&FieldConfig, &str)> {
        self.fields
            .iter()
            .filter_map(|f| f.field_type.foreign_key_target().map(|t| (f, t)))
    }
}

/// Relationship cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToMany,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cardinality::OneToOne => "one-to-one",
            Cardinality::OneToMany => "one-to-many",
            Cardinality::ManyToMany => "many-to-many",
        };
        f.write_str(s)
    }
}

/// A relationship between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipConfig {
    pub source_entity: String,
    pub target_entity: String,
    pub cardinality: Cardinality,

    /// Navigation property name on the source side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_navigation: Option<String>,

    /// Navigation property name on the target side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_navigation: Option<String>,
}

/// One step of a declarative workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    pub entity: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    pub action: String,
}

/// A declarative workflow; runtime semantics are template concerns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,

    /// Event name from `KNOWN_EVENTS`
    pub trigger: String,

    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

/// A declared API endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub path: String,
    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    /// Role names that may call this endpoint; must be declared in
    /// `DomainConfig::roles`
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// A declared UI component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub component_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    #[serde(default)]
    pub fields: Vec<String>,
}

/// A declared third-party integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationSpec {
    pub name: String,
    pub provider: String,

    #[serde(default)]
    pub events: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

/// A declarative business rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRule {
    pub name: String,
    pub entity: String,
    pub condition: String,
    pub action: String,
}

/// Root value object: a normalized domain description
///
/// Identified by `(name, version)`. Immutable once validated - the
/// validator and engine only ever borrow it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    pub version: String,

    #[serde(default)]
    pub entities: Vec<EntityConfig>,

    #[serde(default)]
    pub relationships: Vec<RelationshipConfig>,

    #[serde(default)]
    pub workflows: Vec<WorkflowSpec>,

    #[serde(default)]
    pub api_endpoints: Vec<EndpointSpec>,

    #[serde(default)]
    pub ui_components: Vec<ComponentSpec>,

    #[serde(default)]
    pub integrations: Vec<IntegrationSpec>,

    #[serde(default)]
    pub business_rules: Vec<BusinessRule>,

    /// Role names endpoint permissions may reference
    #[serde(default)]
    pub roles: Vec<String>,
}

impl DomainConfig {
    pub fn entity(&self, name: &str) -> Option<&EntityConfig> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Domain identity: `(name, version)`
    pub fn identity(&self) -> (&str, &str) {
        (&self.name, &self.version)
    }
}

/// Whether `name` is a valid identifier in every target language the
/// templates emit for (ASCII letter or underscore first, then
/// alphanumerics and underscores)
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Convert a PascalCase or camelCase name to snake_case
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert a snake_case or kebab-case name to PascalCase
pub fn to_pascal_case(name: &str) -> String {
    name.split(['_', '-'])
        .filter(|p| !p.is_empty())
        .map(|p| {
            let mut chars = p.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Naive English pluralization, used for default storage names and as a
/// template helper
pub fn pluralize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) && !stem.is_empty() {
            return format!("{}ies", stem);
        }
    }
    if name.ends_with('s') || name.ends_with('x') || name.ends_with("ch") || name.ends_with("sh") {
        format!("{}es", name)
    } else {
        format!("{}s", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("property"), "properties");
        assert_eq!(pluralize("tenant"), "tenants");
        assert_eq!(pluralize("address"), "addresses");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("day"), "days");
    }

    #[test]
    fn test_field_type_parse_string_with_length() {
        assert_eq!(
            "string(255)".parse::<FieldType>().unwrap(),
            FieldType::String { max_length: 255 }
        );
    }

    #[test]
    fn test_field_type_parse_bare_string_defaults() {
        assert_eq!(
            "string".parse::<FieldType>().unwrap(),
            FieldType::String { max_length: 255 }
        );
    }

    #[test]
    fn test_field_type_parse_decimal() {
        assert_eq!(
            "decimal(10,2)".parse::<FieldType>().unwrap(),
            FieldType::Decimal {
                precision: 10,
                scale: 2
            }
        );
    }

    #[test]
    fn test_field_type_parse_enum() {
        assert_eq!(
            "enum(open, closed, archived)".parse::<FieldType>().unwrap(),
            FieldType::Enum {
                values: vec![
                    "open".to_string(),
                    "closed".to_string(),
                    "archived".to_string()
                ]
            }
        );
    }

    #[test]
    fn test_field_type_parse_foreign_key() {
        assert_eq!(
            "foreign-key(Property)".parse::<FieldType>().unwrap(),
            FieldType::ForeignKey {
                entity: "Property".to_string()
            }
        );
    }

    #[test]
    fn test_field_type_rejects_unknown() {
        assert!("varchar(40)".parse::<FieldType>().is_err());
        assert!("decimal".parse::<FieldType>().is_err());
        assert!("foreign-key()".parse::<FieldType>().is_err());
        assert!("string(abc)".parse::<FieldType>().is_err());
    }

    #[test]
    fn test_field_type_display_round_trip() {
        for spec in [
            "string(64)",
            "integer",
            "decimal(10,2)",
            "boolean",
            "datetime",
            "enum(a,b)",
            "foreign-key(Tenant)",
        ] {
            let ty: FieldType = spec.parse().unwrap();
            assert_eq!(ty.to_string(), spec);
            assert_eq!(ty.to_string().parse::<FieldType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_field_type_serde_as_string() {
        let ty: FieldType = serde_json::from_str("\"decimal(12,4)\"").unwrap();
        assert_eq!(
            ty,
            FieldType::Decimal {
                precision: 12,
                scale: 4
            }
        );
        assert_eq!(serde_json::to_string(&ty).unwrap(), "\"decimal(12,4)\"");
    }

    #[test]
    fn test_decimal_has_no_equality() {
        let ty: FieldType = "decimal(10,2)".parse().unwrap();
        assert!(!ty.has_equality());
        assert!("integer".parse::<FieldType>().unwrap().has_equality());
    }

    #[test]
    fn test_accepts_default() {
        let string_ty: FieldType = "string(10)".parse().unwrap();
        assert!(string_ty.accepts_default(&serde_json::json!("hello")));
        assert!(!string_ty.accepts_default(&serde_json::json!(42)));

        let enum_ty: FieldType = "enum(open,closed)".parse().unwrap();
        assert!(enum_ty.accepts_default(&serde_json::json!("open")));
        assert!(!enum_ty.accepts_default(&serde_json::json!("missing")));
    }

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("Property"));
        assert!(is_valid_identifier("_internal"));
        assert!(is_valid_identifier("task_v2"));
        assert!(!is_valid_identifier("2fast"));
        assert!(!is_valid_identifier("has-dash"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn test_case_conversions() {
        assert_eq!(to_snake_case("PropertyUnit"), "property_unit");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_pascal_case("property_unit"), "PropertyUnit");
        assert_eq!(to_pascal_case("backend-model"), "BackendModel");
    }

    #[test]
    fn test_entity_foreign_keys() {
        let entity = EntityConfig {
            name: "Tenant".to_string(),
            storage_name: "tenants".to_string(),
            fields: vec![
                FieldConfig::new("id", FieldType::Integer).required(),
                FieldConfig::new(
                    "property_id",
                    FieldType::ForeignKey {
                        entity: "Property".to_string(),
                    },
                ),
            ],
        };
        let fks: Vec<_> = entity.foreign_keys().collect();
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].1, "Property");
    }

    #[test]
    fn test_domain_config_lookup() {
        let domain = DomainConfig {
            name: "rentals".to_string(),
            version: "1.0".to_string(),
            entities: vec![EntityConfig {
                name: "Property".to_string(),
                storage_name: "properties".to_string(),
                fields: vec![],
            }],
            relationships: vec![],
            workflows: vec![],
            api_endpoints: vec![],
            ui_components: vec![],
            integrations: vec![],
            business_rules: vec![],
            roles: vec![],
        };
        assert!(domain.entity("Property").is_some());
        assert!(domain.entity("Unit").is_none());
        assert_eq!(domain.identity(), ("rentals", "1.0"));
    }
}
