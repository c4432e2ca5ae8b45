//! Configuration parser
//!
//! Reads a domain description in either of two interchangeable
//! serializations (YAML or JSON), resolves entity `extends` inheritance,
//! and produces a normalized [`DomainConfig`]. Unknown top-level keys are
//! rejected rather than silently ignored. No semantic checks happen here;
//! those belong to the validator.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigurationError;
use crate::model::{
    pluralize, to_snake_case, BusinessRule, ComponentSpec, DomainConfig, EndpointSpec,
    EntityConfig, FieldConfig, FieldType, IntegrationSpec, RelationshipConfig, WorkflowSpec,
};

/// Accepted configuration serializations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

/// Parse a domain configuration file, picking the format by extension
pub fn parse_file(path: &Path) -> Result<DomainConfig, ConfigurationError> {
    let format = detect_format(path)?;
    let content = fs::read_to_string(path)?;
    parse_str(&content, format, path)
}

/// Parse a domain configuration from text
///
/// `origin` is only used for error reporting.
pub fn parse_str(
    text: &str,
    format: ConfigFormat,
    origin: &Path,
) -> Result<DomainConfig, ConfigurationError> {
    let value = to_value(text, format, origin)?;
    from_value(value, origin)
}

fn detect_format(path: &Path) -> Result<ConfigFormat, ConfigurationError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
        Some("json") => Ok(ConfigFormat::Json),
        _ => Err(ConfigurationError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

/// Normalize both serializations to the same `serde_json::Value` shape
fn to_value(text: &str, format: ConfigFormat, origin: &Path) -> Result<Value, ConfigurationError> {
    match format {
        ConfigFormat::Yaml => {
            serde_yaml_ng::from_str(text).map_err(|e| ConfigurationError::InvalidYaml {
                file: origin.to_path_buf(),
                message: e.to_string(),
            })
        }
        ConfigFormat::Json => {
            serde_json::from_str(text).map_err(|e| ConfigurationError::InvalidJson {
                file: origin.to_path_buf(),
                message: e.to_string(),
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct DomainHeader {
    name: String,
    version: String,
}

/// Raw document shape; entities stay opaque until inheritance is resolved
#[derive(Debug, Deserialize)]
struct RawDocument {
    domain: DomainHeader,

    #[serde(default)]
    entities: Vec<Value>,

    #[serde(default)]
    relationships: Vec<RelationshipConfig>,

    #[serde(default)]
    workflows: Vec<WorkflowSpec>,

    #[serde(default)]
    api_endpoints: Vec<EndpointSpec>,

    #[serde(default)]
    ui_components: Vec<ComponentSpec>,

    #[serde(default)]
    integrations: Vec<IntegrationSpec>,

    #[serde(default)]
    business_rules: Vec<BusinessRule>,

    #[serde(default)]
    roles: Vec<String>,
}

/// Entity shape after inheritance resolution
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntity {
    name: String,

    #[serde(default)]
    storage_name: Option<String>,

    #[serde(default)]
    fields: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawField {
    name: String,

    #[serde(rename = "type")]
    type_spec: String,

    #[serde(default)]
    required: bool,

    #[serde(default)]
    unique: bool,

    #[serde(default)]
    indexed: bool,

    #[serde(default)]
    default: Option<Value>,
}

fn from_value(value: Value, origin: &Path) -> Result<DomainConfig, ConfigurationError> {
    let mut unknown: Vec<String> = Vec::new();
    let doc: RawDocument = serde_ignored::deserialize(value, |path| {
        unknown.push(path.to_string());
    })
    .map_err(|e| ConfigurationError::InvalidSchema {
        file: origin.to_path_buf(),
        message: e.to_string(),
    })?;

    // Typo protection: an unrecognized key is an authoring mistake, not
    // something to drop on the floor.
    unknown.sort();
    if let Some(key) = unknown.first() {
        return Err(ConfigurationError::UnknownKey {
            key: key.clone(),
            file: origin.to_path_buf(),
        });
    }

    let entities = resolve_entities(doc.entities, origin)?;

    Ok(DomainConfig {
        name: doc.domain.name,
        version: doc.domain.version,
        entities,
        relationships: doc.relationships,
        workflows: doc.workflows,
        api_endpoints: doc.api_endpoints,
        ui_components: doc.ui_components,
        integrations: doc.integrations,
        business_rules: doc.business_rules,
        roles: doc.roles,
    })
}

/// Resolve `extends` chains and produce typed entities
///
/// Merge rule: the child definition is merged over the named parent
/// field-by-field. Scalar keys override; list keys append (child items
/// replacing parent items with the same `name`) unless the child sets
/// `replace: true`.
fn resolve_entities(
    raw: Vec<Value>,
    origin: &Path,
) -> Result<Vec<EntityConfig>, ConfigurationError> {
    let by_name: BTreeMap<String, Value> = raw
        .iter()
        .filter_map(|v| {
            v.get("name")
                .and_then(Value::as_str)
                .map(|n| (n.to_string(), v.clone()))
        })
        .collect();

    let mut entities = Vec::with_capacity(raw.len());
    for value in raw {
        let resolved = resolve_one(&value, &by_name)?;
        entities.push(typed_entity(resolved, origin)?);
    }
    Ok(entities)
}

fn resolve_one(
    value: &Value,
    by_name: &BTreeMap<String, Value>,
) -> Result<Value, ConfigurationError> {
    let mut chain = vec![entity_name(value)];
    let mut merged = resolve_chain(value, by_name, &mut chain)?;

    // Inheritance markers are resolved away; they never reach the model.
    if let Value::Object(map) = &mut merged {
        map.remove("extends");
        map.remove("replace");
    }
    Ok(merged)
}

/// Fully resolve `value`'s parent before merging `value` over it, so each
/// definition's own `replace` marker applies exactly once, at its own
/// level of the chain. The visited chain bounds the walk.
fn resolve_chain(
    value: &Value,
    by_name: &BTreeMap<String, Value>,
    chain: &mut Vec<String>,
) -> Result<Value, ConfigurationError> {
    let Some(parent_name) = value.get("extends").and_then(Value::as_str) else {
        return Ok(value.clone());
    };
    if chain.iter().any(|n| n == parent_name) {
        chain.push(parent_name.to_string());
        return Err(ConfigurationError::CyclicInheritance {
            entity: chain[0].clone(),
            chain: chain.clone(),
        });
    }
    let parent = by_name
        .get(parent_name)
        .ok_or_else(|| ConfigurationError::UnknownParent {
            entity: entity_name(value),
            parent: parent_name.to_string(),
        })?;
    chain.push(parent_name.to_string());
    let resolved_parent = resolve_chain(parent, by_name, chain)?;
    Ok(merge_over(&resolved_parent, value))
}

fn entity_name(value: &Value) -> String {
    value
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>")
        .to_string()
}

/// Merge `child` over `parent`, both entity-shaped objects
fn merge_over(parent: &Value, child: &Value) -> Value {
    let (Value::Object(parent_map), Value::Object(child_map)) = (parent, child) else {
        return child.clone();
    };

    let replace_lists = child_map
        .get("replace")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut out = parent_map.clone();
    out.remove("extends");

    for (key, child_val) in child_map {
        match (out.get(key), child_val) {
            (Some(Value::Array(parent_items)), Value::Array(child_items)) if !replace_lists => {
                out.insert(
                    key.clone(),
                    Value::Array(merge_named_lists(parent_items, child_items)),
                );
            }
            _ => {
                out.insert(key.clone(), child_val.clone());
            }
        }
    }
    out.remove("replace");
    Value::Object(out)
}

/// Append child items to parent items; a child item with the same `name`
/// as a parent item overrides it in place
fn merge_named_lists(parent_items: &[Value], child_items: &[Value]) -> Vec<Value> {
    let mut merged: Vec<Value> = parent_items.to_vec();
    for child_item in child_items {
        let child_name = child_item.get("name").and_then(Value::as_str);
        let existing = child_name.and_then(|name| {
            merged
                .iter()
                .position(|p| p.get("name").and_then(Value::as_str) == Some(name))
        });
        match existing {
            Some(idx) => merged[idx] = child_item.clone(),
            None => merged.push(child_item.clone()),
        }
    }
    merged
}

fn typed_entity(value: Value, origin: &Path) -> Result<EntityConfig, ConfigurationError> {
    let raw: RawEntity =
        serde_json::from_value(value).map_err(|e| ConfigurationError::InvalidSchema {
            file: origin.to_path_buf(),
            message: e.to_string(),
        })?;

    let mut fields = Vec::with_capacity(raw.fields.len());
    for field in raw.fields {
        let field_type = FieldType::from_str(&field.type_spec).map_err(|_| {
            ConfigurationError::InvalidFieldType {
                entity: raw.name.clone(),
                field: field.name.clone(),
                spec: field.type_spec.clone(),
            }
        })?;
        fields.push(FieldConfig {
            name: field.name,
            field_type,
            required: field.required,
            unique: field.unique,
            indexed: field.indexed,
            default: field.default,
        });
    }

    let storage_name = raw
        .storage_name
        .unwrap_or_else(|| pluralize(&to_snake_case(&raw.name)));

    Ok(EntityConfig {
        name: raw.name,
        storage_name,
        fields,
    })
}
