//! Render context construction
//!
//! Builds the variable bindings a template sees: the full (or
//! entity-scoped) domain model, per-field type declarations mapped for
//! the output kind, and a synthesized minimal import list. Templates get
//! data only - no filesystem, clock, or environment access - so renders
//! stay pure and parallel-safe.

use serde_json::{json, Map, Value};

use crate::error::TemplateError;
use crate::model::{to_snake_case, DomainConfig, EntityConfig};

use super::typemap::TypeMap;

/// One synthesized cross-file reference
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Import {
    entity: String,
    module: String,
}

/// Build the bindings for rendering one file
///
/// With `entity` set the context is entity-scoped (`entity` binding plus
/// its imports); without it the context is domain-scoped (`entities`
/// binding, imports covering every entity). Both carry `domain`,
/// `relationships` and `output_kind`.
pub fn generate_context(
    domain: &DomainConfig,
    entity: Option<&EntityConfig>,
    output_kind: &str,
    type_map: &TypeMap,
) -> Result<Value, TemplateError> {
    let mut bindings = Map::new();

    bindings.insert(
        "domain".to_string(),
        json!({
            "name": domain.name,
            "version": domain.version,
            "roles": domain.roles,
        }),
    );
    bindings.insert("output_kind".to_string(), json!(output_kind));
    bindings.insert(
        "relationships".to_string(),
        serde_json::to_value(&domain.relationships).unwrap_or(Value::Array(vec![])),
    );
    bindings.insert(
        "workflows".to_string(),
        serde_json::to_value(&domain.workflows).unwrap_or(Value::Array(vec![])),
    );
    bindings.insert(
        "api_endpoints".to_string(),
        serde_json::to_value(&domain.api_endpoints).unwrap_or(Value::Array(vec![])),
    );
    bindings.insert(
        "ui_components".to_string(),
        serde_json::to_value(&domain.ui_components).unwrap_or(Value::Array(vec![])),
    );
    bindings.insert(
        "integrations".to_string(),
        serde_json::to_value(&domain.integrations).unwrap_or(Value::Array(vec![])),
    );
    bindings.insert(
        "business_rules".to_string(),
        serde_json::to_value(&domain.business_rules).unwrap_or(Value::Array(vec![])),
    );

    match entity {
        Some(entity) => {
            bindings.insert(
                "entity".to_string(),
                entity_bindings(entity, output_kind, type_map)?,
            );
            bindings.insert(
                "imports".to_string(),
                imports_value(entity_imports(domain, entity)),
            );
        }
        None => {
            let mut entities = Vec::with_capacity(domain.entities.len());
            for e in &domain.entities {
                entities.push(entity_bindings(e, output_kind, type_map)?);
            }
            bindings.insert("entities".to_string(), Value::Array(entities));
            bindings.insert(
                "imports".to_string(),
                imports_value(domain_imports(domain)),
            );
        }
    }

    Ok(Value::Object(bindings))
}

/// Entity bindings: the serialized entity with `snake_name` and, when the
/// output kind has a type mapping, a `declaration` per field
fn entity_bindings(
    entity: &EntityConfig,
    output_kind: &str,
    type_map: &TypeMap,
) -> Result<Value, TemplateError> {
    let mut fields = Vec::with_capacity(entity.fields.len());
    for field in &entity.fields {
        let mut f = Map::new();
        f.insert("name".to_string(), json!(field.name));
        f.insert("type".to_string(), json!(field.field_type.to_string()));
        f.insert("tag".to_string(), json!(field.field_type.tag()));
        f.insert("required".to_string(), json!(field.required));
        f.insert("unique".to_string(), json!(field.unique));
        f.insert("indexed".to_string(), json!(field.indexed));
        if let Some(default) = &field.default {
            f.insert("default".to_string(), default.clone());
        }
        if let Some(target) = field.field_type.foreign_key_target() {
            f.insert("references".to_string(), json!(target));
        }
        // Mapping failures must surface per the closed-set contract; kinds
        // with no mappings at all (manifests) simply omit declarations.
        if type_map.supports_kind(output_kind) {
            f.insert(
                "declaration".to_string(),
                json!(type_map.declaration(&field.field_type, output_kind)?),
            );
        }
        fields.push(Value::Object(f));
    }

    Ok(json!({
        "name": entity.name,
        "snake_name": to_snake_case(&entity.name),
        "storage_name": entity.storage_name,
        "fields": fields,
    }))
}

/// Minimal import set for an entity-scoped file: every distinct entity the
/// file references (FK targets plus relationship counterparts), excluding
/// the entity itself, sorted and deduplicated
fn entity_imports(domain: &DomainConfig, entity: &EntityConfig) -> Vec<Import> {
    let mut imports: Vec<Import> = Vec::new();

    for (_, target) in entity.foreign_keys() {
        push_import(&mut imports, domain, target, &entity.name);
    }
    for rel in &domain.relationships {
        if rel.source_entity == entity.name {
            push_import(&mut imports, domain, &rel.target_entity, &entity.name);
        } else if rel.target_entity == entity.name {
            push_import(&mut imports, domain, &rel.source_entity, &entity.name);
        }
    }

    imports.sort();
    imports.dedup();
    imports
}

fn domain_imports(domain: &DomainConfig) -> Vec<Import> {
    let mut imports: Vec<Import> = domain
        .entities
        .iter()
        .map(|e| Import {
            entity: e.name.clone(),
            module: to_snake_case(&e.name),
        })
        .collect();
    imports.sort();
    imports.dedup();
    imports
}

fn push_import(imports: &mut Vec<Import>, domain: &DomainConfig, name: &str, self_name: &str) {
    // Unknown references are a validator concern; skip rather than panic.
    if name != self_name && domain.entity(name).is_some() {
        imports.push(Import {
            entity: name.to_string(),
            module: to_snake_case(name),
        });
    }
}

fn imports_value(imports: Vec<Import>) -> Value {
    Value::Array(
        imports
            .into_iter()
            .map(|i| json!({ "entity": i.entity, "module": i.module }))
            .collect(),
    )
}
