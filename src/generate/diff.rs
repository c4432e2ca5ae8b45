//! Configuration diffing for incremental regeneration
//!
//! Compares the domain snapshot of the previous successful run against a
//! new configuration and reports which entities changed, so the
//! orchestrator can regenerate only the affected files.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{DomainConfig, EntityConfig};

/// Field-level detail for a modified entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityChange {
    pub entity: String,
    #[serde(default)]
    pub added_fields: Vec<String>,
    #[serde(default)]
    pub removed_fields: Vec<String>,
    #[serde(default)]
    pub modified_fields: Vec<String>,
    /// Storage name changed without any field change
    #[serde(default)]
    pub storage_renamed: bool,
}

/// Difference between two domain configurations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDiff {
    #[serde(default)]
    pub added_entities: Vec<String>,
    #[serde(default)]
    pub removed_entities: Vec<String>,
    #[serde(default)]
    pub modified_entities: Vec<EntityChange>,
    /// Relationship set changed in any way
    #[serde(default)]
    pub relationships_changed: bool,
    /// Entities named by added or removed relationships
    #[serde(default)]
    pub relationship_entities: Vec<String>,
    /// Workflows, endpoints, components, integrations, rules, roles or the
    /// domain header changed
    #[serde(default)]
    pub cross_cutting_changed: bool,
}

impl ConfigDiff {
    pub fn is_empty(&self) -> bool {
        self.added_entities.is_empty()
            && self.removed_entities.is_empty()
            && self.modified_entities.is_empty()
            && !self.relationships_changed
            && !self.cross_cutting_changed
    }

    /// Entities whose per-entity files must be regenerated
    ///
    /// Covers added and modified entities, participants of changed
    /// relationships, and entities referencing a removed entity (their
    /// imports change even though their own definition did not).
    pub fn affected_entities(&self, new: &DomainConfig) -> Vec<String> {
        let mut affected: BTreeSet<String> = BTreeSet::new();

        for name in &self.added_entities {
            affected.insert(name.clone());
        }
        for change in &self.modified_entities {
            affected.insert(change.entity.clone());
        }
        for name in &self.relationship_entities {
            affected.insert(name.clone());
        }
        for removed in &self.removed_entities {
            for entity in &new.entities {
                if entity.foreign_keys().any(|(_, target)| target == removed) {
                    affected.insert(entity.name.clone());
                }
            }
        }

        affected.retain(|name| new.entity(name).is_some());
        affected.into_iter().collect()
    }
}

/// Compute the difference between two domain snapshots
pub fn diff_domains(old: &DomainConfig, new: &DomainConfig) -> ConfigDiff {
    let mut diff = ConfigDiff::default();

    let old_names: BTreeSet<&str> = old.entities.iter().map(|e| e.name.as_str()).collect();
    let new_names: BTreeSet<&str> = new.entities.iter().map(|e| e.name.as_str()).collect();

    diff.added_entities = new_names
        .difference(&old_names)
        .map(|n| n.to_string())
        .collect();
    diff.removed_entities = old_names
        .difference(&new_names)
        .map(|n| n.to_string())
        .collect();

    for name in old_names.intersection(&new_names) {
        let before = old.entity(name).expect("present in old set");
        let after = new.entity(name).expect("present in new set");
        if let Some(change) = diff_entity(before, after) {
            diff.modified_entities.push(change);
        }
    }

    let (rel_changed, rel_entities) = diff_relationships(old, new);
    diff.relationships_changed = rel_changed;
    diff.relationship_entities = rel_entities;

    diff.cross_cutting_changed = old.identity() != new.identity()
        || old.workflows != new.workflows
        || old.api_endpoints != new.api_endpoints
        || old.ui_components != new.ui_components
        || old.integrations != new.integrations
        || old.business_rules != new.business_rules
        || old.roles != new.roles;

    diff
}

fn diff_entity(before: &EntityConfig, after: &EntityConfig) -> Option<EntityChange> {
    let before_names: BTreeSet<&str> = before.fields.iter().map(|f| f.name.as_str()).collect();
    let after_names: BTreeSet<&str> = after.fields.iter().map(|f| f.name.as_str()).collect();

    let added_fields: Vec<String> = after_names
        .difference(&before_names)
        .map(|n| n.to_string())
        .collect();
    let removed_fields: Vec<String> = before_names
        .difference(&after_names)
        .map(|n| n.to_string())
        .collect();
    let modified_fields: Vec<String> = before_names
        .intersection(&after_names)
        .filter(|name| before.field(name) != after.field(name))
        .map(|n| n.to_string())
        .collect();
    let storage_renamed = before.storage_name != after.storage_name;

    if added_fields.is_empty()
        && removed_fields.is_empty()
        && modified_fields.is_empty()
        && !storage_renamed
    {
        return None;
    }

    Some(EntityChange {
        entity: after.name.clone(),
        added_fields,
        removed_fields,
        modified_fields,
        storage_renamed,
    })
}

/// Compare relationship sets; returns whether they differ and the entities
/// participating in relationships present on only one side
fn diff_relationships(old: &DomainConfig, new: &DomainConfig) -> (bool, Vec<String>) {
    if old.relationships == new.relationships {
        return (false, Vec::new());
    }

    let mut entities: BTreeSet<String> = BTreeSet::new();
    for rel in &old.relationships {
        if !new.relationships.contains(rel) {
            entities.insert(rel.source_entity.clone());
            entities.insert(rel.target_entity.clone());
        }
    }
    for rel in &new.relationships {
        if !old.relationships.contains(rel) {
            entities.insert(rel.source_entity.clone());
            entities.insert(rel.target_entity.clone());
        }
    }
    (true, entities.into_iter().collect())
}
