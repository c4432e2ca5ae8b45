//! Domain validator
//!
//! Checks a parsed [`DomainConfig`] for structural and semantic
//! correctness. All checks run on every pass and accumulate findings into
//! a [`ValidationReport`]; nothing short-circuits, so one pass reports
//! every problem. The validator never mutates its input and never raises
//! for expected authoring mistakes.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::model::{is_valid_identifier, DomainConfig, FieldType, KNOWN_EVENTS};

/// Finding severity. `Error` blocks generation; the rest do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        f.write_str(s)
    }
}

/// One validation finding, located precisely enough to fix the
/// configuration without reading generator internals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    /// Offending element, e.g. `Tenant.property_id` or `workflow:close_stale`
    pub location: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    fn error(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            location: location.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    fn warning(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            location: location.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }
}

/// Full validation result for one configuration
///
/// Ordering is deterministic (stable sort by location, then severity,
/// then message) so repeated validation of unchanged input yields
/// identical reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    /// Whether generation may proceed
    pub fn passes(&self) -> bool {
        !self.has_errors()
    }
}

/// Validate a domain configuration
///
/// Pure function: same input, same report.
pub fn validate(domain: &DomainConfig) -> ValidationReport {
    let mut issues = Vec::new();

    check_entity_shape(domain, &mut issues);
    check_foreign_keys(domain, &mut issues);
    check_relationships(domain, &mut issues);
    check_fk_cycles(domain, &mut issues);
    check_field_constraints(domain, &mut issues);
    check_workflows(domain, &mut issues);
    check_endpoints(domain, &mut issues);
    check_components(domain, &mut issues);
    check_integrations(domain, &mut issues);
    check_business_rules(domain, &mut issues);

    issues.sort_by(|a, b| {
        a.location
            .cmp(&b.location)
            .then(a.severity.cmp(&b.severity))
            .then(a.message.cmp(&b.message))
    });
    ValidationReport { issues }
}

fn check_entity_shape(domain: &DomainConfig, issues: &mut Vec<ValidationIssue>) {
    let mut seen = HashSet::new();
    for entity in &domain.entities {
        let loc = format!("entity:{}", entity.name);

        if !is_valid_identifier(&entity.name) {
            issues.push(ValidationIssue::error(
                &loc,
                format!("entity name '{}' is not a valid identifier", entity.name),
            ));
        }
        if !seen.insert(entity.name.as_str()) {
            issues.push(ValidationIssue::error(
                &loc,
                format!("duplicate entity name '{}'", entity.name),
            ));
        }

        let mut field_names = HashSet::new();
        for field in &entity.fields {
            let floc = format!("{}.{}", entity.name, field.name);
            if !is_valid_identifier(&field.name) {
                issues.push(ValidationIssue::error(
                    &floc,
                    format!("field name '{}' is not a valid identifier", field.name),
                ));
            }
            if !field_names.insert(field.name.as_str()) {
                issues.push(ValidationIssue::error(
                    &floc,
                    format!("duplicate field name '{}'", field.name),
                ));
            }
        }
    }
}

fn check_foreign_keys(domain: &DomainConfig, issues: &mut Vec<ValidationIssue>) {
    let entity_names: Vec<&str> = domain.entities.iter().map(|e| e.name.as_str()).collect();
    for entity in &domain.entities {
        for (field, target) in entity.foreign_keys() {
            if domain.entity(target).is_none() {
                issues.push(
                    ValidationIssue::error(
                        format!("{}.{}", entity.name, field.name),
                        format!("foreign key references unknown entity '{}'", target),
                    )
                    .with_suggestion(suggest(target, &entity_names)),
                );
            }
        }
    }
}

fn check_relationships(domain: &DomainConfig, issues: &mut Vec<ValidationIssue>) {
    use crate::model::Cardinality;

    let entity_names: Vec<&str> = domain.entities.iter().map(|e| e.name.as_str()).collect();
    for rel in &domain.relationships {
        let loc = format!("relationship:{}->{}", rel.source_entity, rel.target_entity);

        let mut endpoints_ok = true;
        for end in [&rel.source_entity, &rel.target_entity] {
            if domain.entity(end).is_none() {
                endpoints_ok = false;
                issues.push(
                    ValidationIssue::error(
                        &loc,
                        format!("relationship references unknown entity '{}'", end),
                    )
                    .with_suggestion(suggest(end, &entity_names)),
                );
            }
        }
        if !endpoints_ok {
            continue;
        }

        for nav in [&rel.source_navigation, &rel.target_navigation]
            .into_iter()
            .flatten()
        {
            if !is_valid_identifier(nav) {
                issues.push(ValidationIssue::error(
                    &loc,
                    format!("navigation name '{}' is not a valid identifier", nav),
                ));
            }
        }

        let fk_on = |owner: &str, referenced: &str| {
            domain
                .entity(owner)
                .map(|e| e.foreign_keys().any(|(_, t)| t == referenced))
                .unwrap_or(false)
        };
        let source_to_target = fk_on(&rel.source_entity, &rel.target_entity);
        let target_to_source = fk_on(&rel.target_entity, &rel.source_entity);

        match rel.cardinality {
            // The many side must carry a foreign key back to the one side.
            Cardinality::OneToMany => {
                if !target_to_source {
                    issues.push(ValidationIssue::error(
                        &loc,
                        format!(
                            "one-to-many relationship requires a foreign-key field on '{}' referencing '{}'",
                            rel.target_entity, rel.source_entity
                        ),
                    ));
                }
            }
            Cardinality::OneToOne => {
                if !source_to_target && !target_to_source {
                    issues.push(ValidationIssue::error(
                        &loc,
                        "one-to-one relationship requires a foreign-key field on either side"
                            .to_string(),
                    ));
                }
            }
            // Join table is synthesized; a direct FK is suspicious but legal.
            Cardinality::ManyToMany => {
                if source_to_target || target_to_source {
                    issues.push(ValidationIssue::warning(
                        &loc,
                        "many-to-many relationship does not need a direct foreign-key field"
                            .to_string(),
                    ));
                }
            }
        }
    }
}

/// Detect cycles over the directed graph of entities connected by
/// foreign-key edges. Required-FK cycles make construction order
/// impossible and are errors; optional-FK cycles are informational.
fn check_fk_cycles(domain: &DomainConfig, issues: &mut Vec<ValidationIssue>) {
    let required_cycles = fk_cycles(domain, true);
    for cycle in &required_cycles {
        issues.push(ValidationIssue::error(
            format!("entity:{}", cycle[0]),
            format!(
                "cycle of required foreign keys: {} - no construction order exists",
                cycle.join(" -> ")
            ),
        ));
    }

    let required_heads: HashSet<&String> = required_cycles.iter().map(|c| &c[0]).collect();
    for cycle in fk_cycles(domain, false) {
        if !required_heads.contains(&cycle[0]) {
            issues.push(ValidationIssue::warning(
                format!("entity:{}", cycle[0]),
                format!(
                    "cycle of optional foreign keys: {} - construction requires a deferred update",
                    cycle.join(" -> ")
                ),
            ));
        }
    }
}

/// Strongly connected components of the FK graph, each returned as a
/// sorted entity-name list (sorted for deterministic reports)
fn fk_cycles(domain: &DomainConfig, required_only: bool) -> Vec<Vec<String>> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut nodes: BTreeMap<&str, NodeIndex> = BTreeMap::new();

    for entity in &domain.entities {
        nodes.insert(&entity.name, graph.add_node(&entity.name));
    }
    let mut self_loops: HashSet<&str> = HashSet::new();
    for entity in &domain.entities {
        for (field, target) in entity.foreign_keys() {
            if required_only && !field.required {
                continue;
            }
            if let (Some(&from), Some(&to)) = (
                nodes.get(entity.name.as_str()),
                nodes.get(target),
            ) {
                if from == to {
                    self_loops.insert(&entity.name);
                }
                graph.add_edge(from, to, ());
            }
        }
    }

    let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || (scc.len() == 1 && self_loops.contains(graph[scc[0]])))
        .map(|scc| {
            let mut names: Vec<String> = scc.iter().map(|&n| graph[n].to_string()).collect();
            names.sort();
            names
        })
        .collect();
    cycles.sort();
    cycles
}

fn check_field_constraints(domain: &DomainConfig, issues: &mut Vec<ValidationIssue>) {
    for entity in &domain.entities {
        for field in &entity.fields {
            let loc = format!("{}.{}", entity.name, field.name);

            if field.unique && !field.field_type.has_equality() {
                issues.push(ValidationIssue::error(
                    &loc,
                    format!(
                        "'unique' is not allowed on type '{}' (no portable equality semantics)",
                        field.field_type
                    ),
                ));
            }

            match &field.field_type {
                FieldType::String { max_length } if *max_length == 0 => {
                    issues.push(ValidationIssue::error(
                        &loc,
                        "string length must be greater than zero".to_string(),
                    ));
                }
                FieldType::Enum { values } if values.is_empty() => {
                    issues.push(ValidationIssue::error(
                        &loc,
                        "enum must declare at least one value".to_string(),
                    ));
                }
                _ => {}
            }

            if let Some(default) = &field.default {
                if !field.field_type.accepts_default(default) {
                    issues.push(ValidationIssue::error(
                        &loc,
                        format!(
                            "default value {} is not coercible to type '{}'",
                            default, field.field_type
                        ),
                    ));
                }
            }
        }
    }
}

fn check_workflows(domain: &DomainConfig, issues: &mut Vec<ValidationIssue>) {
    let entity_names: Vec<&str> = domain.entities.iter().map(|e| e.name.as_str()).collect();
    for workflow in &domain.workflows {
        let loc = format!("workflow:{}", workflow.name);

        if !KNOWN_EVENTS.contains(&workflow.trigger.as_str()) {
            issues.push(
                ValidationIssue::error(
                    &loc,
                    format!("unknown trigger event '{}'", workflow.trigger),
                )
                .with_suggestion(suggest(&workflow.trigger, KNOWN_EVENTS)),
            );
        }

        for step in &workflow.steps {
            let sloc = format!("{}:{}", loc, step.name);
            match domain.entity(&step.entity) {
                None => {
                    issues.push(
                        ValidationIssue::error(
                            &sloc,
                            format!("step references unknown entity '{}'", step.entity),
                        )
                        .with_suggestion(suggest(&step.entity, &entity_names)),
                    );
                }
                Some(entity) => {
                    if let Some(field) = &step.field {
                        if entity.field(field).is_none() {
                            let field_names: Vec<&str> =
                                entity.fields.iter().map(|f| f.name.as_str()).collect();
                            issues.push(
                                ValidationIssue::error(
                                    &sloc,
                                    format!(
                                        "step references unknown field '{}.{}'",
                                        step.entity, field
                                    ),
                                )
                                .with_suggestion(suggest(field, &field_names)),
                            );
                        }
                    }
                }
            }
        }
    }
}

fn check_endpoints(domain: &DomainConfig, issues: &mut Vec<ValidationIssue>) {
    let entity_names: Vec<&str> = domain.entities.iter().map(|e| e.name.as_str()).collect();
    let role_names: Vec<&str> = domain.roles.iter().map(String::as_str).collect();

    for endpoint in &domain.api_endpoints {
        let loc = format!("endpoint:{} {}", endpoint.method, endpoint.path);

        if let Some(entity) = &endpoint.entity {
            if domain.entity(entity).is_none() {
                issues.push(
                    ValidationIssue::error(
                        &loc,
                        format!("endpoint references unknown entity '{}'", entity),
                    )
                    .with_suggestion(suggest(entity, &entity_names)),
                );
            }
        }

        for permission in &endpoint.permissions {
            if !domain.roles.iter().any(|r| r == permission) {
                issues.push(
                    ValidationIssue::error(
                        &loc,
                        format!("permission references unknown role '{}'", permission),
                    )
                    .with_suggestion(suggest(permission, &role_names)),
                );
            }
        }
    }
}

fn check_components(domain: &DomainConfig, issues: &mut Vec<ValidationIssue>) {
    let entity_names: Vec<&str> = domain.entities.iter().map(|e| e.name.as_str()).collect();
    for component in &domain.ui_components {
        let loc = format!("component:{}", component.name);
        match &component.entity {
            None => {}
            Some(entity_name) => match domain.entity(entity_name) {
                None => {
                    issues.push(
                        ValidationIssue::error(
                            &loc,
                            format!("component references unknown entity '{}'", entity_name),
                        )
                        .with_suggestion(suggest(entity_name, &entity_names)),
                    );
                }
                Some(entity) => {
                    for field in &component.fields {
                        if entity.field(field).is_none() {
                            issues.push(ValidationIssue::error(
                                &loc,
                                format!(
                                    "component references unknown field '{}.{}'",
                                    entity_name, field
                                ),
                            ));
                        }
                    }
                }
            },
        }
    }
}

fn check_integrations(domain: &DomainConfig, issues: &mut Vec<ValidationIssue>) {
    let entity_names: Vec<&str> = domain.entities.iter().map(|e| e.name.as_str()).collect();
    for integration in &domain.integrations {
        let loc = format!("integration:{}", integration.name);

        for event in &integration.events {
            if !KNOWN_EVENTS.contains(&event.as_str()) {
                issues.push(
                    ValidationIssue::error(&loc, format!("unknown event '{}'", event))
                        .with_suggestion(suggest(event, KNOWN_EVENTS)),
                );
            }
        }
        if let Some(entity) = &integration.entity {
            if domain.entity(entity).is_none() {
                issues.push(
                    ValidationIssue::error(
                        &loc,
                        format!("integration references unknown entity '{}'", entity),
                    )
                    .with_suggestion(suggest(entity, &entity_names)),
                );
            }
        }
    }
}

fn check_business_rules(domain: &DomainConfig, issues: &mut Vec<ValidationIssue>) {
    let entity_names: Vec<&str> = domain.entities.iter().map(|e| e.name.as_str()).collect();
    for rule in &domain.business_rules {
        if domain.entity(&rule.entity).is_none() {
            issues.push(
                ValidationIssue::error(
                    format!("rule:{}", rule.name),
                    format!("rule references unknown entity '{}'", rule.entity),
                )
                .with_suggestion(suggest(&rule.entity, &entity_names)),
            );
        }
    }
}

/// Suggest the closest known name within edit distance 2
fn suggest(unknown: &str, candidates: &[&str]) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for candidate in candidates {
        let dist = levenshtein(unknown, candidate);
        best = match best {
            None => Some((candidate, dist)),
            Some((_, best_dist)) if dist < best_dist => Some((candidate, dist)),
            Some(current) => Some(current),
        };
    }
    match best {
        Some((candidate, dist)) if dist <= 2 => Some(format!("did you mean '{}'?", candidate)),
        _ => None,
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    if a == b {
        return 0;
    }

    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    let mut prev: Vec<usize> = (0..=b_bytes.len()).collect();
    let mut curr = vec![0usize; b_bytes.len() + 1];

    for (i, &ac) in a_bytes.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &bc) in b_bytes.iter().enumerate() {
            let cost = if ac == bc { 0 } else { 1 };
            curr[j + 1] =
                std::cmp::min(std::cmp::min(prev[j + 1] + 1, curr[j] + 1), prev[j] + cost);
        }
        prev.clone_from_slice(&curr);
    }

    prev[b_bytes.len()]
}
