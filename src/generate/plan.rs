//! Generation planning
//!
//! Expands plan rules against a domain into the concrete list of files a
//! run will produce, resolving each rule's template through the registry
//! and rejecting plans where two rules collide on an output path.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{ForgeError, GenerationError};
use crate::model::{to_pascal_case, to_snake_case, DomainConfig};
use crate::registry::{Template, TemplateRegistry};

/// Whether a rule produces one file per entity or one file per domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    PerEntity,
    Domain,
}

/// One rule of the generation plan: which template renders to which path
///
/// Path patterns accept `{snake}` and `{pascal}` placeholders for the
/// entity name (per-entity rules only).
#[derive(Debug, Clone)]
pub struct PlanRule {
    pub template: &'static str,
    pub kind: &'static str,
    pub scope: RuleScope,
    pub path_pattern: &'static str,
}

/// The default application layout
pub const DEFAULT_RULES: &[PlanRule] = &[
    PlanRule {
        template: "model",
        kind: "backend-model",
        scope: RuleScope::PerEntity,
        path_pattern: "backend/models/{snake}.py",
    },
    PlanRule {
        template: "schema",
        kind: "api-schema",
        scope: RuleScope::PerEntity,
        path_pattern: "backend/schemas/{snake}_schema.py",
    },
    PlanRule {
        template: "component",
        kind: "frontend-component",
        scope: RuleScope::PerEntity,
        path_pattern: "frontend/components/{pascal}.tsx",
    },
    PlanRule {
        template: "model_test",
        kind: "backend-test",
        scope: RuleScope::PerEntity,
        path_pattern: "tests/test_{snake}.py",
    },
    PlanRule {
        template: "relationships",
        kind: "backend-model",
        scope: RuleScope::Domain,
        path_pattern: "backend/models/relationships.py",
    },
    PlanRule {
        template: "index",
        kind: "backend-model",
        scope: RuleScope::Domain,
        path_pattern: "backend/models/__init__.py",
    },
    PlanRule {
        template: "deployment",
        kind: "deployment-manifest",
        scope: RuleScope::Domain,
        path_pattern: "deploy/app.yaml",
    },
];

/// One planned output file, before rendering
#[derive(Debug, Clone)]
pub struct PlannedFile {
    /// Output path relative to the output root
    pub path: PathBuf,
    pub template: Template,
    pub output_kind: String,
    /// Entity the file is scoped to; `None` for domain-scoped files
    pub entity: Option<String>,
}

/// Expand `rules` against `domain`, resolving templates through `registry`
///
/// Fails on a missing template or when two rules plan the same path. The
/// result is ordered by output path, so plans are deterministic.
pub fn build_plan(
    domain: &DomainConfig,
    registry: &TemplateRegistry,
    rules: &[PlanRule],
) -> Result<Vec<PlannedFile>, ForgeError> {
    let mut planned: Vec<PlannedFile> = Vec::new();
    let mut claimed: HashMap<PathBuf, String> = HashMap::new();

    for rule in rules {
        let template = registry.resolve(rule.template, rule.kind)?;

        match rule.scope {
            RuleScope::PerEntity => {
                for entity in &domain.entities {
                    let path = PathBuf::from(expand_pattern(rule.path_pattern, &entity.name));
                    claim(&mut claimed, &path, template)?;
                    planned.push(PlannedFile {
                        path,
                        template: template.clone(),
                        output_kind: rule.kind.to_string(),
                        entity: Some(entity.name.clone()),
                    });
                }
            }
            RuleScope::Domain => {
                let path = PathBuf::from(rule.path_pattern);
                claim(&mut claimed, &path, template)?;
                planned.push(PlannedFile {
                    path,
                    template: template.clone(),
                    output_kind: rule.kind.to_string(),
                    entity: None,
                });
            }
        }
    }

    planned.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(planned)
}

fn expand_pattern(pattern: &str, entity_name: &str) -> String {
    pattern
        .replace("{snake}", &to_snake_case(entity_name))
        .replace("{pascal}", &to_pascal_case(entity_name))
}

fn claim(
    claimed: &mut HashMap<PathBuf, String>,
    path: &PathBuf,
    template: &Template,
) -> Result<(), GenerationError> {
    if let Some(first) = claimed.insert(path.clone(), template.cache_key()) {
        return Err(GenerationError::DuplicateOutputPath {
            path: path.clone(),
            first,
            second: template.cache_key(),
        });
    }
    Ok(())
}
