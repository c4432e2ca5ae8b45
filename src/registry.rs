//! Template registry
//!
//! Indexes one or more template source directories by priority and
//! resolves a `(name, kind)` pair to a concrete template. Template files
//! are handlebars sources named `<name>.<kind>.hbs`; syntax is checked at
//! registration time so malformed templates surface before any render.
//!
//! The compiled-template cache is owned by the registry instance, never
//! process-wide, so independent registries (one per test, per deployment)
//! do not interfere.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::TemplateError;

/// A resolved template: source text plus provenance
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub kind: String,
    pub source_path: PathBuf,
    pub priority: i32,
    /// Handlebars source, shared cheaply with render jobs
    pub source: Arc<str>,
}

impl Template {
    /// Stable key for caching compiled templates per registry instance
    pub fn cache_key(&self) -> String {
        format!("{}.{}", self.name, self.kind)
    }
}

/// Lightweight listing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateInfo {
    pub name: String,
    pub kind: String,
    pub source_path: PathBuf,
    pub priority: i32,
}

#[derive(Debug, Clone)]
struct Candidate {
    template: Template,
    /// Registration sequence; later registrations shadow earlier ones at
    /// equal priority
    seq: u64,
}

/// Prioritized template index
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    candidates: HashMap<(String, String), Vec<Candidate>>,
    next_seq: u64,
}

/// Built-in templates compiled into the library, registered at priority 0
/// so any registered directory can override them.
const BUILTINS: &[(&str, &str, &str)] = &[
    (
        "model",
        "backend-model",
        include_str!("../templates/model.backend-model.hbs"),
    ),
    (
        "schema",
        "api-schema",
        include_str!("../templates/schema.api-schema.hbs"),
    ),
    (
        "component",
        "frontend-component",
        include_str!("../templates/component.frontend-component.hbs"),
    ),
    (
        "model_test",
        "backend-test",
        include_str!("../templates/model_test.backend-test.hbs"),
    ),
    (
        "relationships",
        "backend-model",
        include_str!("../templates/relationships.backend-model.hbs"),
    ),
    (
        "index",
        "backend-model",
        include_str!("../templates/index.backend-model.hbs"),
    ),
    (
        "deployment",
        "deployment-manifest",
        include_str!("../templates/deployment.deployment-manifest.hbs"),
    ),
];

impl TemplateRegistry {
    /// Empty registry with no templates at all
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in template set at priority 0
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (name, kind, source) in BUILTINS {
            // Built-ins are validated by the crate's own tests; a syntax
            // fault here is a packaging bug, not a user error.
            registry.insert(Template {
                name: (*name).to_string(),
                kind: (*kind).to_string(),
                source_path: PathBuf::from(format!("<builtin>/{}.{}.hbs", name, kind)),
                priority: 0,
                source: Arc::from(*source),
            });
        }
        registry
    }

    /// Register every template under `dir` (recursively) at `priority`
    ///
    /// Higher priority wins on `(name, kind)` collisions; at equal
    /// priority the most recently registered directory wins.
    pub fn register_directory(&mut self, dir: &Path, priority: i32) -> Result<(), TemplateError> {
        if !dir.is_dir() {
            return Err(TemplateError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("template directory not found: {}", dir.display()),
            )));
        }
        let mut paths = Vec::new();
        collect_template_files(dir, &mut paths)?;
        // Deterministic registration order within one directory
        paths.sort();

        for path in paths {
            let (name, kind) = parse_template_filename(&path)?;
            let source = fs::read_to_string(&path)?;
            validate_source(&source, &path)?;
            self.insert(Template {
                name,
                kind,
                source_path: path,
                priority,
                source: Arc::from(source.as_str()),
            });
        }
        Ok(())
    }

    fn insert(&mut self, template: Template) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.candidates
            .entry((template.name.clone(), template.kind.clone()))
            .or_default()
            .push(Candidate { template, seq });
    }

    /// Resolve a template by name and kind
    pub fn resolve(&self, name: &str, kind: &str) -> Result<&Template, TemplateError> {
        self.candidates
            .get(&(name.to_string(), kind.to_string()))
            .and_then(|cands| {
                cands
                    .iter()
                    .max_by_key(|c| (c.template.priority, c.seq))
                    .map(|c| &c.template)
            })
            .ok_or_else(|| TemplateError::NotFound {
                name: name.to_string(),
                kind: kind.to_string(),
            })
    }

    /// List effective templates (post-shadowing), optionally filtered by kind
    pub fn list_available(&self, kind_filter: Option<&str>) -> Vec<TemplateInfo> {
        let mut infos: Vec<TemplateInfo> = self
            .candidates
            .iter()
            .filter(|((_, kind), _)| kind_filter.map(|f| f == kind).unwrap_or(true))
            .filter_map(|(_, cands)| cands.iter().max_by_key(|c| (c.template.priority, c.seq)))
            .map(|c| TemplateInfo {
                name: c.template.name.clone(),
                kind: c.template.kind.clone(),
                source_path: c.template.source_path.clone(),
                priority: c.template.priority,
            })
            .collect();
        infos.sort_by(|a, b| (&a.kind, &a.name).cmp(&(&b.kind, &b.name)));
        infos
    }

    /// Parse a template file in isolation to catch malformed syntax ahead
    /// of any render
    pub fn validate_syntax(path: &Path) -> Result<(), TemplateError> {
        let source = fs::read_to_string(path)?;
        validate_source(&source, path)
    }
}

fn validate_source(source: &str, path: &Path) -> Result<(), TemplateError> {
    handlebars::Template::compile(source).map_err(|e| TemplateError::Syntax {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(())
}

fn collect_template_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<(), TemplateError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with('.'))
                .unwrap_or(false);
            if !hidden {
                collect_template_files(&path, paths)?;
            }
        } else if path.extension().map(|e| e == "hbs").unwrap_or(false) {
            paths.push(path);
        }
    }
    Ok(())
}

/// Split `model.backend-model.hbs` into `("model", "backend-model")`
fn parse_template_filename(path: &Path) -> Result<(String, String), TemplateError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    match stem.split_once('.') {
        Some((name, kind)) if !name.is_empty() && !kind.is_empty() => {
            Ok((name.to_string(), kind.to_string()))
        }
        _ => Err(TemplateError::Syntax {
            path: path.to_path_buf(),
            message: "template file must be named <name>.<kind>.hbs".to_string(),
        }),
    }
}
