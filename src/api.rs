//! High-level library surface
//!
//! Convenience entry points that wire the pipeline together for callers
//! who work from configuration files: parse, validate, diff, generate,
//! roll back. Embedders needing finer control use the underlying types
//! directly.

use std::path::Path;

use crate::error::ForgeResult;
use crate::generate::{
    diff_domains, ConfigDiff, GenerateOptions, GenerationOutcome, Orchestrator,
};
use crate::model::DomainConfig;
use crate::parser::parse_file;
use crate::registry::TemplateRegistry;
use crate::validator::{validate, ValidationReport};

/// Parse and semantically validate a configuration file
///
/// Parse failures are errors; semantic findings come back as a report
/// for the caller to render.
pub fn validate_config(config_path: &Path) -> ForgeResult<ValidationReport> {
    let domain = parse_file(config_path)?;
    Ok(validate(&domain))
}

/// Diff two configuration files entity by entity
pub fn diff_configs(old_path: &Path, new_path: &Path) -> ForgeResult<ConfigDiff> {
    let old = parse_file(old_path)?;
    let new = parse_file(new_path)?;
    Ok(diff_domains(&old, &new))
}

/// Generate the application described by `config_path` under
/// `output_root`, using the builtin templates
///
/// Incremental when a prior run exists; `force` regenerates everything.
pub fn generate(
    config_path: &Path,
    output_root: &Path,
    force: bool,
) -> ForgeResult<GenerationOutcome> {
    let domain = parse_file(config_path)?;
    let options = GenerateOptions {
        force,
        ..GenerateOptions::default()
    };
    Orchestrator::new().generate(&domain, output_root, &options)
}

/// Generate with project template overrides layered over the builtins
pub fn generate_with_templates(
    config_path: &Path,
    output_root: &Path,
    template_dirs: &[&Path],
    force: bool,
) -> ForgeResult<GenerationOutcome> {
    let domain = parse_file(config_path)?;
    let mut registry = TemplateRegistry::with_builtins();
    for (i, dir) in template_dirs.iter().enumerate() {
        // later directories win over earlier ones and over the builtins
        registry.register_directory(dir, (i + 1) as i32)?;
    }
    let options = GenerateOptions {
        force,
        ..GenerateOptions::default()
    };
    Orchestrator::with_registry(registry).generate(&domain, output_root, &options)
}

/// Restore `output_root` to the tree recorded for `run_id`
pub fn rollback(output_root: &Path, run_id: &str) -> ForgeResult<()> {
    Orchestrator::new().rollback(output_root, run_id)
}

/// Parse a configuration file without validating it
pub fn load_config(config_path: &Path) -> ForgeResult<DomainConfig> {
    Ok(parse_file(config_path)?)
}
