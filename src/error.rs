//! Error types for appforge
//!
//! Uses `thiserror` for library errors. The taxonomy mirrors the pipeline
//! stages: configuration parsing, template handling, generation, rollback.
//! Semantic validation findings are data (`ValidationIssue`), not errors.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for appforge operations
pub type ForgeResult<T> = Result<T, ForgeError>;

/// Top-level error type for the library surface
#[derive(Error, Debug)]
pub enum ForgeError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Rollback(#[from] RollbackError),
}

/// Errors raised while parsing a domain configuration
///
/// These are fatal: a configuration that fails to parse never reaches
/// validation, and nothing is written.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// IO error while reading configuration input
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed YAML input
    #[error("invalid YAML in {file}: {message}")]
    InvalidYaml { file: PathBuf, message: String },

    /// Malformed JSON input
    #[error("invalid JSON in {file}: {message}")]
    InvalidJson { file: PathBuf, message: String },

    /// Input does not match the configuration schema
    #[error("invalid configuration in {file}: {message}")]
    InvalidSchema { file: PathBuf, message: String },

    /// Unknown top-level key (typo protection - rejected, not ignored)
    #[error("unknown key '{key}' in {file} - known keys: domain, entities, relationships, workflows, api_endpoints, ui_components, integrations, business_rules, roles")]
    UnknownKey { key: String, file: PathBuf },

    /// Field type string outside the closed semantic type set
    #[error("invalid field type '{spec}' for field '{field}' of entity '{entity}'")]
    InvalidFieldType {
        entity: String,
        field: String,
        spec: String,
    },

    /// `extends` chain that never terminates
    #[error("cyclic inheritance: entity '{entity}' extends itself through chain {chain:?}")]
    CyclicInheritance { entity: String, chain: Vec<String> },

    /// `extends` names an entity that does not exist
    #[error("entity '{entity}' extends unknown entity '{parent}'")]
    UnknownParent { entity: String, parent: String },

    /// Configuration file extension is neither YAML nor JSON
    #[error("unsupported configuration format for {file} - expected .yaml, .yml or .json")]
    UnsupportedFormat { file: PathBuf },
}

/// Errors raised while resolving or rendering templates
///
/// Always pre-write: a template failure aborts the run before anything
/// reaches the output tree.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// No registered directory provides the requested template
    #[error("template '{name}' of kind '{kind}' not found in any registered directory")]
    NotFound { name: String, kind: String },

    /// Template source failed to compile
    #[error("syntax error in template {path}: {message}")]
    Syntax { path: PathBuf, message: String },

    /// No mapping from a semantic field type to the output kind's language
    #[error("no type mapping for '{semantic}' in output kind '{kind}'")]
    UnsupportedType { semantic: String, kind: String },

    /// Render-time failure (strict-mode missing variable, helper error)
    #[error("failed to render template '{name}' for {path}: {message}")]
    Render {
        name: String,
        path: PathBuf,
        message: String,
    },

    /// Render exceeded its wall-clock budget
    #[error("template '{name}' exceeded render budget of {budget_ms}ms")]
    Timeout { name: String, budget_ms: u64 },

    /// IO error while loading template sources
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the generation orchestrator
#[derive(Error, Debug)]
pub enum GenerationError {
    /// Validation produced error-severity findings; generation is blocked
    #[error("validation failed with {errors} error(s) for domain '{domain}'")]
    ValidationFailed { domain: String, errors: usize },

    /// Two templates planned the same output path
    #[error("duplicate output path '{path}' planned by templates '{first}' and '{second}'")]
    DuplicateOutputPath {
        path: PathBuf,
        first: String,
        second: String,
    },

    /// Another run holds the lock for this domain
    #[error("a generation run is already in progress for domain '{domain}'")]
    RunInProgress { domain: String },

    /// The run was cancelled before promotion
    #[error("generation run '{run_id}' was cancelled")]
    Cancelled { run_id: String },

    /// Failure while writing into the staging area or promoting it
    #[error("failed to write {path}: {message}")]
    WriteFailed { path: PathBuf, message: String },

    /// Post-validation found a written file whose hash does not match
    #[error("post-validation failed for {path}: expected {expected}, found {actual}")]
    PostValidation {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Run metadata could not be loaded or persisted
    #[error("run metadata error at {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    /// Incremental regeneration requested without a prior run
    #[error("no prior generation run recorded under {output_root}")]
    NoPriorRun { output_root: PathBuf },

    /// IO error during orchestration
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while restoring a snapshot
#[derive(Error, Debug)]
pub enum RollbackError {
    /// No backup is retained for the requested run
    #[error("no snapshot retained for run '{run_id}'")]
    SnapshotMissing { run_id: String },

    /// The snapshot exists but could not be restored
    #[error("failed to restore snapshot for run '{run_id}': {message}")]
    RestoreFailed { run_id: String, message: String },

    /// IO error during restore
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
