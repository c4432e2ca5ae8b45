//! Appforge - configuration-driven application code generator
//!
//! Appforge turns a declarative domain configuration (entities, fields,
//! relationships, workflows) into a complete multi-file application
//! scaffold: backend models, API schemas, frontend components, tests and
//! deployment manifests. Generation is validated up front, rendered
//! through overridable templates, written atomically, and tracked per
//! run so any retained run can be rolled back.

pub mod api;
pub mod engine;
pub mod error;
pub mod fsops;
pub mod generate;
pub mod hash;
pub mod model;
pub mod parser;
pub mod registry;
pub mod validator;

// Re-exports for convenience
pub use api::{diff_configs, generate, generate_with_templates, load_config, rollback, validate_config};
pub use engine::{CancellationFlag, TemplateEngine, TypeMap};
pub use error::{
    ConfigurationError, ForgeError, ForgeResult, GenerationError, RollbackError, TemplateError,
};
pub use generate::{
    ConfigDiff, GenerateOptions, GenerationOutcome, GenerationRun, Orchestrator, RunStatus,
};
pub use model::{DomainConfig, EntityConfig, FieldConfig, FieldType, RelationshipConfig};
pub use parser::{parse_file, parse_str, ConfigFormat};
pub use registry::{Template, TemplateInfo, TemplateRegistry};
pub use validator::{validate, Severity, ValidationIssue, ValidationReport};
