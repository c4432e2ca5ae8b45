//! Generation pipeline
//!
//! Planning, run bookkeeping, configuration diffing and the orchestrator
//! that drives validate / render / write / promote with rollback.

mod diff;
mod orchestrator;
mod plan;
mod run;

pub use diff::{diff_domains, ConfigDiff, EntityChange};
pub use orchestrator::{GenerateOptions, GenerationOutcome, Orchestrator};
pub use plan::{build_plan, PlanRule, PlannedFile, RuleScope, DEFAULT_RULES};
pub use run::{
    GeneratedArtifact, GenerationRun, RunStatus, RunStore, BACKUP_RETENTION,
};
