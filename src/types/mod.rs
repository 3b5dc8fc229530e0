//! Core types for the graph kernel.

pub mod atom;
pub mod edge;
pub mod issue;
pub mod plan;
pub mod value;

pub use atom::{Atom, AtomId, AtomKind, AtomMetadata, Criticality};
pub use edge::{Edge, EdgeKind};
pub use issue::{IntegrityIssue, IssueType, LintRule, Severity};
pub use plan::{
    ExecutionPlan, PlanFingerprint, PlanStep, PlanWarning, StepAnnotation, StepId, StepStatus,
    StepTarget,
};
