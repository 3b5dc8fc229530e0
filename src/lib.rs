//! # atom-graph-kernel
//!
//! Planning and governance core for business-process knowledge graphs.
//!
//! The kernel answers three questions about a resident atom graph:
//!
//! > Is the graph structurally sound? What would executing this atom
//! > entail? Is this action allowed here?
//!
//! ## Core Contract
//!
//! 1. Validation reports structural defects as data, never as errors
//! 2. Planning resolves a target into an ordered, budgeted execution plan
//! 3. Governance returns a synchronous allow/deny decision with a reason
//! 4. Every plan, query and governance call leaves exactly one audit entry
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────── RuleSet ────────────┐
//!                 ↓                                 ↓
//! AtomStore → Planner → ExecutionPlan     GovernanceEngine → Decision
//!     │                                             │
//!     ├──→ IntegrityValidator (+ SchemaRegistry)    │
//!     └──→ QueryEngine → QueryResult                │
//!                 └──────────→ AuditLog ←───────────┘
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same graph + same rules + same inputs → identical plan fingerprint
//! - Atom ordering is canonical (by AtomId)
//! - Rule ordering is canonical (descending priority, authored order on ties)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod canonical;
pub mod config;
pub mod governance;
pub mod kernel;
pub mod planner;
pub mod query;
pub mod rules;
pub mod schema;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod validator;
pub mod version;

// Re-exports
pub use types::{
    Atom, AtomId, AtomKind, AtomMetadata, Criticality, Edge, EdgeKind, ExecutionPlan, IntegrityIssue, IssueType,
    LintRule, PlanFingerprint, PlanStep, PlanWarning, Severity, StepAnnotation, StepId, StepStatus, StepTarget,
};
pub use audit::{
    AuditAction, AuditEntry, AuditFilter, AuditLog, AuditStatus, ComplianceReport, InMemoryAuditLog, SealedEntry,
};
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
pub use config::{
    ConfigError, GovernanceConfig, KernelConfig, PlannerConfig, SchemaConfig, ValidatorConfig,
    DEFAULT_MIN_DISPLAY_NAME_LEN, DEFAULT_STEP_LATENCY_MS,
};
pub use governance::{DecisionSource, DefaultPolicy, GovernanceDecision, GovernanceEngine, PolicyContext};
pub use kernel::{GraphKernel, GraphKernelBuilder};
pub use planner::{PlanError, PlanOptions, Planner};
pub use query::{QueryEngine, QueryOperator, QueryResult, QueryTrace, SemanticQuery, SortDirection};
pub use rules::{
    BusinessRule, ConditionGroup, ConditionNode, InsertPosition, LogicalOperator, Operator, PhaseDescriptor,
    RuleAction, RuleCondition, RuleEffect, RuleSet,
};
pub use schema::{NodeSchema, SchemaRegistry, UnknownKindPolicy};
pub use store::{AtomStore, InMemoryAtomStore};
pub use telemetry::{init_tracing, LogFormat, TelemetryError};
pub use validator::{IntegrityValidator, ValidationReport};
pub use version::{
    Migration, MigrationError, MigrationReport, ReplayChanges, SchemaChange, SchemaVersion, VersionError,
    VersionManager,
};

/// Schema version of the serialized kernel types.
/// Increment on breaking changes to any serialized type.
pub const GRAPH_KERNEL_SCHEMA_VERSION: &str = "1.0.0";
