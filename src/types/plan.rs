//! Execution plan types.
//!
//! ## Plan Invariants
//!
//! 1. **Closed dependencies**: every id in `step.depends_on` is the id of a step in the same plan
//! 2. **Dependency-first order**: a step appears after the atoms it depends on, except where a cycle forces otherwise
//! 3. **Determinism**: same graph + rules + inputs → identical steps, totals, fired rules and fingerprint

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::atom::{AtomId, Criticality};
use crate::canonical::{canonical_hash_hex, quantize};

/// Identifier of a step within one plan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Step id for an atom.
    pub fn for_atom(id: &AtomId) -> Self {
        Self(format!("step:{id}"))
    }

    /// Step id for a phase injected by a rule.
    pub fn for_phase(rule: &str, phase_id: &str) -> Self {
        Self(format!("phase:{rule}:{phase_id}"))
    }

    /// Get the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a step executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepTarget {
    /// An atom from the graph.
    Atom {
        /// Target atom.
        atom_id: AtomId,
    },
    /// A phase injected by a business rule.
    Phase {
        /// Phase identifier.
        phase_id: String,
        /// Phase display name.
        name: String,
    },
}

impl StepTarget {
    /// Atom id, if this step targets an atom.
    pub fn atom_id(&self) -> Option<&AtomId> {
        match self {
            Self::Atom { atom_id } => Some(atom_id),
            Self::Phase { .. } => None,
        }
    }
}

/// Execution status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet run.
    #[default]
    Pending,
    /// Ran successfully.
    Completed,
    /// Ran and failed.
    Failed,
    /// Will not run.
    Skipped,
}

/// Why a rule touched a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepAnnotation {
    /// Rule that fired.
    pub rule: String,
    /// Reason carried by the rule action.
    pub reason: String,
    /// Criticality carried by the rule action.
    pub criticality: Criticality,
}

/// One unit of an execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Step identifier.
    pub id: StepId,
    /// What this step executes.
    pub target: StepTarget,
    /// Steps that must complete first.
    pub depends_on: Vec<StepId>,
    /// Alternate atom if the target is unavailable.
    pub fallback: Option<AtomId>,
    /// Execution status.
    pub status: StepStatus,
    /// Estimated cost of this step.
    pub estimated_cost: f64,
    /// Estimated latency of this step in milliseconds.
    pub estimated_latency_ms: u64,
    /// Rule annotations, in firing order.
    #[serde(default)]
    pub annotations: Vec<StepAnnotation>,
}

impl PlanStep {
    /// Create a pending step for an atom.
    pub fn for_atom(atom_id: AtomId, cost: f64, latency_ms: u64) -> Self {
        Self {
            id: StepId::for_atom(&atom_id),
            target: StepTarget::Atom { atom_id },
            depends_on: Vec::new(),
            fallback: None,
            status: StepStatus::Pending,
            estimated_cost: cost,
            estimated_latency_ms: latency_ms,
            annotations: Vec::new(),
        }
    }

    /// Create a pending step for an injected phase.
    pub fn for_phase(id: StepId, phase_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            target: StepTarget::Phase {
                phase_id: phase_id.into(),
                name: name.into(),
            },
            depends_on: Vec::new(),
            fallback: None,
            status: StepStatus::Pending,
            estimated_cost: 0.0,
            estimated_latency_ms: 0,
            annotations: Vec::new(),
        }
    }
}

/// Non-fatal conditions attached to a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanWarning {
    /// Total latency exceeds the advisory budget.
    LatencyBudgetExceeded {
        /// Caller-supplied ceiling.
        limit_ms: u64,
        /// Planned total.
        actual_ms: u64,
    },
    /// A dependency edge points at a missing atom and was skipped.
    BrokenDependency {
        /// Source atom.
        from: AtomId,
        /// Missing target.
        to: AtomId,
    },
    /// A visited atom violates its schema.
    SchemaViolation {
        /// Offending atom.
        atom_id: AtomId,
        /// Description.
        message: String,
    },
    /// A rule action referenced a step that is not in the plan.
    UnresolvedReference {
        /// Rule that fired.
        rule: String,
        /// Missing reference.
        reference: AtomId,
    },
}

/// Fingerprint of a plan for determinism checks and caching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanFingerprint(String);

impl PlanFingerprint {
    /// Get the fingerprint as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlanFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered, budgeted execution plan for a target atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Caller-stated goal.
    pub goal: String,
    /// Target atom the plan resolves.
    pub target: AtomId,
    /// Steps in dependency-first insertion order.
    pub steps: Vec<PlanStep>,
    /// Sum of visited atoms' declared cost.
    pub total_cost: f64,
    /// Sum of visited atoms' latency.
    pub total_latency_ms: u64,
    /// Names of rules whose conditions matched, highest priority first.
    pub fired_rules: Vec<String>,
    /// Non-fatal warnings.
    pub warnings: Vec<PlanWarning>,
    /// Content-derived fingerprint.
    pub fingerprint: PlanFingerprint,
}

impl ExecutionPlan {
    /// Assemble a plan and compute its fingerprint.
    pub fn new(
        goal: String,
        target: AtomId,
        steps: Vec<PlanStep>,
        total_cost: f64,
        total_latency_ms: u64,
        fired_rules: Vec<String>,
        warnings: Vec<PlanWarning>,
    ) -> Self {
        let fingerprint = Self::compute_fingerprint(&goal, &target, &steps, total_cost, total_latency_ms, &fired_rules);
        Self {
            goal,
            target,
            steps,
            total_cost,
            total_latency_ms,
            fired_rules,
            warnings,
            fingerprint,
        }
    }

    fn compute_fingerprint(
        goal: &str,
        target: &AtomId,
        steps: &[PlanStep],
        total_cost: f64,
        total_latency_ms: u64,
        fired_rules: &[String],
    ) -> PlanFingerprint {
        let step_keys: Vec<_> = steps
            .iter()
            .map(|s| {
                (
                    &s.id,
                    &s.target,
                    &s.depends_on,
                    &s.fallback,
                    s.status,
                    quantize(s.estimated_cost),
                    s.estimated_latency_ms,
                    &s.annotations,
                )
            })
            .collect();
        let canonical = (goal, target, step_keys, quantize(total_cost), total_latency_ms, fired_rules);
        PlanFingerprint(canonical_hash_hex(&canonical))
    }

    /// Look up a step by id.
    pub fn step(&self, id: &StepId) -> Option<&PlanStep> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Look up the step for an atom.
    pub fn step_for_atom(&self, atom_id: &AtomId) -> Option<&PlanStep> {
        self.step(&StepId::for_atom(atom_id))
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check that every dependency id names a step in this plan.
    pub fn dependencies_closed(&self) -> bool {
        let ids: BTreeSet<&StepId> = self.steps.iter().map(|s| &s.id).collect();
        self.steps
            .iter()
            .all(|s| s.depends_on.iter().all(|d| ids.contains(d)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan(goal: &str) -> ExecutionPlan {
        let mut root = PlanStep::for_atom(AtomId::new("a"), 1.0, 100);
        let leaf = PlanStep::for_atom(AtomId::new("b"), 2.0, 100);
        root.depends_on.push(leaf.id.clone());
        ExecutionPlan::new(
            goal.to_string(),
            AtomId::new("a"),
            vec![leaf, root],
            3.0,
            200,
            vec![],
            vec![],
        )
    }

    #[test]
    fn test_fingerprint_determinism() {
        assert_eq!(sample_plan("g").fingerprint, sample_plan("g").fingerprint);
        assert_ne!(sample_plan("g").fingerprint, sample_plan("h").fingerprint);
    }

    #[test]
    fn test_fingerprint_covers_step_target_and_annotations() {
        let base = sample_plan("g");

        let mut replaced = base.clone();
        replaced.steps[0].target = StepTarget::Phase {
            phase_id: "manual".into(),
            name: "Manual entry".into(),
        };
        let mut annotated = base.clone();
        annotated.steps[1].annotations.push(StepAnnotation {
            rule: "audit".into(),
            reason: "flagged".into(),
            criticality: Criticality::Low,
        });
        let mut with_fallback = base.clone();
        with_fallback.steps[0].fallback = Some(AtomId::new("b2"));

        for changed in [replaced, annotated, with_fallback] {
            let rebuilt = ExecutionPlan::new(
                changed.goal.clone(),
                changed.target.clone(),
                changed.steps,
                changed.total_cost,
                changed.total_latency_ms,
                changed.fired_rules,
                changed.warnings,
            );
            assert_ne!(rebuilt.fingerprint, base.fingerprint);
        }
    }

    #[test]
    fn test_dependencies_closed() {
        let mut plan = sample_plan("g");
        assert!(plan.dependencies_closed());

        plan.steps[1].depends_on.push(StepId::for_atom(&AtomId::new("zzz")));
        assert!(!plan.dependencies_closed());
    }

    #[test]
    fn test_step_lookup() {
        let plan = sample_plan("g");
        let step = plan.step_for_atom(&AtomId::new("a")).unwrap();
        assert_eq!(step.depends_on, vec![StepId::for_atom(&AtomId::new("b"))]);
        assert_eq!(step.target.atom_id(), Some(&AtomId::new("a")));
    }
}
