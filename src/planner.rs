//! Dependency-aware execution planner.
//!
//! Resolves a target atom into an ordered, budgeted [`ExecutionPlan`].
//!
//! ## Algorithm
//!
//! 1. Rule phase: evaluate every enabled rule, highest priority first,
//!    against `caller context + {"target": <atom>, "goal": <goal>}`.
//!    Matches are recorded by name; plan mutations are queued.
//! 2. Dependency phase: post-order walk from the target over the
//!    configured traversal edges using an explicit stack. Each atom is
//!    visited once and emits one step after its dependencies.
//! 3. Modification phase: queued mutations apply in firing order.
//! 4. Budgets: cost over `max_cost` fails the call; latency over
//!    `max_latency_ms` attaches a warning.
//!
//! Steps come out in dependency-first insertion order. No parallel
//! grouping is computed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::audit::{AuditAction, AuditEntry, AuditLog, AuditStatus};
use crate::config::PlannerConfig;
use crate::rules::{BusinessRule, InsertPosition, RuleEffect, RuleSet};
use crate::schema::SchemaRegistry;
use crate::store::AtomStore;
use crate::types::{
    Atom, AtomId, EdgeKind, ExecutionPlan, PlanStep, PlanWarning, StepAnnotation, StepId, StepStatus,
    StepTarget,
};

/// Error type for planning.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    /// Target atom not in the snapshot.
    #[error("Target atom not found: {0}")]
    TargetNotFound(AtomId),
    /// Total cost over the caller's ceiling.
    #[error("Plan cost {actual} exceeds budget {limit}")]
    BudgetExceeded {
        /// Caller-supplied ceiling.
        limit: f64,
        /// Planned total.
        actual: f64,
    },
}

/// Per-call planning options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOptions {
    /// Who is planning.
    pub actor: String,
    /// Caller context merged into the rule context.
    #[serde(default)]
    pub context: Value,
    /// Hard cost ceiling.
    #[serde(default)]
    pub max_cost: Option<f64>,
    /// Advisory latency ceiling.
    #[serde(default)]
    pub max_latency_ms: Option<u64>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self::new("system")
    }
}

impl PlanOptions {
    /// Options for an actor, with no context and no budgets.
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            context: Value::Object(Map::new()),
            max_cost: None,
            max_latency_ms: None,
        }
    }

    /// Set the caller context.
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Set a hard cost ceiling.
    pub fn with_max_cost(mut self, max_cost: f64) -> Self {
        self.max_cost = Some(max_cost);
        self
    }

    /// Set an advisory latency ceiling.
    pub fn with_max_latency_ms(mut self, max_latency_ms: u64) -> Self {
        self.max_latency_ms = Some(max_latency_ms);
        self
    }
}

/// Dependency-aware planner.
pub struct Planner<S: AtomStore> {
    store: Arc<S>,
    rules: Arc<RuleSet>,
    schemas: Option<Arc<SchemaRegistry>>,
    config: PlannerConfig,
    audit: Arc<dyn AuditLog>,
}

impl<S: AtomStore> Planner<S> {
    /// Create a planner.
    pub fn new(store: Arc<S>, rules: Arc<RuleSet>, config: PlannerConfig, audit: Arc<dyn AuditLog>) -> Self {
        Self {
            store,
            rules,
            schemas: None,
            config,
            audit,
        }
    }

    /// Attach schema warnings for visited atoms.
    pub fn with_schemas(mut self, schemas: Arc<SchemaRegistry>) -> Self {
        self.schemas = Some(schemas);
        self
    }

    /// Planner configuration.
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Resolve `target` into an execution plan. Records one audit entry
    /// whether or not planning succeeds.
    pub fn plan(&self, goal: &str, target: &AtomId, options: &PlanOptions) -> Result<ExecutionPlan, PlanError> {
        let start = Instant::now();
        let result = self.build(goal, target, options);
        let elapsed = start.elapsed().as_millis() as u64;

        let entry = AuditEntry::new(options.actor.clone(), AuditAction::Plan, AuditStatus::Success)
            .with_query(format!("{goal} -> {target}"))
            .with_latency_ms(elapsed);
        let entry = match &result {
            Ok(plan) => {
                tracing::info!(
                    target_atom = %target,
                    steps = plan.len(),
                    total_cost = plan.total_cost,
                    total_latency_ms = plan.total_latency_ms,
                    fired_rules = plan.fired_rules.len(),
                    fingerprint = %plan.fingerprint,
                    "plan resolved"
                );
                plan.fired_rules.iter().fold(
                    entry.with_result_count(plan.len()).with_cost(plan.total_cost),
                    |e, rule| e.with_reason(format!("rule fired: {rule}")),
                )
            }
            Err(e) => {
                tracing::info!(target_atom = %target, error = %e, "planning failed");
                AuditEntry {
                    status: AuditStatus::Failure,
                    ..entry
                }
                .with_reason(e.to_string())
            }
        };
        self.audit.record(entry);

        result
    }

    fn build(&self, goal: &str, target_id: &AtomId, options: &PlanOptions) -> Result<ExecutionPlan, PlanError> {
        let target = self
            .store
            .get_atom(target_id)
            .ok_or_else(|| PlanError::TargetNotFound(target_id.clone()))?;

        // Rule phase
        let context = rule_context(&options.context, target, goal);
        let fired: Vec<&BusinessRule> = self.rules.matching(&context).collect();
        let fired_rules: Vec<String> = fired.iter().map(|r| r.name.clone()).collect();

        // Dependency phase
        let mut warnings = Vec::new();
        let mut steps = self.resolve_dependencies(target, &mut warnings);
        let total_cost: f64 = steps.iter().map(|s| s.estimated_cost).sum();
        let total_latency_ms = steps
            .iter()
            .map(|s| s.estimated_latency_ms)
            .fold(0u64, u64::saturating_add);

        if let Some(schemas) = &self.schemas {
            for step in &steps {
                let Some(atom) = step.target.atom_id().and_then(|id| self.store.get_atom(id)) else {
                    continue;
                };
                warnings.extend(schemas.validate(atom).into_iter().map(|issue| PlanWarning::SchemaViolation {
                    atom_id: atom.id.clone(),
                    message: issue.message,
                }));
            }
        }

        // Modification phase
        for rule in fired.iter().filter(|r| r.action.effect.is_plan_mutation()) {
            apply_mutation(rule, target_id, &mut steps, &mut warnings);
        }

        if let Some(limit) = options.max_cost {
            if total_cost > limit {
                return Err(PlanError::BudgetExceeded {
                    limit,
                    actual: total_cost,
                });
            }
        }
        if let Some(limit_ms) = options.max_latency_ms {
            if total_latency_ms > limit_ms {
                tracing::warn!(limit_ms, actual_ms = total_latency_ms, "plan exceeds latency budget");
                warnings.push(PlanWarning::LatencyBudgetExceeded {
                    limit_ms,
                    actual_ms: total_latency_ms,
                });
            }
        }

        Ok(ExecutionPlan::new(
            goal.to_string(),
            target_id.clone(),
            steps,
            total_cost,
            total_latency_ms,
            fired_rules,
            warnings,
        ))
    }

    fn resolve_dependencies(&self, target: &Atom, warnings: &mut Vec<PlanWarning>) -> Vec<PlanStep> {
        let follows = |kind: EdgeKind| self.config.traversal_edges.contains(&kind);
        let mut visited: HashSet<&AtomId> = HashSet::from([&target.id]);
        let mut steps = Vec::new();
        // (atom, next edge position)
        let mut stack: Vec<(&Atom, usize)> = vec![(target, 0)];

        while let Some(&(atom, pos)) = stack.last() {
            let next = atom.edges.iter().enumerate().skip(pos).find(|(_, e)| follows(e.kind));

            let Some((edge_pos, edge)) = next else {
                stack.pop();
                steps.push(self.step_for(atom));
                continue;
            };
            if let Some(top) = stack.last_mut() {
                top.1 = edge_pos + 1;
            }

            match self.store.get_atom(&edge.target) {
                None => {
                    tracing::warn!(from = %atom.id, to = %edge.target, "skipping missing dependency");
                    warnings.push(PlanWarning::BrokenDependency {
                        from: atom.id.clone(),
                        to: edge.target.clone(),
                    });
                }
                Some(dep) => {
                    if visited.insert(&dep.id) {
                        stack.push((dep, 0));
                    }
                }
            }
        }

        steps
    }

    fn step_for(&self, atom: &Atom) -> PlanStep {
        let cost = atom.declared_cost().unwrap_or(0.0);
        let latency = atom.declared_latency_ms().unwrap_or(self.config.default_latency_ms);
        let mut step = PlanStep::for_atom(atom.id.clone(), cost, latency);

        for edge in atom.edges.iter().filter(|e| self.config.traversal_edges.contains(&e.kind)) {
            if !self.store.contains(&edge.target) {
                continue;
            }
            let dep = StepId::for_atom(&edge.target);
            if !step.depends_on.contains(&dep) {
                step.depends_on.push(dep);
            }
        }
        step.fallback = atom.first_fallback().cloned();

        tracing::debug!(atom = %atom.id, cost, latency_ms = latency, deps = step.depends_on.len(), "step planned");
        step
    }
}

fn rule_context(caller: &Value, target: &Atom, goal: &str) -> Value {
    let mut map = match caller {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    map.insert("target".to_string(), target.to_value());
    map.insert("goal".to_string(), Value::String(goal.to_string()));
    Value::Object(map)
}

fn apply_mutation(rule: &BusinessRule, plan_target: &AtomId, steps: &mut Vec<PlanStep>, warnings: &mut Vec<PlanWarning>) {
    let reference = match &rule.action.effect {
        RuleEffect::InsertPhase { reference, .. }
        | RuleEffect::RemoveStep { reference }
        | RuleEffect::ReplaceStep { reference, .. }
        | RuleEffect::ModifyStep { reference } => reference.clone().unwrap_or_else(|| plan_target.clone()),
        RuleEffect::Allow | RuleEffect::Deny | RuleEffect::Escalate => return,
    };

    let ref_id = StepId::for_atom(&reference);
    let Some(index) = steps.iter().position(|s| s.id == ref_id) else {
        warnings.push(PlanWarning::UnresolvedReference {
            rule: rule.name.clone(),
            reference,
        });
        return;
    };

    let annotation = StepAnnotation {
        rule: rule.name.clone(),
        reason: rule.action.reason.clone(),
        criticality: rule.action.criticality,
    };

    match &rule.action.effect {
        RuleEffect::InsertPhase { phase, position, .. } => {
            let mut injected = PlanStep::for_phase(StepId::for_phase(&rule.name, &phase.id), &phase.id, &phase.name);
            injected.annotations.push(annotation);
            if position.precedes_reference() {
                steps[index].depends_on.push(injected.id.clone());
            } else {
                injected.depends_on.push(ref_id);
            }
            let at = match position {
                InsertPosition::AtStart => 0,
                InsertPosition::Before => index,
                InsertPosition::After => index + 1,
                InsertPosition::AtEnd => steps.len(),
            };
            steps.insert(at, injected);
        }
        RuleEffect::RemoveStep { .. } => {
            steps[index].status = StepStatus::Skipped;
            steps[index].annotations.push(annotation);
        }
        RuleEffect::ReplaceStep { phase, .. } => {
            steps[index].target = StepTarget::Phase {
                phase_id: phase.id.clone(),
                name: phase.name.clone(),
            };
            steps[index].annotations.push(annotation);
        }
        RuleEffect::ModifyStep { .. } => steps[index].annotations.push(annotation),
        RuleEffect::Allow | RuleEffect::Deny | RuleEffect::Escalate => {}
    }
    tracing::debug!(rule = %rule.name, reference = %reference, "rule applied to plan");
}
