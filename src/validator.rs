//! Graph integrity validation.
//!
//! Scans a snapshot for dependency cycles, dangling edges, domain lint
//! violations and (optionally) schema violations. Every check runs
//! against every atom; none short-circuits another. Problems are
//! returned as [`IntegrityIssue`] values, never raised.
//!
//! ## Cycle Detection
//!
//! Depth-first walk over the configured dependency edges using an
//! explicit stack and index-addressed visit state. When the walk reaches
//! an atom that is still on the stack it reports one CYCLE anchored at
//! that atom and does not descend further along that edge. Full cycle
//! membership is not enumerated.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ValidatorConfig;
use crate::schema::SchemaRegistry;
use crate::store::{AtomStore, InMemoryAtomStore};
use crate::types::{
    Atom, AtomId, AtomKind, Criticality, EdgeKind, IntegrityIssue, IssueType, LintRule, Severity,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    OnStack,
    Done,
}

/// Result of a validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// All issues found.
    pub issues: Vec<IntegrityIssue>,
    /// Atoms scanned.
    pub atoms_checked: usize,
    /// Edges scanned.
    pub edges_checked: usize,
}

impl ValidationReport {
    /// Issues with the given code.
    pub fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a IntegrityIssue> + 'a {
        self.issues.iter().filter(move |i| i.code() == code)
    }

    /// Number of issues with the given code.
    pub fn count(&self, code: &str) -> usize {
        self.with_code(code).count()
    }

    /// Issues at or above a severity.
    pub fn at_least(&self, severity: Severity) -> Vec<&IntegrityIssue> {
        self.issues.iter().filter(|i| i.severity >= severity).collect()
    }

    /// Whether any ERROR or CRITICAL issue was found.
    pub fn has_blocking_issues(&self) -> bool {
        self.issues.iter().any(|i| i.severity >= Severity::Error)
    }
}

/// Structural validator for atom graphs.
#[derive(Debug, Clone, Default)]
pub struct IntegrityValidator {
    config: ValidatorConfig,
    schemas: Option<Arc<SchemaRegistry>>,
}

impl IntegrityValidator {
    /// Create a validator without schema checks.
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config, schemas: None }
    }

    /// Also run schema validation against every atom.
    pub fn with_schemas(mut self, schemas: Arc<SchemaRegistry>) -> Self {
        self.schemas = Some(schemas);
        self
    }

    /// Validator configuration.
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate a bare atom collection.
    pub fn validate_atoms(&self, atoms: impl IntoIterator<Item = Atom>) -> ValidationReport {
        self.validate(&InMemoryAtomStore::from_atoms(atoms))
    }

    /// Validate a snapshot.
    pub fn validate<S: AtomStore + ?Sized>(&self, store: &S) -> ValidationReport {
        let atoms = store.atoms();
        let mut issues = Vec::new();

        issues.extend(self.detect_cycles(&atoms));
        issues.extend(Self::detect_broken_refs(store, &atoms));
        for atom in &atoms {
            issues.extend(self.lint(atom));
            if let Some(schemas) = &self.schemas {
                issues.extend(schemas.validate(atom));
            }
        }

        for issue in &issues {
            issue.log();
        }

        let report = ValidationReport {
            atoms_checked: atoms.len(),
            edges_checked: atoms.iter().map(|a| a.edges.len()).sum(),
            issues,
        };
        tracing::info!(
            atoms = report.atoms_checked,
            edges = report.edges_checked,
            issues = report.issues.len(),
            blocking = report.has_blocking_issues(),
            "graph validation complete"
        );
        report
    }

    fn detect_cycles(&self, atoms: &[&Atom]) -> Vec<IntegrityIssue> {
        let index: HashMap<&AtomId, usize> = atoms.iter().enumerate().map(|(i, a)| (&a.id, i)).collect();
        let mut state = vec![VisitState::Unvisited; atoms.len()];
        let mut issues = Vec::new();
        let follows = |kind: EdgeKind| self.config.cycle_edges.contains(&kind);

        for root in 0..atoms.len() {
            if state[root] != VisitState::Unvisited {
                continue;
            }
            // (atom index, next edge position)
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            state[root] = VisitState::OnStack;

            while let Some(&(node, pos)) = stack.last() {
                let next = atoms[node]
                    .edges
                    .iter()
                    .enumerate()
                    .skip(pos)
                    .find(|(_, e)| follows(e.kind));

                let Some((edge_pos, edge)) = next else {
                    state[node] = VisitState::Done;
                    stack.pop();
                    continue;
                };
                if let Some(top) = stack.last_mut() {
                    top.1 = edge_pos + 1;
                }

                let Some(&target) = index.get(&edge.target) else {
                    continue;
                };
                match state[target] {
                    VisitState::Unvisited => {
                        state[target] = VisitState::OnStack;
                        stack.push((target, 0));
                    }
                    VisitState::OnStack => {
                        let anchor = &atoms[target].id;
                        let from = &atoms[node].id;
                        issues.push(IntegrityIssue::new(
                            IssueType::Cycle,
                            Severity::Error,
                            format!("dependency cycle re-enters '{anchor}' via {} from '{from}'", edge.kind),
                            vec![anchor.clone(), from.clone()],
                        ));
                    }
                    VisitState::Done => {}
                }
            }
        }

        issues
    }

    fn detect_broken_refs<S: AtomStore + ?Sized>(store: &S, atoms: &[&Atom]) -> Vec<IntegrityIssue> {
        atoms
            .iter()
            .flat_map(|atom| atom.edges.iter().map(move |edge| (atom, edge)))
            .filter(|(_, edge)| !store.contains(&edge.target))
            .map(|(atom, edge)| {
                IntegrityIssue::new(
                    IssueType::BrokenRef,
                    Severity::Critical,
                    format!("{} edge from '{}' targets missing atom '{}'", edge.kind, atom.id, edge.target),
                    vec![atom.id.clone(), edge.target.clone()],
                )
            })
            .collect()
    }

    fn lint(&self, atom: &Atom) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();

        if atom.kind == AtomKind::Process && !atom.has_edge(EdgeKind::PerformedBy) {
            issues.push(IntegrityIssue::lint(
                LintRule::MissingPerformer,
                atom.id.clone(),
                format!("process '{}' has no PERFORMED_BY edge", atom.id),
            ));
        }

        if atom.criticality() == Some(Criticality::Critical) && !has_documented_exception(atom) {
            issues.push(IntegrityIssue::lint(
                LintRule::UndocumentedCriticalAtom,
                atom.id.clone(),
                format!("critical atom '{}' documents no exception handling", atom.id),
            ));
        }

        if atom.name.trim().chars().count() < self.config.min_display_name_len {
            issues.push(IntegrityIssue::lint(
                LintRule::ShortDisplayName,
                atom.id.clone(),
                format!("display name '{}' is shorter than {} characters", atom.name, self.config.min_display_name_len),
            ));
        }

        issues
    }
}

fn has_documented_exception(atom: &Atom) -> bool {
    let in_metadata = atom.metadata.as_ref().is_some_and(|m| !m.exceptions.is_empty());
    let in_attributes = match atom.attributes.get("exceptions") {
        Some(serde_json::Value::Array(items)) => !items.is_empty(),
        Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
        _ => false,
    };
    in_metadata || in_attributes
}
