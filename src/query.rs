//! Semantic queries over atom collections.
//!
//! A [`SemanticQuery`] is built fluently, but execution order is fixed:
//! every filter runs first (in declaration order), then the stable sort,
//! then the limit. Calling `.limit()` before `.filter()` therefore does
//! not truncate before filtering.
//!
//! Field names resolve through [`Atom::resolve_field`]: top-level fields,
//! content attributes, metrics, then extended metadata.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::{AuditAction, AuditEntry, AuditLog, AuditStatus};
use crate::store::AtomStore;
use crate::types::value::{compare, contains, is_in, loose_eq, sort_key_cmp};
use crate::types::Atom;

/// Filter operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOperator {
    /// Coercing equality.
    Equals,
    /// Array membership or substring.
    Contains,
    /// Strictly greater.
    Gt,
    /// Strictly less.
    Lt,
    /// Membership in a supplied list.
    In,
}

impl QueryOperator {
    fn matches(&self, actual: &Value, expected: &Value) -> bool {
        match self {
            Self::Equals => loose_eq(actual, expected),
            Self::Contains => contains(actual, expected),
            Self::Gt => compare(actual, expected) == Some(Ordering::Greater),
            Self::Lt => compare(actual, expected) == Some(Ordering::Less),
            Self::In => is_in(actual, expected),
        }
    }
}

impl std::fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Equals => "equals",
            Self::Contains => "contains",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::In => "in",
        };
        f.write_str(s)
    }
}

/// One filter clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Field name or dotted path.
    pub field: String,
    /// Operator.
    pub operator: QueryOperator,
    /// Comparison value.
    pub value: Value,
}

impl QueryFilter {
    /// Whether an atom passes this filter. Missing fields never pass.
    pub fn matches(&self, atom: &Atom) -> bool {
        atom.resolve_field(&self.field)
            .is_some_and(|actual| self.operator.matches(&actual, &self.value))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// Sort clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    /// Field to sort on.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

/// Declarative query over atoms.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SemanticQuery {
    /// Filters, applied in order.
    #[serde(default)]
    pub filters: Vec<QueryFilter>,
    /// Optional sort.
    #[serde(default)]
    pub sort: Option<SortSpec>,
    /// Optional result cap.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SemanticQuery {
    /// Empty query matching everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter.
    pub fn filter(mut self, field: impl Into<String>, operator: QueryOperator, value: impl Into<Value>) -> Self {
        self.filters.push(QueryFilter {
            field: field.into(),
            operator,
            value: value.into(),
        });
        self
    }

    /// Sort the matches.
    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(SortSpec {
            field: field.into(),
            direction,
        });
        self
    }

    /// Cap the number of matches.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// One-line description used in audit entries.
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = self
            .filters
            .iter()
            .map(|f| format!("{} {} {}", f.field, f.operator, f.value))
            .collect();
        if let Some(sort) = &self.sort {
            let dir = match sort.direction {
                SortDirection::Asc => "asc",
                SortDirection::Desc => "desc",
            };
            parts.push(format!("sort {} {dir}", sort.field));
        }
        if let Some(limit) = self.limit {
            parts.push(format!("limit {limit}"));
        }
        if parts.is_empty() {
            "*".to_string()
        } else {
            parts.join(" | ")
        }
    }

    /// Run against a collection. Pure; no auditing.
    pub fn apply<'a>(&self, atoms: impl IntoIterator<Item = &'a Atom>) -> QueryResult {
        let mut current: Vec<&Atom> = atoms.into_iter().collect();
        let mut trace = QueryTrace {
            input: current.len(),
            ..QueryTrace::default()
        };

        for filter in &self.filters {
            let before = current.len();
            current.retain(|atom| filter.matches(atom));
            trace.filters.push(FilterTrace {
                field: filter.field.clone(),
                operator: filter.operator,
                before,
                eliminated: before - current.len(),
            });
        }

        if let Some(sort) = &self.sort {
            let keys: Vec<Option<Value>> = current.iter().map(|a| a.resolve_field(&sort.field)).collect();
            let mut order: Vec<usize> = (0..current.len()).collect();
            // sort_by is stable, so equal keys keep filter order
            order.sort_by(|&a, &b| {
                let ord = sort_key_cmp(keys[a].as_ref(), keys[b].as_ref());
                match sort.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => match (&keys[a], &keys[b]) {
                        (Some(_), Some(_)) => ord.reverse(),
                        _ => ord,
                    },
                }
            });
            current = order.into_iter().map(|i| current[i]).collect();
            trace.sort = Some(sort.clone());
        }

        if let Some(limit) = self.limit {
            if current.len() > limit {
                trace.truncation = Some(Truncation {
                    limit,
                    dropped: current.len() - limit,
                });
                current.truncate(limit);
            }
        }

        QueryResult {
            matches: current.into_iter().cloned().collect(),
            trace,
        }
    }
}

/// Elimination count for one filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterTrace {
    /// Filtered field.
    pub field: String,
    /// Operator.
    pub operator: QueryOperator,
    /// Candidates entering the filter.
    pub before: usize,
    /// Candidates removed by the filter.
    pub eliminated: usize,
}

/// Truncation applied by `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truncation {
    /// Requested cap.
    pub limit: usize,
    /// Matches dropped.
    pub dropped: usize,
}

/// How a query reduced its input.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryTrace {
    /// Collection size before filtering.
    pub input: usize,
    /// Per-filter elimination counts in application order.
    pub filters: Vec<FilterTrace>,
    /// Sort applied, if any.
    pub sort: Option<SortSpec>,
    /// Truncation applied, if the limit cut anything.
    pub truncation: Option<Truncation>,
}

/// Matches plus trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Matching atoms in result order.
    pub matches: Vec<Atom>,
    /// Reduction trace.
    pub trace: QueryTrace,
}

impl QueryResult {
    /// Number of matches.
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Whether nothing matched.
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Audited query execution over a store.
pub struct QueryEngine<S: AtomStore> {
    store: Arc<S>,
    audit: Arc<dyn AuditLog>,
}

impl<S: AtomStore> QueryEngine<S> {
    /// Create an engine.
    pub fn new(store: Arc<S>, audit: Arc<dyn AuditLog>) -> Self {
        Self { store, audit }
    }

    /// Execute a query and record one audit entry.
    pub fn execute(&self, query: &SemanticQuery, actor: &str) -> QueryResult {
        let start = Instant::now();
        let result = query.apply(self.store.atoms());
        let elapsed = start.elapsed().as_millis() as u64;

        tracing::info!(
            actor,
            query = %query.describe(),
            input = result.trace.input,
            matches = result.len(),
            "query executed"
        );

        let mut entry = AuditEntry::new(actor, AuditAction::Query, AuditStatus::Success)
            .with_query(query.describe())
            .with_result_count(result.len())
            .with_latency_ms(elapsed);
        for f in &result.trace.filters {
            entry = entry.with_reason(format!("{} {}: eliminated {} of {}", f.field, f.operator, f.eliminated, f.before));
        }
        if let Some(t) = result.trace.truncation {
            entry = entry.with_reason(format!("limit {} dropped {}", t.limit, t.dropped));
        }
        self.audit.record(entry);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditFilter, InMemoryAuditLog};
    use crate::store::InMemoryAtomStore;
    use crate::types::{AtomKind, AtomMetadata};
    use serde_json::json;

    fn atoms() -> Vec<Atom> {
        vec![
            Atom::new("a1", AtomKind::Process, "Account opening")
                .with_attribute("tags", json!(["kyc", "retail"]))
                .with_metric("volume", 40.0),
            Atom::new("a2", AtomKind::Process, "Loan review")
                .with_attribute("tags", json!(["credit"]))
                .with_metric("volume", 10.0),
            Atom::new("a3", AtomKind::System, "Core ledger")
                .with_metric("volume", 40.0)
                .with_metadata(AtomMetadata {
                    cost_per_invocation: Some(2.5),
                    ..Default::default()
                }),
            Atom::new("a4", AtomKind::Role, "Loan officer"),
        ]
    }

    fn ids(result: &QueryResult) -> Vec<&str> {
        result.matches.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn test_equals_on_kind() {
        let atoms = atoms();
        let result = SemanticQuery::new()
            .filter("kind", QueryOperator::Equals, "PROCESS")
            .apply(&atoms);
        assert_eq!(ids(&result), vec!["a1", "a2"]);
        assert_eq!(result.trace.filters[0].eliminated, 2);
    }

    #[test]
    fn test_contains_array_and_substring() {
        let atoms = atoms();
        let tagged = SemanticQuery::new().filter("tags", QueryOperator::Contains, "kyc").apply(&atoms);
        assert_eq!(ids(&tagged), vec!["a1"]);

        let named = SemanticQuery::new().filter("name", QueryOperator::Contains, "Loan").apply(&atoms);
        assert_eq!(ids(&named), vec!["a2", "a4"]);
    }

    #[test]
    fn test_metrics_and_metadata_resolve() {
        let atoms = atoms();
        let busy = SemanticQuery::new().filter("volume", QueryOperator::Gt, 20).apply(&atoms);
        assert_eq!(ids(&busy), vec!["a1", "a3"]);

        let cheap = SemanticQuery::new()
            .filter("cost_per_invocation", QueryOperator::Lt, 3)
            .apply(&atoms);
        assert_eq!(ids(&cheap), vec!["a3"]);
    }

    #[test]
    fn test_in_operator() {
        let atoms = atoms();
        let result = SemanticQuery::new()
            .filter("kind", QueryOperator::In, json!(["ROLE", "SYSTEM"]))
            .apply(&atoms);
        assert_eq!(ids(&result), vec!["a3", "a4"]);
    }

    #[test]
    fn test_limit_applies_after_filters_regardless_of_builder_order() {
        let atoms = atoms();
        let result = SemanticQuery::new()
            .limit(1)
            .filter("kind", QueryOperator::Equals, "PROCESS")
            .sort_by("volume", SortDirection::Asc)
            .apply(&atoms);
        assert_eq!(ids(&result), vec!["a2"]);
        assert_eq!(result.trace.truncation, Some(Truncation { limit: 1, dropped: 1 }));
    }

    #[test]
    fn test_sort_is_stable_and_missing_last() {
        let atoms = atoms();
        let asc = SemanticQuery::new().sort_by("volume", SortDirection::Asc).apply(&atoms);
        assert_eq!(ids(&asc), vec!["a2", "a1", "a3", "a4"]);

        let desc = SemanticQuery::new().sort_by("volume", SortDirection::Desc).apply(&atoms);
        assert_eq!(ids(&desc), vec!["a1", "a3", "a2", "a4"]);
    }

    #[test]
    fn test_mixed_type_keys_sort_the_same_from_any_input_order() {
        let ranked = |id: &str, rank: Value| Atom::new(id, AtomKind::Process, "Ranked step").with_attribute("rank", rank);
        let atoms = vec![ranked("a", json!(5)), ranked("b", json!("10a")), ranked("c", json!("2"))];
        let mut reversed = atoms.clone();
        reversed.reverse();

        let query = SemanticQuery::new().sort_by("rank", SortDirection::Asc);
        assert_eq!(ids(&query.apply(&atoms)), vec!["c", "a", "b"]);
        assert_eq!(ids(&query.apply(&reversed)), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_no_truncation_when_under_limit() {
        let atoms = atoms();
        let result = SemanticQuery::new().limit(10).apply(&atoms);
        assert_eq!(result.len(), 4);
        assert!(result.trace.truncation.is_none());
    }

    #[test]
    fn test_engine_records_one_audit_entry_per_call() {
        let store = Arc::new(InMemoryAtomStore::from_atoms(atoms()));
        let audit = Arc::new(InMemoryAuditLog::new());
        let engine = QueryEngine::new(store, audit.clone());

        let query = SemanticQuery::new().filter("kind", QueryOperator::Equals, "ROLE");
        let first = engine.execute(&query, "analyst");
        let second = engine.execute(&query, "analyst");

        assert_eq!(first, second);
        let entries = audit.entries(&AuditFilter::all().action(AuditAction::Query));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].result_count, Some(1));
        assert_eq!(entries[0].query.as_deref(), Some("kind equals \"ROLE\""));
    }
}
