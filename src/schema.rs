//! Per-kind node schemas.
//!
//! A [`SchemaRegistry`] is assembled once, then shared read-only by the
//! validator and the planner. Its fingerprint changes whenever the set of
//! schemas changes, so callers can tell which rules a validation ran under.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::canonical::canonical_hash_hex;
use crate::types::{Atom, AtomKind, EdgeKind, IntegrityIssue, IssueType, Severity};

/// What to do with atoms whose kind has no registered schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownKindPolicy {
    /// Schema-exempt: zero issues.
    #[default]
    Exempt,
    /// One ERROR issue per atom of an unregistered kind.
    Reject,
}

/// Attribute and edge rules for one atom kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSchema {
    /// Kind this schema governs.
    pub kind: AtomKind,
    /// Attributes every atom of this kind must carry.
    #[serde(default)]
    pub required: Vec<String>,
    /// Attributes atoms of this kind may carry.
    #[serde(default)]
    pub optional: Vec<String>,
    /// Legal outgoing edge kinds; `None` allows any.
    #[serde(default)]
    pub allowed_edges: Option<BTreeSet<EdgeKind>>,
}

impl NodeSchema {
    /// Create a schema with no attribute or edge rules.
    pub fn new(kind: AtomKind) -> Self {
        Self {
            kind,
            required: Vec::new(),
            optional: Vec::new(),
            allowed_edges: None,
        }
    }

    /// Add required attributes.
    pub fn require(mut self, attrs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required.extend(attrs.into_iter().map(Into::into));
        self
    }

    /// Add optional attributes.
    pub fn allow(mut self, attrs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.optional.extend(attrs.into_iter().map(Into::into));
        self
    }

    /// Restrict outgoing edges to the given kinds.
    pub fn edges(mut self, kinds: impl IntoIterator<Item = EdgeKind>) -> Self {
        self.allowed_edges = Some(kinds.into_iter().collect());
        self
    }

    /// Whether an outgoing edge of `kind` is legal.
    pub fn allows_edge(&self, kind: EdgeKind) -> bool {
        self.allowed_edges.as_ref().map_or(true, |set| set.contains(&kind))
    }
}

/// Registry of node schemas keyed by atom kind.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: BTreeMap<AtomKind, NodeSchema>,
    unknown_kind: UnknownKindPolicy,
    fingerprint: String,
}

impl SchemaRegistry {
    /// Create an empty registry with the exempt unknown-kind policy.
    pub fn new() -> Self {
        let mut registry = Self {
            schemas: BTreeMap::new(),
            unknown_kind: UnknownKindPolicy::default(),
            fingerprint: String::new(),
        };
        registry.update_fingerprint();
        registry
    }

    /// Register a schema, replacing any existing schema for its kind.
    pub fn register(mut self, schema: NodeSchema) -> Self {
        self.schemas.insert(schema.kind, schema);
        self.update_fingerprint();
        self
    }

    /// Set the unknown-kind policy.
    pub fn with_unknown_kind(mut self, policy: UnknownKindPolicy) -> Self {
        self.unknown_kind = policy;
        self.update_fingerprint();
        self
    }

    /// Schema for a kind.
    pub fn get(&self, kind: AtomKind) -> Option<&NodeSchema> {
        self.schemas.get(&kind)
    }

    /// Unknown-kind policy in effect.
    pub fn unknown_kind(&self) -> UnknownKindPolicy {
        self.unknown_kind
    }

    /// Registered kinds.
    pub fn kinds(&self) -> Vec<AtomKind> {
        self.schemas.keys().copied().collect()
    }

    /// Number of registered schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether no schemas are registered.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Registry fingerprint.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Validate an atom against its kind's schema.
    ///
    /// Emits one ERROR per missing required attribute and one WARNING per
    /// illegal outgoing edge. An explicit `null` counts as missing.
    pub fn validate(&self, atom: &Atom) -> Vec<IntegrityIssue> {
        let Some(schema) = self.schemas.get(&atom.kind) else {
            return match self.unknown_kind {
                UnknownKindPolicy::Exempt => Vec::new(),
                UnknownKindPolicy::Reject => vec![IntegrityIssue::new(
                    IssueType::Schema,
                    Severity::Error,
                    format!("no schema registered for kind {}", atom.kind),
                    vec![atom.id.clone()],
                )],
            };
        };

        let mut issues = Vec::new();

        for attr in &schema.required {
            let present = matches!(atom.resolve_field(attr), Some(v) if v != Value::Null);
            if !present {
                issues.push(IntegrityIssue::new(
                    IssueType::Schema,
                    Severity::Error,
                    format!("{} '{}' is missing required attribute '{}'", atom.kind, atom.id, attr),
                    vec![atom.id.clone()],
                ));
            }
        }

        for edge in &atom.edges {
            if !schema.allows_edge(edge.kind) {
                issues.push(IntegrityIssue::new(
                    IssueType::Schema,
                    Severity::Warning,
                    format!("{} '{}' may not hold {} edges", atom.kind, atom.id, edge.kind),
                    vec![atom.id.clone(), edge.target.clone()],
                ));
            }
        }

        issues
    }

    fn update_fingerprint(&mut self) {
        let schemas: Vec<_> = self.schemas.values().collect();
        self.fingerprint = canonical_hash_hex(&(schemas, self.unknown_kind));
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
