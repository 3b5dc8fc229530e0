//! Atom types for the graph kernel.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use super::edge::{Edge, EdgeKind};
use super::value::resolve_path;

/// Unique identifier for an atom in the knowledge graph.
///
/// Wraps the storage-layer identifier and implements `Ord` so every
/// traversal in the kernel can iterate atoms in a deterministic order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AtomId(String);

impl AtomId {
    /// Create a new AtomId.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AtomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AtomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Kind of knowledge unit an atom documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AtomKind {
    /// Business process.
    Process,
    /// Decision point within a process.
    Decision,
    /// Human or organizational role.
    Role,
    /// Software system.
    System,
    /// Document or artifact.
    Document,
    /// Governing policy.
    Policy,
    /// Control enforcing a policy.
    Control,
    /// Callable API.
    Api,
    /// Business capability.
    Capability,
    /// Automated agent.
    Agent,
    /// Version marker.
    Version,
    /// Multi-process workflow.
    Workflow,
    /// Regulatory requirement.
    Regulation,
    /// Tracked metric.
    Metric,
    /// Identified risk.
    Risk,
}

impl AtomKind {
    /// All atom kinds, in declaration order.
    pub const ALL: [AtomKind; 15] = [
        Self::Process,
        Self::Decision,
        Self::Role,
        Self::System,
        Self::Document,
        Self::Policy,
        Self::Control,
        Self::Api,
        Self::Capability,
        Self::Agent,
        Self::Version,
        Self::Workflow,
        Self::Regulation,
        Self::Metric,
        Self::Risk,
    ];

    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Process => "PROCESS",
            Self::Decision => "DECISION",
            Self::Role => "ROLE",
            Self::System => "SYSTEM",
            Self::Document => "DOCUMENT",
            Self::Policy => "POLICY",
            Self::Control => "CONTROL",
            Self::Api => "API",
            Self::Capability => "CAPABILITY",
            Self::Agent => "AGENT",
            Self::Version => "VERSION",
            Self::Workflow => "WORKFLOW",
            Self::Regulation => "REGULATION",
            Self::Metric => "METRIC",
            Self::Risk => "RISK",
        }
    }

    /// Parse atom kind from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        let upper = s.to_uppercase();
        Self::ALL.into_iter().find(|k| k.as_str() == upper)
    }
}

impl fmt::Display for AtomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business criticality of an atom or of a rule action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Criticality {
    /// Nice to have.
    Low,
    /// Normal business impact.
    Medium,
    /// Significant business impact.
    High,
    /// Failure halts the business.
    Critical,
}

impl Default for Criticality {
    fn default() -> Self {
        Self::Medium
    }
}

impl fmt::Display for Criticality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Extended execution metadata attached to an atom.
///
/// An empty `allowed_environments` list means the atom is not
/// environment-restricted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtomMetadata {
    /// Cost of one invocation, in caller-defined units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_invocation: Option<f64>,
    /// Typical latency of one invocation in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typical_latency_ms: Option<u64>,
    /// Environments this atom may be acted upon in.
    #[serde(default)]
    pub allowed_environments: Vec<String>,
    /// Alternate atoms substituted when this one is unavailable.
    #[serde(default)]
    pub fallback_ids: Vec<AtomId>,
    /// Business criticality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criticality: Option<Criticality>,
    /// Documented exception-handling entries.
    #[serde(default)]
    pub exceptions: Vec<String>,
    /// Any further metadata the storage layer carries.
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

/// A typed knowledge-graph node.
///
/// The kernel only reads atoms within a request; the store owns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// Unique atom identifier.
    pub id: AtomId,
    /// Atom kind.
    pub kind: AtomKind,
    /// Display name.
    pub name: String,
    /// Content attributes.
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Numeric metrics (usage counts, scores).
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// Ordered outgoing edges.
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Extended execution metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AtomMetadata>,
}

impl Atom {
    /// Create a new atom with no attributes, edges, or metadata.
    pub fn new(id: impl Into<AtomId>, kind: AtomKind, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            attributes: Map::new(),
            metrics: BTreeMap::new(),
            edges: Vec::new(),
            metadata: None,
        }
    }

    /// Set a content attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set a metric.
    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    /// Append an outgoing edge.
    pub fn with_edge(mut self, kind: EdgeKind, target: impl Into<AtomId>) -> Self {
        self.edges.push(Edge::new(kind, target));
        self
    }

    /// Attach extended metadata.
    pub fn with_metadata(mut self, metadata: AtomMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Outgoing edges of the given kind, in declaration order.
    pub fn edges_of(&self, kind: EdgeKind) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.kind == kind)
    }

    /// Whether the atom has at least one outgoing edge of the given kind.
    pub fn has_edge(&self, kind: EdgeKind) -> bool {
        self.edges_of(kind).next().is_some()
    }

    /// Declared cost per invocation, if any.
    pub fn declared_cost(&self) -> Option<f64> {
        self.metadata.as_ref().and_then(|m| m.cost_per_invocation)
    }

    /// Declared typical latency, if any.
    pub fn declared_latency_ms(&self) -> Option<u64> {
        self.metadata.as_ref().and_then(|m| m.typical_latency_ms)
    }

    /// First declared fallback, if any.
    pub fn first_fallback(&self) -> Option<&AtomId> {
        self.metadata.as_ref().and_then(|m| m.fallback_ids.first())
    }

    /// Business criticality from metadata, falling back to a `criticality`
    /// content attribute.
    pub fn criticality(&self) -> Option<Criticality> {
        self.metadata
            .as_ref()
            .and_then(|m| m.criticality)
            .or_else(|| {
                self.attributes
                    .get("criticality")
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok())
            })
    }

    /// Resolve a (possibly dotted) field against this atom.
    ///
    /// Resolution order: top-level fields, content attributes, metrics,
    /// extended metadata. The first layer holding the field wins.
    pub fn resolve_field(&self, field: &str) -> Option<Value> {
        match field {
            "id" => return Some(Value::String(self.id.to_string())),
            "kind" => return Some(Value::String(self.kind.as_str().to_string())),
            "name" => return Some(Value::String(self.name.clone())),
            _ => {}
        }

        let (head, rest) = match field.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (field, None),
        };

        if let Some(value) = self.attributes.get(head) {
            let resolved = match rest {
                Some(rest) => resolve_path(value, rest),
                None => Some(value),
            };
            if let Some(v) = resolved {
                return Some(v.clone());
            }
        }

        if rest.is_none() {
            if let Some(metric) = self.metrics.get(field) {
                return serde_json::Number::from_f64(*metric).map(Value::Number);
            }
        }

        let metadata = serde_json::to_value(self.metadata.as_ref()?).ok()?;
        resolve_path(&metadata, field).cloned()
    }

    /// JSON view of this atom, as seen by rule conditions.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
