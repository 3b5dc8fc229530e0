//! Edge types for the graph kernel.

use serde::{Deserialize, Serialize};
use super::atom::AtomId;

/// Type of relationship between two atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Source cannot run before target.
    DependsOn,
    /// Source needs the knowledge documented by target.
    RequiresKnowledgeOf,
    /// Source is carried out by target (a role, agent, or system).
    PerformedBy,
    /// Source makes target possible.
    Enables,
    /// Source (a policy) forbids target.
    ForbiddenFor,
    /// Source is governed by target.
    GovernedBy,
    /// Source is superseded by target.
    ReplacedBy,
    /// Source is a version of target.
    VersionOf,
    /// Source starts target.
    Triggers,
    /// Source outputs target.
    Produces,
    /// Source takes target as input.
    Consumes,
    /// Untyped association.
    RelatedTo,
}

impl EdgeKind {
    /// Wire name of this edge kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DependsOn => "DEPENDS_ON",
            Self::RequiresKnowledgeOf => "REQUIRES_KNOWLEDGE_OF",
            Self::PerformedBy => "PERFORMED_BY",
            Self::Enables => "ENABLES",
            Self::ForbiddenFor => "FORBIDDEN_FOR",
            Self::GovernedBy => "GOVERNED_BY",
            Self::ReplacedBy => "REPLACED_BY",
            Self::VersionOf => "VERSION_OF",
            Self::Triggers => "TRIGGERS",
            Self::Produces => "PRODUCES",
            Self::Consumes => "CONSUMES",
            Self::RelatedTo => "RELATED_TO",
        }
    }

    /// Whether this edge expresses an execution dependency.
    pub fn is_dependency(&self) -> bool {
        matches!(self, Self::DependsOn | Self::RequiresKnowledgeOf)
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed, typed edge owned by its source atom.
///
/// Implements `Ord` for deterministic ordering: (kind, target).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Relationship type.
    pub kind: EdgeKind,
    /// Target atom.
    pub target: AtomId,
}

impl Edge {
    /// Create a new edge.
    pub fn new(kind: EdgeKind, target: impl Into<AtomId>) -> Self {
        Self {
            kind,
            target: target.into(),
        }
    }

    /// Create a DEPENDS_ON edge.
    pub fn depends_on(target: impl Into<AtomId>) -> Self {
        Self::new(EdgeKind::DependsOn, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_kind_wire_names() {
        let json = serde_json::to_string(&EdgeKind::RequiresKnowledgeOf).unwrap();
        assert_eq!(json, "\"REQUIRES_KNOWLEDGE_OF\"");
        assert_eq!(EdgeKind::ForbiddenFor.to_string(), "FORBIDDEN_FOR");
    }

    #[test]
    fn test_dependency_kinds() {
        assert!(EdgeKind::DependsOn.is_dependency());
        assert!(EdgeKind::RequiresKnowledgeOf.is_dependency());
        assert!(!EdgeKind::PerformedBy.is_dependency());
    }

    #[test]
    fn test_edge_ordering() {
        let a = Edge::depends_on("b");
        let b = Edge::new(EdgeKind::PerformedBy, "a");
        assert!(a < b);
    }
}
