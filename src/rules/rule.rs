//! Business rules: prioritized when/then pairs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::canonical_hash_hex;
use crate::types::{AtomId, Criticality};
use super::condition::ConditionGroup;

fn enabled_by_default() -> bool {
    true
}

/// A phase a rule injects into a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDescriptor {
    /// Phase identifier, unique within the rule.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl PhaseDescriptor {
    /// Create a phase descriptor.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Where an inserted phase lands relative to its reference step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsertPosition {
    /// Runs before the reference step.
    Before,
    /// Runs after the reference step.
    After,
    /// Runs before everything the reference step needs.
    AtStart,
    /// Runs after the whole plan.
    AtEnd,
}

impl InsertPosition {
    /// Whether the reference step must wait for the injected phase.
    pub fn precedes_reference(&self) -> bool {
        matches!(self, Self::Before | Self::AtStart)
    }
}

/// What a rule does when its condition matches.
///
/// `reference` defaults to the plan's target atom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleEffect {
    /// Insert a new phase.
    InsertPhase {
        /// Phase to insert.
        phase: PhaseDescriptor,
        /// Placement.
        position: InsertPosition,
        /// Reference atom.
        #[serde(default)]
        reference: Option<AtomId>,
    },
    /// Mark the reference step skipped.
    RemoveStep {
        /// Reference atom.
        #[serde(default)]
        reference: Option<AtomId>,
    },
    /// Swap the reference step's target for a phase.
    ReplaceStep {
        /// Replacement phase.
        phase: PhaseDescriptor,
        /// Reference atom.
        #[serde(default)]
        reference: Option<AtomId>,
    },
    /// Annotate the reference step with the rule's reason.
    ModifyStep {
        /// Reference atom.
        #[serde(default)]
        reference: Option<AtomId>,
    },
    /// Governance: allow the action.
    Allow,
    /// Governance: deny the action.
    Deny,
    /// Governance: deny pending escalation.
    Escalate,
}

impl RuleEffect {
    /// Whether this effect mutates plans.
    pub fn is_plan_mutation(&self) -> bool {
        matches!(
            self,
            Self::InsertPhase { .. } | Self::RemoveStep { .. } | Self::ReplaceStep { .. } | Self::ModifyStep { .. }
        )
    }

    /// Whether this effect is a governance decision.
    pub fn is_decision(&self) -> bool {
        matches!(self, Self::Allow | Self::Deny | Self::Escalate)
    }
}

/// Action of a rule. Always carries a reason and criticality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAction {
    /// Effect.
    #[serde(flatten)]
    pub effect: RuleEffect,
    /// Why the rule exists.
    pub reason: String,
    /// How much it matters.
    #[serde(default)]
    pub criticality: Criticality,
}

impl RuleAction {
    /// Create an action.
    pub fn new(effect: RuleEffect, reason: impl Into<String>, criticality: Criticality) -> Self {
        Self {
            effect,
            reason: reason.into(),
            criticality,
        }
    }
}

/// A named, prioritized, enable-flagged rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRule {
    /// Unique rule name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Higher runs first.
    #[serde(default)]
    pub priority: i32,
    /// Disabled rules never evaluate.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// When.
    pub condition: ConditionGroup,
    /// Then.
    pub action: RuleAction,
}

impl BusinessRule {
    /// Create an enabled rule.
    pub fn new(name: impl Into<String>, priority: i32, condition: ConditionGroup, action: RuleAction) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            priority,
            enabled: true,
            condition,
            action,
        }
    }

    /// Disable this rule.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether the rule is enabled and its condition holds.
    pub fn matches(&self, context: &Value) -> bool {
        self.enabled && self.condition.evaluate(context)
    }
}

/// Immutable rule collection ordered by descending priority.
///
/// The sort is stable: rules with equal priority keep their authored order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<BusinessRule>,
}

impl RuleSet {
    /// Build a rule set.
    pub fn new(rules: impl IntoIterator<Item = BusinessRule>) -> Self {
        let mut rules: Vec<BusinessRule> = rules.into_iter().collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { rules }
    }

    /// Parse a JSON array of rules.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let rules: Vec<BusinessRule> = serde_json::from_str(json)?;
        Ok(Self::new(rules))
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[BusinessRule] {
        &self.rules
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every matching rule, highest priority first. Each rule fires at
    /// most once per call.
    pub fn matching<'a>(&'a self, context: &'a Value) -> impl Iterator<Item = &'a BusinessRule> + 'a {
        self.rules.iter().filter(move |r| r.matches(context))
    }

    /// Rule set fingerprint.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(&self.rules)
    }
}
