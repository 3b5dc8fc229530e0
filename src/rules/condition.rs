//! Boolean condition trees and their evaluation.
//!
//! ## Semantics
//!
//! - Field paths resolve by dotted traversal against the context record.
//!   A missing path is "undefined" and fails every operator, including the
//!   negated ones.
//! - An empty condition list is vacuously true, whatever the group's logic.
//! - `NOT` negates the conjunction of all its children.
//! - Unknown operators evaluate false; evaluation never errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::types::value::{compare, contains, is_in, loose_eq, resolve_path};

/// Nesting depth beyond which a group evaluates false.
pub const MAX_CONDITION_DEPTH: usize = 64;

/// Comparison operator of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    /// Coercing equality.
    Equals,
    /// Coercing inequality.
    NotEquals,
    /// Ordered `>`.
    #[serde(alias = "GT")]
    GreaterThan,
    /// Ordered `<`.
    #[serde(alias = "LT")]
    LessThan,
    /// Ordered `>=`.
    #[serde(alias = "GTE")]
    GreaterThanOrEqual,
    /// Ordered `<=`.
    #[serde(alias = "LTE")]
    LessThanOrEqual,
    /// Array membership or substring.
    Contains,
    /// Negated `Contains`.
    NotContains,
    /// Membership in the supplied list.
    In,
    /// Non-membership in the supplied list.
    NotIn,
    /// Anything this version does not recognize.
    #[serde(other)]
    Unknown,
}

/// A single `(field, operator, value)` test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    /// Dotted path into the context record.
    pub field: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Right-hand side.
    #[serde(default)]
    pub value: Value,
}

impl RuleCondition {
    /// Create a condition.
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Evaluate against a context record.
    pub fn evaluate(&self, context: &Value) -> bool {
        let Some(actual) = resolve_path(context, &self.field) else {
            return false;
        };
        let expected = &self.value;

        match self.operator {
            Operator::Equals => loose_eq(actual, expected),
            Operator::NotEquals => !loose_eq(actual, expected),
            Operator::GreaterThan => compare(actual, expected) == Some(Ordering::Greater),
            Operator::LessThan => compare(actual, expected) == Some(Ordering::Less),
            Operator::GreaterThanOrEqual => {
                matches!(compare(actual, expected), Some(Ordering::Greater | Ordering::Equal))
            }
            Operator::LessThanOrEqual => {
                matches!(compare(actual, expected), Some(Ordering::Less | Ordering::Equal))
            }
            Operator::Contains => contains(actual, expected),
            Operator::NotContains => !contains(actual, expected),
            Operator::In => is_in(actual, expected),
            Operator::NotIn => expected.is_array() && !is_in(actual, expected),
            Operator::Unknown => {
                tracing::debug!(field = %self.field, "unknown operator, condition fails closed");
                false
            }
        }
    }
}

/// How a group combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogicalOperator {
    /// All children true.
    And,
    /// At least one child true.
    Or,
    /// Not all children true.
    Not,
}

/// Child of a condition group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionNode {
    /// Nested group.
    Group(ConditionGroup),
    /// Leaf condition.
    Condition(RuleCondition),
}

impl From<RuleCondition> for ConditionNode {
    fn from(c: RuleCondition) -> Self {
        Self::Condition(c)
    }
}

impl From<ConditionGroup> for ConditionNode {
    fn from(g: ConditionGroup) -> Self {
        Self::Group(g)
    }
}

/// Boolean expression tree over rule conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    /// Combinator.
    pub logic: LogicalOperator,
    /// Children.
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
}

impl ConditionGroup {
    /// Create a group.
    pub fn new(logic: LogicalOperator, conditions: impl IntoIterator<Item = impl Into<ConditionNode>>) -> Self {
        Self {
            logic,
            conditions: conditions.into_iter().map(Into::into).collect(),
        }
    }

    /// AND group.
    pub fn all(conditions: impl IntoIterator<Item = impl Into<ConditionNode>>) -> Self {
        Self::new(LogicalOperator::And, conditions)
    }

    /// OR group.
    pub fn any(conditions: impl IntoIterator<Item = impl Into<ConditionNode>>) -> Self {
        Self::new(LogicalOperator::Or, conditions)
    }

    /// NOT group: true unless every child is true.
    pub fn not(conditions: impl IntoIterator<Item = impl Into<ConditionNode>>) -> Self {
        Self::new(LogicalOperator::Not, conditions)
    }

    /// Group with no conditions; always true.
    pub fn always() -> Self {
        Self {
            logic: LogicalOperator::And,
            conditions: Vec::new(),
        }
    }

    /// Evaluate against a context record.
    pub fn evaluate(&self, context: &Value) -> bool {
        self.evaluate_at(context, 0)
    }

    fn evaluate_at(&self, context: &Value, depth: usize) -> bool {
        if depth >= MAX_CONDITION_DEPTH {
            tracing::warn!(depth, "condition tree too deep, group fails closed");
            return false;
        }
        if self.conditions.is_empty() {
            return true;
        }

        let mut children = self.conditions.iter().map(|node| match node {
            ConditionNode::Condition(c) => c.evaluate(context),
            ConditionNode::Group(g) => g.evaluate_at(context, depth + 1),
        });

        match self.logic {
            LogicalOperator::And => children.all(|r| r),
            LogicalOperator::Or => children.any(|r| r),
            LogicalOperator::Not => !children.all(|r| r),
        }
    }
}

/// Evaluate a condition group against a context record.
pub fn evaluate(group: &ConditionGroup, context: &Value) -> bool {
    group.evaluate(context)
}
