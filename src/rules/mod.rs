//! Rule conditions and business rules.
//!
//! The same evaluator backs plan mutation and governance decisions.

pub mod condition;
pub mod rule;

pub use condition::{
    evaluate, ConditionGroup, ConditionNode, LogicalOperator, Operator, RuleCondition,
    MAX_CONDITION_DEPTH,
};
pub use rule::{BusinessRule, InsertPosition, PhaseDescriptor, RuleAction, RuleEffect, RuleSet};
