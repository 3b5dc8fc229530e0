//! Governance: synchronous authorization gate for actions on atoms.
//!
//! ## Decision Order
//!
//! | Step | Source | Outcome |
//! |------|--------|---------|
//! | 1 | Target's `allowed_environments` | Deny if the context environment is not listed |
//! | 2 | POLICY atoms with a FORBIDDEN_FOR edge to the target | First applicable policy denies |
//! | 3 | Business rules with ALLOW / DENY / ESCALATE actions | First match (highest priority) decides |
//! | 4 | [`DefaultPolicy`] | Allow unless configured otherwise |
//!
//! ## Policy Applicability
//!
//! A FORBIDDEN_FOR policy denies only when every constraint it declares
//! matches the context. Constraints are string lists on the policy atom:
//!
//! - `applies_to_roles`: context role must be listed
//! - `applies_to_environments`: context environment must be listed
//! - `actions`: requested action must be listed
//! - `exempt_licenses`: a listed context license exempts the caller
//!
//! An absent constraint matches everything. A declared role or
//! environment constraint also matches a context that omits that value,
//! so prohibitions fail closed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::audit::{AuditAction, AuditEntry, AuditLog, AuditStatus};
use crate::config::GovernanceConfig;
use crate::rules::{RuleEffect, RuleSet};
use crate::store::AtomStore;
use crate::types::{Atom, AtomId, AtomKind, EdgeKind};

/// Decision when no environment, policy or rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPolicy {
    /// Permissive: allow.
    #[default]
    Allow,
    /// Restrictive: deny.
    Deny,
}

/// Caller context for a governance check.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyContext {
    /// Who is asking.
    #[serde(default)]
    pub actor: String,
    /// Deployment environment, e.g. `production`.
    #[serde(default)]
    pub environment: Option<String>,
    /// Caller role.
    #[serde(default)]
    pub role: Option<String>,
    /// Caller license or certification.
    #[serde(default)]
    pub license: Option<String>,
}

impl PolicyContext {
    /// Context for an actor.
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            ..Self::default()
        }
    }

    /// Set the environment.
    pub fn in_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Set the role.
    pub fn as_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set the license.
    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        self.license = Some(license.into());
        self
    }
}

/// What produced a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DecisionSource {
    /// Target's allowed-environments list.
    Environment,
    /// A FORBIDDEN_FOR policy atom.
    Policy {
        /// Policy atom.
        policy_id: AtomId,
    },
    /// A business rule.
    Rule {
        /// Rule name.
        rule: String,
    },
    /// The configured default.
    Default {
        /// Default in effect.
        policy: DefaultPolicy,
    },
}

/// Result of a governance check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceDecision {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// Why, when there is something to say.
    pub reason: Option<String>,
    /// Denied pending escalation.
    #[serde(default)]
    pub escalated: bool,
    /// What decided.
    pub decided_by: DecisionSource,
}

impl GovernanceDecision {
    fn allow(reason: Option<String>, decided_by: DecisionSource) -> Self {
        Self {
            allowed: true,
            reason,
            escalated: false,
            decided_by,
        }
    }

    fn deny(reason: String, decided_by: DecisionSource) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            escalated: false,
            decided_by,
        }
    }
}

/// Governance policy engine.
pub struct GovernanceEngine<S: AtomStore> {
    store: Arc<S>,
    rules: Arc<RuleSet>,
    config: GovernanceConfig,
    audit: Arc<dyn AuditLog>,
}

impl<S: AtomStore> GovernanceEngine<S> {
    /// Create an engine.
    pub fn new(store: Arc<S>, rules: Arc<RuleSet>, config: GovernanceConfig, audit: Arc<dyn AuditLog>) -> Self {
        Self {
            store,
            rules,
            config,
            audit,
        }
    }

    /// Default policy in effect.
    pub fn default_policy(&self) -> DefaultPolicy {
        self.config.default_policy
    }

    /// Decide whether `action` on `target` is allowed, recording one audit entry.
    pub fn is_action_allowed(&self, action: &str, target: &Atom, context: &PolicyContext) -> GovernanceDecision {
        let decision = self.decide(action, target, context);

        if decision.allowed {
            tracing::debug!(action, target = %target.id, actor = %context.actor, "action allowed");
        } else {
            tracing::warn!(
                action,
                target = %target.id,
                actor = %context.actor,
                escalated = decision.escalated,
                reason = decision.reason.as_deref().unwrap_or_default(),
                "action denied"
            );
        }

        let status = if decision.allowed {
            AuditStatus::Success
        } else {
            AuditStatus::Denied
        };
        let mut entry = AuditEntry::new(context.actor.clone(), AuditAction::Governance, status)
            .with_query(format!("{action} {}", target.id))
            .with_reason(format!("decided by {:?}", decision.decided_by));
        if let Some(reason) = &decision.reason {
            entry = entry.with_reason(reason.clone());
        }
        self.audit.record(entry);

        decision
    }

    fn decide(&self, action: &str, target: &Atom, context: &PolicyContext) -> GovernanceDecision {
        if let Some(denial) = check_environment(target, context) {
            return denial;
        }

        for policy in self.store.incoming(&target.id, EdgeKind::ForbiddenFor) {
            if policy.kind != AtomKind::Policy || !policy_applies(policy, action, context) {
                continue;
            }
            let reason = policy
                .attributes
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("forbidden by policy '{}' ({})", policy.id, policy.name));
            return GovernanceDecision::deny(
                reason,
                DecisionSource::Policy {
                    policy_id: policy.id.clone(),
                },
            );
        }

        let rule_context = json!({
            "action": action,
            "target": target.to_value(),
            "actor": context.actor,
            "environment": context.environment,
            "role": context.role,
            "license": context.license,
        });
        if let Some(rule) = self.rules.matching(&rule_context).find(|r| r.action.effect.is_decision()) {
            let source = DecisionSource::Rule { rule: rule.name.clone() };
            let reason = rule.action.reason.clone();
            return match rule.action.effect {
                RuleEffect::Allow => GovernanceDecision::allow(Some(reason), source),
                RuleEffect::Escalate => GovernanceDecision {
                    escalated: true,
                    ..GovernanceDecision::deny(reason, source)
                },
                _ => GovernanceDecision::deny(reason, source),
            };
        }

        let source = DecisionSource::Default {
            policy: self.config.default_policy,
        };
        match self.config.default_policy {
            DefaultPolicy::Allow => GovernanceDecision::allow(None, source),
            DefaultPolicy::Deny => GovernanceDecision::deny("no applicable policy; default deny".to_string(), source),
        }
    }
}

fn check_environment(target: &Atom, context: &PolicyContext) -> Option<GovernanceDecision> {
    let allowed = &target.metadata.as_ref()?.allowed_environments;
    if allowed.is_empty() {
        return None;
    }
    let listed = context
        .environment
        .as_ref()
        .is_some_and(|env| allowed.iter().any(|a| a == env));
    if listed {
        return None;
    }
    let env = context.environment.as_deref().unwrap_or("<unspecified>");
    Some(GovernanceDecision::deny(
        format!("environment '{env}' not in allowed environments [{}]", allowed.join(", ")),
        DecisionSource::Environment,
    ))
}

fn string_list(atom: &Atom, key: &str) -> Option<Vec<String>> {
    match atom.attributes.get(key)? {
        Value::Array(items) => Some(items.iter().filter_map(Value::as_str).map(str::to_string).collect()),
        Value::String(s) => Some(vec![s.clone()]),
        _ => None,
    }
}

// An undeclared constraint matches everyone. A declared one also matches a
// caller that omits the value, so a prohibition cannot be skipped by
// leaving the role or environment out of the context.
fn constraint_matches(atom: &Atom, key: &str, value: Option<&str>) -> bool {
    match (string_list(atom, key), value) {
        (None, _) | (Some(_), None) => true,
        (Some(list), Some(v)) => list.iter().any(|item| item == v),
    }
}

fn policy_applies(policy: &Atom, action: &str, context: &PolicyContext) -> bool {
    let exempt = match (string_list(policy, "exempt_licenses"), &context.license) {
        (Some(list), Some(license)) => list.contains(license),
        _ => false,
    };
    !exempt
        && constraint_matches(policy, "applies_to_roles", context.role.as_deref())
        && constraint_matches(policy, "applies_to_environments", context.environment.as_deref())
        && constraint_matches(policy, "actions", Some(action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditFilter, InMemoryAuditLog};
    use crate::rules::{BusinessRule, ConditionGroup, Operator, RuleAction, RuleCondition};
    use crate::store::InMemoryAtomStore;
    use crate::types::{AtomMetadata, Criticality};

    fn ledger() -> Atom {
        Atom::new("sys-ledger", AtomKind::System, "General ledger").with_metadata(AtomMetadata {
            allowed_environments: vec!["staging".into(), "production".into()],
            ..Default::default()
        })
    }

    fn engine_with(atoms: Vec<Atom>, rules: RuleSet, config: GovernanceConfig) -> (GovernanceEngine<InMemoryAtomStore>, Arc<InMemoryAuditLog>) {
        let audit = Arc::new(InMemoryAuditLog::new());
        let engine = GovernanceEngine::new(
            Arc::new(InMemoryAtomStore::from_atoms(atoms)),
            Arc::new(rules),
            config,
            audit.clone(),
        );
        (engine, audit)
    }

    #[test]
    fn test_environment_outside_list_denies() {
        let (engine, _) = engine_with(vec![ledger()], RuleSet::default(), GovernanceConfig::default());
        let decision = engine.is_action_allowed("execute", &ledger(), &PolicyContext::new("ops").in_environment("dev"));
        assert!(!decision.allowed);
        assert_eq!(decision.decided_by, DecisionSource::Environment);
        let reason = decision.reason.unwrap_or_default();
        assert!(reason.contains("staging") && reason.contains("production"));
    }

    #[test]
    fn test_default_allow() {
        let (engine, _) = engine_with(vec![ledger()], RuleSet::default(), GovernanceConfig::default());
        let decision =
            engine.is_action_allowed("execute", &ledger(), &PolicyContext::new("ops").in_environment("production"));
        assert!(decision.allowed);
        assert_eq!(decision.reason, None);
        assert_eq!(
            decision.decided_by,
            DecisionSource::Default {
                policy: DefaultPolicy::Allow
            }
        );
    }

    #[test]
    fn test_default_deny_is_explicit() {
        let config = GovernanceConfig {
            default_policy: DefaultPolicy::Deny,
        };
        let (engine, _) = engine_with(vec![ledger()], RuleSet::default(), config);
        let decision =
            engine.is_action_allowed("execute", &ledger(), &PolicyContext::new("ops").in_environment("production"));
        assert!(!decision.allowed);
    }

    #[test]
    fn test_forbidden_for_policy_applicability() {
        let policy = Atom::new("pol-sod", AtomKind::Policy, "Segregation of duties")
            .with_attribute("applies_to_roles", serde_json::json!(["teller"]))
            .with_attribute("exempt_licenses", serde_json::json!(["cpa"]))
            .with_attribute("reason", "tellers may not post to the ledger")
            .with_edge(EdgeKind::ForbiddenFor, "sys-ledger");
        let (engine, _) = engine_with(vec![ledger(), policy], RuleSet::default(), GovernanceConfig::default());
        let prod = PolicyContext::new("u1").in_environment("production");

        let teller = engine.is_action_allowed("post", &ledger(), &prod.clone().as_role("teller"));
        assert!(!teller.allowed);
        assert_eq!(teller.reason.as_deref(), Some("tellers may not post to the ledger"));

        let manager = engine.is_action_allowed("post", &ledger(), &prod.clone().as_role("manager"));
        assert!(manager.allowed);

        let licensed = engine.is_action_allowed("post", &ledger(), &prod.as_role("teller").with_license("cpa"));
        assert!(licensed.allowed);
    }

    #[test]
    fn test_forbidden_for_fails_closed_without_role() {
        let policy = Atom::new("pol-sod", AtomKind::Policy, "Segregation of duties")
            .with_attribute("applies_to_roles", serde_json::json!(["teller"]))
            .with_attribute("applies_to_environments", serde_json::json!(["production"]))
            .with_edge(EdgeKind::ForbiddenFor, "sys-ledger");
        let (engine, _) = engine_with(vec![ledger(), policy], RuleSet::default(), GovernanceConfig::default());

        let anonymous = engine.is_action_allowed("post", &ledger(), &PolicyContext::new("u1").in_environment("production"));
        assert!(!anonymous.allowed);
        assert_eq!(
            anonymous.decided_by,
            DecisionSource::Policy {
                policy_id: AtomId::new("pol-sod")
            }
        );

        let staging = engine.is_action_allowed("post", &ledger(), &PolicyContext::new("u1").in_environment("staging"));
        assert!(staging.allowed);
    }

    #[test]
    fn test_non_policy_forbidden_for_is_ignored() {
        let role = Atom::new("role-x", AtomKind::Role, "Intern role").with_edge(EdgeKind::ForbiddenFor, "sys-ledger");
        let (engine, _) = engine_with(vec![ledger(), role], RuleSet::default(), GovernanceConfig::default());
        let decision =
            engine.is_action_allowed("post", &ledger(), &PolicyContext::new("u").in_environment("staging"));
        assert!(decision.allowed);
    }

    #[test]
    fn test_rule_escalation() {
        let rule = BusinessRule::new(
            "escalate-deletes",
            10,
            ConditionGroup::all([RuleCondition::new("action", Operator::Equals, "delete")]),
            RuleAction::new(RuleEffect::Escalate, "deletes need approval", Criticality::High),
        );
        let (engine, _) = engine_with(vec![ledger()], RuleSet::new([rule]), GovernanceConfig::default());
        let ctx = PolicyContext::new("u").in_environment("staging");

        let delete = engine.is_action_allowed("delete", &ledger(), &ctx);
        assert!(!delete.allowed);
        assert!(delete.escalated);

        let read = engine.is_action_allowed("read", &ledger(), &ctx);
        assert!(read.allowed);
    }

    #[test]
    fn test_one_audit_entry_per_call() {
        let (engine, audit) = engine_with(vec![ledger()], RuleSet::default(), GovernanceConfig::default());
        engine.is_action_allowed("read", &ledger(), &PolicyContext::new("a").in_environment("staging"));
        engine.is_action_allowed("read", &ledger(), &PolicyContext::new("a").in_environment("dev"));

        let entries = audit.entries(&AuditFilter::all().action(AuditAction::Governance));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, AuditStatus::Success);
        assert_eq!(entries[1].status, AuditStatus::Denied);
    }
}
