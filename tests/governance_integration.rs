//! Integration tests for governance, auditing and the kernel facade.
//!
//! A small bank-operations graph: a ledger system restricted to staging
//! and production, a segregation-of-duties policy, and rules that gate
//! deletes and annotate plans.

use std::sync::Arc;

use atom_graph_kernel::{
    Atom, AtomId, AtomKind, AtomMetadata, AuditAction, AuditEntry, AuditFilter, AuditLog, AuditStatus, BusinessRule,
    ConditionGroup, Criticality, DecisionSource, DefaultPolicy, EdgeKind, GovernanceConfig, GraphKernel,
    InMemoryAtomStore, InMemoryAuditLog, KernelConfig, NodeSchema, Operator, PlanOptions, PolicyContext, QueryOperator,
    RuleAction, RuleCondition, RuleEffect, RuleSet, SchemaRegistry, SemanticQuery,
};
use chrono::{Duration, TimeZone, Utc};

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

fn bank_graph() -> InMemoryAtomStore {
    InMemoryAtomStore::from_atoms([
        Atom::new("sys-ledger", AtomKind::System, "General ledger").with_metadata(AtomMetadata {
            allowed_environments: vec!["staging".into(), "production".into()],
            cost_per_invocation: Some(3.0),
            ..Default::default()
        }),
        Atom::new("proc-post", AtomKind::Process, "Journal posting")
            .with_attribute("owner", "finance")
            .with_edge(EdgeKind::DependsOn, "sys-ledger")
            .with_edge(EdgeKind::PerformedBy, "role-teller"),
        Atom::new("role-teller", AtomKind::Role, "Branch teller"),
        Atom::new("pol-sod", AtomKind::Policy, "Segregation of duties")
            .with_attribute("applies_to_roles", serde_json::json!(["teller"]))
            .with_attribute("actions", serde_json::json!(["post", "approve"]))
            .with_attribute("exempt_licenses", serde_json::json!(["auditor"]))
            .with_edge(EdgeKind::ForbiddenFor, "sys-ledger"),
    ])
}

fn bank_rules() -> RuleSet {
    RuleSet::new([
        BusinessRule::new(
            "deletes-escalate",
            20,
            ConditionGroup::all([RuleCondition::new("action", Operator::Equals, "delete")]),
            RuleAction::new(RuleEffect::Escalate, "deletes need a second approver", Criticality::High),
        ),
        BusinessRule::new(
            "interns-denied",
            10,
            ConditionGroup::all([RuleCondition::new("role", Operator::Equals, "intern")]),
            RuleAction::new(RuleEffect::Deny, "interns are read-only", Criticality::Medium),
        ),
        BusinessRule::new(
            "finance-signoff",
            5,
            ConditionGroup::all([RuleCondition::new("target.attributes.owner", Operator::Equals, "finance")]),
            RuleAction::new(RuleEffect::ModifyStep { reference: None }, "finance sign-off", Criticality::Medium),
        ),
    ])
}

fn bank_kernel(config: KernelConfig) -> (GraphKernel<InMemoryAtomStore>, Arc<InMemoryAuditLog>) {
    let audit = Arc::new(InMemoryAuditLog::new());
    let kernel = GraphKernel::builder(Arc::new(bank_graph()))
        .config(config)
        .rules(bank_rules())
        .schemas(SchemaRegistry::new().register(NodeSchema::new(AtomKind::Process).require(["owner"])))
        .audit_log(audit.clone())
        .build();
    (kernel, audit)
}

fn ledger(kernel: &GraphKernel<InMemoryAtomStore>) -> Atom {
    kernel.atom(&AtomId::new("sys-ledger")).cloned().unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Governance
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_environment_checked_before_policies() {
    let (kernel, _) = bank_kernel(KernelConfig::default());
    let ctx = PolicyContext::new("u1").in_environment("dev").as_role("manager");
    let decision = kernel.is_action_allowed("read", &ledger(&kernel), &ctx);

    assert!(!decision.allowed);
    assert_eq!(decision.decided_by, DecisionSource::Environment);
}

#[test]
fn test_policy_matches_role_and_action() {
    let (kernel, _) = bank_kernel(KernelConfig::default());
    let teller = PolicyContext::new("u1").in_environment("production").as_role("teller");

    let post = kernel.is_action_allowed("post", &ledger(&kernel), &teller);
    assert!(!post.allowed);
    assert_eq!(
        post.decided_by,
        DecisionSource::Policy {
            policy_id: AtomId::new("pol-sod")
        }
    );

    let read = kernel.is_action_allowed("read", &ledger(&kernel), &teller);
    assert!(read.allowed);

    let auditor = teller.with_license("auditor");
    assert!(kernel.is_action_allowed("post", &ledger(&kernel), &auditor).allowed);
}

#[test]
fn test_rules_decide_after_policies() {
    let (kernel, _) = bank_kernel(KernelConfig::default());
    let intern = PolicyContext::new("u2").in_environment("staging").as_role("intern");

    let read = kernel.is_action_allowed("read", &ledger(&kernel), &intern);
    assert!(!read.allowed);
    assert!(!read.escalated);
    assert_eq!(read.reason.as_deref(), Some("interns are read-only"));

    // higher priority escalation wins over the intern rule
    let delete = kernel.is_action_allowed("delete", &ledger(&kernel), &intern);
    assert!(delete.escalated);
    assert_eq!(
        delete.decided_by,
        DecisionSource::Rule {
            rule: "deletes-escalate".into()
        }
    );
}

#[test]
fn test_configured_default_policy() {
    let config = KernelConfig {
        governance: GovernanceConfig {
            default_policy: DefaultPolicy::Deny,
        },
        ..KernelConfig::default()
    };
    let (kernel, _) = bank_kernel(config);
    let ctx = PolicyContext::new("u3").in_environment("production").as_role("manager");
    let decision = kernel.is_action_allowed("read", &ledger(&kernel), &ctx);

    assert!(!decision.allowed);
    assert_eq!(
        decision.decided_by,
        DecisionSource::Default {
            policy: DefaultPolicy::Deny
        }
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Audit
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_every_call_records_matching_entry() {
    let (kernel, audit) = bank_kernel(KernelConfig::default());
    let ctx = PolicyContext::new("ops").in_environment("production").as_role("teller");

    kernel.is_action_allowed("post", &ledger(&kernel), &ctx);
    assert_eq!(audit.len(), 1);
    kernel.is_action_allowed("read", &ledger(&kernel), &ctx);
    assert_eq!(audit.len(), 2);
    kernel.query(&SemanticQuery::new().filter("kind", QueryOperator::Equals, "ROLE"), "ops");
    assert_eq!(audit.len(), 3);
    let plan = kernel
        .plan("post journal", &AtomId::new("proc-post"), &PlanOptions::new("ops"))
        .unwrap();
    assert_eq!(audit.len(), 4);
    kernel
        .plan("post journal", &AtomId::new("ghost"), &PlanOptions::new("ops"))
        .unwrap_err();
    assert_eq!(audit.len(), 5);

    let entries = audit.entries(&AuditFilter::all());
    let summary: Vec<(AuditAction, AuditStatus)> = entries.iter().map(|e| (e.action, e.status)).collect();
    assert_eq!(
        summary,
        vec![
            (AuditAction::Governance, AuditStatus::Denied),
            (AuditAction::Governance, AuditStatus::Success),
            (AuditAction::Query, AuditStatus::Success),
            (AuditAction::Plan, AuditStatus::Success),
            (AuditAction::Plan, AuditStatus::Failure),
        ]
    );
    assert_eq!(entries[3].cost, Some(plan.total_cost));
    assert_eq!(plan.fired_rules, vec!["finance-signoff"]);
    assert!(audit.verify_chain().is_ok());
}

#[test]
fn test_tampering_breaks_chain() {
    let (kernel, audit) = bank_kernel(KernelConfig::default());
    for actor in ["a", "b", "c"] {
        kernel.query(&SemanticQuery::new(), actor);
    }

    let mut chain = audit.sealed();
    assert!(InMemoryAuditLog::verify_sealed(&chain).is_ok());
    chain[1].entry.actor = "mallory".into();
    assert_eq!(InMemoryAuditLog::verify_sealed(&chain), Err(1));
}

#[test]
fn test_compliance_report_over_range() {
    let audit = InMemoryAuditLog::new();
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let entries = [
        ("alice", AuditAction::Plan, AuditStatus::Success, 0),
        ("bob", AuditAction::Plan, AuditStatus::Failure, 1),
        ("alice", AuditAction::Governance, AuditStatus::Denied, 2),
        ("carol", AuditAction::Query, AuditStatus::Success, 3),
        ("dave", AuditAction::Query, AuditStatus::Success, 10),
    ];
    for (actor, action, status, hours) in entries {
        audit.record(AuditEntry::new(actor, action, status).at(t0 + Duration::hours(hours)));
    }

    let report = audit.compliance_report(t0, t0 + Duration::hours(3));
    assert_eq!(report.total_operations, 4);
    assert_eq!(report.failures, 1);
    assert_eq!(report.denials, 1);
    assert_eq!(report.failure_rate, 0.25);
    assert_eq!(report.distinct_actors(), 3);
    assert_eq!(report.by_action.get(&AuditAction::Plan), Some(&2));

    let empty = audit.compliance_report(t0 - Duration::days(2), t0 - Duration::days(1));
    assert_eq!(empty.total_operations, 0);
    assert_eq!(empty.failure_rate, 0.0);
    assert!(!empty.failure_rate.is_nan());
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation through the kernel
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_kernel_validation_includes_schema_issues() {
    let audit = Arc::new(InMemoryAuditLog::new());
    let store = InMemoryAtomStore::from_atoms([
        Atom::new("p", AtomKind::Process, "Unowned process").with_edge(EdgeKind::PerformedBy, "r"),
        Atom::new("r", AtomKind::Role, "Reviewer"),
    ]);
    let kernel = GraphKernel::builder(Arc::new(store))
        .schemas(SchemaRegistry::new().register(NodeSchema::new(AtomKind::Process).require(["owner"])))
        .audit_log(audit.clone())
        .build();

    let report = kernel.validate("ci");
    assert_eq!(report.count("SCHEMA"), 1);
    assert_eq!(report.count("LINT-001"), 0);

    let entries = audit.entries(&AuditFilter::all().action(AuditAction::Validation));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].result_count, Some(report.issues.len()));
}
