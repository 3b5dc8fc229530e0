//! Kernel facade.
//!
//! [`GraphKernel`] wires every component over one store snapshot, one
//! rule set, one schema registry and one audit log. All of these are
//! fixed at construction and shared read-only, so a kernel can be put in
//! an `Arc` and called from many threads.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::audit::{AuditAction, AuditEntry, AuditLog, AuditStatus, ComplianceReport, InMemoryAuditLog};
use crate::canonical::canonical_hash_hex;
use crate::config::KernelConfig;
use crate::governance::{GovernanceDecision, GovernanceEngine, PolicyContext};
use crate::planner::{PlanError, PlanOptions, Planner};
use crate::query::{QueryEngine, QueryResult, SemanticQuery};
use crate::rules::RuleSet;
use crate::schema::SchemaRegistry;
use crate::store::AtomStore;
use crate::types::{Atom, AtomId, ExecutionPlan};
use crate::validator::{IntegrityValidator, ValidationReport};
use crate::version::{MigrationReport, VersionError, VersionManager};

/// Builder for [`GraphKernel`].
pub struct GraphKernelBuilder<S: AtomStore> {
    store: Arc<S>,
    config: KernelConfig,
    rules: RuleSet,
    schemas: Option<SchemaRegistry>,
    audit: Option<Arc<dyn AuditLog>>,
    versions: Option<Arc<VersionManager>>,
}

impl<S: AtomStore> GraphKernelBuilder<S> {
    /// Use this configuration.
    pub fn config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    /// Use these business rules.
    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Use this schema registry instead of an empty one.
    ///
    /// The configured `schema.unknown_kind` policy is applied to it at
    /// build time, so the config stays the single source for that policy.
    pub fn schemas(mut self, schemas: SchemaRegistry) -> Self {
        self.schemas = Some(schemas);
        self
    }

    /// Record into this audit log instead of a fresh in-memory one.
    pub fn audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Share an existing version ledger.
    pub fn versions(mut self, versions: Arc<VersionManager>) -> Self {
        self.versions = Some(versions);
        self
    }

    /// Assemble the kernel.
    pub fn build(self) -> GraphKernel<S> {
        let config = self.config;
        let schemas = Arc::new(
            self.schemas
                .unwrap_or_default()
                .with_unknown_kind(config.schema.unknown_kind),
        );
        let rules = Arc::new(self.rules);
        let audit: Arc<dyn AuditLog> = match self.audit {
            Some(audit) => audit,
            None => Arc::new(InMemoryAuditLog::new()),
        };
        let versions = self.versions.unwrap_or_default();

        let validator = IntegrityValidator::new(config.validator.clone()).with_schemas(schemas.clone());
        let planner = Planner::new(self.store.clone(), rules.clone(), config.planner.clone(), audit.clone())
            .with_schemas(schemas.clone());
        let query = QueryEngine::new(self.store.clone(), audit.clone());
        let governance = GovernanceEngine::new(self.store.clone(), rules.clone(), config.governance, audit.clone());

        tracing::info!(
            atoms = self.store.len(),
            rules = rules.len(),
            schemas = schemas.len(),
            config = %config.fingerprint(),
            "graph kernel ready"
        );

        GraphKernel {
            store: self.store,
            config,
            rules,
            schemas,
            audit,
            versions,
            validator,
            planner,
            query,
            governance,
        }
    }
}

/// Planning and governance core over one atom graph snapshot.
pub struct GraphKernel<S: AtomStore> {
    store: Arc<S>,
    config: KernelConfig,
    rules: Arc<RuleSet>,
    schemas: Arc<SchemaRegistry>,
    audit: Arc<dyn AuditLog>,
    versions: Arc<VersionManager>,
    validator: IntegrityValidator,
    planner: Planner<S>,
    query: QueryEngine<S>,
    governance: GovernanceEngine<S>,
}

impl<S: AtomStore> GraphKernel<S> {
    /// Start building a kernel over a store.
    pub fn builder(store: Arc<S>) -> GraphKernelBuilder<S> {
        GraphKernelBuilder {
            store,
            config: KernelConfig::default(),
            rules: RuleSet::default(),
            schemas: None,
            audit: None,
            versions: None,
        }
    }

    /// Validate the graph and record one audit entry.
    pub fn validate(&self, actor: &str) -> ValidationReport {
        let start = Instant::now();
        let report = self.validator.validate(self.store.as_ref());
        let entry = AuditEntry::new(actor, AuditAction::Validation, AuditStatus::Success)
            .with_query(format!("validate {} atoms", report.atoms_checked))
            .with_result_count(report.issues.len())
            .with_latency_ms(start.elapsed().as_millis() as u64);
        self.audit.record(entry);
        report
    }

    /// Run a semantic query.
    pub fn query(&self, query: &SemanticQuery, actor: &str) -> QueryResult {
        self.query.execute(query, actor)
    }

    /// Resolve an execution plan.
    pub fn plan(&self, goal: &str, target: &AtomId, options: &PlanOptions) -> Result<ExecutionPlan, PlanError> {
        self.planner.plan(goal, target, options)
    }

    /// Governance check for an action on an atom.
    pub fn is_action_allowed(&self, action: &str, target: &Atom, context: &PolicyContext) -> GovernanceDecision {
        self.governance.is_action_allowed(action, target, context)
    }

    /// Migrate atoms to `target` and record one audit entry.
    pub fn migrate(&self, atoms: &mut [Atom], target: &str, actor: &str) -> Result<MigrationReport, VersionError> {
        let start = Instant::now();
        let result = self.versions.migrate(atoms, target);
        let status = if result.is_ok() {
            AuditStatus::Success
        } else {
            AuditStatus::Failure
        };
        let mut entry = AuditEntry::new(actor, AuditAction::Migration, status)
            .with_query(format!("migrate to {target}"))
            .with_latency_ms(start.elapsed().as_millis() as u64);
        entry = match &result {
            Ok(report) => entry
                .with_result_count(report.atoms_touched)
                .with_reason(format!("applied {:?}", report.applied)),
            Err(e) => entry.with_reason(e.to_string()),
        };
        self.audit.record(entry);
        result
    }

    /// Compliance summary for `[start, end]`.
    pub fn compliance_report(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> ComplianceReport {
        self.audit.compliance_report(start, end)
    }

    /// Look up an atom in the snapshot.
    pub fn atom(&self, id: &AtomId) -> Option<&Atom> {
        self.store.get_atom(id)
    }

    /// Atom store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Configuration in effect.
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Business rules in effect.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Schema registry in effect.
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Audit log.
    pub fn audit(&self) -> &Arc<dyn AuditLog> {
        &self.audit
    }

    /// Version ledger.
    pub fn versions(&self) -> &Arc<VersionManager> {
        &self.versions
    }

    /// Hash of config, rules and schemas; identifies the decision surface.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(&(self.config.fingerprint(), self.rules.fingerprint(), self.schemas.fingerprint()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditFilter;
    use crate::config::SchemaConfig;
    use crate::schema::{NodeSchema, UnknownKindPolicy};
    use crate::store::InMemoryAtomStore;
    use crate::types::{AtomKind, EdgeKind};
    use crate::version::SchemaVersion;

    fn kernel() -> GraphKernel<InMemoryAtomStore> {
        let store = InMemoryAtomStore::from_atoms([
            Atom::new("x", AtomKind::Process, "Month-end close").with_edge(EdgeKind::DependsOn, "y"),
            Atom::new("y", AtomKind::Role, "Controller"),
        ]);
        GraphKernel::builder(Arc::new(store)).build()
    }

    #[test]
    fn test_each_operation_records_one_entry() {
        let kernel = kernel();
        kernel.validate("ci");
        kernel.query(&SemanticQuery::new(), "ci");
        kernel.plan("close", &AtomId::new("x"), &PlanOptions::new("ci")).unwrap();
        let y = kernel.atom(&AtomId::new("y")).cloned().unwrap();
        kernel.is_action_allowed("read", &y, &PolicyContext::new("ci"));
        kernel.versions().register_version(SchemaVersion::new("1", Utc::now()));
        kernel.migrate(&mut [], "1", "ci").unwrap();

        let entries = kernel.audit().entries(&AuditFilter::all().actor("ci"));
        let actions: Vec<_> = entries.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::Validation,
                AuditAction::Query,
                AuditAction::Plan,
                AuditAction::Governance,
                AuditAction::Migration,
            ]
        );
    }

    #[test]
    fn test_configured_unknown_kind_applies_to_supplied_registry() {
        let store = InMemoryAtomStore::from_atoms([Atom::new("r", AtomKind::Role, "Controller")]);
        let config = KernelConfig {
            schema: SchemaConfig {
                unknown_kind: UnknownKindPolicy::Reject,
            },
            ..KernelConfig::default()
        };
        let kernel = GraphKernel::builder(Arc::new(store))
            .config(config)
            .schemas(SchemaRegistry::new().register(NodeSchema::new(AtomKind::Process)))
            .build();

        assert_eq!(kernel.schemas().unknown_kind(), UnknownKindPolicy::Reject);
        assert_eq!(kernel.validate("ci").count("SCHEMA"), 1);
    }

    #[test]
    fn test_fingerprint_stable_across_builds() {
        assert_eq!(kernel().fingerprint(), kernel().fingerprint());
    }
}
