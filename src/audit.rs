//! Append-only audit trail and compliance reporting.
//!
//! Every plan, query and governance call records exactly one entry.
//! Recording never fails and never touches earlier entries.
//!
//! ## Tamper Evidence
//!
//! [`InMemoryAuditLog`] seals each entry as
//! `SHA-256(previous_hash || canonical_json(entry))`, starting from an
//! all-zero genesis hash. [`InMemoryAuditLog::verify_chain`] recomputes the
//! chain and reports the first broken link.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::canonical::to_canonical_bytes;

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Kind of audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Semantic query.
    Query,
    /// Plan resolution.
    Plan,
    /// Governance decision.
    Governance,
    /// Graph integrity validation.
    Validation,
    /// Schema migration.
    Migration,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::Plan => write!(f, "plan"),
            Self::Governance => write!(f, "governance"),
            Self::Validation => write!(f, "validation"),
            Self::Migration => write!(f, "migration"),
        }
    }
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Completed.
    Success,
    /// Terminated with an error.
    Failure,
    /// Completed with a deny decision.
    Denied,
}

/// Immutable record of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID.
    pub id: Uuid,
    /// When the operation happened.
    pub timestamp: DateTime<Utc>,
    /// Who performed it.
    pub actor: String,
    /// What kind of operation.
    pub action: AuditAction,
    /// Query text or operation subject.
    pub query: Option<String>,
    /// Outcome.
    pub status: AuditStatus,
    /// Matches, steps, or issues produced.
    pub result_count: Option<usize>,
    /// Wall-clock duration.
    pub latency_ms: Option<u64>,
    /// Estimated cost.
    pub cost: Option<f64>,
    /// Reasoning trace.
    #[serde(default)]
    pub reasoning: Vec<String>,
}

impl AuditEntry {
    /// Create an entry stamped now.
    pub fn new(actor: impl Into<String>, action: AuditAction, status: AuditStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: actor.into(),
            action,
            query: None,
            status,
            result_count: None,
            latency_ms: None,
            cost: None,
            reasoning: Vec::new(),
        }
    }

    /// Override the timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the query text.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Set the result count.
    pub fn with_result_count(mut self, count: usize) -> Self {
        self.result_count = Some(count);
        self
    }

    /// Set the latency.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Set the cost.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Append a reasoning line.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasoning.push(reason.into());
        self
    }
}

/// Entry sealed into the hash chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedEntry {
    /// Position in the log, from 0.
    pub sequence: u64,
    /// The entry.
    pub entry: AuditEntry,
    /// Hash of the previous sealed entry.
    pub previous_hash: String,
    /// Hash of this sealed entry.
    pub hash: String,
}

fn seal_hash(previous_hash: &str, entry: &AuditEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(to_canonical_bytes(entry));
    hex::encode(hasher.finalize())
}

/// Filter over audit entries. Unset fields match everything; time bounds
/// are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Exact actor.
    pub actor: Option<String>,
    /// Exact action.
    pub action: Option<AuditAction>,
    /// Exact status.
    pub status: Option<AuditStatus>,
    /// Earliest timestamp.
    pub from: Option<DateTime<Utc>>,
    /// Latest timestamp.
    pub to: Option<DateTime<Utc>>,
}

impl AuditFilter {
    /// Match everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to an actor.
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Restrict to an action.
    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Restrict to a status.
    pub fn status(mut self, status: AuditStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restrict to an inclusive time range.
    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Whether an entry passes this filter.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.actor.as_ref().map_or(true, |a| &entry.actor == a)
            && self.action.map_or(true, |a| entry.action == a)
            && self.status.map_or(true, |s| entry.status == s)
            && self.from.map_or(true, |from| entry.timestamp >= from)
            && self.to.map_or(true, |to| entry.timestamp <= to)
    }
}

/// Aggregate summary of audited operations over a time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    /// Range start (inclusive).
    pub start: DateTime<Utc>,
    /// Range end (inclusive).
    pub end: DateTime<Utc>,
    /// Entries in range.
    pub total_operations: usize,
    /// Entries with `Failure` status.
    pub failures: usize,
    /// Entries with `Denied` status.
    pub denials: usize,
    /// `failures / total_operations`, 0 when there are no entries.
    pub failure_rate: f64,
    /// Entry count per action.
    pub by_action: BTreeMap<AuditAction, usize>,
    /// Distinct actors.
    pub actors: BTreeSet<String>,
    /// Mean latency over entries that recorded one.
    pub average_latency_ms: Option<f64>,
    /// Sum of recorded costs.
    pub total_cost: f64,
}

impl ComplianceReport {
    /// Summarize the entries falling within `[start, end]`.
    pub fn from_entries<'a>(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        entries: impl IntoIterator<Item = &'a AuditEntry>,
    ) -> Self {
        let mut report = Self {
            start,
            end,
            total_operations: 0,
            failures: 0,
            denials: 0,
            failure_rate: 0.0,
            by_action: BTreeMap::new(),
            actors: BTreeSet::new(),
            average_latency_ms: None,
            total_cost: 0.0,
        };
        let mut latency_sum = 0u64;
        let mut latency_count = 0u64;

        for entry in entries {
            if entry.timestamp < start || entry.timestamp > end {
                continue;
            }
            report.total_operations += 1;
            match entry.status {
                AuditStatus::Failure => report.failures += 1,
                AuditStatus::Denied => report.denials += 1,
                AuditStatus::Success => {}
            }
            *report.by_action.entry(entry.action).or_insert(0) += 1;
            report.actors.insert(entry.actor.clone());
            if let Some(latency) = entry.latency_ms {
                latency_sum += latency;
                latency_count += 1;
            }
            report.total_cost += entry.cost.unwrap_or(0.0);
        }

        if report.total_operations > 0 {
            report.failure_rate = report.failures as f64 / report.total_operations as f64;
        }
        if latency_count > 0 {
            report.average_latency_ms = Some(latency_sum as f64 / latency_count as f64);
        }
        report
    }

    /// Number of distinct actors.
    pub fn distinct_actors(&self) -> usize {
        self.actors.len()
    }
}

/// Append-only audit sink.
///
/// Implementations must preserve insertion order and be safe to share
/// across threads.
pub trait AuditLog: Send + Sync {
    /// Append an entry. Never fails.
    fn record(&self, entry: AuditEntry);

    /// Entries passing `filter`, in insertion order.
    fn entries(&self, filter: &AuditFilter) -> Vec<AuditEntry>;

    /// Total number of entries.
    fn len(&self) -> usize;

    /// Whether the log is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compliance summary for `[start, end]`.
    fn compliance_report(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> ComplianceReport {
        let entries = self.entries(&AuditFilter::all().between(start, end));
        ComplianceReport::from_entries(start, end, &entries)
    }
}

/// In-memory, hash-chained audit log.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<SealedEntry>>,
}

impl InMemoryAuditLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the sealed chain.
    pub fn sealed(&self) -> Vec<SealedEntry> {
        self.entries.read().clone()
    }

    /// Hash of the most recent entry (genesis hash when empty).
    pub fn head_hash(&self) -> String {
        self.entries
            .read()
            .last()
            .map_or_else(|| GENESIS_HASH.to_string(), |e| e.hash.clone())
    }

    /// Recompute the chain. Returns the sequence of the first entry whose
    /// hash or link does not verify.
    pub fn verify_chain(&self) -> Result<(), u64> {
        Self::verify_sealed(&self.entries.read())
    }

    /// Verify an exported chain.
    pub fn verify_sealed(chain: &[SealedEntry]) -> Result<(), u64> {
        let mut previous = GENESIS_HASH.to_string();
        for sealed in chain {
            if sealed.previous_hash != previous || seal_hash(&previous, &sealed.entry) != sealed.hash {
                return Err(sealed.sequence);
            }
            previous = sealed.hash.clone();
        }
        Ok(())
    }
}

impl AuditLog for InMemoryAuditLog {
    fn record(&self, entry: AuditEntry) {
        let mut entries = self.entries.write();
        let previous_hash = entries
            .last()
            .map_or_else(|| GENESIS_HASH.to_string(), |e| e.hash.clone());
        let hash = seal_hash(&previous_hash, &entry);
        tracing::debug!(
            audit_id = %entry.id,
            actor = %entry.actor,
            action = %entry.action,
            status = ?entry.status,
            "audit entry recorded"
        );
        let sequence = entries.len() as u64;
        entries.push(SealedEntry {
            sequence,
            entry,
            previous_hash,
            hash,
        });
    }

    fn entries(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        self.entries
            .read()
            .iter()
            .filter(|s| filter.matches(&s.entry))
            .map(|s| s.entry.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_record_preserves_order_and_filters() {
        let log = InMemoryAuditLog::new();
        log.record(AuditEntry::new("alice", AuditAction::Query, AuditStatus::Success).with_query("q1"));
        log.record(AuditEntry::new("bob", AuditAction::Plan, AuditStatus::Failure));
        log.record(AuditEntry::new("alice", AuditAction::Plan, AuditStatus::Success));

        assert_eq!(log.len(), 3);

        let alice = log.entries(&AuditFilter::all().actor("alice"));
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].query.as_deref(), Some("q1"));

        let plans = log.entries(&AuditFilter::all().action(AuditAction::Plan));
        assert_eq!(plans.iter().map(|e| e.actor.as_str()).collect::<Vec<_>>(), vec!["bob", "alice"]);

        let failures = log.entries(&AuditFilter::all().status(AuditStatus::Failure));
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn test_compliance_report_counts() {
        let log = InMemoryAuditLog::new();
        log.record(AuditEntry::new("a", AuditAction::Query, AuditStatus::Success).at(t(0)).with_latency_ms(10));
        log.record(AuditEntry::new("b", AuditAction::Plan, AuditStatus::Failure).at(t(10)).with_cost(2.5));
        log.record(AuditEntry::new("a", AuditAction::Governance, AuditStatus::Denied).at(t(20)).with_latency_ms(30));
        log.record(AuditEntry::new("c", AuditAction::Query, AuditStatus::Success).at(t(100)));

        let report = log.compliance_report(t(0), t(20));
        assert_eq!(report.total_operations, 3);
        assert_eq!(report.failures, 1);
        assert_eq!(report.denials, 1);
        assert!((report.failure_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.distinct_actors(), 2);
        assert_eq!(report.by_action.get(&AuditAction::Query), Some(&1));
        assert_eq!(report.average_latency_ms, Some(20.0));
        assert_eq!(report.total_cost, 2.5);
    }

    #[test]
    fn test_compliance_report_empty_range() {
        let log = InMemoryAuditLog::new();
        log.record(AuditEntry::new("a", AuditAction::Query, AuditStatus::Failure).at(t(0)));

        let report = log.compliance_report(t(1000), t(2000));
        assert_eq!(report.total_operations, 0);
        assert_eq!(report.failure_rate, 0.0);
        assert!(report.average_latency_ms.is_none());
    }

    #[test]
    fn test_range_is_inclusive() {
        let entries = vec![
            AuditEntry::new("a", AuditAction::Query, AuditStatus::Success).at(t(0)),
            AuditEntry::new("a", AuditAction::Query, AuditStatus::Success).at(t(5)),
        ];
        let report = ComplianceReport::from_entries(t(0), t(5), &entries);
        assert_eq!(report.total_operations, 2);

        let report = ComplianceReport::from_entries(t(0), t(5) - Duration::seconds(1), &entries);
        assert_eq!(report.total_operations, 1);
    }

    #[test]
    fn test_chain_verifies_and_detects_tampering() {
        let log = InMemoryAuditLog::new();
        assert_eq!(log.head_hash(), GENESIS_HASH);
        for i in 0..4 {
            log.record(AuditEntry::new(format!("actor-{i}"), AuditAction::Query, AuditStatus::Success));
        }
        assert!(log.verify_chain().is_ok());

        let mut chain = log.sealed();
        chain[2].entry.status = AuditStatus::Failure;
        assert_eq!(InMemoryAuditLog::verify_sealed(&chain), Err(2));
    }
}
