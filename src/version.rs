//! Schema version ledger and migrations.
//!
//! Versions are appended in registration order; the ledger never sorts or
//! checks monotonicity, that is the caller's job. Range queries compare
//! version identifiers lexicographically, so `"1.10"` sorts before `"1.9"`.
//! Use zero-padded identifiers if that matters.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Atom, AtomKind};

/// One schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchemaChange {
    /// New attribute on a kind.
    AddedProperty {
        /// Affected kind.
        kind: AtomKind,
        /// Attribute name.
        property: String,
        /// Value backfilled on atoms lacking the attribute.
        #[serde(default)]
        default: Option<Value>,
    },
    /// Attribute dropped from a kind.
    RemovedProperty {
        /// Affected kind.
        kind: AtomKind,
        /// Attribute name.
        property: String,
    },
    /// Attribute renamed.
    RenamedProperty {
        /// Affected kind.
        kind: AtomKind,
        /// Old name.
        from: String,
        /// New name.
        to: String,
    },
    /// Kind scheduled for removal.
    DeprecatedNode {
        /// Deprecated kind.
        kind: AtomKind,
    },
    /// New kind introduced.
    AddedNodeKind {
        /// New kind.
        kind: AtomKind,
    },
}

impl SchemaChange {
    /// Apply to one atom. Returns whether the atom changed.
    pub fn apply(&self, atom: &mut Atom) -> bool {
        match self {
            Self::AddedProperty { kind, property, default } => {
                let Some(default) = default else { return false };
                if atom.kind != *kind || atom.attributes.contains_key(property) {
                    return false;
                }
                atom.attributes.insert(property.clone(), default.clone());
                true
            }
            Self::RemovedProperty { kind, property } => atom.kind == *kind && atom.attributes.remove(property).is_some(),
            Self::RenamedProperty { kind, from, to } => {
                if atom.kind != *kind {
                    return false;
                }
                match atom.attributes.remove(from) {
                    Some(value) => {
                        atom.attributes.insert(to.clone(), value);
                        true
                    }
                    None => false,
                }
            }
            Self::DeprecatedNode { .. } | Self::AddedNodeKind { .. } => false,
        }
    }
}

/// Error raised by a migration procedure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Migration failed: {0}")]
pub struct MigrationError(pub String);

/// Data migration attached to a version.
pub trait Migration: Send + Sync + std::fmt::Debug {
    /// Migrate atoms to `version`. Returns the number of atoms touched.
    fn migrate(&self, atoms: &mut [Atom], version: &SchemaVersion) -> Result<usize, MigrationError>;
}

/// Migration that replays the version's own change list.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayChanges;

impl Migration for ReplayChanges {
    fn migrate(&self, atoms: &mut [Atom], version: &SchemaVersion) -> Result<usize, MigrationError> {
        let mut touched = 0;
        for atom in atoms.iter_mut() {
            let mut changed = false;
            for change in &version.changes {
                changed |= change.apply(atom);
            }
            touched += usize::from(changed);
        }
        Ok(touched)
    }
}

/// One ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Version identifier.
    pub version: String,
    /// Release time.
    pub released_at: DateTime<Utc>,
    /// Release notes.
    #[serde(default)]
    pub description: String,
    /// Changes in this version.
    #[serde(default)]
    pub changes: Vec<SchemaChange>,
    /// Data migration; `None` is a no-op.
    #[serde(skip)]
    pub migration: Option<Arc<dyn Migration>>,
}

impl SchemaVersion {
    /// Create a version without changes or migration.
    pub fn new(version: impl Into<String>, released_at: DateTime<Utc>) -> Self {
        Self {
            version: version.into(),
            released_at,
            description: String::new(),
            changes: Vec::new(),
            migration: None,
        }
    }

    /// Add a change.
    pub fn with_change(mut self, change: SchemaChange) -> Self {
        self.changes.push(change);
        self
    }

    /// Attach a migration.
    pub fn with_migration(mut self, migration: Arc<dyn Migration>) -> Self {
        self.migration = Some(migration);
        self
    }
}

/// Error type for version operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// Target version not in the ledger.
    #[error("Unknown schema version: {0}")]
    UnknownVersion(String),
    /// Target precedes the current version.
    #[error("Cannot migrate backwards from {current} to {target}")]
    Downgrade {
        /// Current version.
        current: String,
        /// Requested version.
        target: String,
    },
    /// A migration procedure failed; earlier versions stay applied.
    #[error("Migration to {version} failed: {source}")]
    MigrationFailed {
        /// Version whose migration failed.
        version: String,
        /// Underlying error.
        #[source]
        source: MigrationError,
    },
}

/// Outcome of a migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Version before the run.
    pub from: Option<String>,
    /// Version after the run.
    pub to: String,
    /// Versions whose migration ran, ascending.
    pub applied: Vec<String>,
    /// Versions in range with no migration.
    pub skipped: Vec<String>,
    /// Atoms touched across all migrations.
    pub atoms_touched: usize,
}

#[derive(Debug, Default)]
struct Ledger {
    versions: Vec<SchemaVersion>,
    current: Option<String>,
}

/// Ordered, append-only version ledger.
#[derive(Debug, Default)]
pub struct VersionManager {
    ledger: RwLock<Ledger>,
}

impl VersionManager {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a version.
    pub fn register_version(&self, version: SchemaVersion) {
        tracing::info!(version = %version.version, changes = version.changes.len(), "schema version registered");
        self.ledger.write().versions.push(version);
    }

    /// Version identifiers in registration order.
    pub fn versions(&self) -> Vec<String> {
        self.ledger.read().versions.iter().map(|v| v.version.clone()).collect()
    }

    /// Look up a version.
    pub fn get(&self, version: &str) -> Option<SchemaVersion> {
        self.ledger.read().versions.iter().find(|v| v.version == version).cloned()
    }

    /// Currently recorded version.
    pub fn current_version(&self) -> Option<String> {
        self.ledger.read().current.clone()
    }

    /// Record the current version without migrating.
    pub fn set_current(&self, version: &str) -> Result<(), VersionError> {
        let mut ledger = self.ledger.write();
        if !ledger.versions.iter().any(|v| v.version == version) {
            return Err(VersionError::UnknownVersion(version.to_string()));
        }
        ledger.current = Some(version.to_string());
        Ok(())
    }

    /// Changes of versions in `(from, to]`, in registration order.
    pub fn change_log(&self, from: &str, to: &str) -> Vec<SchemaChange> {
        self.ledger
            .read()
            .versions
            .iter()
            .filter(|v| v.version.as_str() > from && v.version.as_str() <= to)
            .flat_map(|v| v.changes.iter().cloned())
            .collect()
    }

    /// Replay migrations for versions in `(current, target]` in ascending
    /// order, then record `target` as current.
    ///
    /// On failure the current version is left at the last version that
    /// migrated cleanly.
    pub fn migrate(&self, atoms: &mut [Atom], target: &str) -> Result<MigrationReport, VersionError> {
        let mut ledger = self.ledger.write();
        if !ledger.versions.iter().any(|v| v.version == target) {
            return Err(VersionError::UnknownVersion(target.to_string()));
        }
        let from = ledger.current.clone();
        if let Some(current) = &from {
            if current.as_str() > target {
                return Err(VersionError::Downgrade {
                    current: current.clone(),
                    target: target.to_string(),
                });
            }
        }

        let mut pending: Vec<SchemaVersion> = ledger
            .versions
            .iter()
            .filter(|v| from.as_deref().map_or(true, |c| v.version.as_str() > c) && v.version.as_str() <= target)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.version.cmp(&b.version));

        let mut report = MigrationReport {
            from: from.clone(),
            to: target.to_string(),
            applied: Vec::new(),
            skipped: Vec::new(),
            atoms_touched: 0,
        };

        for version in &pending {
            let Some(migration) = &version.migration else {
                report.skipped.push(version.version.clone());
                ledger.current = Some(version.version.clone());
                continue;
            };
            let touched = migration.migrate(atoms, version).map_err(|source| {
                tracing::warn!(version = %version.version, error = %source, "migration failed");
                VersionError::MigrationFailed {
                    version: version.version.clone(),
                    source,
                }
            })?;
            tracing::debug!(version = %version.version, touched, "migration applied");
            report.atoms_touched += touched;
            report.applied.push(version.version.clone());
            ledger.current = Some(version.version.clone());
        }

        ledger.current = Some(target.to_string());
        tracing::info!(
            from = from.as_deref().unwrap_or("<none>"),
            to = target,
            applied = report.applied.len(),
            touched = report.atoms_touched,
            "schema migration complete"
        );
        Ok(report)
    }
}
