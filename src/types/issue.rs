//! Integrity issues reported by graph validation.
//!
//! ## Issue Types
//!
//! | Code | Issue | Severity |
//! |------|-------|----------|
//! | CYCLE | Dependency cycle re-entered at an atom | ERROR |
//! | BROKEN_REF | Edge target missing from the snapshot | CRITICAL |
//! | LINT-001 | PROCESS without a PERFORMED_BY edge | ERROR |
//! | LINT-002 | CRITICAL atom without a documented exception | WARNING |
//! | LINT-003 | Display name too short | INFO |
//! | SCHEMA | Missing required attribute / illegal edge kind | ERROR / WARNING |
//!
//! Issues are data, never errors: validation always completes and
//! returns every issue it found.

use serde::{Deserialize, Serialize};

use super::atom::AtomId;

/// Severity levels for integrity issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Cosmetic; no action needed.
    Info,
    /// Should be fixed before the next release.
    Warning,
    /// Breaks a modelling rule.
    Error,
    /// Graph cannot be trusted until fixed.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Domain lint rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LintRule {
    /// Every PROCESS needs someone to perform it.
    MissingPerformer,
    /// Every CRITICAL atom needs a documented exception path.
    UndocumentedCriticalAtom,
    /// Display names must be descriptive.
    ShortDisplayName,
}

impl LintRule {
    /// Stable lint code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingPerformer => "LINT-001",
            Self::UndocumentedCriticalAtom => "LINT-002",
            Self::ShortDisplayName => "LINT-003",
        }
    }

    /// Severity this lint reports at.
    pub fn severity(&self) -> Severity {
        match self {
            Self::MissingPerformer => Severity::Error,
            Self::UndocumentedCriticalAtom => Severity::Warning,
            Self::ShortDisplayName => Severity::Info,
        }
    }
}

/// Type of integrity issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "rule", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueType {
    /// A dependency walk re-entered an atom still on the stack.
    Cycle,
    /// An edge points at an atom missing from the snapshot.
    BrokenRef,
    /// Domain lint violation.
    Lint(LintRule),
    /// Schema violation.
    Schema,
}

impl IssueType {
    /// Stable code used by dashboards.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cycle => "CYCLE",
            Self::BrokenRef => "BROKEN_REF",
            Self::Lint(rule) => rule.code(),
            Self::Schema => "SCHEMA",
        }
    }
}

/// A structural graph defect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    /// Issue type.
    pub issue_type: IssueType,
    /// Severity level.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
    /// Affected atoms; the first is the anchor.
    pub atom_ids: Vec<AtomId>,
}

impl IntegrityIssue {
    /// Create a new issue.
    pub fn new(
        issue_type: IssueType,
        severity: Severity,
        message: impl Into<String>,
        atom_ids: Vec<AtomId>,
    ) -> Self {
        Self {
            issue_type,
            severity,
            message: message.into(),
            atom_ids,
        }
    }

    /// Create a lint issue at the rule's own severity.
    pub fn lint(rule: LintRule, atom_id: AtomId, message: impl Into<String>) -> Self {
        Self::new(IssueType::Lint(rule), rule.severity(), message, vec![atom_id])
    }

    /// Stable code of this issue.
    pub fn code(&self) -> &'static str {
        self.issue_type.code()
    }

    /// Anchor atom of this issue.
    pub fn anchor(&self) -> Option<&AtomId> {
        self.atom_ids.first()
    }

    /// Log this issue as a structured event.
    pub fn log(&self) {
        match self.severity {
            Severity::Critical | Severity::Error => tracing::warn!(
                code = self.code(),
                severity = %self.severity,
                atoms = ?self.atom_ids,
                "integrity issue: {}",
                self.message
            ),
            Severity::Warning | Severity::Info => tracing::debug!(
                code = self.code(),
                severity = %self.severity,
                atoms = ?self.atom_ids,
                "integrity issue: {}",
                self.message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Error);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn test_lint_codes_and_severity() {
        assert_eq!(LintRule::MissingPerformer.code(), "LINT-001");
        assert_eq!(LintRule::MissingPerformer.severity(), Severity::Error);
        assert_eq!(LintRule::UndocumentedCriticalAtom.severity(), Severity::Warning);
        assert_eq!(LintRule::ShortDisplayName.severity(), Severity::Info);
    }

    #[test]
    fn test_issue_code() {
        let issue = IntegrityIssue::lint(LintRule::ShortDisplayName, AtomId::new("x"), "short");
        assert_eq!(issue.code(), "LINT-003");
        assert_eq!(issue.anchor(), Some(&AtomId::new("x")));
        assert_eq!(IssueType::BrokenRef.code(), "BROKEN_REF");
    }

    #[test]
    fn test_issue_type_serialization() {
        let json = serde_json::to_value(IssueType::Lint(LintRule::MissingPerformer)).unwrap();
        assert_eq!(json["type"], "LINT");
        assert_eq!(json["rule"], "missing_performer");
    }
}
