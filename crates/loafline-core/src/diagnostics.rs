//! Structured warnings collected during preprocessing and extraction.
//!
//! The preprocessor never fails on recoverable oddities (a tightened horizon,
//! a leg filtered for shelf life, an unreachable breadroom); it records them
//! here so callers can surface them next to the plan. Errors that abort the
//! solve are raised as typed errors instead, never collected.

use serde::Serialize;

/// Severity of a diagnostic issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Unusual but the solve continues (e.g. shortages will absorb slack).
    Warning,
    /// An element was dropped or ignored (e.g. forecast row outside horizon).
    Error,
}

/// A single issue encountered while preparing or extracting a plan.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Grouping category: "horizon", "routing", "shelf_life", "coverage",
    /// "balance", "warm_start".
    pub category: String,
    pub message: String,
    /// Entity the issue refers to (e.g. "truck T-WED", "leg 6104->6130").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(severity: Severity, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            entity: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;
        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }
        Ok(())
    }
}

/// Collection of diagnostic issues for one planning run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, category: impl Into<String>, message: impl Into<String>) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    pub fn add_warning_with_entity(
        &mut self,
        category: impl Into<String>,
        message: impl Into<String>,
        entity: impl Into<String>,
    ) {
        self.issues.push(
            DiagnosticIssue::new(Severity::Warning, category, message).with_entity(entity),
        );
    }

    pub fn add_error(&mut self, category: impl Into<String>, message: impl Into<String>) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message));
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Absorb all issues from another collection.
    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    /// Issues in a category, for targeted assertions and reporting.
    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_severity() {
        let mut diag = Diagnostics::new();
        diag.add_warning("horizon", "start tightened by caller");
        diag.add_warning_with_entity("shelf_life", "leg filtered", "leg 6104->6130");
        diag.add_error("coverage", "forecast row outside horizon dropped");
        assert_eq!(diag.warning_count(), 2);
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_display_includes_entity() {
        let issue = DiagnosticIssue::new(Severity::Warning, "routing", "no truck serves leg")
            .with_entity("leg Lineage->6130");
        let text = issue.to_string();
        assert!(text.contains("[warning:routing]"));
        assert!(text.contains("Lineage->6130"));
    }

    #[test]
    fn test_merge_and_category_filter() {
        let mut a = Diagnostics::new();
        a.add_warning("horizon", "one");
        let mut b = Diagnostics::new();
        b.add_warning("routing", "two");
        a.merge(b);
        assert_eq!(a.issues.len(), 2);
        assert_eq!(a.in_category("routing").count(), 1);
    }
}
