//! Validation report structures

use crate::domain::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub target_table: String,
    pub severity: Severity,
    pub passed: bool,
    /// Rendered message; for passing rules, what was checked
    pub detail: String,
}

/// Ordered results of one validation run plus the overall verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// When the validation was performed
    pub validated_at: DateTime<Utc>,

    /// Results in rule catalog order
    pub results: Vec<RuleResult>,

    /// Duration of validation in milliseconds
    pub duration_ms: u64,

    /// True iff no fatal rule failed
    pub publishable: bool,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            validated_at: Utc::now(),
            results: Vec::new(),
            duration_ms: 0,
            publishable: true,
        }
    }

    /// Record a rule outcome, updating the verdict
    pub fn record(&mut self, result: RuleResult) {
        if !result.passed && result.severity == Severity::Fatal {
            self.publishable = false;
        }
        self.results.push(result);
    }

    pub fn set_duration(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    /// Failed rules of the given severity
    pub fn failures(&self, severity: Severity) -> impl Iterator<Item = &RuleResult> {
        self.results
            .iter()
            .filter(move |r| !r.passed && r.severity == severity)
    }

    pub fn fatal_rule_ids(&self) -> Vec<String> {
        self.failures(Severity::Fatal)
            .map(|r| r.rule_id.clone())
            .collect()
    }

    pub fn warning_count(&self) -> usize {
        self.failures(Severity::Warning).count()
    }

    pub fn has_warnings(&self) -> bool {
        self.warning_count() > 0
    }

    /// Format the report as a human-readable string
    pub fn format_summary(&self) -> String {
        let fatal = self.failures(Severity::Fatal).count();
        let mut summary = String::new();
        summary.push_str("📊 Validation Report\n");
        summary.push_str(&format!("  Validated at: {}\n", self.validated_at));
        summary.push_str(&format!("  Duration: {} ms\n", self.duration_ms));
        summary.push_str(&format!("  Rules evaluated: {}\n", self.results.len()));
        summary.push_str(&format!("  ✅ Passed: {}\n", self.passed()));
        summary.push_str(&format!("  ❌ Fatal failures: {fatal}\n"));
        summary.push_str(&format!("  ⚠️  Warnings: {}\n", self.warning_count()));
        summary.push_str(&format!(
            "  Publishable: {}\n",
            if self.publishable { "yes" } else { "no" }
        ));

        let sections = [
            ("❌ Fatal", Severity::Fatal),
            ("⚠️  Warning", Severity::Warning),
        ];
        for (label, severity) in sections {
            let failed: Vec<_> = self.failures(severity).collect();
            if failed.is_empty() {
                continue;
            }
            summary.push_str(&format!("\n{label}:\n"));
            for (i, result) in failed.iter().enumerate() {
                summary.push_str(&format!("  {}. {}\n", i + 1, result.rule_id));
                summary.push_str(&format!("     {}\n", result.detail));
            }
        }

        summary
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, severity: Severity, passed: bool) -> RuleResult {
        RuleResult {
            rule_id: id.to_string(),
            target_table: "vmt_trends".to_string(),
            severity,
            passed,
            detail: format!("{id} detail"),
        }
    }

    #[test]
    fn test_new_report_is_publishable() {
        let report = ValidationReport::new();
        assert!(report.publishable);
        assert!(report.results.is_empty());
    }

    #[test]
    fn test_one_fatal_and_four_warnings_blocks() {
        let mut report = ValidationReport::new();
        report.record(result("non_negative.vmt_trends", Severity::Fatal, false));
        for i in 0..4 {
            report.record(result(&format!("row_band.t{i}"), Severity::Warning, false));
        }
        report.record(result("exists.vmt_trends", Severity::Fatal, true));

        assert!(!report.publishable);
        assert_eq!(report.fatal_rule_ids(), vec!["non_negative.vmt_trends"]);
        assert_eq!(report.warning_count(), 4);
        assert_eq!(report.passed(), 1);
    }

    #[test]
    fn test_warnings_only_is_publishable() {
        let mut report = ValidationReport::new();
        for i in 0..4 {
            report.record(result(&format!("row_band.t{i}"), Severity::Warning, false));
        }
        assert!(report.publishable);
        assert!(report.has_warnings());
    }

    #[test]
    fn test_results_keep_order() {
        let mut report = ValidationReport::new();
        report.record(result("b", Severity::Warning, true));
        report.record(result("a", Severity::Fatal, true));
        let ids: Vec<_> = report.results.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_format_summary_lists_failures() {
        let mut report = ValidationReport::new();
        report.record(result("bounding_box.collision_map_points", Severity::Fatal, false));
        let summary = report.format_summary();
        assert!(summary.contains("Publishable: no"));
        assert!(summary.contains("bounding_box.collision_map_points"));
    }
}
