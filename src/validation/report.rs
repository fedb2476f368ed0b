use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub security_issues: Vec<String>,
    pub performance_notes: Vec<String>,
    pub suggestions: Vec<String>,
    pub summary: String,
}

impl ValidationReport {
    /// Recompute validity and summary from the collected findings.
    pub fn finalize(mut self) -> Self {
        self.is_valid = self.errors.is_empty();
        self.summary = self.summarize();
        self
    }

    pub fn total_issues(&self) -> usize {
        self.errors.len()
            + self.warnings.len()
            + self.security_issues.len()
            + self.performance_notes.len()
            + self.suggestions.len()
    }

    fn summarize(&self) -> String {
        if !self.is_valid {
            return format!("Query has {} errors that must be fixed", self.errors.len());
        }
        match self.total_issues() {
            0 => "Query is valid and ready for execution".to_string(),
            n => format!("Query is valid but has {} issues to consider", n),
        }
    }

    /// Human-readable multi-section report
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        let status = if self.is_valid { "VALID" } else { "INVALID" };
        lines.push(format!("SQL Validation Status: {}", status));
        lines.push("=".repeat(50));

        let sections = [
            ("ERRORS (must fix)", &self.errors),
            ("WARNINGS", &self.warnings),
            ("SECURITY ISSUES", &self.security_issues),
            ("PERFORMANCE NOTES", &self.performance_notes),
            ("SUGGESTIONS", &self.suggestions),
        ];
        for (title, items) in sections {
            if items.is_empty() {
                continue;
            }
            lines.push(String::new());
            lines.push(format!("{}:", title));
            lines.extend(items.iter().map(|item| format!("  - {}", item)));
        }

        lines.push(String::new());
        lines.push("SUMMARY:".to_string());
        lines.push(format!("  {}", self.summary));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_strings() {
        let clean = ValidationReport::default().finalize();
        assert!(clean.is_valid);
        assert_eq!(clean.summary, "Query is valid and ready for execution");

        let noted = ValidationReport {
            performance_notes: vec!["DISTINCT operation may be expensive on large datasets".to_string()],
            suggestions: vec!["Sort order requirement not implemented in query".to_string()],
            ..ValidationReport::default()
        }
        .finalize();
        assert!(noted.is_valid);
        assert_eq!(noted.summary, "Query is valid but has 2 issues to consider");

        let broken = ValidationReport {
            errors: vec!["Missing FROM clause".to_string()],
            warnings: vec!["Unmatched quotes detected".to_string()],
            ..ValidationReport::default()
        }
        .finalize();
        assert!(!broken.is_valid);
        assert_eq!(broken.summary, "Query has 1 errors that must be fixed");
    }

    #[test]
    fn test_render_lists_only_non_empty_sections() {
        let report = ValidationReport {
            errors: vec!["Missing FROM clause".to_string()],
            ..ValidationReport::default()
        }
        .finalize();
        let text = report.render();
        assert!(text.starts_with("SQL Validation Status: INVALID"));
        assert!(text.contains("ERRORS (must fix):\n  - Missing FROM clause"));
        assert!(!text.contains("WARNINGS"));
        assert!(text.ends_with("Query has 1 errors that must be fixed"));
    }
}
