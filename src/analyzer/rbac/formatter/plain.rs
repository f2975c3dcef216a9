//! Plain text formatter.

use crate::analyzer::rbac::audit::AuditReport;
use crate::analyzer::rbac::catalog::Catalog;

/// Format an audit report as plain text.
pub fn format(report: &AuditReport, catalog: &Catalog) -> String {
    let mut output = String::new();

    for finding in &report.findings {
        let pattern = catalog.get(&finding.pattern_id);
        let description = pattern.map(|p| p.description.as_str()).unwrap_or_default();

        output.push_str(&format!(
            "[{}] {} {} - {}\n",
            finding.severity.as_str().to_uppercase(),
            finding.pattern_id,
            finding.subject,
            description,
        ));
        for grant in &finding.matched_grants {
            output.push_str(&format!("  grant: {}\n", grant));
        }
        for provenance in &finding.evidence {
            output.push_str(&format!("  via: {}\n", provenance));
        }
        if let Some(pattern) = pattern.filter(|p| !p.remediation.is_empty()) {
            output.push_str(&format!("  Remediation: {}\n", pattern.remediation));
        }
    }

    if !report.warnings.is_empty() {
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str("Warnings:\n");
        for warning in &report.warnings {
            output.push_str(&format!("  {}: {}\n", warning.code(), warning));
        }
    }

    let summary = &report.summary;
    if report.findings.is_empty() {
        output.push_str("No escalation risks found.\n");
    } else {
        output.push_str(&format!(
            "\nFound {} risk(s): {} critical, {} high, {} medium, {} low.\n",
            report.findings.len(),
            summary.critical,
            summary.high,
            summary.medium,
            summary.low,
        ));
    }
    output.push_str(&format!(
        "Analyzed {} objects, {} subjects, {} grants (catalog v{}).\n",
        summary.objects_analyzed, summary.subjects, summary.grants, summary.catalog_version,
    ));

    output
}
