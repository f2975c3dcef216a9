//! Output formatters for audit reports.

pub mod json;
pub mod legacy;
pub mod plain;

use crate::analyzer::rbac::audit::AuditReport;
use crate::analyzer::rbac::catalog::{Catalog, Pattern};
use serde::Serialize;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Plain text output.
    #[default]
    Plain,
    /// JSON output.
    Json,
    /// Flat per-subject JSON with `###` rule delimiters, for older consumers.
    Legacy,
}

impl OutputFormat {
    /// Parse from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "plain" | "text" => Some(Self::Plain),
            "json" => Some(Self::Json),
            "legacy" => Some(Self::Legacy),
            _ => None,
        }
    }
}

/// Format an audit report to a string.
pub fn format_report_to_string(
    report: &AuditReport,
    catalog: &Catalog,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Plain => plain::format(report, catalog),
        OutputFormat::Json => json::format(report),
        OutputFormat::Legacy => legacy::format(report),
    }
}

/// Render the effective catalog. The legacy format has no catalog layout
/// of its own and falls back to JSON.
pub fn format_catalog_to_string(catalog: &Catalog, format: OutputFormat) -> String {
    match format {
        OutputFormat::Plain => {
            let width = catalog
                .patterns()
                .iter()
                .map(|p| p.id.len())
                .max()
                .unwrap_or(0);
            let mut output = format!(
                "Escalation catalog v{} ({} patterns)\n",
                catalog.version(),
                catalog.len()
            );
            for pattern in catalog.patterns() {
                output.push_str(&format!(
                    "  {:<width$}  {:<8}  {}\n",
                    pattern.id,
                    pattern.severity.as_str(),
                    pattern.description,
                ));
            }
            let namespaces: Vec<&str> = catalog
                .sensitive_namespaces()
                .iter()
                .map(String::as_str)
                .collect();
            output.push_str(&format!(
                "Sensitive namespaces: {}\n",
                namespaces.join(", ")
            ));
            output
        }
        OutputFormat::Json | OutputFormat::Legacy => {
            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            struct CatalogOutput<'a> {
                version: u32,
                sensitive_namespaces: Vec<&'a String>,
                patterns: &'a [Pattern],
            }
            let output = CatalogOutput {
                version: catalog.version(),
                sensitive_namespaces: catalog.sensitive_namespaces().iter().collect(),
                patterns: catalog.patterns(),
            };
            serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(OutputFormat::parse("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("text"), Some(OutputFormat::Plain));
        assert_eq!(OutputFormat::parse("legacy"), Some(OutputFormat::Legacy));
        assert_eq!(OutputFormat::parse("yaml"), None);
    }

    #[test]
    fn test_catalog_listing() {
        let catalog = Catalog::builtin();
        let plain = format_catalog_to_string(&catalog, OutputFormat::Plain);
        assert!(plain.starts_with("Escalation catalog v1 (8 patterns)"));
        assert!(plain.contains("cluster-admin-equivalent"));
        assert!(plain.contains("Sensitive namespaces: kube-system"));

        let json: serde_json::Value =
            serde_json::from_str(&format_catalog_to_string(&catalog, OutputFormat::Json)).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["patterns"].as_array().unwrap().len(), 8);
    }
}
