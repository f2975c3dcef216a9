//! JSON formatter.
//!
//! Maps keyed by structs are flattened into sorted lists so the output is
//! stable across runs.

use crate::analyzer::rbac::aggregate::EffectivePermission;
use crate::analyzer::rbac::audit::{AuditReport, AuditSummary};
use crate::analyzer::rbac::evaluate::Finding;
use crate::analyzer::rbac::types::{Provenance, Subject};
use serde::Serialize;

/// Format an audit report as JSON.
pub fn format(report: &AuditReport) -> String {
    let output = JsonOutput::from(report);
    serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonOutput<'a> {
    findings: &'a [Finding],
    permissions: Vec<JsonPermission<'a>>,
    warnings: Vec<JsonWarning>,
    summary: &'a AuditSummary,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonPermission<'a> {
    subject: &'a Subject,
    grants: Vec<JsonGrant<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    non_resource_grants: Vec<JsonNonResourceGrant<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonGrant<'a> {
    api_group: &'a str,
    resource: &'a str,
    verb: &'a str,
    provenance: Vec<&'a Provenance>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonNonResourceGrant<'a> {
    url: &'a str,
    verb: &'a str,
    provenance: Vec<&'a Provenance>,
}

#[derive(Serialize)]
struct JsonWarning {
    code: &'static str,
    message: String,
}

impl<'a> From<&'a EffectivePermission> for JsonPermission<'a> {
    fn from(perm: &'a EffectivePermission) -> Self {
        Self {
            subject: &perm.subject,
            grants: perm
                .grants
                .iter()
                .map(|(triple, provenance)| JsonGrant {
                    api_group: &triple.api_group,
                    resource: &triple.resource,
                    verb: &triple.verb,
                    provenance: provenance.iter().collect(),
                })
                .collect(),
            non_resource_grants: perm
                .non_resource_grants
                .iter()
                .map(|(grant, provenance)| JsonNonResourceGrant {
                    url: &grant.url,
                    verb: &grant.verb,
                    provenance: provenance.iter().collect(),
                })
                .collect(),
        }
    }
}

impl<'a> From<&'a AuditReport> for JsonOutput<'a> {
    fn from(report: &'a AuditReport) -> Self {
        Self {
            findings: &report.findings,
            permissions: report.permissions.values().map(JsonPermission::from).collect(),
            warnings: report
                .warnings
                .iter()
                .map(|w| JsonWarning {
                    code: w.code(),
                    message: w.to_string(),
                })
                .collect(),
            summary: &report.summary,
        }
    }
}
