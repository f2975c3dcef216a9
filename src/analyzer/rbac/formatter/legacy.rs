//! Legacy flat JSON formatter.
//!
//! Older consumers expect one object per subject whose roles list rule
//! fields as flat arrays, with a literal `"###"` closing each rule. This
//! output exists for them only.

use crate::analyzer::rbac::audit::AuditReport;
use crate::analyzer::rbac::model::Role;
use crate::analyzer::rbac::types::ObjectRef;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Marks the end of one rule in the flattened lists.
pub const RULE_DELIMITER: &str = "###";

/// Format an audit report in the legacy layout.
pub fn format(report: &AuditReport) -> String {
    let mut subjects: BTreeMap<String, LegacySubject> = BTreeMap::new();

    for (subject, perm) in &report.permissions {
        let mut role_scopes: BTreeMap<&ObjectRef, BTreeSet<String>> = BTreeMap::new();
        for provenance in perm.grants.values().chain(perm.non_resource_grants.values()).flatten() {
            role_scopes
                .entry(&provenance.role)
                .or_default()
                .insert(provenance.scope.to_string());
        }

        let roles = role_scopes
            .into_iter()
            .filter_map(|(role_ref, scopes)| {
                let role = report.roles.get(role_ref)?;
                Some(LegacyRole::new(role, scopes.into_iter().collect()))
            })
            .collect();

        subjects.insert(
            subject.identifier(),
            LegacySubject {
                kind: subject.kind.as_str(),
                name: subject.name.clone(),
                namespace: subject.namespace.clone(),
                roles,
                risks: Vec::new(),
            },
        );
    }

    for finding in &report.findings {
        if let Some(entry) = subjects.get_mut(&finding.subject.identifier()) {
            entry.risks.push(LegacyRisk {
                id: finding.pattern_id.clone(),
                level: finding.severity.as_str(),
            });
        }
    }

    serde_json::to_string_pretty(&subjects).unwrap_or_else(|_| "{}".to_string())
}

#[derive(Serialize)]
struct LegacySubject {
    kind: &'static str,
    name: String,
    namespace: Option<String>,
    roles: Vec<LegacyRole>,
    risks: Vec<LegacyRisk>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRole {
    kind: &'static str,
    name: String,
    namespace: Option<String>,
    scopes: Vec<String>,
    api_groups: Vec<String>,
    resources: Vec<String>,
    non_resource_urls: Vec<String>,
    verbs: Vec<String>,
}

impl LegacyRole {
    fn new(role: &Role, scopes: Vec<String>) -> Self {
        let mut legacy = Self {
            kind: role.kind.as_str(),
            name: role.name.clone(),
            namespace: role.namespace.clone(),
            scopes,
            api_groups: Vec::new(),
            resources: Vec::new(),
            non_resource_urls: Vec::new(),
            verbs: Vec::new(),
        };
        for rule in &role.rules {
            flatten_into(&mut legacy.api_groups, &rule.api_groups);
            flatten_into(&mut legacy.resources, &rule.resources);
            flatten_into(&mut legacy.non_resource_urls, &rule.non_resource_urls);
            flatten_into(&mut legacy.verbs, &rule.verbs);
        }
        legacy
    }
}

fn flatten_into(target: &mut Vec<String>, values: &BTreeSet<String>) {
    target.extend(values.iter().cloned());
    target.push(RULE_DELIMITER.to_string());
}

#[derive(Serialize)]
struct LegacyRisk {
    id: String,
    level: &'static str,
}
