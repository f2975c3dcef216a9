//! Audit orchestration.
//!
//! Ties together the model, binding resolution, aggregation and the catalog
//! to provide the main audit API.

use crate::analyzer::rbac::aggregate::{EffectivePermission, aggregate};
use crate::analyzer::rbac::catalog::{CATALOG_VERSION, Catalog, CatalogConfigurationError};
use crate::analyzer::rbac::config::AuditConfig;
use crate::analyzer::rbac::evaluate::{Finding, evaluate};
use crate::analyzer::rbac::model::Role;
use crate::analyzer::rbac::snapshot::RbacSnapshot;
use crate::analyzer::rbac::types::{ObjectRef, Severity, Subject};
use crate::analyzer::rbac::warning::{AnalysisWarning, ManifestWarning};
use serde::Serialize;
use std::collections::BTreeMap;

/// Result of auditing one RBAC snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditReport {
    /// Effective permissions per subject.
    pub permissions: BTreeMap<Subject, EffectivePermission>,
    /// Escalation findings, sorted.
    pub findings: Vec<Finding>,
    /// Recoverable problems met along the way.
    pub warnings: Vec<AnalysisWarning>,
    /// Every parsed role after aggregation, for reporters that show rules.
    pub roles: BTreeMap<ObjectRef, Role>,
    pub summary: AuditSummary,
}

/// Summary of an audit run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    /// Number of raw RBAC objects analyzed.
    pub objects_analyzed: usize,
    pub subjects: usize,
    /// Distinct (subject, triple) grants.
    pub grants: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub warnings: usize,
    pub catalog_version: u32,
    /// Whether no finding reached the failure threshold.
    pub passed: bool,
}

impl AuditSummary {
    fn count(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }
}

impl AuditReport {
    pub fn has_findings(&self) -> bool {
        !self.findings.is_empty()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }

    /// Check if the results should cause a non-zero exit.
    pub fn should_fail(&self, config: &AuditConfig) -> bool {
        self.max_severity().is_some_and(|s| config.should_fail(s))
    }

    /// Prepend warnings raised while loading the manifests.
    pub fn with_manifest_warnings(mut self, warnings: Vec<ManifestWarning>) -> Self {
        if warnings.is_empty() {
            return self;
        }
        let mut merged: Vec<AnalysisWarning> =
            warnings.into_iter().map(AnalysisWarning::from).collect();
        merged.append(&mut self.warnings);
        self.warnings = merged;
        self.summary.warnings = self.warnings.len();
        self
    }

    /// Findings for one subject, in report order.
    pub fn findings_for<'a>(&'a self, subject: &'a Subject) -> impl Iterator<Item = &'a Finding> {
        self.findings.iter().filter(move |f| &f.subject == subject)
    }
}

/// Audit a snapshot with a catalog built from `config`.
pub fn audit(
    snapshot: &RbacSnapshot,
    config: &AuditConfig,
) -> Result<AuditReport, CatalogConfigurationError> {
    let catalog = Catalog::from_config(config)?;
    Ok(audit_with_catalog(snapshot, &catalog, config))
}

/// Audit a snapshot with an already validated catalog.
pub fn audit_with_catalog(
    snapshot: &RbacSnapshot,
    catalog: &Catalog,
    config: &AuditConfig,
) -> AuditReport {
    let (model, mut warnings) = snapshot.to_model();
    let (graph, orphans) = model.build_graph();
    warnings.extend(orphans);

    let permissions = aggregate(&graph);
    let mut findings = evaluate(&permissions, catalog);
    findings.retain(|f| !config.is_subject_ignored(&f.subject));

    let mut summary = AuditSummary {
        objects_analyzed: snapshot.len(),
        subjects: permissions.len(),
        grants: permissions.values().map(|p| p.grants.len()).sum(),
        warnings: warnings.len(),
        catalog_version: CATALOG_VERSION,
        ..Default::default()
    };
    for finding in &findings {
        summary.count(finding.severity);
    }

    let roles = model
        .roles
        .into_iter()
        .chain(model.cluster_roles)
        .map(|role| (role.object_ref(), role))
        .collect();

    let mut report = AuditReport {
        permissions,
        findings,
        warnings,
        roles,
        summary,
    };
    report.summary.passed = !report.should_fail(config);
    log::info!(
        "audited {} objects: {} subjects, {} findings, {} warnings",
        report.summary.objects_analyzed,
        report.summary.subjects,
        report.findings.len(),
        report.summary.warnings
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::rbac::parser::yaml::parse_manifests;

    const MANIFESTS: &str = r#"
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: operator
rules:
  - apiGroups: [""]
    resources: ["secrets"]
    verbs: ["get", "list"]
  - apiGroups: [""]
    resources: ["pods"]
    verbs: ["create"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: operator
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: operator
subjects:
  - kind: ServiceAccount
    name: operator
    namespace: operators
---
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata:
  name: dangling
  namespace: operators
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: Role
  name: missing
subjects:
  - kind: User
    name: jane
"#;

    fn snapshot() -> RbacSnapshot {
        parse_manifests(MANIFESTS).0
    }

    #[test]
    fn test_audit_end_to_end() {
        let report = audit(&snapshot(), &AuditConfig::default()).unwrap();
        assert_eq!(report.summary.objects_analyzed, 3);
        assert_eq!(report.summary.subjects, 1);
        assert_eq!(report.summary.medium, 2);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].code(), "orphan-binding");
        // Medium is below the default high threshold
        assert!(report.summary.passed);
        assert_eq!(report.max_severity(), Some(Severity::Medium));

        let sa = Subject::service_account("operators", "operator");
        assert_eq!(report.findings_for(&sa).count(), 2);
    }

    #[test]
    fn test_threshold_controls_failure() {
        let config = AuditConfig::new().with_threshold(Severity::Medium);
        let report = audit(&snapshot(), &config).unwrap();
        assert!(!report.summary.passed);
        assert!(report.should_fail(&config));
    }

    #[test]
    fn test_ignored_subjects_dropped_from_findings() {
        let config = AuditConfig::new().ignore_subject("ServiceAccount:operators/operator");
        let report = audit(&snapshot(), &config).unwrap();
        assert!(!report.has_findings());
        // Permissions are still reported
        assert_eq!(report.permissions.len(), 1);
    }

    #[test]
    fn test_manifest_warnings_come_first() {
        let report = audit(&snapshot(), &AuditConfig::default())
            .unwrap()
            .with_manifest_warnings(vec![ManifestWarning {
                path: "broken.yaml".into(),
                message: "invalid YAML".to_string(),
            }]);
        assert_eq!(report.warnings.len(), 2);
        assert_eq!(report.warnings[0].code(), "manifest");
        assert_eq!(report.summary.warnings, 2);
    }

    #[test]
    fn test_invalid_catalog_is_fatal() {
        let config = AuditConfig::new().include("does-not-exist");
        assert!(audit(&snapshot(), &config).is_err());
    }
}
