//! Recoverable, per-object problems found during an analysis run.
//!
//! None of these abort a run. They are collected next to the results so the
//! caller can surface them (audit-log lines, report footers) without holding
//! back the findings.

use crate::analyzer::rbac::types::ObjectRef;
use serde::Serialize;
use std::path::PathBuf;

/// Why a rule was dropped from its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MalformedRuleReason {
    /// Neither resources nor non-resource URLs are listed.
    NoResources,
    /// The rule lists no verbs.
    NoVerbs,
    /// Resources are listed without any API group.
    NoApiGroups,
}

impl MalformedRuleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoResources => "rule has no resources and no non-resource URLs",
            Self::NoVerbs => "rule has no verbs",
            Self::NoApiGroups => "rule lists resources without apiGroups",
        }
    }
}

/// A single rule could not be used; the rest of its role still applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{role}: rule #{index} dropped: {}", reason.as_str())]
pub struct MalformedRuleError {
    pub role: ObjectRef,
    /// Zero-based position of the rule in the role.
    pub index: usize,
    pub reason: MalformedRuleReason,
}

/// A binding subject that cannot be turned into an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{binding}: subject {kind}/{name} skipped: {reason}")]
pub struct MalformedSubject {
    pub binding: ObjectRef,
    pub kind: String,
    pub name: String,
    pub reason: String,
}

/// A binding whose roleRef does not resolve against the supplied roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{binding}: roleRef {role_ref_kind}/{role_ref_name} not found, binding ignored")]
pub struct OrphanWarning {
    pub binding: ObjectRef,
    pub role_ref_kind: String,
    pub role_ref_name: String,
}

/// An aggregated ClusterRole selector that is only partly evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{role}: aggregation selector #{index} uses matchExpressions and was skipped")]
pub struct UnsupportedSelector {
    pub role: ObjectRef,
    pub index: usize,
}

/// A manifest document or file that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{}: {message}", path.display())]
pub struct ManifestWarning {
    pub path: PathBuf,
    pub message: String,
}

/// Every recoverable warning an analysis run can produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AnalysisWarning {
    #[error(transparent)]
    MalformedRule(#[from] MalformedRuleError),
    #[error(transparent)]
    MalformedSubject(#[from] MalformedSubject),
    #[error(transparent)]
    Orphan(#[from] OrphanWarning),
    #[error(transparent)]
    UnsupportedSelector(#[from] UnsupportedSelector),
    #[error(transparent)]
    Manifest(#[from] ManifestWarning),
}

impl AnalysisWarning {
    /// Short machine-friendly name of the warning class.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedRule(_) => "malformed-rule",
            Self::MalformedSubject(_) => "malformed-subject",
            Self::Orphan(_) => "orphan-binding",
            Self::UnsupportedSelector(_) => "unsupported-selector",
            Self::Manifest(_) => "manifest",
        }
    }
}
