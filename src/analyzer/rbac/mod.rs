//! RBAC privilege-escalation analysis.
//!
//! Resolves Roles, ClusterRoles, RoleBindings and ClusterRoleBindings into
//! the effective permissions of every User, Group and ServiceAccount, then
//! matches those permissions against a catalog of escalation patterns.
//!
//! # Pipeline
//!
//! raw objects → [`model`] → [`graph`] → [`aggregate`] → [`evaluate`] → [`AuditReport`]
//!
//! Every stage is a pure function over its input. Problems with individual
//! objects (malformed rules, orphan bindings, bad documents) are collected as
//! [`AnalysisWarning`]s next to the findings and never abort a run.
//!
//! # Example
//!
//! ```rust,ignore
//! use rbac_audit::analyzer::rbac::{AuditConfig, audit, parser};
//! use std::path::Path;
//!
//! let (snapshot, _) = parser::load_path(Path::new("./deploy"))?;
//! let report = audit(&snapshot, &AuditConfig::default())?;
//!
//! for finding in &report.findings {
//!     println!("[{}] {} {}", finding.severity, finding.pattern_id, finding.subject);
//! }
//! ```
//!
//! # Built-in patterns
//!
//! - `cluster-admin-equivalent` - every verb on every resource, cluster-wide
//! - `rbac-self-escalation` - `escalate`/`bind` on roles
//! - `direct-clusterrolebinding-write` - create/update clusterrolebindings
//! - `impersonation` - impersonate users, groups or service accounts
//! - `role-modification` - create/update/patch roles
//! - `secret-read` - get/list secrets, scope-aware
//! - `arbitrary-pod-creation` - create pods
//! - `node-modification` - patch/update nodes

pub mod aggregate;
pub mod audit;
pub mod catalog;
pub mod cluster;
pub mod config;
pub mod evaluate;
pub mod formatter;
pub mod graph;
pub mod model;
pub mod parser;
pub mod snapshot;
pub mod types;
pub mod warning;

pub use aggregate::{EffectivePermission, NonResourceGrant, RBAC_VERBS, aggregate};
pub use audit::{AuditReport, AuditSummary, audit, audit_with_catalog};
pub use catalog::{
    CATALOG_VERSION, Catalog, CatalogConfigurationError, MatchMode, Pattern, Predicate,
    ScopePolicy, builtin_patterns,
};
pub use cluster::{ClusterError, ClusterRbacClient};
pub use config::{AuditConfig, ConfigError};
pub use evaluate::{Finding, evaluate};
pub use formatter::{OutputFormat, format_catalog_to_string, format_report_to_string};
pub use graph::{Edge, Graph, ResourceUniverse, build_graph};
pub use model::{Binding, Role, RoleRef, Rule};
pub use parser::{AppManifests, ManifestError, load_apps, load_path, parse_manifest_dir};
pub use snapshot::{RbacModel, RbacSnapshot};
pub use types::{
    EffectiveScope, ObjectRef, PermissionTriple, Provenance, RbacKind, Severity, Subject,
    SubjectKind,
};
pub use warning::{
    AnalysisWarning, MalformedRuleError, MalformedSubject, ManifestWarning, OrphanWarning,
    UnsupportedSelector,
};
