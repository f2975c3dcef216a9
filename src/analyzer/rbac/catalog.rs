//! The escalation rule catalog.
//!
//! Patterns are plain data: a predicate over granted triples, a base
//! severity and a scope policy. Adding a risk is adding a table entry.

use crate::analyzer::rbac::aggregate::{RBAC_VERBS, is_known_verb};
use crate::analyzer::rbac::config::AuditConfig;
use crate::analyzer::rbac::types::{EffectiveScope, PermissionTriple, Severity, WILDCARD};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Version of the built-in pattern table.
pub const CATALOG_VERSION: u32 = 1;

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

/// How the verbs of a predicate combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Any listed verb is enough.
    #[default]
    Any,
    /// Every listed verb must be granted on the same group/resource and scope.
    All,
}

/// Which scopes count for a pattern and at what severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopePolicy {
    /// Every scope counts at the base severity.
    #[default]
    Any,
    /// Only cluster-wide grants count.
    ClusterWide,
    /// Cluster-wide and sensitive-namespace grants count at the base
    /// severity, other namespaces at the downgraded one.
    SensitiveNamespaces,
}

/// Which granted triples a pattern is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Predicate {
    /// `None` matches any group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_groups: Option<Vec<String>>,
    pub resources: Vec<String>,
    /// `*` stands for every built-in verb.
    pub verbs: Vec<String>,
    #[serde(default, rename = "match")]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub scope: ScopePolicy,
    /// Severity outside sensitive namespaces, `low` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downgrade_to: Option<Severity>,
}

impl Predicate {
    pub fn new(resources: &[&str], verbs: &[&str]) -> Self {
        Self {
            api_groups: None,
            resources: resources.iter().map(|s| s.to_string()).collect(),
            verbs: verbs.iter().map(|s| s.to_string()).collect(),
            match_mode: MatchMode::Any,
            scope: ScopePolicy::Any,
            downgrade_to: None,
        }
    }

    pub fn in_groups(mut self, groups: &[&str]) -> Self {
        self.api_groups = Some(groups.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn match_all(mut self) -> Self {
        self.match_mode = MatchMode::All;
        self
    }

    pub fn with_scope(mut self, scope: ScopePolicy) -> Self {
        self.scope = scope;
        self
    }

    /// Listed verbs with `*` expanded.
    pub fn expanded_verbs(&self) -> BTreeSet<&str> {
        let mut verbs = BTreeSet::new();
        for verb in &self.verbs {
            if verb == WILDCARD {
                verbs.extend(RBAC_VERBS);
            } else {
                verbs.insert(verb.as_str());
            }
        }
        verbs
    }

    /// Check the group and resource of a granted triple, ignoring the verb.
    ///
    /// A granted `*` stands for names the input never mentions, so it
    /// matches any requested name. A requested `*` only matches a granted `*`.
    pub fn matches_target(&self, triple: &PermissionTriple) -> bool {
        let covers = |granted: &str, requested: &str| granted == WILDCARD || granted == requested;

        let group_ok = match &self.api_groups {
            None => true,
            Some(groups) => groups.iter().any(|g| covers(&triple.api_group, g)),
        };
        group_ok && self.resources.iter().any(|r| covers(&triple.resource, r))
    }

    /// Severity a match at `scope` carries, or `None` when the scope does not count.
    pub fn severity_at(
        &self,
        base: Severity,
        scope: &EffectiveScope,
        sensitive_namespaces: &BTreeSet<String>,
    ) -> Option<Severity> {
        match (self.scope, scope) {
            (ScopePolicy::Any, _) => Some(base),
            (ScopePolicy::ClusterWide, EffectiveScope::ClusterWide) => Some(base),
            (ScopePolicy::ClusterWide, EffectiveScope::Namespace(_)) => None,
            (ScopePolicy::SensitiveNamespaces, EffectiveScope::ClusterWide) => Some(base),
            (ScopePolicy::SensitiveNamespaces, EffectiveScope::Namespace(ns)) => {
                if sensitive_namespaces.contains(ns) {
                    Some(base)
                } else {
                    Some(self.downgrade_to.unwrap_or(Severity::Low).min(base))
                }
            }
        }
    }
}

/// A declarative escalation pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub remediation: String,
    pub predicate: Predicate,
}

impl Pattern {
    pub fn new(
        id: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
        remediation: impl Into<String>,
        predicate: Predicate,
    ) -> Self {
        Self {
            id: id.into(),
            severity,
            description: description.into(),
            remediation: remediation.into(),
            predicate,
        }
    }

    fn validate(&self) -> Result<(), CatalogConfigurationError> {
        if self.id.trim().is_empty() {
            return Err(CatalogConfigurationError::EmptyId);
        }
        if self.predicate.verbs.is_empty() {
            return Err(CatalogConfigurationError::EmptyVerbs(self.id.clone()));
        }
        if self.predicate.resources.is_empty() {
            return Err(CatalogConfigurationError::EmptyResources(self.id.clone()));
        }
        if let Some(verb) = self
            .predicate
            .verbs
            .iter()
            .find(|v| *v != WILDCARD && !is_known_verb(v))
        {
            return Err(CatalogConfigurationError::UnknownVerb {
                pattern: self.id.clone(),
                verb: verb.clone(),
            });
        }
        Ok(())
    }
}

/// Invalid catalog configuration. Raised before any analysis runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogConfigurationError {
    #[error("pattern with empty id")]
    EmptyId,

    #[error("duplicate pattern id '{0}'")]
    DuplicateId(String),

    #[error("pattern '{0}' lists no verbs")]
    EmptyVerbs(String),

    #[error("pattern '{0}' lists no resources")]
    EmptyResources(String),

    #[error("pattern '{pattern}' uses unknown verb '{verb}'")]
    UnknownVerb { pattern: String, verb: String },

    #[error("{field} references unknown pattern '{id}'")]
    UnknownPattern { field: &'static str, id: String },
}

/// A validated, versioned set of patterns plus the namespaces they treat
/// as sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    version: u32,
    patterns: Vec<Pattern>,
    sensitive_namespaces: BTreeSet<String>,
}

impl Catalog {
    /// Validate and build a catalog.
    pub fn new(
        patterns: Vec<Pattern>,
        sensitive_namespaces: impl IntoIterator<Item = String>,
    ) -> Result<Self, CatalogConfigurationError> {
        let mut seen = HashSet::new();
        for pattern in &patterns {
            pattern.validate()?;
            if !seen.insert(pattern.id.as_str()) {
                return Err(CatalogConfigurationError::DuplicateId(pattern.id.clone()));
            }
        }
        Ok(Self {
            version: CATALOG_VERSION,
            patterns,
            sensitive_namespaces: sensitive_namespaces.into_iter().collect(),
        })
    }

    /// Built-in patterns with default sensitive namespaces.
    pub fn builtin() -> Self {
        Self {
            version: CATALOG_VERSION,
            patterns: builtin_patterns(),
            sensitive_namespaces: AuditConfig::default().sensitive_namespaces.into_iter().collect(),
        }
    }

    /// Built-in plus custom patterns, filtered and re-weighted by the config.
    pub fn from_config(config: &AuditConfig) -> Result<Self, CatalogConfigurationError> {
        let mut patterns = builtin_patterns();
        patterns.extend(config.custom_patterns.iter().cloned());
        let catalog = Self::new(patterns, config.sensitive_namespaces.iter().cloned())?;

        let known: HashSet<&str> = catalog.patterns.iter().map(|p| p.id.as_str()).collect();
        let references = config
            .include
            .iter()
            .map(|id| ("include", id))
            .chain(config.exclude.iter().map(|id| ("exclude", id)))
            .chain(config.severity_overrides.keys().map(|id| ("severityOverrides", id)));
        for (field, id) in references {
            if !known.contains(id.as_str()) {
                return Err(CatalogConfigurationError::UnknownPattern {
                    field,
                    id: id.clone(),
                });
            }
        }

        let mut catalog = catalog;
        catalog.patterns.retain(|p| {
            (config.include.is_empty() || config.include.contains(&p.id))
                && !config.exclude.contains(&p.id)
        });
        for pattern in &mut catalog.patterns {
            if let Some(severity) = config.severity_overrides.get(&pattern.id) {
                pattern.severity = *severity;
            }
        }

        log::debug!(
            "catalog v{}: {} patterns, sensitive namespaces {:?}",
            catalog.version,
            catalog.patterns.len(),
            catalog.sensitive_namespaces
        );
        Ok(catalog)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn get(&self, id: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.id == id)
    }

    pub fn sensitive_namespaces(&self) -> &BTreeSet<String> {
        &self.sensitive_namespaces
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// The built-in escalation patterns.
pub fn builtin_patterns() -> Vec<Pattern> {
    vec![
        Pattern::new(
            "cluster-admin-equivalent",
            Severity::Critical,
            "Holds every verb on every resource in every API group cluster-wide.",
            "Bind a role scoped to the resources the workload actually uses instead of a full wildcard.",
            Predicate::new(&[WILDCARD], &[WILDCARD])
                .in_groups(&[WILDCARD])
                .match_all()
                .with_scope(ScopePolicy::ClusterWide),
        ),
        Pattern::new(
            "rbac-self-escalation",
            Severity::Critical,
            "Can grant itself permissions it does not hold through escalate or bind.",
            "Remove the escalate and bind verbs on roles and clusterroles.",
            Predicate::new(&["roles", "clusterroles"], &["escalate", "bind"]),
        ),
        Pattern::new(
            "direct-clusterrolebinding-write",
            Severity::Critical,
            "Can bind any ClusterRole, including cluster-admin, to any subject.",
            "Remove create and update on clusterrolebindings.",
            Predicate::new(&["clusterrolebindings"], &["create", "update"]),
        ),
        Pattern::new(
            "impersonation",
            Severity::High,
            "Can act as other users, groups or service accounts.",
            "Remove the impersonate verb or restrict it with resourceNames.",
            Predicate::new(&["users", "groups", "serviceaccounts"], &["impersonate"]),
        ),
        Pattern::new(
            "role-modification",
            Severity::High,
            "Can create or edit roles and extend what existing bindings grant.",
            "Remove create, update and patch on roles and clusterroles.",
            Predicate::new(&["roles", "clusterroles"], &["create", "update", "patch"])
                .in_groups(&[RBAC_GROUP]),
        ),
        Pattern::new(
            "secret-read",
            Severity::Medium,
            "Can read secrets, which often hold service account tokens and credentials.",
            "Limit get and list on secrets to named secrets in the workload's own namespace.",
            Predicate::new(&["secrets"], &["get", "list"]).with_scope(ScopePolicy::SensitiveNamespaces),
        ),
        Pattern::new(
            "arbitrary-pod-creation",
            Severity::Medium,
            "Can create pods and mount any service account or host path in reach.",
            "Create pods through a controller with a dedicated service account instead.",
            Predicate::new(&["pods"], &["create"]),
        ),
        Pattern::new(
            "node-modification",
            Severity::Medium,
            "Can patch or update nodes, e.g. to taint or relabel them and attract workloads.",
            "Remove patch and update on nodes.",
            Predicate::new(&["nodes"], &["patch", "update"]).in_groups(&[""]),
        ),
    ]
}
