//! Canonical in-memory RBAC model.
//!
//! Raw `k8s_openapi` RBAC objects are converted into [`Role`] and
//! [`Binding`] values here. Wildcards are kept verbatim; expansion happens in
//! the aggregator, which knows the universe it reasons about.

use crate::analyzer::rbac::types::{ObjectRef, RbacKind, Subject, SubjectKind, WILDCARD};
use crate::analyzer::rbac::warning::{
    MalformedRuleError, MalformedRuleReason, MalformedSubject, UnsupportedSelector,
};
use k8s_openapi::api::rbac::v1 as rbac;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A single RBAC rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub api_groups: BTreeSet<String>,
    pub resources: BTreeSet<String>,
    pub non_resource_urls: BTreeSet<String>,
    pub verbs: BTreeSet<String>,
}

impl Rule {
    /// Build a rule from string slices. Mostly useful in tests.
    pub fn new(api_groups: &[&str], resources: &[&str], verbs: &[&str]) -> Self {
        Self {
            api_groups: to_set(api_groups.iter().copied()),
            resources: to_set(resources.iter().copied()),
            non_resource_urls: BTreeSet::new(),
            verbs: to_set(verbs.iter().copied()),
        }
    }

    /// Build a non-resource URL rule.
    pub fn non_resource(urls: &[&str], verbs: &[&str]) -> Self {
        Self {
            non_resource_urls: to_set(urls.iter().copied()),
            verbs: to_set(verbs.iter().copied()),
            ..Default::default()
        }
    }

    /// Convert a raw policy rule, rejecting rules RBAC considers invalid.
    pub fn from_policy_rule(raw: &rbac::PolicyRule) -> Result<Self, MalformedRuleReason> {
        let rule = Self {
            api_groups: to_set(raw.api_groups.iter().flatten().map(String::as_str)),
            resources: to_set(raw.resources.iter().flatten().map(String::as_str)),
            non_resource_urls: to_set(raw.non_resource_urls.iter().flatten().map(String::as_str)),
            verbs: to_set(raw.verbs.iter().map(String::as_str)),
        };
        rule.validate()?;
        Ok(rule)
    }

    fn validate(&self) -> Result<(), MalformedRuleReason> {
        if self.resources.is_empty() && self.non_resource_urls.is_empty() {
            return Err(MalformedRuleReason::NoResources);
        }
        if self.verbs.is_empty() {
            return Err(MalformedRuleReason::NoVerbs);
        }
        if !self.resources.is_empty() && self.api_groups.is_empty() {
            return Err(MalformedRuleReason::NoApiGroups);
        }
        Ok(())
    }

    /// Whether any field of the rule is a wildcard.
    pub fn has_wildcard(&self) -> bool {
        self.api_groups.contains(WILDCARD)
            || self.resources.contains(WILDCARD)
            || self.verbs.contains(WILDCARD)
    }
}

// Trims values but keeps the empty string, which names the core API group.
fn to_set<'a>(values: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    values.map(|v| v.trim().to_string()).collect()
}

/// A label selector on an aggregated ClusterRole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSelector {
    pub match_labels: BTreeMap<String, String>,
    pub has_match_expressions: bool,
}

impl RoleSelector {
    /// Check the selector's labels against a role's labels.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

/// A Role or ClusterRole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Role {
    pub kind: RbacKind,
    pub name: String,
    /// `None` for ClusterRoles.
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub rules: Vec<Rule>,
    /// ClusterRole aggregation selectors, empty when not aggregated.
    pub aggregation: Vec<RoleSelector>,
}

impl Role {
    /// Create a namespaced Role.
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            kind: RbacKind::Role,
            name: name.into(),
            namespace: Some(namespace.into()),
            labels: BTreeMap::new(),
            rules,
            aggregation: Vec::new(),
        }
    }

    /// Create a ClusterRole.
    pub fn cluster(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            kind: RbacKind::ClusterRole,
            name: name.into(),
            namespace: None,
            labels: BTreeMap::new(),
            rules,
            aggregation: Vec::new(),
        }
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.kind, self.name.clone(), self.namespace.clone())
    }

    pub fn is_cluster_role(&self) -> bool {
        self.kind == RbacKind::ClusterRole
    }
}

/// The role a binding points at, as written in the binding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RoleRef {
    /// Raw kind; anything other than `Role`/`ClusterRole` never resolves.
    pub kind: String,
    pub name: String,
}

impl RoleRef {
    pub fn role(name: impl Into<String>) -> Self {
        Self {
            kind: RbacKind::Role.as_str().to_string(),
            name: name.into(),
        }
    }

    pub fn cluster_role(name: impl Into<String>) -> Self {
        Self {
            kind: RbacKind::ClusterRole.as_str().to_string(),
            name: name.into(),
        }
    }
}

/// A RoleBinding or ClusterRoleBinding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub kind: RbacKind,
    pub name: String,
    /// `None` for ClusterRoleBindings.
    pub namespace: Option<String>,
    pub subjects: Vec<Subject>,
    pub role_ref: RoleRef,
}

impl Binding {
    /// Create a namespaced RoleBinding.
    pub fn namespaced(
        namespace: impl Into<String>,
        name: impl Into<String>,
        role_ref: RoleRef,
        subjects: Vec<Subject>,
    ) -> Self {
        Self {
            kind: RbacKind::RoleBinding,
            name: name.into(),
            namespace: Some(namespace.into()),
            subjects,
            role_ref,
        }
    }

    /// Create a ClusterRoleBinding.
    pub fn cluster(name: impl Into<String>, role_ref: RoleRef, subjects: Vec<Subject>) -> Self {
        Self {
            kind: RbacKind::ClusterRoleBinding,
            name: name.into(),
            namespace: None,
            subjects,
            role_ref,
        }
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.kind, self.name.clone(), self.namespace.clone())
    }
}

// ============================================================================
// Parsing from k8s_openapi objects
// ============================================================================

/// Namespace assumed for namespaced manifests that do not set one.
pub const DEFAULT_NAMESPACE: &str = "default";

fn meta_name(meta: &ObjectMeta) -> String {
    meta.name.clone().unwrap_or_default()
}

fn meta_namespace(meta: &ObjectMeta) -> String {
    meta.namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .unwrap_or(DEFAULT_NAMESPACE)
        .to_string()
}

fn parse_rules(
    owner: &ObjectRef,
    raw: Option<&Vec<rbac::PolicyRule>>,
) -> (Vec<Rule>, Vec<MalformedRuleError>) {
    let mut rules = Vec::new();
    let mut errors = Vec::new();

    for (index, raw_rule) in raw.into_iter().flatten().enumerate() {
        match Rule::from_policy_rule(raw_rule) {
            Ok(rule) => rules.push(rule),
            Err(reason) => {
                let err = MalformedRuleError {
                    role: owner.clone(),
                    index,
                    reason,
                };
                log::warn!("{}", err);
                errors.push(err);
            }
        }
    }

    (rules, errors)
}

/// Parse a namespaced Role. Malformed rules are dropped and reported.
///
/// A Role without a namespace lands in [`DEFAULT_NAMESPACE`].
pub fn parse_role(raw: &rbac::Role) -> (Role, Vec<MalformedRuleError>) {
    let mut role = Role::namespaced(
        meta_namespace(&raw.metadata),
        meta_name(&raw.metadata),
        Vec::new(),
    );
    role.labels = raw.metadata.labels.clone().unwrap_or_default();

    let (rules, errors) = parse_rules(&role.object_ref(), raw.rules.as_ref());
    role.rules = rules;
    (role, errors)
}

/// Parse a ClusterRole, including its aggregation selectors.
pub fn parse_cluster_role(raw: &rbac::ClusterRole) -> (Role, Vec<MalformedRuleError>) {
    let mut role = Role::cluster(meta_name(&raw.metadata), Vec::new());
    role.labels = raw.metadata.labels.clone().unwrap_or_default();
    role.aggregation = raw
        .aggregation_rule
        .as_ref()
        .and_then(|a| a.cluster_role_selectors.as_ref())
        .map(|selectors| {
            selectors
                .iter()
                .map(|s| RoleSelector {
                    match_labels: s.match_labels.clone().unwrap_or_default(),
                    has_match_expressions: s
                        .match_expressions
                        .as_ref()
                        .is_some_and(|e| !e.is_empty()),
                })
                .collect()
        })
        .unwrap_or_default();

    let (rules, errors) = parse_rules(&role.object_ref(), raw.rules.as_ref());
    role.rules = rules;
    (role, errors)
}

fn parse_subjects(
    binding: &ObjectRef,
    raw: Option<&Vec<rbac::Subject>>,
) -> (Vec<Subject>, Vec<MalformedSubject>) {
    let mut subjects = Vec::new();
    let mut errors = Vec::new();

    for raw_subject in raw.into_iter().flatten() {
        let reject = |reason: &str| MalformedSubject {
            binding: binding.clone(),
            kind: raw_subject.kind.clone(),
            name: raw_subject.name.clone(),
            reason: reason.to_string(),
        };

        let Some(kind) = SubjectKind::from_kind(&raw_subject.kind) else {
            errors.push(reject("unknown subject kind"));
            continue;
        };
        let name = raw_subject.name.trim();
        if name.is_empty() {
            errors.push(reject("subject has no name"));
            continue;
        }

        let subject = match kind {
            SubjectKind::ServiceAccount => {
                let namespace = raw_subject
                    .namespace
                    .as_deref()
                    .filter(|ns| !ns.is_empty())
                    .or(binding.namespace.as_deref());
                match namespace {
                    Some(ns) => Subject::service_account(ns, name),
                    None => {
                        errors.push(reject("service account has no namespace"));
                        continue;
                    }
                }
            }
            SubjectKind::User => Subject::user(name),
            SubjectKind::Group => Subject::group(name),
        };
        subjects.push(subject);
    }

    for err in &errors {
        log::warn!("{}", err);
    }
    (subjects, errors)
}

fn parse_role_ref(raw: &rbac::RoleRef) -> RoleRef {
    RoleRef {
        kind: raw.kind.trim().to_string(),
        name: raw.name.trim().to_string(),
    }
}

/// Parse a RoleBinding. Service accounts without a namespace inherit the
/// binding's namespace.
pub fn parse_role_binding(raw: &rbac::RoleBinding) -> (Binding, Vec<MalformedSubject>) {
    let mut binding = Binding::namespaced(
        meta_namespace(&raw.metadata),
        meta_name(&raw.metadata),
        parse_role_ref(&raw.role_ref),
        Vec::new(),
    );
    let (subjects, errors) = parse_subjects(&binding.object_ref(), raw.subjects.as_ref());
    binding.subjects = subjects;
    (binding, errors)
}

/// Parse a ClusterRoleBinding.
pub fn parse_cluster_role_binding(
    raw: &rbac::ClusterRoleBinding,
) -> (Binding, Vec<MalformedSubject>) {
    let mut binding = Binding::cluster(
        meta_name(&raw.metadata),
        parse_role_ref(&raw.role_ref),
        Vec::new(),
    );
    let (subjects, errors) = parse_subjects(&binding.object_ref(), raw.subjects.as_ref());
    binding.subjects = subjects;
    (binding, errors)
}

/// Fill aggregated ClusterRoles with the rules of the ClusterRoles their
/// selectors match.
///
/// Aggregation chains are followed until nothing changes. Selectors using
/// `matchExpressions` are skipped and reported.
pub fn resolve_aggregation(cluster_roles: &mut [Role]) -> Vec<UnsupportedSelector> {
    let mut warnings = Vec::new();

    // (aggregating role index, source role indexes)
    let mut sources: Vec<(usize, Vec<usize>)> = Vec::new();
    for (i, role) in cluster_roles.iter().enumerate() {
        if role.aggregation.is_empty() {
            continue;
        }
        let mut matched = BTreeSet::new();
        for (index, selector) in role.aggregation.iter().enumerate() {
            if selector.has_match_expressions {
                let warning = UnsupportedSelector {
                    role: role.object_ref(),
                    index,
                };
                log::warn!("{}", warning);
                warnings.push(warning);
                continue;
            }
            for (j, candidate) in cluster_roles.iter().enumerate() {
                if i != j && selector.matches(&candidate.labels) {
                    matched.insert(j);
                }
            }
        }
        sources.push((i, matched.into_iter().collect()));
    }

    // Each pass can only add rules, so this terminates after at most one
    // pass per aggregating role plus one.
    for _ in 0..=sources.len() {
        let mut changed = false;
        for (target, from) in &sources {
            let missing: Vec<Rule> = from
                .iter()
                .flat_map(|source| cluster_roles[*source].rules.iter())
                .fold(Vec::new(), |mut missing, rule| {
                    if !cluster_roles[*target].rules.contains(rule) && !missing.contains(rule) {
                        missing.push(rule.clone());
                    }
                    missing
                });
            if !missing.is_empty() {
                let role = &mut cluster_roles[*target];
                role.rules.extend(missing);
                log::debug!(
                    "aggregated ClusterRole {} now has {} rules",
                    role.name,
                    role.rules.len()
                );
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::rbac::v1::{AggregationRule, PolicyRule};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};

    fn policy_rule(groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
        PolicyRule {
            api_groups: Some(groups.iter().map(|s| s.to_string()).collect()),
            resources: Some(resources.iter().map(|s| s.to_string()).collect()),
            verbs: verbs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(|s| s.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_role_keeps_wildcards_verbatim() {
        let raw = rbac::Role {
            metadata: meta("reader", Some("ns1")),
            rules: Some(vec![policy_rule(&["*"], &["pods"], &["*"])]),
        };
        let (role, errors) = parse_role(&raw);
        assert!(errors.is_empty());
        assert_eq!(role.namespace.as_deref(), Some("ns1"));
        assert_eq!(role.rules.len(), 1);
        assert!(role.rules[0].verbs.contains("*"));
        assert!(role.rules[0].api_groups.contains("*"));
        assert!(role.rules[0].has_wildcard());
    }

    #[test]
    fn test_malformed_rule_dropped_not_fatal() {
        let raw = rbac::ClusterRole {
            metadata: meta("mixed", None),
            rules: Some(vec![
                PolicyRule {
                    verbs: vec!["get".to_string()],
                    ..Default::default()
                },
                policy_rule(&[""], &["configmaps"], &["get"]),
            ]),
            ..Default::default()
        };
        let (role, errors) = parse_cluster_role(&raw);
        assert_eq!(role.rules.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].index, 0);
        assert_eq!(errors[0].reason, MalformedRuleReason::NoResources);
    }

    #[test]
    fn test_non_resource_rule_is_valid() {
        let raw = rbac::ClusterRole {
            metadata: meta("metrics", None),
            rules: Some(vec![PolicyRule {
                non_resource_urls: Some(vec!["/metrics".to_string()]),
                verbs: vec!["get".to_string()],
                ..Default::default()
            }]),
            ..Default::default()
        };
        let (role, errors) = parse_cluster_role(&raw);
        assert!(errors.is_empty());
        assert!(role.rules[0].non_resource_urls.contains("/metrics"));
    }

    #[test]
    fn test_core_group_preserved() {
        let rule = Rule::from_policy_rule(&policy_rule(&[""], &["secrets"], &["get"])).unwrap();
        assert!(rule.api_groups.contains(""));
    }

    #[test]
    fn test_rule_without_verbs_or_groups_rejected() {
        assert_eq!(
            Rule::from_policy_rule(&policy_rule(&[""], &["pods"], &[])),
            Err(MalformedRuleReason::NoVerbs)
        );
        let raw = PolicyRule {
            resources: Some(vec!["pods".to_string()]),
            verbs: vec!["get".to_string()],
            ..Default::default()
        };
        assert_eq!(
            Rule::from_policy_rule(&raw),
            Err(MalformedRuleReason::NoApiGroups)
        );
    }

    #[test]
    fn test_role_binding_service_account_inherits_namespace() {
        let raw = rbac::RoleBinding {
            metadata: meta("rb", Some("team-a")),
            role_ref: rbac::RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "Role".to_string(),
                name: "reader".to_string(),
            },
            subjects: Some(vec![
                rbac::Subject {
                    kind: "ServiceAccount".to_string(),
                    name: "builder".to_string(),
                    ..Default::default()
                },
                rbac::Subject {
                    kind: "Robot".to_string(),
                    name: "r2".to_string(),
                    ..Default::default()
                },
            ]),
        };
        let (binding, errors) = parse_role_binding(&raw);
        assert_eq!(binding.subjects, vec![Subject::service_account("team-a", "builder")]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, "Robot");
    }

    #[test]
    fn test_cluster_binding_service_account_needs_namespace() {
        let raw = rbac::ClusterRoleBinding {
            metadata: meta("crb", None),
            role_ref: rbac::RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: "view".to_string(),
            },
            subjects: Some(vec![
                rbac::Subject {
                    kind: "ServiceAccount".to_string(),
                    name: "orphaned".to_string(),
                    ..Default::default()
                },
                rbac::Subject {
                    kind: "Group".to_string(),
                    name: "devs".to_string(),
                    // Ignored for non-service-account subjects
                    namespace: Some("ns".to_string()),
                    ..Default::default()
                },
            ]),
        };
        let (binding, errors) = parse_cluster_role_binding(&raw);
        assert_eq!(binding.subjects, vec![Subject::group("devs")]);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_aggregation_collects_matching_rules() {
        let mut labels = BTreeMap::new();
        labels.insert("aggregate-to-ops".to_string(), "true".to_string());

        let mut source = Role::cluster("pods-edit", vec![Rule::new(&[""], &["pods"], &["create"])]);
        source.labels = labels.clone();
        let unrelated = Role::cluster("other", vec![Rule::new(&[""], &["nodes"], &["get"])]);
        let mut ops = Role::cluster("ops", Vec::new());
        ops.aggregation = vec![RoleSelector {
            match_labels: labels,
            has_match_expressions: false,
        }];

        let mut roles = vec![ops, source, unrelated];
        let warnings = resolve_aggregation(&mut roles);
        assert!(warnings.is_empty());
        assert_eq!(roles[0].rules, vec![Rule::new(&[""], &["pods"], &["create"])]);
    }

    #[test]
    fn test_aggregation_keeps_own_rules_first() {
        let mut labels = BTreeMap::new();
        labels.insert("aggregate-to-ops".to_string(), "true".to_string());

        let own = vec![
            Rule::new(&["apps"], &["deployments"], &["list"]),
            Rule::new(&[""], &["configmaps"], &["get"]),
        ];
        let mut source = Role::cluster(
            "extra",
            vec![
                Rule::new(&[""], &["pods"], &["create"]),
                Rule::new(&[""], &["configmaps"], &["get"]),
            ],
        );
        source.labels = labels.clone();
        let mut ops = Role::cluster("ops", own.clone());
        ops.aggregation = vec![RoleSelector {
            match_labels: labels,
            has_match_expressions: false,
        }];

        let mut roles = vec![ops, source];
        resolve_aggregation(&mut roles);
        assert_eq!(
            roles[0].rules,
            vec![
                own[0].clone(),
                own[1].clone(),
                Rule::new(&[""], &["pods"], &["create"]),
            ]
        );
    }

    #[test]
    fn test_aggregation_follows_chains() {
        let label = |k: &str| {
            let mut m = BTreeMap::new();
            m.insert(k.to_string(), "true".to_string());
            m
        };
        let selector = |k: &str| RoleSelector {
            match_labels: label(k),
            has_match_expressions: false,
        };

        let mut top = Role::cluster("top", Vec::new());
        top.aggregation = vec![selector("to-top")];
        let mut middle = Role::cluster("middle", Vec::new());
        middle.labels = label("to-top");
        middle.aggregation = vec![selector("to-middle")];
        let mut leaf = Role::cluster("leaf", vec![Rule::new(&[""], &["secrets"], &["get"])]);
        leaf.labels = label("to-middle");

        let mut roles = vec![top, middle, leaf];
        resolve_aggregation(&mut roles);
        assert_eq!(roles[0].rules.len(), 1);
        assert_eq!(roles[1].rules.len(), 1);
    }

    #[test]
    fn test_aggregation_match_expressions_reported() {
        let raw = rbac::ClusterRole {
            metadata: meta("agg", None),
            aggregation_rule: Some(AggregationRule {
                cluster_role_selectors: Some(vec![LabelSelector {
                    match_expressions: Some(vec![LabelSelectorRequirement {
                        key: "tier".to_string(),
                        operator: "In".to_string(),
                        values: Some(vec!["ops".to_string()]),
                    }]),
                    match_labels: None,
                }]),
            }),
            rules: None,
        };
        let (role, _) = parse_cluster_role(&raw);
        let mut roles = vec![role, Role::cluster("x", vec![Rule::new(&[""], &["pods"], &["get"])])];
        let warnings = resolve_aggregation(&mut roles);
        assert_eq!(warnings.len(), 1);
        assert!(roles[0].rules.is_empty());
    }
}
