//! Permission aggregation: folds every edge of a subject into the set of
//! concrete (apiGroup, resource, verb) triples it effectively holds.

use crate::analyzer::rbac::graph::{Edge, Graph, ResourceUniverse};
use crate::analyzer::rbac::model::Rule;
use crate::analyzer::rbac::types::{EffectiveScope, PermissionTriple, Provenance, Subject, WILDCARD};
use std::collections::{BTreeMap, BTreeSet};

/// The verbs a `*` verb grant expands to.
pub const RBAC_VERBS: [&str; 14] = [
    "get",
    "list",
    "watch",
    "create",
    "update",
    "patch",
    "delete",
    "deletecollection",
    "bind",
    "escalate",
    "impersonate",
    "use",
    "approve",
    "sign",
];

/// Check whether a verb is one of the built-in RBAC verbs.
pub fn is_known_verb(verb: &str) -> bool {
    RBAC_VERBS.contains(&verb)
}

/// A granted (non-resource URL, verb) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NonResourceGrant {
    pub url: String,
    pub verb: String,
}

/// Everything a subject can do, with where each permission came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePermission {
    pub subject: Subject,
    pub grants: BTreeMap<PermissionTriple, BTreeSet<Provenance>>,
    pub non_resource_grants: BTreeMap<NonResourceGrant, BTreeSet<Provenance>>,
}

impl EffectivePermission {
    pub fn new(subject: Subject) -> Self {
        Self {
            subject,
            grants: BTreeMap::new(),
            non_resource_grants: BTreeMap::new(),
        }
    }

    /// Record a grant. Re-adding an existing triple only adds provenance.
    pub fn grant(&mut self, triple: PermissionTriple, provenance: Provenance) {
        self.grants.entry(triple).or_default().insert(provenance);
    }

    pub fn grant_non_resource(&mut self, grant: NonResourceGrant, provenance: Provenance) {
        self.non_resource_grants
            .entry(grant)
            .or_default()
            .insert(provenance);
    }

    pub fn has(&self, triple: &PermissionTriple) -> bool {
        self.grants.contains_key(triple)
    }

    /// Provenance of a triple, empty when it is not granted.
    pub fn provenance(&self, triple: &PermissionTriple) -> impl Iterator<Item = &Provenance> {
        self.grants.get(triple).into_iter().flatten()
    }

    /// Distinct scopes at which a triple is granted.
    pub fn scopes(&self, triple: &PermissionTriple) -> BTreeSet<&EffectiveScope> {
        self.provenance(triple).map(|p| &p.scope).collect()
    }

    /// A triple is cluster-wide if any binding grants it cluster-wide.
    pub fn is_cluster_wide(&self, triple: &PermissionTriple) -> bool {
        self.provenance(triple).any(|p| p.scope.is_cluster_wide())
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty() && self.non_resource_grants.is_empty()
    }
}

fn expand_verbs(rule: &Rule) -> BTreeSet<&str> {
    let mut verbs: BTreeSet<&str> = rule
        .verbs
        .iter()
        .map(String::as_str)
        .filter(|v| *v != WILDCARD)
        .collect();
    if rule.verbs.contains(WILDCARD) {
        verbs.extend(RBAC_VERBS);
    }
    verbs
}

fn expand_groups<'a>(rule: &'a Rule, universe: &'a ResourceUniverse) -> BTreeSet<&'a str> {
    if rule.api_groups.contains(WILDCARD) {
        universe.groups().collect()
    } else {
        rule.api_groups.iter().map(String::as_str).collect()
    }
}

fn expand_resources<'a>(
    rule: &'a Rule,
    group: &str,
    universe: &'a ResourceUniverse,
) -> BTreeSet<&'a str> {
    let mut resources: BTreeSet<&str> = rule.resources.iter().map(String::as_str).collect();
    if rule.resources.contains(WILDCARD) {
        resources.extend(universe.resources(group));
    }
    resources
}

fn add_edge(perm: &mut EffectivePermission, edge: &Edge, universe: &ResourceUniverse) {
    let provenance = Provenance {
        binding: edge.binding.clone(),
        role: edge.role.object_ref(),
        scope: edge.scope.clone(),
    };

    for rule in &edge.role.rules {
        let verbs = expand_verbs(rule);

        for group in expand_groups(rule, universe) {
            for resource in expand_resources(rule, group, universe) {
                for verb in &verbs {
                    perm.grant(
                        PermissionTriple::new(group, resource, *verb),
                        provenance.clone(),
                    );
                }
            }
        }

        // The API server only honours non-resource rules from ClusterRoleBindings.
        if !edge.scope.is_cluster_wide() {
            continue;
        }
        for url in &rule.non_resource_urls {
            for verb in &rule.verbs {
                perm.grant_non_resource(
                    NonResourceGrant {
                        url: url.clone(),
                        verb: verb.clone(),
                    },
                    provenance.clone(),
                );
            }
        }
    }
}

/// Compute the effective permissions of every subject in the graph.
pub fn aggregate(graph: &Graph) -> BTreeMap<Subject, EffectivePermission> {
    let mut result = BTreeMap::new();

    for (subject, edges) in &graph.edges {
        let mut perm = EffectivePermission::new(subject.clone());
        for edge in edges {
            add_edge(&mut perm, edge, &graph.universe);
        }
        log::debug!(
            "{}: {} grants from {} edges",
            subject,
            perm.grants.len(),
            edges.len()
        );
        result.insert(subject.clone(), perm);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::rbac::graph::build_graph;
    use crate::analyzer::rbac::model::{Binding, Role, RoleRef};

    fn aggregate_one(role: Role, binding: Binding, subject: &Subject) -> EffectivePermission {
        let (graph, _) = match (role.is_cluster_role(), binding.namespace.is_some()) {
            (true, true) => build_graph(&[], &[role], &[binding], &[]),
            (true, false) => build_graph(&[], &[role], &[], &[binding]),
            (false, _) => build_graph(&[role], &[], &[binding], &[]),
        };
        aggregate(&graph).remove(subject).unwrap()
    }

    #[test]
    fn test_verb_wildcard_expands_to_fixed_set() {
        let sa = Subject::service_account("ns1", "sa");
        let perm = aggregate_one(
            Role::cluster("pods-all", vec![Rule::new(&[""], &["pods"], &["*"])]),
            Binding::cluster("crb", RoleRef::cluster_role("pods-all"), vec![sa.clone()]),
            &sa,
        );

        let verbs: BTreeSet<&str> = perm
            .grants
            .keys()
            .filter(|t| t.api_group.is_empty() && t.resource == "pods")
            .map(|t| t.verb.as_str())
            .collect();
        assert_eq!(verbs, RBAC_VERBS.into_iter().collect());
        assert_eq!(perm.grants.len(), 14);
    }

    #[test]
    fn test_role_binding_to_cluster_role_is_namespaced() {
        let sa = Subject::service_account("ns1", "sa");
        let perm = aggregate_one(
            Role::cluster("reader", vec![Rule::new(&[""], &["secrets"], &["get"])]),
            Binding::namespaced("ns1", "rb", RoleRef::cluster_role("reader"), vec![sa.clone()]),
            &sa,
        );

        let triple = PermissionTriple::new("", "secrets", "get");
        let scopes: Vec<_> = perm.scopes(&triple).into_iter().cloned().collect();
        assert_eq!(scopes, vec![EffectiveScope::Namespace("ns1".to_string())]);
        assert!(!perm.is_cluster_wide(&triple));
    }

    #[test]
    fn test_resource_wildcard_includes_sentinel_and_seen_resources() {
        let user = Subject::user("alice");
        let roles = vec![
            Role::cluster("everything", vec![Rule::new(&[""], &["*"], &["get"])]),
            Role::cluster("cm", vec![Rule::new(&[""], &["configmaps"], &["list"])]),
        ];
        let crb = Binding::cluster("crb", RoleRef::cluster_role("everything"), vec![user.clone()]);
        let (graph, _) = build_graph(&[], &roles, &[], &[crb]);
        let perm = aggregate(&graph).remove(&user).unwrap();

        assert!(perm.has(&PermissionTriple::new("", "configmaps", "get")));
        assert!(perm.has(&PermissionTriple::new("", "*", "get")));
        assert!(!perm.has(&PermissionTriple::new("", "configmaps", "list")));
    }

    #[test]
    fn test_group_wildcard_covers_core_and_sentinel() {
        let user = Subject::user("alice");
        let perm = aggregate_one(
            Role::cluster("any-group", vec![Rule::new(&["*"], &["secrets"], &["get"])]),
            Binding::cluster("crb", RoleRef::cluster_role("any-group"), vec![user.clone()]),
            &user,
        );
        assert!(perm.has(&PermissionTriple::new("", "secrets", "get")));
        assert!(perm.has(&PermissionTriple::new("*", "secrets", "get")));
    }

    #[test]
    fn test_regrant_adds_provenance_only() {
        let user = Subject::user("alice");
        let role = Role::cluster("reader", vec![Rule::new(&[""], &["pods"], &["get"])]);
        let bindings = vec![
            Binding::cluster("one", RoleRef::cluster_role("reader"), vec![user.clone()]),
            Binding::cluster("two", RoleRef::cluster_role("reader"), vec![user.clone()]),
        ];
        let (graph, _) = build_graph(&[], &[role], &[], &bindings);
        let perm = aggregate(&graph).remove(&user).unwrap();

        let triple = PermissionTriple::new("", "pods", "get");
        assert_eq!(perm.grants.len(), 1);
        assert_eq!(perm.provenance(&triple).count(), 2);
    }

    #[test]
    fn test_non_resource_urls_need_cluster_binding() {
        let user = Subject::user("alice");
        let role = Role::cluster("metrics", vec![Rule::non_resource(&["/metrics"], &["get"])]);

        let via_crb = aggregate_one(
            role.clone(),
            Binding::cluster("crb", RoleRef::cluster_role("metrics"), vec![user.clone()]),
            &user,
        );
        assert_eq!(via_crb.non_resource_grants.len(), 1);

        let via_rb = aggregate_one(
            role,
            Binding::namespaced("ns1", "rb", RoleRef::cluster_role("metrics"), vec![user.clone()]),
            &user,
        );
        assert!(via_rb.is_empty());
    }
}
