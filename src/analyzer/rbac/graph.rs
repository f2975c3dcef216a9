//! Binding resolution: links subjects to the roles their bindings reference.
//!
//! The resulting [`Graph`] is a pure value. Bindings whose roleRef does not
//! resolve are reported as [`OrphanWarning`]s and contribute no edges.

use crate::analyzer::rbac::model::{Binding, DEFAULT_NAMESPACE, Role, RoleRef};
use crate::analyzer::rbac::types::{
    CORE_GROUP, EffectiveScope, ObjectRef, RbacKind, Subject, WILDCARD,
};
use crate::analyzer::rbac::warning::OrphanWarning;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// One resolved (binding, role) pair granting a subject permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub binding: ObjectRef,
    pub role: Arc<Role>,
    pub scope: EffectiveScope,
}

impl Edge {
    fn sort_key(&self) -> (&ObjectRef, RbacKind, &str, &Option<String>, &EffectiveScope) {
        (
            &self.binding,
            self.role.kind,
            &self.role.name,
            &self.role.namespace,
            &self.scope,
        )
    }
}

/// Every API group and resource name mentioned by the input role set.
///
/// Wildcards are expanded against this universe. The literal `*` is always a
/// member of both enumerations and stands for names the input never mentions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceUniverse {
    resources_by_group: BTreeMap<String, BTreeSet<String>>,
}

impl ResourceUniverse {
    /// Collect groups and resources from a set of roles.
    pub fn from_roles<'a>(roles: impl IntoIterator<Item = &'a Role>) -> Self {
        let mut universe = Self::default();
        universe.resources_by_group.entry(CORE_GROUP.to_string()).or_default();
        universe.resources_by_group.entry(WILDCARD.to_string()).or_default();

        let mut unbound_resources = BTreeSet::new();
        for rule in roles.into_iter().flat_map(|r| r.rules.iter()) {
            let named: Vec<&String> = rule.resources.iter().filter(|r| *r != WILDCARD).collect();
            for group in &rule.api_groups {
                let entry = universe.resources_by_group.entry(group.clone()).or_default();
                if group == WILDCARD {
                    unbound_resources.extend(named.iter().map(|r| (*r).clone()));
                } else {
                    entry.extend(named.iter().map(|r| (*r).clone()));
                }
            }
        }

        // Resources named under a wildcard group exist in every group.
        for resources in universe.resources_by_group.values_mut() {
            resources.extend(unbound_resources.iter().cloned());
        }
        universe
    }

    /// All known groups, including the core group and the `*` sentinel.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.resources_by_group.keys().map(String::as_str)
    }

    /// Known resources of a group, including the `*` sentinel.
    pub fn resources(&self, group: &str) -> Vec<&str> {
        let mut resources: Vec<&str> = self
            .resources_by_group
            .get(group)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        resources.push(WILDCARD);
        resources
    }
}

/// Subject → incoming edges, plus the universe the aggregator expands against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    pub edges: BTreeMap<Subject, Vec<Edge>>,
    pub universe: ResourceUniverse,
}

impl Graph {
    /// Edges for one subject (empty if the subject is unknown).
    pub fn edges_for(&self, subject: &Subject) -> &[Edge] {
        self.edges.get(subject).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn subjects(&self) -> impl Iterator<Item = &Subject> {
        self.edges.keys()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }
}

type RoleKey = (RbacKind, String, Option<String>);

struct RoleIndex {
    roles: HashMap<RoleKey, Arc<Role>>,
}

impl RoleIndex {
    fn new(roles: &[Role], cluster_roles: &[Role]) -> Self {
        let mut index = HashMap::new();
        for role in roles.iter().chain(cluster_roles) {
            let key = (role.kind, role.name.clone(), role.namespace.clone());
            if index.insert(key, Arc::new(role.clone())).is_some() {
                log::warn!("duplicate {}, keeping the last one", role.object_ref());
            }
        }
        Self { roles: index }
    }

    /// Resolve a roleRef from a binding in `namespace` (`None` for
    /// ClusterRoleBindings, which can only reference ClusterRoles).
    fn resolve(&self, role_ref: &RoleRef, namespace: Option<&str>) -> Option<Arc<Role>> {
        let key = match (RbacKind::from_kind(&role_ref.kind)?, namespace) {
            (RbacKind::ClusterRole, _) => (RbacKind::ClusterRole, role_ref.name.clone(), None),
            (RbacKind::Role, Some(ns)) => {
                (RbacKind::Role, role_ref.name.clone(), Some(ns.to_string()))
            }
            _ => return None,
        };
        self.roles.get(&key).cloned()
    }
}

/// Build the subject → role graph.
///
/// - A ClusterRoleBinding referencing a ClusterRole grants cluster-wide.
/// - A RoleBinding grants only inside its own namespace, including when it
///   references a ClusterRole.
/// - Bindings whose roleRef cannot be resolved are excluded and reported.
pub fn build_graph(
    roles: &[Role],
    cluster_roles: &[Role],
    bindings: &[Binding],
    cluster_bindings: &[Binding],
) -> (Graph, Vec<OrphanWarning>) {
    let index = RoleIndex::new(roles, cluster_roles);
    let mut edges: BTreeMap<Subject, Vec<Edge>> = BTreeMap::new();
    let mut orphans = Vec::new();

    for binding in bindings.iter().chain(cluster_bindings) {
        let namespace = match binding.kind {
            RbacKind::ClusterRoleBinding => None,
            _ => Some(binding.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)),
        };

        let Some(role) = index.resolve(&binding.role_ref, namespace) else {
            let orphan = OrphanWarning {
                binding: binding.object_ref(),
                role_ref_kind: binding.role_ref.kind.clone(),
                role_ref_name: binding.role_ref.name.clone(),
            };
            log::warn!("{}", orphan);
            orphans.push(orphan);
            continue;
        };

        let scope = match namespace {
            None => EffectiveScope::ClusterWide,
            Some(ns) => EffectiveScope::Namespace(ns.to_string()),
        };

        for subject in &binding.subjects {
            edges.entry(subject.clone()).or_default().push(Edge {
                binding: binding.object_ref(),
                role: Arc::clone(&role),
                scope: scope.clone(),
            });
        }
    }

    for subject_edges in edges.values_mut() {
        subject_edges.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        subject_edges.dedup();
    }

    let graph = Graph {
        edges,
        universe: ResourceUniverse::from_roles(roles.iter().chain(cluster_roles)),
    };
    log::debug!(
        "built RBAC graph: {} subjects, {} edges, {} orphan bindings",
        graph.edges.len(),
        graph.edge_count(),
        orphans.len()
    );
    (graph, orphans)
}
