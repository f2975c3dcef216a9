//! Raw RBAC object snapshots and their conversion into the model.

use crate::analyzer::rbac::graph::{Graph, build_graph};
use crate::analyzer::rbac::model::{
    Binding, Role, parse_cluster_role, parse_cluster_role_binding, parse_role,
    parse_role_binding, resolve_aggregation,
};
use crate::analyzer::rbac::warning::AnalysisWarning;
use k8s_openapi::api::rbac::v1 as rbac;

/// The four RBAC object kinds, as read from manifests or a cluster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RbacSnapshot {
    pub roles: Vec<rbac::Role>,
    pub cluster_roles: Vec<rbac::ClusterRole>,
    pub role_bindings: Vec<rbac::RoleBinding>,
    pub cluster_role_bindings: Vec<rbac::ClusterRoleBinding>,
}

impl RbacSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of objects.
    pub fn len(&self) -> usize {
        self.roles.len()
            + self.cluster_roles.len()
            + self.role_bindings.len()
            + self.cluster_role_bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append every object of another snapshot.
    pub fn merge(&mut self, other: RbacSnapshot) {
        self.roles.extend(other.roles);
        self.cluster_roles.extend(other.cluster_roles);
        self.role_bindings.extend(other.role_bindings);
        self.cluster_role_bindings.extend(other.cluster_role_bindings);
    }

    /// Convert into the canonical model.
    ///
    /// Malformed rules and subjects are dropped and returned as warnings.
    /// ClusterRole aggregation is resolved before anything is bound.
    pub fn to_model(&self) -> (RbacModel, Vec<AnalysisWarning>) {
        let mut warnings: Vec<AnalysisWarning> = Vec::new();
        let mut model = RbacModel::default();

        for raw in &self.roles {
            let (role, errors) = parse_role(raw);
            model.roles.push(role);
            warnings.extend(errors.into_iter().map(AnalysisWarning::from));
        }
        for raw in &self.cluster_roles {
            let (role, errors) = parse_cluster_role(raw);
            model.cluster_roles.push(role);
            warnings.extend(errors.into_iter().map(AnalysisWarning::from));
        }
        warnings.extend(
            resolve_aggregation(&mut model.cluster_roles)
                .into_iter()
                .map(AnalysisWarning::from),
        );

        for raw in &self.role_bindings {
            let (binding, errors) = parse_role_binding(raw);
            model.bindings.push(binding);
            warnings.extend(errors.into_iter().map(AnalysisWarning::from));
        }
        for raw in &self.cluster_role_bindings {
            let (binding, errors) = parse_cluster_role_binding(raw);
            model.cluster_bindings.push(binding);
            warnings.extend(errors.into_iter().map(AnalysisWarning::from));
        }

        log::debug!(
            "model: {} roles, {} cluster roles, {} role bindings, {} cluster role bindings",
            model.roles.len(),
            model.cluster_roles.len(),
            model.bindings.len(),
            model.cluster_bindings.len()
        );
        (model, warnings)
    }
}

/// The canonical model of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RbacModel {
    pub roles: Vec<Role>,
    pub cluster_roles: Vec<Role>,
    pub bindings: Vec<Binding>,
    pub cluster_bindings: Vec<Binding>,
}

impl RbacModel {
    /// Resolve bindings into a graph. Orphans are returned as warnings.
    pub fn build_graph(&self) -> (Graph, Vec<AnalysisWarning>) {
        let (graph, orphans) = build_graph(
            &self.roles,
            &self.cluster_roles,
            &self.bindings,
            &self.cluster_bindings,
        );
        (graph, orphans.into_iter().map(AnalysisWarning::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::rbac::parser::yaml::parse_manifests;

    const AGGREGATED: &str = r#"
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: monitoring
aggregationRule:
  clusterRoleSelectors:
    - matchLabels:
        rbac.example.com/aggregate-to-monitoring: "true"
rules: []
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: monitoring-endpoints
  labels:
    rbac.example.com/aggregate-to-monitoring: "true"
rules:
  - apiGroups: [""]
    resources: ["services", "endpoints", "pods"]
    verbs: ["get", "list", "watch"]
  - apiGroups: [""]
    verbs: ["get"]
"#;

    #[test]
    fn test_to_model_resolves_aggregation_and_collects_warnings() {
        let (snapshot, manifest_warnings) = parse_manifests(AGGREGATED);
        assert!(manifest_warnings.is_empty());
        assert_eq!(snapshot.cluster_roles.len(), 2);

        let (model, warnings) = snapshot.to_model();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code(), "malformed-rule");

        let monitoring = model
            .cluster_roles
            .iter()
            .find(|r| r.name == "monitoring")
            .unwrap();
        assert_eq!(monitoring.rules.len(), 1);
    }

    #[test]
    fn test_merge_and_len() {
        let (mut a, _) = parse_manifests(AGGREGATED);
        let (b, _) = parse_manifests(AGGREGATED);
        a.merge(b);
        assert_eq!(a.len(), 4);
        assert!(!a.is_empty());
        assert!(RbacSnapshot::new().is_empty());
    }
}
