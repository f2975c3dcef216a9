//! YAML parsing for RBAC manifests.
//!
//! Only the four RBAC kinds are kept; every other document is skipped.
//! Documents that look like RBAC objects but fail to deserialize become
//! warnings instead of aborting the file.

use crate::analyzer::rbac::snapshot::RbacSnapshot;
use crate::analyzer::rbac::warning::ManifestWarning;
use k8s_openapi::api::rbac::v1 as rbac;
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use std::path::Path;

/// API group of the RBAC kinds.
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

const RBAC_API_VERSION: &str = "rbac.authorization.k8s.io/v1";

/// Parse a YAML string containing one or more documents.
pub fn parse_manifests(content: &str) -> (RbacSnapshot, Vec<ManifestWarning>) {
    parse_manifests_with_path(content, Path::new("<stdin>"))
}

/// Parse YAML content with a source path used in warnings.
pub fn parse_manifests_with_path(
    content: &str,
    path: &Path,
) -> (RbacSnapshot, Vec<ManifestWarning>) {
    let mut collector = Collector {
        path,
        snapshot: RbacSnapshot::new(),
        warnings: Vec::new(),
    };

    for (line, doc) in split_documents(content) {
        if doc.trim().is_empty() {
            continue;
        }
        match serde_yaml::from_str::<Value>(&doc) {
            Ok(Value::Null) => {}
            Ok(value) => collector.collect(value, line),
            Err(e) => collector.warn(line, e),
        }
    }

    (collector.snapshot, collector.warnings)
}

/// Parse a YAML file.
pub fn parse_manifest_file(path: &Path) -> std::io::Result<(RbacSnapshot, Vec<ManifestWarning>)> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_manifests_with_path(&content, path))
}

/// Whether a path has a YAML extension.
pub fn is_manifest_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Split on `---` separator lines, keeping the 1-based start line of each
/// document.
fn split_documents(content: &str) -> Vec<(usize, String)> {
    let mut docs = Vec::new();
    let mut current = String::new();
    let mut start = 1;

    for (index, line) in content.lines().enumerate() {
        if line == "---" || line.starts_with("--- ") {
            docs.push((start, std::mem::take(&mut current)));
            start = index + 2;
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    docs.push((start, current));
    docs
}

struct Collector<'a> {
    path: &'a Path,
    snapshot: RbacSnapshot,
    warnings: Vec<ManifestWarning>,
}

impl Collector<'_> {
    fn warn(&mut self, line: usize, error: impl std::fmt::Display) {
        let warning = ManifestWarning {
            path: self.path.to_path_buf(),
            message: format!("document at line {}: {}", line, error),
        };
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    fn collect(&mut self, mut value: Value, line: usize) {
        let Some(kind) = value.get("kind").and_then(Value::as_str).map(str::to_string) else {
            return;
        };

        // `kubectl get -o yaml` output wraps objects in a List.
        if kind.ends_with("List") {
            if let Some(Value::Sequence(items)) = value.get_mut("items").map(std::mem::take) {
                for item in items {
                    self.collect(item, line);
                }
            }
            return;
        }

        let group = value
            .get("apiVersion")
            .and_then(Value::as_str)
            .and_then(|v| v.split_once('/'))
            .map(|(group, _)| group);
        if group != Some(RBAC_API_GROUP) {
            log::trace!("skipping {} at line {}", kind, line);
            return;
        }

        // v1beta1/v1alpha1 objects share the v1 schema.
        if let Some(mapping) = value.as_mapping_mut() {
            mapping.insert(
                Value::String("apiVersion".to_string()),
                Value::String(RBAC_API_VERSION.to_string()),
            );
        }

        match kind.as_str() {
            "Role" => self.push(value, line, |s, o: rbac::Role| s.roles.push(o)),
            "ClusterRole" => self.push(value, line, |s, o: rbac::ClusterRole| s.cluster_roles.push(o)),
            "RoleBinding" => self.push(value, line, |s, o: rbac::RoleBinding| s.role_bindings.push(o)),
            "ClusterRoleBinding" => self.push(value, line, |s, o: rbac::ClusterRoleBinding| {
                s.cluster_role_bindings.push(o)
            }),
            _ => log::trace!("skipping {} at line {}", kind, line),
        }
    }

    fn push<T: DeserializeOwned>(
        &mut self,
        value: Value,
        line: usize,
        add: impl FnOnce(&mut RbacSnapshot, T),
    ) {
        match serde_yaml::from_value::<T>(value) {
            Ok(object) => add(&mut self.snapshot, object),
            Err(e) => self.warn(line, e),
        }
    }
}
