//! Loading RBAC objects from YAML files, directories and Helm charts.

pub mod helm;
pub mod template;
pub mod yaml;

pub use yaml::{parse_manifest_file, parse_manifests};

use crate::analyzer::rbac::snapshot::RbacSnapshot;
use crate::analyzer::rbac::warning::ManifestWarning;
use std::path::{Path, PathBuf};

/// Errors that prevent a manifest source from being loaded at all.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Manifests of one application, as loaded by [`load_apps`].
#[derive(Debug, Clone)]
pub struct AppManifests {
    pub name: String,
    pub path: PathBuf,
    pub snapshot: RbacSnapshot,
    pub warnings: Vec<ManifestWarning>,
}

/// Load a file, a Helm chart, or a directory of manifests.
///
/// Directories are walked recursively; any Helm chart found on the way is
/// rendered as a whole instead of parsing its templates as plain YAML.
pub fn load_path(path: &Path) -> Result<(RbacSnapshot, Vec<ManifestWarning>), ManifestError> {
    if !path.exists() {
        return Err(ManifestError::NotFound(path.to_path_buf()));
    }
    if path.is_file() {
        return yaml::parse_manifest_file(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    if helm::is_helm_chart(path) {
        return Ok(helm::load_helm_chart(path));
    }
    Ok(parse_manifest_dir(path))
}

/// Parse every YAML file under a directory.
///
/// Hidden directories are skipped. Nested Helm charts are loaded as charts
/// instead of parsing their templates as plain YAML. Unreadable files
/// become warnings.
pub fn parse_manifest_dir(path: &Path) -> (RbacSnapshot, Vec<ManifestWarning>) {
    let mut charts = Vec::new();
    let mut files = Vec::new();
    let walker = walkdir::WalkDir::new(path)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let hidden = entry.depth() > 0
                && entry.file_name().to_str().is_some_and(|n| n.starts_with('.'));
            if hidden {
                return false;
            }
            let is_chart = entry.depth() > 0
                && entry.file_type().is_dir()
                && helm::is_helm_chart(entry.path());
            if is_chart {
                charts.push(entry.path().to_path_buf());
            }
            !is_chart
        });
    for entry in walker.filter_map(|e| e.ok()) {
        if entry.file_type().is_file() && yaml::is_manifest_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    let mut snapshot = RbacSnapshot::new();
    let mut warnings = Vec::new();
    for file in files {
        match yaml::parse_manifest_file(&file) {
            Ok((parsed, mut file_warnings)) => {
                snapshot.merge(parsed);
                warnings.append(&mut file_warnings);
            }
            Err(e) => warnings.push(ManifestWarning {
                path: file,
                message: e.to_string(),
            }),
        }
    }
    for chart in charts {
        let (parsed, mut chart_warnings) = helm::load_helm_chart(&chart);
        snapshot.merge(parsed);
        warnings.append(&mut chart_warnings);
    }

    log::debug!(
        "loaded {} RBAC objects from {} ({} warnings)",
        snapshot.len(),
        path.display(),
        warnings.len()
    );
    (snapshot, warnings)
}

/// Treat each immediate subdirectory of `dir` as one application.
pub fn load_apps(dir: &Path) -> Result<Vec<AppManifests>, ManifestError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ManifestError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut app_dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter(|p| {
            !p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'))
        })
        .collect();
    app_dirs.sort();

    let mut apps = Vec::with_capacity(app_dirs.len());
    for app_dir in app_dirs {
        let (snapshot, warnings) = load_path(&app_dir)?;
        let name = app_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        apps.push(AppManifests {
            name,
            path: app_dir,
            snapshot,
            warnings,
        });
    }
    Ok(apps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const CLUSTER_ROLE: &str = r#"
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: reader
rules:
  - apiGroups: [""]
    resources: ["pods"]
    verbs: ["get"]
"#;

    #[test]
    fn test_load_missing_path() {
        let result = load_path(Path::new("/definitely/not/here"));
        assert!(matches!(result, Err(ManifestError::NotFound(_))));
    }

    #[test]
    fn test_load_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("role.yaml");
        fs::write(&file, CLUSTER_ROLE).unwrap();
        let (snapshot, warnings) = load_path(&file).unwrap();
        assert_eq!(snapshot.cluster_roles.len(), 1);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_parse_manifest_dir_skips_hidden_and_loads_nested_charts() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("base/nested")).unwrap();
        fs::write(dir.path().join("base/nested/role.yml"), CLUSTER_ROLE).unwrap();
        fs::create_dir(dir.path().join(".cache")).unwrap();
        fs::write(dir.path().join(".cache/role.yaml"), CLUSTER_ROLE).unwrap();
        fs::write(dir.path().join("README.md"), "# not yaml").unwrap();

        let chart = dir.path().join("charts/demo");
        fs::create_dir_all(chart.join("templates")).unwrap();
        fs::write(chart.join("Chart.yaml"), "apiVersion: v2\nname: demo\nversion: 0.1.0\n").unwrap();
        fs::write(chart.join("templates/role.yaml"), CLUSTER_ROLE).unwrap();

        let (snapshot, warnings) = parse_manifest_dir(dir.path());
        assert!(warnings.is_empty());
        // One from base/nested and one from the chart, rendered or sanitized
        assert_eq!(snapshot.cluster_roles.len(), 2);
    }

    #[test]
    fn test_load_apps_one_per_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        for app in ["beta", "alpha"] {
            fs::create_dir(dir.path().join(app)).unwrap();
            fs::write(dir.path().join(app).join("rbac.yaml"), CLUSTER_ROLE).unwrap();
        }
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("top-level.yaml"), CLUSTER_ROLE).unwrap();

        let apps = load_apps(dir.path()).unwrap();
        let names: Vec<&str> = apps.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert!(apps.iter().all(|a| a.snapshot.cluster_roles.len() == 1));
    }
}
