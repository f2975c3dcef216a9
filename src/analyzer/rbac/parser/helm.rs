//! Helm chart rendering for RBAC manifests.

use crate::analyzer::rbac::parser::template::{PLACEHOLDER, sanitize_template};
use crate::analyzer::rbac::parser::yaml;
use crate::analyzer::rbac::snapshot::RbacSnapshot;
use crate::analyzer::rbac::warning::ManifestWarning;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Render a Helm chart and parse the RBAC objects it produces.
///
/// This shells out to `helm template`, using the chart's own `values.yaml`
/// when present.
pub fn render_helm_chart(
    chart_path: &Path,
    values: Option<&Path>,
) -> Result<(RbacSnapshot, Vec<ManifestWarning>), HelmError> {
    if !is_helm_available() {
        return Err(HelmError::HelmNotFound);
    }

    let mut cmd = Command::new("helm");
    cmd.arg("template")
        .arg("release-name") // Placeholder release name
        .arg(chart_path);

    let default_values = chart_path.join("values.yaml");
    match values {
        Some(values_path) => {
            cmd.arg("-f").arg(values_path);
        }
        None if default_values.is_file() => {
            cmd.arg("-f").arg(&default_values);
        }
        None => {}
    }

    let output = cmd
        .output()
        .map_err(|e| HelmError::RenderError(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(HelmError::RenderError(stderr.trim().to_string()));
    }

    let yaml_content = String::from_utf8_lossy(&output.stdout);
    log::debug!(
        "rendered chart {} ({} bytes)",
        chart_path.display(),
        yaml_content.len()
    );
    Ok(yaml::parse_manifests_with_path(&yaml_content, chart_path))
}

/// Parse a chart's raw templates without helm.
///
/// Template actions are sanitized first, so only documents whose RBAC
/// content is mostly static survive.
pub fn parse_chart_templates(chart_path: &Path) -> (RbacSnapshot, Vec<ManifestWarning>) {
    let mut snapshot = RbacSnapshot::new();
    let mut warnings = Vec::new();

    for path in template_files(chart_path) {
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let sanitized = sanitize_template(&content, PLACEHOLDER);
                let (parsed, mut file_warnings) = yaml::parse_manifests_with_path(&sanitized, &path);
                snapshot.merge(parsed);
                warnings.append(&mut file_warnings);
            }
            Err(e) => warnings.push(ManifestWarning {
                path,
                message: e.to_string(),
            }),
        }
    }

    (snapshot, warnings)
}

/// Render a chart, falling back to sanitized templates when helm is missing
/// or rendering fails.
pub fn load_helm_chart(chart_path: &Path) -> (RbacSnapshot, Vec<ManifestWarning>) {
    match render_helm_chart(chart_path, None) {
        Ok(result) => result,
        Err(e) => {
            log::warn!(
                "{}: {}, falling back to raw templates",
                chart_path.display(),
                e
            );
            parse_chart_templates(chart_path)
        }
    }
}

fn template_files(chart_path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(chart_path.join("templates"))
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && yaml::is_manifest_file(p))
        .collect();
    files.sort();
    files
}

/// Check if a directory is a Helm chart.
pub fn is_helm_chart(path: &Path) -> bool {
    path.join("Chart.yaml").exists() || path.join("Chart.yml").exists()
}

/// Check if helm binary is available in PATH.
pub fn is_helm_available() -> bool {
    Command::new("helm")
        .arg("version")
        .arg("--short")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Helm rendering errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HelmError {
    #[error("helm binary not found in PATH")]
    HelmNotFound,
    #[error("render error: {0}")]
    RenderError(String),
}
