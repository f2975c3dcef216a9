//! Best-effort sanitizing of raw Helm templates.
//!
//! Used when `helm template` is unavailable or fails. Template actions are
//! replaced by a placeholder so RBAC documents whose rules are static still
//! parse; control-flow lines are dropped.

use regex::Regex;
use std::sync::LazyLock;

/// Value substituted for inline template actions.
pub const PLACEHOLDER: &str = "dynamic_parameters";

static ACTION_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{.*?\}\}").unwrap());
static CONTROL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{-?\s*(end|if|else|range|with|define|template)\b.*?\}\}").unwrap()
});
static INCLUDE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{-?\s*(include|toYaml|nindent)\b.*?\}\}").unwrap());
static WHOLE_LINE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\{\{.*\}\}\s*$").unwrap());

/// Sanitize one template file.
///
/// - Lines holding control actions (`if`, `end`, `range`, ...) are dropped.
/// - `include` style actions are removed.
/// - Lines made only of an action are dropped.
/// - Any other action is replaced by `placeholder`.
/// - Lines still containing braces afterwards are dropped.
pub fn sanitize_template(content: &str, placeholder: &str) -> String {
    let mut lines = Vec::new();

    for line in content.lines() {
        if CONTROL_REGEX.is_match(line) {
            continue;
        }
        let line = if INCLUDE_REGEX.is_match(line) {
            INCLUDE_REGEX.replace_all(line, "").into_owned()
        } else if ACTION_REGEX.is_match(line) {
            if WHOLE_LINE_REGEX.is_match(line) {
                continue;
            }
            ACTION_REGEX.replace_all(line, placeholder).into_owned()
        } else {
            line.to_string()
        };

        if line.contains('{') || line.contains('}') {
            continue;
        }
        lines.push(line);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"{{- if .Values.rbac.create }}
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: {{ include "chart.fullname" . }}
  labels:
    {{- include "chart.labels" . | nindent 4 }}
rules:
  - apiGroups: [""]
    resources: ["secrets"]
    verbs: ["get", "list"]
{{- end }}
"#;

    #[test]
    fn test_sanitize_drops_control_lines() {
        let out = sanitize_template(TEMPLATE, PLACEHOLDER);
        assert!(!out.contains("{{"));
        assert!(!out.contains("if .Values"));
        assert!(out.contains("kind: ClusterRole"));
        assert!(out.contains(r#"verbs: ["get", "list"]"#));
    }

    #[test]
    fn test_sanitize_replaces_inline_values() {
        let out = sanitize_template("  namespace: {{ .Release.Namespace }}", PLACEHOLDER);
        assert_eq!(out, "  namespace: dynamic_parameters");
    }

    #[test]
    fn test_sanitized_template_parses() {
        let out = sanitize_template(TEMPLATE, PLACEHOLDER);
        let value: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        assert_eq!(value["kind"].as_str(), Some("ClusterRole"));
        assert_eq!(value["rules"][0]["resources"][0].as_str(), Some("secrets"));
    }

    #[test]
    fn test_lines_with_leftover_braces_dropped() {
        let out = sanitize_template("a: 1\nb: {c: 2}\n", PLACEHOLDER);
        assert_eq!(out, "a: 1");
    }
}
