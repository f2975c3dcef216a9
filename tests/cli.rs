use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const CRB_WRITER: &str = r#"
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: crb-writer
rules:
  - apiGroups: ["rbac.authorization.k8s.io"]
    resources: ["clusterrolebindings"]
    verbs: ["create"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: crb-writer
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: crb-writer
subjects:
  - kind: ServiceAccount
    name: sa1
    namespace: ns1
"#;

const POD_CREATOR: &str = r#"
apiVersion: rbac.authorization.k8s.io/v1
kind: Role
metadata:
  name: pod-creator
  namespace: jobs
rules:
  - apiGroups: [""]
    resources: ["pods"]
    verbs: ["create"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata:
  name: pod-creator
  namespace: jobs
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: Role
  name: pod-creator
subjects:
  - kind: ServiceAccount
    name: runner
"#;

fn rbac_audit() -> Command {
    let mut cmd = Command::cargo_bin("rbac-audit").unwrap();
    // Keep user-level config files out of the way
    cmd.env("HOME", env!("CARGO_TARGET_TMPDIR"));
    cmd
}

fn write_manifest(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_catalog_lists_builtin_patterns() {
    rbac_audit()
        .arg("catalog")
        .assert()
        .success()
        .stdout(predicate::str::contains("cluster-admin-equivalent"))
        .stdout(predicate::str::contains("direct-clusterrolebinding-write"))
        .stdout(predicate::str::contains("Sensitive namespaces: kube-system"));
}

#[test]
fn test_critical_finding_fails_run() {
    let dir = TempDir::new().unwrap();
    let path = write_manifest(&dir, "rbac.yaml", CRB_WRITER);

    rbac_audit()
        .current_dir(dir.path())
        .arg("manifests")
        .arg(&path)
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "[CRITICAL] direct-clusterrolebinding-write ServiceAccount:ns1/sa1",
        ));
}

#[test]
fn test_no_fail_flag() {
    let dir = TempDir::new().unwrap();
    let path = write_manifest(&dir, "rbac.yaml", CRB_WRITER);

    rbac_audit()
        .current_dir(dir.path())
        .args(["manifests", "--no-fail"])
        .arg(&path)
        .assert()
        .success();
}

#[test]
fn test_medium_finding_passes_default_threshold() {
    let dir = TempDir::new().unwrap();
    let path = write_manifest(&dir, "rbac.yaml", POD_CREATOR);

    rbac_audit()
        .current_dir(dir.path())
        .arg("manifests")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("arbitrary-pod-creation"));

    rbac_audit()
        .current_dir(dir.path())
        .args(["manifests", "--fail-on", "medium"])
        .arg(&path)
        .assert()
        .code(1);
}

#[test]
fn test_json_output() {
    let dir = TempDir::new().unwrap();
    let path = write_manifest(&dir, "rbac.yaml", POD_CREATOR);

    let output = rbac_audit()
        .current_dir(dir.path())
        .args(["--format", "json", "manifests"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["findings"][0]["patternId"], "arbitrary-pod-creation");
    assert_eq!(value["findings"][0]["subject"]["namespace"], "jobs");
    assert_eq!(value["summary"]["passed"], true);
}

#[test]
fn test_config_file_in_working_directory() {
    let dir = TempDir::new().unwrap();
    let path = write_manifest(&dir, "rbac.yaml", CRB_WRITER);
    fs::write(
        dir.path().join(".rbac-audit.yaml"),
        "ignoreSubjects:\n  - \"ServiceAccount:ns1/*\"\n",
    )
    .unwrap();

    rbac_audit()
        .current_dir(dir.path())
        .arg("manifests")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("No escalation risks found."));
}

#[test]
fn test_broken_discovered_config_stops_run() {
    let dir = TempDir::new().unwrap();
    let path = write_manifest(&dir, "rbac.yaml", POD_CREATOR);
    fs::write(
        dir.path().join(".rbac-audit.yaml"),
        r#"
exclude: ["arbitrary-pod-creation"]
customPatterns:
  - id: node-proxy
    severity: severe
    predicate:
      resources: ["nodes/proxy"]
      verbs: ["get"]
"#,
    )
    .unwrap();

    rbac_audit()
        .current_dir(dir.path())
        .arg("manifests")
        .arg(&path)
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("invalid config"))
        .stderr(predicate::str::contains("severe"));
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = write_manifest(&dir, "rbac.yaml", CRB_WRITER);
    let config = write_manifest(&dir, "audit.yaml", "exclude: [\"no-such-pattern\"]\n");

    rbac_audit()
        .args(["manifests", "--config"])
        .arg(&config)
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no-such-pattern"));
}

#[test]
fn test_apps_mode() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("billing")).unwrap();
    fs::create_dir_all(dir.path().join("jobs")).unwrap();
    write_manifest(&dir, "billing/rbac.yaml", CRB_WRITER);
    write_manifest(&dir, "jobs/rbac.yaml", POD_CREATOR);

    let output = rbac_audit()
        .current_dir(dir.path())
        .args(["--format", "json", "--no-fail", "apps", "."])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        value["billing"]["findings"][0]["patternId"],
        "direct-clusterrolebinding-write"
    );
    assert_eq!(
        value["jobs"]["findings"][0]["patternId"],
        "arbitrary-pod-creation"
    );
}

#[test]
fn test_missing_path() {
    rbac_audit()
        .args(["manifests", "/nonexistent/rbac"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("path not found"));
}
