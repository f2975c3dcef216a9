//! Configuration for the RBAC audit.
//!
//! Provides:
//! - Pattern inclusion/exclusion and severity overrides
//! - Custom escalation patterns
//! - Sensitive namespaces for scope-aware patterns
//! - Subjects to leave out of the findings
//! - Failure thresholds

use crate::analyzer::rbac::catalog::Pattern;
use crate::analyzer::rbac::types::{Severity, Subject};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File names looked up by [`AuditConfig::load_from_default`].
pub const CONFIG_FILE_NAMES: &[&str] = &[".rbac-audit.yaml", ".rbac-audit.yml"];

/// Configuration for an RBAC audit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    /// Namespaces whose namespace-scoped grants are treated like cluster-wide ones.
    #[serde(default = "default_sensitive_namespaces")]
    pub sensitive_namespaces: Vec<String>,

    /// If non-empty, only these pattern ids are evaluated.
    #[serde(default)]
    pub include: Vec<String>,

    /// Pattern ids to skip.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Replacement base severity per pattern id.
    #[serde(default)]
    pub severity_overrides: BTreeMap<String, Severity>,

    /// Additional patterns evaluated next to the built-in ones.
    #[serde(default)]
    pub custom_patterns: Vec<Pattern>,

    /// Findings at or above this severity fail the run.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: Severity,

    /// If true, never return a non-zero exit code.
    #[serde(default)]
    pub no_fail: bool,

    /// Subject identifiers (`Kind:namespace/name` or `Kind:name`, globs
    /// allowed) excluded from findings.
    #[serde(default)]
    pub ignore_subjects: Vec<String>,
}

fn default_sensitive_namespaces() -> Vec<String> {
    vec!["kube-system".to_string()]
}

fn default_failure_threshold() -> Severity {
    Severity::High
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sensitive_namespaces: default_sensitive_namespaces(),
            include: Vec::new(),
            exclude: Vec::new(),
            severity_overrides: BTreeMap::new(),
            custom_patterns: Vec::new(),
            failure_threshold: default_failure_threshold(),
            no_fail: false,
            ignore_subjects: Vec::new(),
        }
    }
}

impl AuditConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern to the include list.
    pub fn include(mut self, pattern_id: impl Into<String>) -> Self {
        self.include.push(pattern_id.into());
        self
    }

    /// Add a pattern to the exclude list.
    pub fn exclude(mut self, pattern_id: impl Into<String>) -> Self {
        self.exclude.push(pattern_id.into());
        self
    }

    /// Override the base severity of a pattern.
    pub fn with_severity(mut self, pattern_id: impl Into<String>, severity: Severity) -> Self {
        self.severity_overrides.insert(pattern_id.into(), severity);
        self
    }

    pub fn with_custom_pattern(mut self, pattern: Pattern) -> Self {
        self.custom_patterns.push(pattern);
        self
    }

    pub fn with_sensitive_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.sensitive_namespaces.push(namespace.into());
        self
    }

    pub fn with_threshold(mut self, threshold: Severity) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn ignore_subject(mut self, identifier: impl Into<String>) -> Self {
        self.ignore_subjects.push(identifier.into());
        self
    }

    /// Check whether findings for a subject should be dropped.
    pub fn is_subject_ignored(&self, subject: &Subject) -> bool {
        let identifier = subject.identifier();
        self.ignore_subjects.iter().any(|pattern| {
            pattern == &identifier
                || glob::Pattern::new(pattern).is_ok_and(|glob| glob.matches(&identifier))
        })
    }

    /// Whether a finding of this severity fails the run.
    pub fn should_fail(&self, severity: Severity) -> bool {
        !self.no_fail && severity >= self.failure_threshold
    }

    /// Load configuration from a YAML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load_from_str(&content)
    }

    /// Load configuration from a YAML string.
    pub fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Try the working directory, then the home directory.
    ///
    /// Returns `Ok(None)` when no config file exists. A file that exists
    /// but cannot be read or parsed is an error.
    pub fn load_from_default() -> Result<Option<Self>, ConfigError> {
        let Some(path) = Self::default_path() else {
            return Ok(None);
        };
        let config = Self::load_from_file(&path)?;
        log::debug!("loaded config from {}", path.display());
        Ok(Some(config))
    }

    /// First existing default config file, if any.
    pub fn default_path() -> Option<PathBuf> {
        let local = CONFIG_FILE_NAMES.iter().map(PathBuf::from);
        let global = dirs::home_dir()
            .into_iter()
            .flat_map(|home| CONFIG_FILE_NAMES.iter().map(move |name| home.join(name)));
        local.chain(global).find(|path| path.exists())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}
