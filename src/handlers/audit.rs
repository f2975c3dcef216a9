//! Handlers for the audit commands.
//!
//! Every audit handler returns `Ok(true)` when the findings reach the
//! failure threshold, leaving the exit code to the caller.

use crate::analyzer::rbac::{
    AuditConfig, AuditReport, Catalog, ClusterRbacClient, OutputFormat, RbacSnapshot, Severity,
    audit_with_catalog, format_catalog_to_string, format_report_to_string, load_apps, load_path,
};
use crate::analyzer::rbac::warning::ManifestWarning;
use crate::error::Result;
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Options shared by the audit commands.
#[derive(Debug, Clone, Default)]
pub struct AuditOptions {
    /// Explicit configuration file; the default locations are searched otherwise
    pub config: Option<PathBuf>,
    pub format: OutputFormat,
    /// Overrides `failureThreshold` from the configuration
    pub fail_on: Option<Severity>,
    /// Overrides `noFail` from the configuration
    pub no_fail: bool,
}

impl AuditOptions {
    /// Load the configuration and apply command-line overrides.
    pub fn load_config(&self) -> Result<AuditConfig> {
        let mut config = match &self.config {
            Some(path) => AuditConfig::load_from_file(path)?,
            None => AuditConfig::load_from_default()?.unwrap_or_default(),
        };
        if let Some(threshold) = self.fail_on {
            config.failure_threshold = threshold;
        }
        if self.no_fail {
            config.no_fail = true;
        }
        Ok(config)
    }
}

/// Handle the `manifests` command.
pub fn handle_manifests(path: &Path, options: &AuditOptions) -> Result<bool> {
    let config = options.load_config()?;
    let catalog = Catalog::from_config(&config)?;

    let (snapshot, warnings) = load_path(path)?;
    let report = run_audit(&snapshot, warnings, &catalog, &config);

    print!(
        "{}",
        format_report_to_string(&report, &catalog, options.format)
    );
    Ok(report.should_fail(&config))
}

/// Handle the `apps` command: one report per application directory.
pub fn handle_apps(dir: &Path, options: &AuditOptions) -> Result<bool> {
    let config = options.load_config()?;
    let catalog = Catalog::from_config(&config)?;

    let apps = load_apps(dir)?;
    if apps.is_empty() {
        log::warn!("no application directories under {}", dir.display());
    }

    let mut failed = false;
    let mut combined = serde_json::Map::new();
    for app in apps {
        let report = run_audit(&app.snapshot, app.warnings, &catalog, &config);
        failed |= report.should_fail(&config);
        let rendered = format_report_to_string(&report, &catalog, options.format);

        match options.format {
            OutputFormat::Plain => {
                println!("{}", format!("== {} ==", app.name).bold());
                println!("{}", rendered);
            }
            OutputFormat::Json | OutputFormat::Legacy => {
                let value = serde_json::from_str(&rendered).unwrap_or(serde_json::Value::Null);
                combined.insert(app.name, value);
            }
        }
    }

    if options.format != OutputFormat::Plain {
        let output = serde_json::Value::Object(combined);
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
        );
    }
    Ok(failed)
}

/// Handle the `cluster` command.
pub async fn handle_cluster(
    context: Option<&str>,
    page_size: u32,
    options: &AuditOptions,
) -> Result<bool> {
    // Install rustls crypto provider (required for TLS connections to K8s API)
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = options.load_config()?;
    let catalog = Catalog::from_config(&config)?;

    let client = match context {
        Some(context) => ClusterRbacClient::with_context(context).await?,
        None => ClusterRbacClient::new().await?,
    }
    .with_page_size(page_size);

    if options.format == OutputFormat::Plain {
        let name = match context {
            Some(context) => context.to_string(),
            None => ClusterRbacClient::current_context().unwrap_or_else(|_| "in-cluster".to_string()),
        };
        eprintln!("{} {}", "Auditing cluster".cyan(), name.bold());
    }

    let snapshot = client.fetch_snapshot().await?;
    let report = run_audit(&snapshot, Vec::new(), &catalog, &config);

    print!(
        "{}",
        format_report_to_string(&report, &catalog, options.format)
    );
    Ok(report.should_fail(&config))
}

/// Handle the `catalog` command.
pub fn handle_catalog(options: &AuditOptions) -> Result<()> {
    let config = options.load_config()?;
    let catalog = Catalog::from_config(&config)?;
    print!("{}", format_catalog_to_string(&catalog, options.format));
    Ok(())
}

fn run_audit(
    snapshot: &RbacSnapshot,
    manifest_warnings: Vec<ManifestWarning>,
    catalog: &Catalog,
    config: &AuditConfig,
) -> AuditReport {
    for warning in &manifest_warnings {
        log::warn!("{}", warning);
    }
    audit_with_catalog(snapshot, catalog, config).with_manifest_warnings(manifest_warnings)
}
