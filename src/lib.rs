//! # rbac-audit
//!
//! Finds privilege-escalation paths in Kubernetes RBAC.
//!
//! Roles, ClusterRoles and their bindings are resolved into the effective
//! permissions of every user, group and service account. Those permissions
//! are then matched against a catalog of escalation patterns such as
//! cluster-admin equivalence, `escalate`/`bind` on roles, or impersonation.
//!
//! ## Features
//!
//! - **Offline analysis**: Manifest files, directories and Helm charts
//! - **Per-application reports**: One report per application directory
//! - **Live clusters**: Paginated listing through the Kubernetes API
//! - **Configurable catalog**: Include, exclude, re-weight or add patterns
//!
//! ## Example
//!
//! ```rust,no_run
//! use rbac_audit::analyzer::rbac::{AuditConfig, audit, load_path};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (snapshot, _warnings) = load_path(Path::new("./deploy"))?;
//! let report = audit(&snapshot, &AuditConfig::default())?;
//! for finding in &report.findings {
//!     println!("{} {} {}", finding.severity, finding.pattern_id, finding.subject);
//! }
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod cli;
pub mod error;
pub mod handlers;

// Re-export commonly used types and functions
pub use analyzer::rbac::{AuditConfig, AuditReport, RbacSnapshot, audit};
pub use error::{AuditError, Result};
use cli::Commands;
use handlers::AuditOptions;

/// The current version of the CLI tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run a command. Returns whether the findings should fail the run.
pub async fn run_command(command: Commands, options: &AuditOptions) -> Result<bool> {
    match command {
        Commands::Manifests { path } => handlers::handle_manifests(&path, options),
        Commands::Apps { dir } => handlers::handle_apps(&dir, options),
        Commands::Cluster { context, page_size } => {
            handlers::handle_cluster(context.as_deref(), page_size, options).await
        }
        Commands::Catalog => handlers::handle_catalog(options).map(|_| false),
    }
}
