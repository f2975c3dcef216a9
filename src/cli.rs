use crate::analyzer::rbac::{OutputFormat as ReportFormat, Severity};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rbac-audit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Find privilege-escalation paths in Kubernetes RBAC")]
#[command(long_about = "Resolves Roles, ClusterRoles and their bindings into the effective permissions of every user, group and service account, then reports the ones that allow privilege escalation. Works on manifest files, Helm charts, per-application directories and live clusters.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "plain")]
    pub format: OutputFormat,

    /// Exit non-zero when a finding reaches this severity (overrides the config file)
    #[arg(long, global = true, value_enum, value_name = "SEVERITY")]
    pub fail_on: Option<SeverityThreshold>,

    /// Always exit zero when the audit completes
    #[arg(long, global = true)]
    pub no_fail: bool,

    /// Enable verbose logging (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Audit a manifest file, a directory of manifests, or a Helm chart
    Manifests {
        /// File, directory or chart to audit
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Audit every immediate subdirectory of DIR as a separate application
    Apps {
        /// Directory holding one subdirectory per application
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },

    /// Audit the RBAC objects of a live cluster
    Cluster {
        /// Kubeconfig context to use (defaults to the current context)
        #[arg(long, value_name = "NAME")]
        context: Option<String>,

        /// Objects requested per list call
        #[arg(long, default_value_t = 500)]
        page_size: u32,
    },

    /// List the escalation patterns that will be evaluated
    Catalog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeverityThreshold {
    Low,
    Medium,
    High,
    Critical,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Plain => ReportFormat::Plain,
            OutputFormat::Json => ReportFormat::Json,
            OutputFormat::Legacy => ReportFormat::Legacy,
        }
    }
}

impl From<SeverityThreshold> for Severity {
    fn from(threshold: SeverityThreshold) -> Self {
        match threshold {
            SeverityThreshold::Low => Severity::Low,
            SeverityThreshold::Medium => Severity::Medium,
            SeverityThreshold::High => Severity::High,
            SeverityThreshold::Critical => Severity::Critical,
        }
    }
}

impl Cli {
    /// Initialize logging based on verbosity level
    pub fn init_logging(&self) {
        if self.quiet {
            return;
        }

        let level = match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };

        env_logger::Builder::from_default_env()
            .filter_level(level)
            .init();
    }
}
