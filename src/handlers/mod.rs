// Handler modules
pub mod audit;

// Re-export all handler functions
pub use audit::{AuditOptions, handle_apps, handle_catalog, handle_cluster, handle_manifests};
