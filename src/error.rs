use crate::analyzer::rbac::{
    CatalogConfigurationError, ClusterError, ConfigError, ManifestError,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid escalation catalog: {0}")]
    Catalog(#[from] CatalogConfigurationError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;
