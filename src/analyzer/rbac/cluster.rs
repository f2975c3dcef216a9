//! Live cluster retrieval of RBAC objects.
//!
//! Lists Roles, ClusterRoles, RoleBindings and ClusterRoleBindings from the
//! API server into an [`RbacSnapshot`]. The four kinds are fetched
//! concurrently and every list is paginated.
//!
//! # Prerequisites
//!
//! - Valid kubeconfig (uses default context or specified context)
//! - Permission to list the four RBAC kinds cluster-wide
//!
//! # Example
//!
//! ```rust,ignore
//! use rbac_audit::analyzer::rbac::cluster::ClusterRbacClient;
//!
//! let client = ClusterRbacClient::new().await?;
//! let snapshot = client.fetch_snapshot().await?;
//! println!("{} RBAC objects", snapshot.len());
//! ```

use crate::analyzer::rbac::snapshot::RbacSnapshot;
use k8s_openapi::api::rbac::v1 as rbac;
use kube::{
    Client, Config, Resource,
    api::{Api, ListParams},
};
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// Objects requested per list call.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Error type for cluster retrieval.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("failed to create Kubernetes client: {0}")]
    ClientCreation(#[from] kube::Error),

    #[error("failed to infer Kubernetes config: {0}")]
    ConfigError(#[from] kube::config::InferConfigError),

    #[error("failed to read kubeconfig: {0}")]
    KubeconfigError(#[from] kube::config::KubeconfigError),

    #[error("failed to list {kind}: {source}")]
    List {
        kind: String,
        #[source]
        source: kube::Error,
    },
}

/// Reads RBAC objects from a live cluster.
pub struct ClusterRbacClient {
    client: Client,
    page_size: u32,
}

impl ClusterRbacClient {
    /// Create a client using the default kubeconfig or in-cluster config.
    pub async fn new() -> Result<Self, ClusterError> {
        let config = Config::infer().await?;
        Ok(Self::from_client(Client::try_from(config)?))
    }

    /// Create a client with a specific kubeconfig context.
    pub async fn with_context(context: &str) -> Result<Self, ClusterError> {
        let kubeconfig = kube::config::Kubeconfig::read()?;
        let config = Config::from_custom_kubeconfig(
            kubeconfig,
            &kube::config::KubeConfigOptions {
                context: Some(context.to_string()),
                ..Default::default()
            },
        )
        .await?;
        Ok(Self::from_client(Client::try_from(config)?))
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Get the current context name.
    pub fn current_context() -> Result<String, ClusterError> {
        let kubeconfig = kube::config::Kubeconfig::read()?;
        Ok(kubeconfig
            .current_context
            .unwrap_or_else(|| "default".to_string()))
    }

    /// Fetch all four RBAC kinds.
    pub async fn fetch_snapshot(&self) -> Result<RbacSnapshot, ClusterError> {
        let (roles, cluster_roles, role_bindings, cluster_role_bindings) = tokio::try_join!(
            self.list_all::<rbac::Role>(),
            self.list_all::<rbac::ClusterRole>(),
            self.list_all::<rbac::RoleBinding>(),
            self.list_all::<rbac::ClusterRoleBinding>(),
        )?;

        let snapshot = RbacSnapshot {
            roles,
            cluster_roles,
            role_bindings,
            cluster_role_bindings,
        };
        log::info!("fetched {} RBAC objects from the cluster", snapshot.len());
        Ok(snapshot)
    }

    async fn list_all<K>(&self) -> Result<Vec<K>, ClusterError>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
    {
        let api: Api<K> = Api::all(self.client.clone());
        let kind = K::kind(&()).to_string();
        let mut params = ListParams::default().limit(self.page_size);
        let mut items = Vec::new();

        loop {
            let page = api.list(&params).await.map_err(|source| ClusterError::List {
                kind: kind.clone(),
                source,
            })?;
            items.extend(page.items);

            match page.metadata.continue_ {
                Some(token) if !token.is_empty() => {
                    params = params.continue_token(&token);
                }
                _ => break,
            }
        }

        log::debug!("listed {} {} objects", items.len(), kind);
        Ok(items)
    }
}
