//! Kubernetes secret provider
//!
//! The provider reads Secrets through narrow capabilities so the same logic
//! runs against the API server ([`crate::adapters::secrets`]) and against
//! in-memory fixtures ([`crate::adapters::memory`]).

pub mod client_builder;
pub mod kubernetes;
pub mod validation;

pub use kubernetes::ProviderKubernetes;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::crd::SecretKeySelector;
use crate::Result;

/// Resource name passed to access reviews
pub const SECRETS_RESOURCE: &str = "secrets";

/// Read access to Secrets in one namespace
#[async_trait]
pub trait SecretGetter: Send + Sync {
    /// Fetch one secret by name
    async fn get(&self, name: &str, cancel: &CancellationToken) -> Result<Secret>;

    /// List secrets matching a label selector; `""` lists everything
    async fn list(&self, label_selector: &str, cancel: &CancellationToken) -> Result<Vec<Secret>>;
}

/// Permission probe for the identity a client acts as
#[async_trait]
pub trait AccessReviewer: Send + Sync {
    /// Whether `get` on `resource` in `namespace` is allowed
    async fn can_get(
        &self,
        namespace: &str,
        resource: &str,
        cancel: &CancellationToken,
    ) -> Result<bool>;
}

/// The operator's own connection to the cluster
#[async_trait]
pub trait KubeConnector: Send + Sync {
    /// Secrets in `namespace`, read as the operator
    fn secrets(&self, namespace: &str) -> Arc<dyn SecretGetter>;

    /// Access reviews for the operator's identity
    fn access_reviewer(&self) -> Arc<dyn AccessReviewer>;

    /// Read a bearer token from a Secret key, as the operator
    async fn resolve_bearer_token(
        &self,
        selector: &SecretKeySelector,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<String>;

    /// A client for `namespace` acting as the identity behind `token`
    fn impersonate(&self, token: &str, namespace: &str) -> Result<ScopedClient>;
}

/// Secret access and access review bound to one namespace and one identity
#[derive(Clone)]
pub struct ScopedClient {
    pub secrets: Arc<dyn SecretGetter>,
    pub reviewer: Arc<dyn AccessReviewer>,
    pub namespace: String,
}

impl std::fmt::Debug for ScopedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedClient")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
