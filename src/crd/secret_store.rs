//! SecretStore and ClusterSecretStore definitions for the Kubernetes backend

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

/// Kind of the namespaced store
pub const SECRET_STORE_KIND: &str = "SecretStore";

/// Kind of the cluster-scoped store
pub const CLUSTER_SECRET_STORE_KIND: &str = "ClusterSecretStore";

/// Namespaced store specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "external-secrets.io",
    version = "v1beta1",
    kind = "SecretStore",
    plural = "secretstores",
    singular = "secretstore",
    shortname = "ss",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SecretStoreSpec {
    /// Backend configuration
    pub provider: SecretStoreProvider,
}

/// Cluster-scoped store specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "external-secrets.io",
    version = "v1beta1",
    kind = "ClusterSecretStore",
    plural = "clustersecretstores",
    singular = "clustersecretstore",
    shortname = "css"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSecretStoreSpec {
    /// Backend configuration
    pub provider: SecretStoreProvider,
}

/// Backend selection. Other backends live in other crates; an absent
/// `kubernetes` block means the store is not meant for this provider.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretStoreProvider {
    /// Read secrets from a Kubernetes cluster
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubernetesProvider>,
}

/// Kubernetes backend configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesProvider {
    /// Namespace to read secrets from instead of the caller's namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_namespace: Option<String>,

    /// Identity to read secrets as. When unset, the operator's own
    /// identity is used and no access review is performed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<KubernetesAuth>,
}

/// Authentication configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesAuth {
    /// Bearer token authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenAuth>,
}

/// Bearer token authentication
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenAuth {
    /// Secret key holding the bearer token
    pub bearer_token: SecretKeySelector,
}

/// Reference to a single key of a Secret
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    /// Secret name
    pub name: String,
    /// Secret namespace. Only honoured for cluster-scoped stores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Key in secret
    pub key: String,
}

impl KubernetesProvider {
    /// Bearer token selector, if impersonation is configured
    pub fn bearer_token(&self) -> Option<&SecretKeySelector> {
        self.auth
            .as_ref()
            .and_then(|auth| auth.token.as_ref())
            .map(|token| &token.bearer_token)
    }
}

/// A store of either supported kind
#[derive(Clone, Debug)]
pub enum GenericStore {
    SecretStore(SecretStore),
    ClusterSecretStore(ClusterSecretStore),
}

impl GenericStore {
    /// Parse a store manifest (YAML or JSON).
    ///
    /// Fails with [`Error::InvalidStore`] for any kind other than
    /// `SecretStore` and `ClusterSecretStore`.
    pub fn from_manifest(manifest: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(manifest)
            .map_err(|e| Error::InvalidStore(format!("Failed to parse store manifest: {}", e)))?;

        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .ok_or_else(|| Error::InvalidStore("store manifest has no kind".to_string()))?;

        match kind {
            SECRET_STORE_KIND => serde_yaml::from_value::<SecretStore>(value)
                .map(GenericStore::SecretStore)
                .map_err(|e| {
                    Error::InvalidStore(format!("Malformed {}: {}", SECRET_STORE_KIND, e))
                }),
            CLUSTER_SECRET_STORE_KIND => serde_yaml::from_value::<ClusterSecretStore>(value)
                .map(GenericStore::ClusterSecretStore)
                .map_err(|e| {
                    Error::InvalidStore(format!("Malformed {}: {}", CLUSTER_SECRET_STORE_KIND, e))
                }),
            other => Err(Error::InvalidStore(format!(
                "unsupported store kind '{}', expected {} or {}",
                other, SECRET_STORE_KIND, CLUSTER_SECRET_STORE_KIND
            ))),
        }
    }

    /// Store kind
    pub fn kind(&self) -> &'static str {
        match self {
            GenericStore::SecretStore(_) => SECRET_STORE_KIND,
            GenericStore::ClusterSecretStore(_) => CLUSTER_SECRET_STORE_KIND,
        }
    }

    /// Store name
    pub fn name(&self) -> String {
        match self {
            GenericStore::SecretStore(store) => store.name_any(),
            GenericStore::ClusterSecretStore(store) => store.name_any(),
        }
    }

    /// Namespace of a namespaced store; `None` for cluster-scoped stores
    pub fn namespace(&self) -> Option<String> {
        match self {
            GenericStore::SecretStore(store) => store.namespace(),
            GenericStore::ClusterSecretStore(_) => None,
        }
    }

    pub fn is_cluster_scoped(&self) -> bool {
        matches!(self, GenericStore::ClusterSecretStore(_))
    }

    /// Backend configuration
    pub fn provider(&self) -> &SecretStoreProvider {
        match self {
            GenericStore::SecretStore(store) => &store.spec.provider,
            GenericStore::ClusterSecretStore(store) => &store.spec.provider,
        }
    }

    /// Kubernetes backend configuration, if this store targets it
    pub fn kubernetes(&self) -> Option<&KubernetesProvider> {
        self.provider().kubernetes.as_ref()
    }
}

impl From<SecretStore> for GenericStore {
    fn from(store: SecretStore) -> Self {
        GenericStore::SecretStore(store)
    }
}

impl From<ClusterSecretStore> for GenericStore {
    fn from(store: ClusterSecretStore) -> Self {
        GenericStore::ClusterSecretStore(store)
    }
}

/// Load a store manifest from disk
pub fn load_store(path: &Path) -> Result<GenericStore> {
    let manifest = std::fs::read_to_string(path).map_err(|e| {
        Error::InvalidStore(format!(
            "Failed to read store manifest {}: {}",
            path.display(),
            e
        ))
    })?;
    GenericStore::from_manifest(&manifest)
}
