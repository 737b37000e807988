//! Validation of store definitions before any client is built

use crate::crd::{GenericStore, KubernetesProvider};
use crate::{Error, Result};

/// Validate a store and return its Kubernetes backend configuration.
///
/// `default_namespace` is the namespace the store is used from; a namespaced
/// store's bearer token is read there.
pub fn validate_store<'a>(
    store: &'a GenericStore,
    default_namespace: &str,
) -> Result<&'a KubernetesProvider> {
    let provider = store.kubernetes().ok_or_else(|| {
        Error::InvalidStore(format!(
            "{} {} has no kubernetes provider configured",
            store.kind(),
            store.name()
        ))
    })?;

    if let Some(remote) = &provider.remote_namespace {
        if remote.is_empty() {
            return Err(Error::InvalidStore(
                "provider.kubernetes.remoteNamespace cannot be empty when set".to_string(),
            ));
        }
    }

    if let Some(selector) = provider.bearer_token() {
        if selector.name.is_empty() {
            return Err(Error::InvalidStore(
                "auth.token.bearerToken.name cannot be empty".to_string(),
            ));
        }

        if selector.key.is_empty() {
            return Err(Error::InvalidStore(
                "auth.token.bearerToken.key cannot be empty".to_string(),
            ));
        }

        // Namespaced stores may only reference the namespace they are used from
        if let (GenericStore::SecretStore(_), Some(ns)) = (store, &selector.namespace) {
            if ns != default_namespace {
                return Err(Error::InvalidStore(format!(
                    "{} may not reference bearer token secret in namespace {}",
                    store.kind(),
                    ns
                )));
            }
        }
    }

    Ok(provider)
}

/// Namespace secrets are read from: the remote override, else the caller's
pub fn effective_namespace(
    provider: &KubernetesProvider,
    default_namespace: &str,
) -> Result<String> {
    let namespace = provider
        .remote_namespace
        .as_deref()
        .unwrap_or(default_namespace);

    if namespace.is_empty() {
        return Err(Error::InvalidStore(
            "no namespace to read secrets from: set remoteNamespace or provide a namespace"
                .to_string(),
        ));
    }

    Ok(namespace.to_string())
}

/// Namespace holding the bearer token secret
pub fn token_namespace(store: &GenericStore, default_namespace: &str) -> String {
    match store {
        GenericStore::SecretStore(_) => default_namespace.to_string(),
        GenericStore::ClusterSecretStore(_) => store
            .kubernetes()
            .and_then(|p| p.bearer_token())
            .and_then(|selector| selector.namespace.clone())
            .unwrap_or_else(|| default_namespace.to_string()),
    }
}
