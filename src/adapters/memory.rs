//! In-memory secret access
//!
//! Implementations of the provider capabilities that keep everything in
//! process. Used by this crate's tests and available to operators embedding
//! the provider in their own tests.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::error::ErrorResponse;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

use crate::crd::SecretKeySelector;
use crate::provider::{AccessReviewer, KubeConnector, ScopedClient, SecretGetter};
use crate::{Error, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn server_error(message: &str) -> Error {
    Error::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

/// Build a Secret with the given labels and data
pub fn build_secret(name: &str, labels: &[(&str, &str)], data: &[(&str, &[u8])]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: if labels.is_empty() {
                None
            } else {
                Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                )
            },
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

/// Secrets of one namespace. Clones share the same storage.
#[derive(Clone, Default)]
pub struct InMemorySecrets {
    namespace: String,
    secrets: Arc<Mutex<BTreeMap<String, Secret>>>,
    list_selectors: Arc<Mutex<Vec<String>>>,
    failure: Option<String>,
}

impl InMemorySecrets {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    /// Every call fails with a server error carrying `message`
    pub fn failing(namespace: &str, message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(namespace)
        }
    }

    pub fn with_secret(self, secret: Secret) -> Self {
        self.insert(secret);
        self
    }

    pub fn insert(&self, mut secret: Secret) {
        secret.metadata.namespace = Some(self.namespace.clone());
        lock(&self.secrets).insert(secret.name_any(), secret);
    }

    /// Label selectors passed to `list`, in call order
    pub fn list_selectors(&self) -> Vec<String> {
        lock(&self.list_selectors).clone()
    }
}

/// Equality-based selector evaluation (`k=v,k2=v2`)
fn selector_matches(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
            None => labels.contains_key(term),
        })
}

#[async_trait]
impl SecretGetter for InMemorySecrets {
    async fn get(&self, name: &str, cancel: &CancellationToken) -> Result<Secret> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(message) = &self.failure {
            return Err(server_error(message));
        }

        lock(&self.secrets)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::SecretNotFound {
                name: name.to_string(),
                namespace: self.namespace.clone(),
            })
    }

    async fn list(&self, label_selector: &str, cancel: &CancellationToken) -> Result<Vec<Secret>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        lock(&self.list_selectors).push(label_selector.to_string());
        if let Some(message) = &self.failure {
            return Err(server_error(message));
        }

        Ok(lock(&self.secrets)
            .values()
            .filter(|secret| selector_matches(label_selector, secret.labels()))
            .cloned()
            .collect())
    }
}

/// Outcome every review returns
#[derive(Clone, Debug)]
pub enum Decision {
    Allow,
    Deny,
    Fail(String),
}

/// Access reviewer with a fixed decision
#[derive(Clone)]
pub struct StaticAccessReviewer {
    decision: Decision,
    reviews: Arc<Mutex<Vec<(String, String)>>>,
}

impl StaticAccessReviewer {
    pub fn new(decision: Decision) -> Self {
        Self {
            decision,
            reviews: Arc::default(),
        }
    }

    pub fn allow() -> Self {
        Self::new(Decision::Allow)
    }

    pub fn deny() -> Self {
        Self::new(Decision::Deny)
    }

    /// `(namespace, resource)` of every review, in call order
    pub fn reviews(&self) -> Vec<(String, String)> {
        lock(&self.reviews).clone()
    }
}

#[async_trait]
impl AccessReviewer for StaticAccessReviewer {
    async fn can_get(
        &self,
        namespace: &str,
        resource: &str,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        lock(&self.reviews).push((namespace.to_string(), resource.to_string()));

        match &self.decision {
            Decision::Allow => Ok(true),
            Decision::Deny => Ok(false),
            Decision::Fail(message) => Err(server_error(message)),
        }
    }
}

/// A whole cluster: secrets per namespace and the namespaces each bearer
/// token may read. Tokens without grants fail access review as
/// unauthenticated.
#[derive(Clone)]
pub struct InMemoryCluster {
    namespaces: Arc<Mutex<BTreeMap<String, InMemorySecrets>>>,
    grants: Arc<Mutex<BTreeMap<String, BTreeSet<String>>>>,
    impersonations: Arc<Mutex<Vec<(String, String)>>>,
    operator: StaticAccessReviewer,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self {
            namespaces: Arc::default(),
            grants: Arc::default(),
            impersonations: Arc::default(),
            operator: StaticAccessReviewer::allow(),
        }
    }
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(self, namespace: &str, secret: Secret) -> Self {
        self.namespace(namespace).insert(secret);
        self
    }

    /// Allow `token` to get secrets in `namespace`
    pub fn grant(self, token: &str, namespace: &str) -> Self {
        lock(&self.grants)
            .entry(token.to_string())
            .or_default()
            .insert(namespace.to_string());
        self
    }

    /// Register `token` as a valid identity without any permissions
    pub fn identity(self, token: &str) -> Self {
        lock(&self.grants).entry(token.to_string()).or_default();
        self
    }

    /// Storage for `namespace`, created on first use
    pub fn namespace(&self, namespace: &str) -> InMemorySecrets {
        lock(&self.namespaces)
            .entry(namespace.to_string())
            .or_insert_with(|| InMemorySecrets::new(namespace))
            .clone()
    }

    /// `(token, namespace)` of every impersonated client built, in order
    pub fn impersonations(&self) -> Vec<(String, String)> {
        lock(&self.impersonations).clone()
    }
}

#[async_trait]
impl KubeConnector for InMemoryCluster {
    fn secrets(&self, namespace: &str) -> Arc<dyn SecretGetter> {
        Arc::new(self.namespace(namespace))
    }

    fn access_reviewer(&self) -> Arc<dyn AccessReviewer> {
        Arc::new(self.operator.clone())
    }

    async fn resolve_bearer_token(
        &self,
        selector: &SecretKeySelector,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let secret = self.namespace(namespace).get(&selector.name, cancel).await?;
        crate::adapters::secrets::get_secret_key(&secret, &selector.name, &selector.key)
    }

    fn impersonate(&self, token: &str, namespace: &str) -> Result<ScopedClient> {
        lock(&self.impersonations).push((token.to_string(), namespace.to_string()));

        let decision = match lock(&self.grants).get(token) {
            Some(namespaces) if namespaces.contains(namespace) => Decision::Allow,
            Some(_) => Decision::Deny,
            None => Decision::Fail("Unauthorized".to_string()),
        };

        Ok(ScopedClient {
            secrets: Arc::new(self.namespace(namespace)),
            reviewer: Arc::new(StaticAccessReviewer::new(decision)),
            namespace: namespace.to_string(),
        })
    }
}
