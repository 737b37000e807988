//! Kubernetes API backed secret access

use async_trait::async_trait;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use k8s_openapi::api::core::v1::Secret;
use kube::api::{ListParams, PostParams};
use kube::config::AuthInfo;
use kube::{Api, Client, Config};
use secrecy::SecretString;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::crd::SecretKeySelector;
use crate::provider::{AccessReviewer, KubeConnector, ScopedClient, SecretGetter};
use crate::{Error, Result};

/// The operator's connection, plus the configuration needed to open
/// connections as other identities against the same cluster
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
    config: Config,
}

impl KubeClient {
    /// Connect using in-cluster configuration or the local kubeconfig
    pub async fn try_default() -> Result<Self> {
        let config = Config::infer()
            .await
            .map_err(|e| Error::Kube(kube::Error::InferConfig(e)))?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let client = Client::try_from(config.clone())?;
        Ok(Self { client, config })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl KubeConnector for KubeClient {
    fn secrets(&self, namespace: &str) -> Arc<dyn SecretGetter> {
        Arc::new(KubeSecrets::new(self.client.clone(), namespace))
    }

    fn access_reviewer(&self) -> Arc<dyn AccessReviewer> {
        Arc::new(KubeAccessReviewer::new(self.client.clone()))
    }

    async fn resolve_bearer_token(
        &self,
        selector: &SecretKeySelector,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let secret = KubeSecrets::new(self.client.clone(), namespace)
            .get(&selector.name, cancel)
            .await?;
        get_secret_key(&secret, &selector.name, &selector.key)
    }

    fn impersonate(&self, token: &str, namespace: &str) -> Result<ScopedClient> {
        // Keep cluster URL and TLS settings, drop every other credential
        let mut config = self.config.clone();
        config.auth_info = AuthInfo {
            token: Some(SecretString::new(token.to_string())),
            ..Default::default()
        };
        let client = Client::try_from(config)?;

        debug!(namespace = %namespace, "Built bearer token client");

        Ok(ScopedClient {
            secrets: Arc::new(KubeSecrets::new(client.clone(), namespace)),
            reviewer: Arc::new(KubeAccessReviewer::new(client)),
            namespace: namespace.to_string(),
        })
    }
}

/// Secrets of one namespace
pub struct KubeSecrets {
    api: Api<Secret>,
    namespace: String,
}

impl KubeSecrets {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }
}

#[async_trait]
impl SecretGetter for KubeSecrets {
    async fn get(&self, name: &str, cancel: &CancellationToken) -> Result<Secret> {
        cancellable(cancel, self.api.get(name))
            .await?
            .map_err(|e| match &e {
                kube::Error::Api(ae) if ae.code == 404 => Error::SecretNotFound {
                    name: name.to_string(),
                    namespace: self.namespace.clone(),
                },
                _ => Error::Kube(e),
            })
    }

    async fn list(&self, label_selector: &str, cancel: &CancellationToken) -> Result<Vec<Secret>> {
        let mut params = ListParams::default();
        if !label_selector.is_empty() {
            params = params.labels(label_selector);
        }

        let list = cancellable(cancel, self.api.list(&params)).await??;
        Ok(list.items)
    }
}

/// Self access reviews for the identity a client is authenticated as
pub struct KubeAccessReviewer {
    api: Api<SelfSubjectAccessReview>,
}

impl KubeAccessReviewer {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl AccessReviewer for KubeAccessReviewer {
    async fn can_get(
        &self,
        namespace: &str,
        resource: &str,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    namespace: Some(namespace.to_string()),
                    verb: Some("get".to_string()),
                    resource: Some(resource.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        let created =
            cancellable(cancel, self.api.create(&PostParams::default(), &review)).await??;

        Ok(created.status.map(|s| s.allowed).unwrap_or(false))
    }
}

/// Get a specific key from a secret as text
pub fn get_secret_key(secret: &Secret, name: &str, key: &str) -> Result<String> {
    let value = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(|| Error::NotFound {
            secret: name.to_string(),
            key: key.to_string(),
        })?;

    String::from_utf8(value.0.clone()).map_err(|_| Error::InvalidSecretData {
        name: name.to_string(),
        key: key.to_string(),
    })
}

/// Run an API call unless `cancel` fires first
async fn cancellable<F, T>(cancel: &CancellationToken, call: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        out = call => Ok(out),
    }
}
