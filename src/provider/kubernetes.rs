//! Secret lookups against one namespace

use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::adapters::decoder::{self, SecretPayload};
use crate::adapters::matcher::FindSpec;
use crate::crd::{GenericStore, SecretReference};
use crate::metrics;
use crate::provider::{
    client_builder, AccessReviewer, KubeConnector, ScopedClient, SecretGetter, SECRETS_RESOURCE,
};
use crate::{Error, Result};

/// Reads secrets for one store. Holds no mutable state, so one instance
/// can serve concurrent requests.
#[derive(Clone)]
pub struct ProviderKubernetes {
    secrets: Arc<dyn SecretGetter>,
    reviewer: Arc<dyn AccessReviewer>,
    namespace: String,
}

impl ProviderKubernetes {
    /// Wrap an already scoped client
    pub fn new(client: ScopedClient) -> Self {
        Self {
            secrets: client.secrets,
            reviewer: client.reviewer,
            namespace: client.namespace,
        }
    }

    /// Build a provider for `store`, performing the access review when the
    /// store impersonates another identity.
    pub async fn new_client(
        store: &GenericStore,
        kube: &dyn KubeConnector,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let start = Instant::now();
        let result = client_builder::build(store, kube, namespace, cancel)
            .await
            .map(Self::new);
        metrics::observe("new_client", start, &result);
        result
    }

    /// Namespace this provider reads from
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Fetch one secret, returning either one property or all keys as JSON
    #[instrument(
        skip(self, cancel, reference),
        fields(namespace = %self.namespace, key = %reference.key)
    )]
    pub async fn get_secret(
        &self,
        cancel: &CancellationToken,
        reference: &SecretReference,
    ) -> Result<Vec<u8>> {
        let start = Instant::now();
        let result = async {
            let data = self.fetch(cancel, &reference.key).await?;
            decoder::decode(&reference.key, &data, reference.property())
        }
        .await;
        metrics::observe("get_secret", start, &result);
        result
    }

    /// Fetch one secret's full data map
    #[instrument(
        skip(self, cancel, reference),
        fields(namespace = %self.namespace, key = %reference.key)
    )]
    pub async fn get_secret_map(
        &self,
        cancel: &CancellationToken,
        reference: &SecretReference,
    ) -> Result<BTreeMap<String, Vec<u8>>> {
        let start = Instant::now();
        let result = self
            .fetch(cancel, &reference.key)
            .await
            .map(|data| decoder::to_map(&data));
        metrics::observe("get_secret_map", start, &result);
        result
    }

    /// Fetch every matching secret, each encoded as a JSON object of its keys.
    ///
    /// Returns the complete map or an error, never a partial map.
    #[instrument(skip(self, cancel, find), fields(namespace = %self.namespace))]
    pub async fn get_all_secrets(
        &self,
        cancel: &CancellationToken,
        find: &FindSpec,
    ) -> Result<BTreeMap<String, Vec<u8>>> {
        let start = Instant::now();
        let result = self.find(cancel, find).await;
        metrics::observe("get_all_secrets", start, &result);
        result
    }

    /// Check that the current identity may still read secrets
    pub async fn validate(&self, cancel: &CancellationToken) -> Result<()> {
        let review = self
            .reviewer
            .can_get(&self.namespace, SECRETS_RESOURCE, cancel)
            .await;
        metrics::observe_access_review(&review);

        match review {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::Authorization {
                namespace: self.namespace.clone(),
                reason: "access review denied get on secrets".to_string(),
                source: None,
            }),
            Err(e) => Err(Error::Authorization {
                namespace: self.namespace.clone(),
                reason: "access review failed".to_string(),
                source: Some(Box::new(e)),
            }),
        }
    }

    async fn fetch(&self, cancel: &CancellationToken, key: &str) -> Result<SecretPayload> {
        if key.is_empty() {
            return Err(Error::InvalidSpec("secret key cannot be empty".to_string()));
        }

        let secret = self
            .secrets
            .get(key, cancel)
            .await
            .map_err(|e| Error::RemoteFetch {
                key: key.to_string(),
                namespace: self.namespace.clone(),
                source: Box::new(e),
            })?;

        Ok(secret.data.unwrap_or_default())
    }

    async fn find(
        &self,
        cancel: &CancellationToken,
        find: &FindSpec,
    ) -> Result<BTreeMap<String, Vec<u8>>> {
        let selector = find.label_selector();
        let listed = self
            .secrets
            .list(&selector, cancel)
            .await
            .map_err(|e| Error::RemoteFetch {
                key: describe(find),
                namespace: self.namespace.clone(),
                source: Box::new(e),
            })?;

        let mut result = BTreeMap::new();
        for secret in &listed {
            let name = secret.name_any();
            let labels = secret.labels();
            if !find.matches(&name, labels) {
                continue;
            }

            let empty = SecretPayload::new();
            let data = secret.data.as_ref().unwrap_or(&empty);
            let encoded = decoder::to_json(&name, data)?;
            result.insert(name, encoded);
        }

        debug!(
            selector = %selector,
            listed = listed.len(),
            matched = result.len(),
            "Collected matching secrets"
        );

        Ok(result)
    }
}

/// Human readable form of a find request for error messages
fn describe(find: &FindSpec) -> String {
    match find {
        FindSpec::ByName(pattern) => format!("name~{}", pattern.as_str()),
        FindSpec::ByTags(_) => format!("labels({})", find.label_selector()),
    }
}

impl std::fmt::Debug for ProviderKubernetes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderKubernetes")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
