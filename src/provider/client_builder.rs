//! Construction of namespace-scoped clients for a store

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::crd::GenericStore;
use crate::metrics;
use crate::provider::validation::{effective_namespace, token_namespace, validate_store};
use crate::provider::{KubeConnector, ScopedClient, SECRETS_RESOURCE};
use crate::{Error, Result};

/// Build the client a provider for `store` reads secrets with.
///
/// Without bearer token auth the operator's own client is returned, scoped
/// to the effective namespace. With it, a client acting as the token's
/// identity is built and must pass an access review for `get secrets`
/// before it is returned.
#[instrument(skip(store, kube, cancel), fields(store = %store.name(), kind = store.kind()))]
pub async fn build(
    store: &GenericStore,
    kube: &dyn KubeConnector,
    default_namespace: &str,
    cancel: &CancellationToken,
) -> Result<ScopedClient> {
    let provider = validate_store(store, default_namespace)?;
    let namespace = effective_namespace(provider, default_namespace)?;

    let Some(selector) = provider.bearer_token() else {
        debug!(namespace = %namespace, "Using operator identity");
        return Ok(ScopedClient {
            secrets: kube.secrets(&namespace),
            reviewer: kube.access_reviewer(),
            namespace,
        });
    };

    let token_ns = token_namespace(store, default_namespace);
    debug!(
        namespace = %namespace,
        token_secret = %selector.name,
        token_namespace = %token_ns,
        "Resolving bearer token"
    );

    let token = kube
        .resolve_bearer_token(selector, &token_ns, cancel)
        .await
        .map_err(|e| Error::Authorization {
            namespace: namespace.clone(),
            reason: format!(
                "could not read bearer token from secret {}/{} key '{}'",
                token_ns, selector.name, selector.key
            ),
            source: Some(Box::new(e)),
        })?;

    let client = kube.impersonate(&token, &namespace)?;

    let review = client
        .reviewer
        .can_get(&namespace, SECRETS_RESOURCE, cancel)
        .await;
    metrics::observe_access_review(&review);

    match review {
        Ok(true) => {
            info!(namespace = %namespace, "Access review passed for bearer token identity");
            Ok(client)
        }
        Ok(false) => {
            warn!(namespace = %namespace, "Access review denied get on secrets");
            Err(Error::Authorization {
                namespace,
                reason: "access review denied get on secrets".to_string(),
                source: None,
            })
        }
        Err(e) => {
            warn!(namespace = %namespace, error = %e, "Access review failed");
            Err(Error::Authorization {
                namespace,
                reason: "access review failed".to_string(),
                source: Some(Box::new(e)),
            })
        }
    }
}
