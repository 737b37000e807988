//! Integration tests for provider construction
//!
//! These tests verify namespace resolution, the trusted operator path and
//! the bearer token path with its access review.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use kubernetes_secret_provider::adapters::memory::{build_secret, InMemoryCluster};
use kubernetes_secret_provider::crd::{
    ClusterSecretStore, ClusterSecretStoreSpec, KubernetesAuth, KubernetesProvider,
    SecretKeySelector, SecretStore, SecretStoreProvider, SecretStoreSpec, TokenAuth,
};
use kubernetes_secret_provider::{Error, GenericStore, ProviderKubernetes, SecretReference};

// ============================================================================
// Test Helpers
// ============================================================================

fn token_auth(name: &str, namespace: Option<&str>, key: &str) -> KubernetesAuth {
    KubernetesAuth {
        token: Some(TokenAuth {
            bearer_token: SecretKeySelector {
                name: name.to_string(),
                namespace: namespace.map(str::to_string),
                key: key.to_string(),
            },
        }),
    }
}

fn cluster_store(kubernetes: Option<KubernetesProvider>) -> GenericStore {
    ClusterSecretStore {
        metadata: ObjectMeta {
            name: Some("cluster-store".to_string()),
            ..Default::default()
        },
        spec: ClusterSecretStoreSpec {
            provider: SecretStoreProvider { kubernetes },
        },
    }
    .into()
}

fn namespaced_store(namespace: Option<&str>, kubernetes: KubernetesProvider) -> GenericStore {
    SecretStore {
        metadata: ObjectMeta {
            name: Some("store".to_string()),
            namespace: namespace.map(str::to_string),
            ..Default::default()
        },
        spec: SecretStoreSpec {
            provider: SecretStoreProvider {
                kubernetes: Some(kubernetes),
            },
        },
    }
    .into()
}

fn impersonating(remote_namespace: Option<&str>, auth: KubernetesAuth) -> KubernetesProvider {
    KubernetesProvider {
        remote_namespace: remote_namespace.map(str::to_string),
        auth: Some(auth),
    }
}

fn token_secret(token: &str) -> k8s_openapi::api::core::v1::Secret {
    build_secret("foo", &[], &[("token", token.as_bytes())])
}

async fn new_client(
    store: &GenericStore,
    cluster: &InMemoryCluster,
    namespace: &str,
) -> Result<ProviderKubernetes, Error> {
    ProviderKubernetes::new_client(store, cluster, namespace, &CancellationToken::new()).await
}

// ============================================================================
// Store Validation
// ============================================================================

#[tokio::test]
async fn store_without_kubernetes_provider_is_invalid() {
    let cluster = InMemoryCluster::new();

    let err = assert_err!(new_client(&cluster_store(None), &cluster, "default").await);

    assert!(matches!(err, Error::InvalidStore(_)));
}

/// A cluster store with no remote namespace and no caller namespace has
/// nothing to scope reads to. Rather than returning a client that defers the
/// namespace to each request (the "referent" auth behaviour), construction
/// fails.
#[tokio::test]
async fn empty_effective_namespace_is_invalid() {
    let cluster = InMemoryCluster::new();
    let store = cluster_store(Some(KubernetesProvider::default()));

    let err = assert_err!(new_client(&store, &cluster, "").await);

    assert!(matches!(err, Error::InvalidStore(_)));
}

/// Same as above for a store with bearer token auth: no token lookup or
/// access review happens before the missing namespace is reported.
#[tokio::test]
async fn empty_effective_namespace_with_token_auth_is_invalid() {
    let cluster = InMemoryCluster::new()
        .with_secret("default", token_secret("1234"))
        .grant("1234", "default");
    let store = cluster_store(Some(impersonating(
        None,
        token_auth("foo", Some("default"), "token"),
    )));

    let err = assert_err!(new_client(&store, &cluster, "").await);

    assert!(matches!(err, Error::InvalidStore(_)));
    assert!(cluster.impersonations().is_empty());
}

// ============================================================================
// Operator Identity
// ============================================================================

#[tokio::test]
async fn operator_identity_uses_caller_namespace_without_review() {
    let cluster = InMemoryCluster::new()
        .with_secret("apps", build_secret("mysec", &[], &[("token", b"foobar")]));
    let store = cluster_store(Some(KubernetesProvider::default()));

    let provider = assert_ok!(new_client(&store, &cluster, "apps").await);

    assert_eq!(provider.namespace(), "apps");
    assert!(cluster.impersonations().is_empty());
    let value = assert_ok!(
        provider
            .get_secret(
                &CancellationToken::new(),
                &SecretReference::new("mysec").with_property("token")
            )
            .await
    );
    assert_eq!(value, b"foobar");
}

#[tokio::test]
async fn remote_namespace_overrides_caller_namespace() {
    let cluster = InMemoryCluster::new();
    let store = cluster_store(Some(KubernetesProvider {
        remote_namespace: Some("remote".to_string()),
        auth: None,
    }));

    let provider = assert_ok!(new_client(&store, &cluster, "apps").await);

    assert_eq!(provider.namespace(), "remote");
}

// ============================================================================
// Bearer Token Identity
// ============================================================================

#[tokio::test]
async fn missing_token_secret_fails_with_authorization() {
    let cluster = InMemoryCluster::new();
    let store = cluster_store(Some(impersonating(
        Some("remote"),
        token_auth("foo", Some("default"), "token"),
    )));

    let err = assert_err!(new_client(&store, &cluster, "foobarothernamespace").await);

    assert!(matches!(err, Error::Authorization { .. }));
    assert!(cluster.impersonations().is_empty());
}

#[tokio::test]
async fn denied_access_review_fails_with_authorization() {
    let cluster = InMemoryCluster::new()
        .with_secret("default", token_secret("1234"))
        .identity("1234");
    let store = cluster_store(Some(impersonating(
        Some("remote"),
        token_auth("foo", Some("default"), "token"),
    )));

    let err = assert_err!(new_client(&store, &cluster, "foobarothernamespace").await);

    match err {
        Error::Authorization { namespace, source, .. } => {
            assert_eq!(namespace, "remote");
            assert!(source.is_none());
        }
        other => panic!("expected Authorization, got {:?}", other),
    }
}

#[tokio::test]
async fn failing_access_review_fails_with_authorization() {
    let cluster = InMemoryCluster::new().with_secret("default", token_secret("not-a-valid-token"));
    let store = cluster_store(Some(impersonating(
        Some("remote"),
        token_auth("foo", Some("default"), "token"),
    )));

    let err = assert_err!(new_client(&store, &cluster, "foobarothernamespace").await);

    match err {
        Error::Authorization { source, .. } => assert!(source.is_some()),
        other => panic!("expected Authorization, got {:?}", other),
    }
}

#[tokio::test]
async fn allowed_token_returns_client_bound_to_token_identity() {
    let cluster = InMemoryCluster::new()
        .with_secret("default", token_secret("1234"))
        .with_secret("remote", build_secret("mysec", &[], &[("token", b"remote-value")]))
        .grant("1234", "remote");
    let store = cluster_store(Some(impersonating(
        Some("remote"),
        token_auth("foo", Some("default"), "token"),
    )));

    let provider = assert_ok!(new_client(&store, &cluster, "foobarothernamespace").await);

    assert_eq!(provider.namespace(), "remote");
    assert_eq!(
        cluster.impersonations(),
        vec![("1234".to_string(), "remote".to_string())]
    );
    let value = assert_ok!(
        provider
            .get_secret(
                &CancellationToken::new(),
                &SecretReference::new("mysec").with_property("token")
            )
            .await
    );
    assert_eq!(value, b"remote-value");
}

#[tokio::test]
async fn cluster_store_token_defaults_to_caller_namespace() {
    let cluster = InMemoryCluster::new()
        .with_secret("apps", token_secret("5678"))
        .grant("5678", "apps");
    let store = cluster_store(Some(impersonating(None, token_auth("foo", None, "token"))));

    let provider = assert_ok!(new_client(&store, &cluster, "apps").await);

    assert_eq!(provider.namespace(), "apps");
    assert_eq!(
        cluster.impersonations(),
        vec![("5678".to_string(), "apps".to_string())]
    );
}

#[tokio::test]
async fn namespaced_store_reads_token_from_own_namespace() {
    let cluster = InMemoryCluster::new()
        .with_secret("team-a", token_secret("abcd"))
        .grant("abcd", "team-a");
    let store = namespaced_store(
        Some("team-a"),
        impersonating(None, token_auth("foo", None, "token")),
    );

    let provider = assert_ok!(new_client(&store, &cluster, "team-a").await);

    assert_eq!(provider.namespace(), "team-a");
}

#[tokio::test]
async fn namespaced_store_cannot_reference_foreign_token_namespace() {
    let cluster = InMemoryCluster::new().with_secret("kube-system", token_secret("abcd"));
    let store = namespaced_store(
        Some("team-a"),
        impersonating(None, token_auth("foo", Some("kube-system"), "token")),
    );

    let err = assert_err!(new_client(&store, &cluster, "team-a").await);

    assert!(matches!(err, Error::InvalidStore(_)));
}

#[tokio::test]
async fn namespaced_store_without_metadata_namespace_reads_token_from_caller_namespace() {
    let cluster = InMemoryCluster::new()
        .with_secret("team-a", token_secret("abcd"))
        .grant("abcd", "team-a");
    let store = namespaced_store(
        None,
        impersonating(None, token_auth("foo", Some("team-a"), "token")),
    );

    let provider = assert_ok!(new_client(&store, &cluster, "team-a").await);

    assert_eq!(provider.namespace(), "team-a");
    assert_eq!(
        cluster.impersonations(),
        vec![("abcd".to_string(), "team-a".to_string())]
    );
}

#[tokio::test]
async fn namespaced_store_metadata_namespace_does_not_widen_token_access() {
    let cluster = InMemoryCluster::new()
        .with_secret("team-a", token_secret("abcd"))
        .with_secret("team-b", token_secret("efgh"))
        .grant("abcd", "team-b");
    let store = namespaced_store(
        Some("team-a"),
        impersonating(None, token_auth("foo", Some("team-a"), "token")),
    );

    let err = assert_err!(new_client(&store, &cluster, "team-b").await);

    assert!(matches!(err, Error::InvalidStore(_)));
    assert!(cluster.impersonations().is_empty());
}

#[tokio::test]
async fn token_key_missing_from_secret_fails_with_authorization() {
    let cluster = InMemoryCluster::new()
        .with_secret("default", token_secret("1234"))
        .grant("1234", "default");
    let store = cluster_store(Some(impersonating(None, token_auth("foo", None, "other-key"))));

    let err = assert_err!(new_client(&store, &cluster, "default").await);

    match err {
        Error::Authorization { source: Some(source), .. } => {
            assert!(matches!(*source, Error::NotFound { .. }))
        }
        other => panic!("expected Authorization with cause, got {:?}", other),
    }
}
