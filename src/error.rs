//! Error types for the Kubernetes secret provider

use thiserror::Error;

/// Result type for the provider
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the provider
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Unsupported or malformed store definition
    #[error("Invalid store: {0}")]
    InvalidStore(String),

    /// Malformed secret reference or find request
    #[error("Invalid find specification: {0}")]
    InvalidSpec(String),

    /// The impersonated identity may not read secrets, or the review failed
    #[error("Not authorized to get secrets in namespace {namespace}: {reason}")]
    Authorization {
        namespace: String,
        reason: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// Fetching or listing secrets from the API failed
    #[error("Failed to fetch secret {key} from namespace {namespace}: {source}")]
    RemoteFetch {
        key: String,
        namespace: String,
        #[source]
        source: Box<Error>,
    },

    /// Requested property is absent from the secret data
    #[error("Key '{key}' not found in secret {secret}")]
    NotFound { secret: String, key: String },

    /// Secret payload could not be encoded as JSON
    #[error("Failed to serialize secret {secret}: {source}")]
    Serialization {
        secret: String,
        #[source]
        source: serde_json::Error,
    },

    /// Secret object does not exist
    #[error("Secret {name} not found in namespace {namespace}")]
    SecretNotFound { name: String, namespace: String },

    /// Secret value is not usable as text
    #[error("Invalid UTF-8 in secret {name} key '{key}'")]
    InvalidSecretData { name: String, key: String },

    /// Call was cancelled by the caller
    #[error("Request cancelled")]
    Cancelled,
}

impl Error {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Kube(_) => "kube",
            Error::InvalidStore(_) => "invalid_store",
            Error::InvalidSpec(_) => "invalid_spec",
            Error::Authorization { .. } => "authorization",
            Error::RemoteFetch { .. } => "remote_fetch",
            Error::NotFound { .. } => "not_found",
            Error::Serialization { .. } => "serialization",
            Error::SecretNotFound { .. } => "secret_not_found",
            Error::InvalidSecretData { .. } => "invalid_secret_data",
            Error::Cancelled => "cancelled",
        }
    }

    /// Whether retrying the same request later may succeed.
    ///
    /// Transport failures are transient; configuration, authorization and
    /// data mismatches are not. Authorization may be retried by operator
    /// policy, but never by this crate.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RemoteFetch { .. } | Error::Kube(_))
    }
}
