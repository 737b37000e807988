//! Kubernetes Secret provider
//!
//! Reads credential material stored as Kubernetes Secrets on behalf of a
//! secret-synchronization operator, optionally as an impersonated identity
//! that must pass an access review first.

pub mod adapters;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod provider;

pub use adapters::matcher::FindSpec;
pub use crd::{GenericStore, SecretReference};
pub use error::{Error, Result};
pub use provider::ProviderKubernetes;
