//! Adapters between Secret objects, request types and the Kubernetes API

pub mod decoder;
pub mod matcher;
pub mod memory;
pub mod secrets;
