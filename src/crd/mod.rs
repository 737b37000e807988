//! Store definitions and request types consumed by the provider

mod external_secret;
mod secret_store;

pub use external_secret::*;
pub use secret_store::*;
