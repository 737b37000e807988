//! Secret data decoding
//!
//! Turns the raw data of a Secret into either one property's bytes or a JSON
//! object of every key.

use k8s_openapi::ByteString;
use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::{Error, Result};

/// Raw key/value data of a Secret
pub type SecretPayload = BTreeMap<String, ByteString>;

/// Decode `payload` of the secret named `secret`.
///
/// With a property, returns that key's bytes unmodified. Without one (or with
/// an empty one), returns the whole payload as a JSON object of strings.
pub fn decode(secret: &str, payload: &SecretPayload, property: Option<&str>) -> Result<Vec<u8>> {
    match property.filter(|p| !p.is_empty()) {
        Some(key) => payload
            .get(key)
            .map(|value| value.0.clone())
            .ok_or_else(|| Error::NotFound {
                secret: secret.to_string(),
                key: key.to_string(),
            }),
        None => to_json(secret, payload),
    }
}

/// Serialize the whole payload as `{"key":"value",...}`.
///
/// Values are embedded as string content; invalid UTF-8 sequences are
/// replaced rather than re-encoded.
pub fn to_json(secret: &str, payload: &SecretPayload) -> Result<Vec<u8>> {
    let object: BTreeMap<&str, Cow<'_, str>> = payload
        .iter()
        .map(|(key, value)| (key.as_str(), String::from_utf8_lossy(&value.0)))
        .collect();

    serde_json::to_vec(&object).map_err(|source| Error::Serialization {
        secret: secret.to_string(),
        source,
    })
}

/// Copy the payload into plain byte vectors
pub fn to_map(payload: &SecretPayload) -> BTreeMap<String, Vec<u8>> {
    payload
        .iter()
        .map(|(key, value)| (key.clone(), value.0.clone()))
        .collect()
}
