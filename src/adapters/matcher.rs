//! Bulk lookup matching
//!
//! A [`FindSpec`] selects secrets either by a name pattern, evaluated here,
//! or by labels, evaluated by the API server through a label selector.

use regex::Regex;
use std::collections::BTreeMap;

use crate::crd::ExternalSecretFind;
use crate::{Error, Result};

const LABEL_NAME_MAX_LEN: usize = 63;
const LABEL_PREFIX_MAX_LEN: usize = 253;

lazy_static::lazy_static! {
    /// Label name and value syntax
    static ref LABEL_NAME: Regex =
        Regex::new(r"^[A-Za-z0-9]([-_.A-Za-z0-9]*[A-Za-z0-9])?$").unwrap();

    /// DNS subdomain allowed as a label key prefix
    static ref LABEL_PREFIX: Regex =
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap();
}

/// Check a label key: `[prefix/]name`
fn validate_label_key(key: &str) -> Result<()> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if prefix.len() > LABEL_PREFIX_MAX_LEN || !LABEL_PREFIX.is_match(prefix) {
            return Err(Error::InvalidSpec(format!("tag key '{}' has an invalid prefix", key)));
        }
    }

    if name.len() > LABEL_NAME_MAX_LEN || !LABEL_NAME.is_match(name) {
        return Err(Error::InvalidSpec(format!("tag key '{}' is not a valid label key", key)));
    }

    Ok(())
}

/// Check a label value; empty is allowed
fn validate_label_value(key: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }

    if value.len() > LABEL_NAME_MAX_LEN || !LABEL_NAME.is_match(value) {
        return Err(Error::InvalidSpec(format!(
            "tag '{}' value '{}' is not a valid label value",
            key, value
        )));
    }

    Ok(())
}

/// Compiled name pattern; must match the whole secret name
#[derive(Clone, Debug)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::InvalidSpec("name.regexp cannot be empty".to_string()));
        }

        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
            Error::InvalidSpec(format!("name.regexp '{}' is invalid: {}", pattern, e))
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Pattern as written by the user
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// Validated bulk lookup request
#[derive(Clone, Debug)]
pub enum FindSpec {
    /// Secrets whose name fully matches the pattern
    ByName(NamePattern),
    /// Secrets carrying all of these labels
    ByTags(BTreeMap<String, String>),
}

impl FindSpec {
    pub fn by_name(pattern: &str) -> Result<Self> {
        NamePattern::new(pattern).map(FindSpec::ByName)
    }

    pub fn by_tags(tags: BTreeMap<String, String>) -> Result<Self> {
        if tags.is_empty() {
            return Err(Error::InvalidSpec("tags cannot be empty".to_string()));
        }

        for (key, value) in &tags {
            validate_label_key(key)?;
            validate_label_value(key, value)?;
        }

        Ok(FindSpec::ByTags(tags))
    }

    /// Label selector to list with; empty means no server-side filter
    pub fn label_selector(&self) -> String {
        match self {
            FindSpec::ByName(_) => String::new(),
            FindSpec::ByTags(tags) => tags
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Whether a listed secret belongs in the result.
    ///
    /// Tag requests are filtered by the label selector, so every listed
    /// secret qualifies.
    pub fn matches(&self, name: &str, _labels: &BTreeMap<String, String>) -> bool {
        match self {
            FindSpec::ByName(pattern) => pattern.is_match(name),
            FindSpec::ByTags(_) => true,
        }
    }
}

impl TryFrom<ExternalSecretFind> for FindSpec {
    type Error = Error;

    fn try_from(find: ExternalSecretFind) -> Result<Self> {
        match (find.name, find.tags) {
            (Some(name), None) => FindSpec::by_name(&name.regexp),
            (None, Some(tags)) => FindSpec::by_tags(tags),
            (Some(_), Some(_)) => Err(Error::InvalidSpec(
                "only one of name or tags may be set".to_string(),
            )),
            (None, None) => Err(Error::InvalidSpec(
                "one of name or tags must be set".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::FindName;

    fn no_labels() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn name_pattern_requires_full_match() {
        let spec = FindSpec::by_name("other").unwrap();

        assert!(spec.matches("other", &no_labels()));
        assert!(!spec.matches("mysec", &no_labels()));
        assert!(!spec.matches("another", &no_labels()));
        assert!(!spec.matches("other-secret", &no_labels()));
    }

    #[test]
    fn name_pattern_supports_alternation() {
        let spec = FindSpec::by_name("db-.*|cache").unwrap();

        assert!(spec.matches("db-password", &no_labels()));
        assert!(spec.matches("cache", &no_labels()));
        assert!(!spec.matches("my-cache", &no_labels()));
    }

    #[test]
    fn empty_pattern_is_rejected() {
        assert!(matches!(FindSpec::by_name(""), Err(Error::InvalidSpec(_))));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(matches!(FindSpec::by_name("("), Err(Error::InvalidSpec(_))));
    }

    #[test]
    fn tags_render_sorted_selector() {
        let tags = BTreeMap::from([
            ("team".to_string(), "payments".to_string()),
            ("app".to_string(), "foobar".to_string()),
        ]);
        let spec = FindSpec::by_tags(tags).unwrap();

        assert_eq!(spec.label_selector(), "app=foobar,team=payments");
        assert!(spec.matches("anything", &no_labels()));
    }

    fn tags(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn tag_value_with_comma_is_rejected() {
        let result = FindSpec::by_tags(tags(&[("app", "foobar,team=payments")]));

        assert!(matches!(result, Err(Error::InvalidSpec(ref msg)) if msg.contains("app")));
    }

    #[test]
    fn tag_values_with_selector_operators_are_rejected() {
        for value in ["a=b", "!app", "in(a)", "a b", "-leading", "trailing."] {
            assert!(
                matches!(FindSpec::by_tags(tags(&[("app", value)])), Err(Error::InvalidSpec(_))),
                "value {:?} should be rejected",
                value
            );
        }
    }

    #[test]
    fn empty_tag_key_is_rejected() {
        assert!(matches!(
            FindSpec::by_tags(tags(&[("", "foobar")])),
            Err(Error::InvalidSpec(_))
        ));
    }

    #[test]
    fn malformed_tag_keys_are_rejected() {
        let long_name = "a".repeat(64);
        for key in ["app,team", "Example.com/app", "/app", "example.com/", long_name.as_str()] {
            assert!(
                matches!(FindSpec::by_tags(tags(&[(key, "x")])), Err(Error::InvalidSpec(_))),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[test]
    fn valid_label_syntax_is_accepted() {
        let spec = FindSpec::by_tags(tags(&[
            ("app.kubernetes.io/name", "payments-api"),
            ("tier", ""),
            ("Version_2", "v1.2.3"),
        ]))
        .unwrap();

        assert_eq!(
            spec.label_selector(),
            "Version_2=v1.2.3,app.kubernetes.io/name=payments-api,tier="
        );
    }

    #[test]
    fn name_pattern_lists_without_selector() {
        assert_eq!(FindSpec::by_name("x").unwrap().label_selector(), "");
    }

    #[test]
    fn wire_request_needs_exactly_one_variant() {
        let both = ExternalSecretFind {
            name: Some(FindName {
                regexp: "x".to_string(),
            }),
            tags: Some(BTreeMap::from([("a".to_string(), "b".to_string())])),
        };
        assert!(matches!(FindSpec::try_from(both), Err(Error::InvalidSpec(_))));

        assert!(matches!(
            FindSpec::try_from(ExternalSecretFind::default()),
            Err(Error::InvalidSpec(_))
        ));

        let empty_tags = ExternalSecretFind {
            name: None,
            tags: Some(BTreeMap::new()),
        };
        assert!(matches!(
            FindSpec::try_from(empty_tags),
            Err(Error::InvalidSpec(_))
        ));

        let by_name = ExternalSecretFind {
            name: Some(FindName {
                regexp: "other".to_string(),
            }),
            tags: None,
        };
        assert!(matches!(FindSpec::try_from(by_name), Ok(FindSpec::ByName(_))));
    }
}
