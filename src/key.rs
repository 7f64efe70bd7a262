//! Key codec: the external `namespace::group.item` code format.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Namespace value meaning "no namespace"
pub const DEFAULT_NAMESPACE: &str = "*";

/// Separates the namespace from the rest of a code
pub const NAMESPACE_SEPARATOR: &str = "::";

/// Separates the group from the item path
pub const PATH_SEPARATOR: char = '.';

/// Locale-independent identity of a translation family.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TranslationKey {
    pub namespace: String,
    pub group: String,
    pub item: String,
}

impl TranslationKey {
    /// Build a key, substituting the default namespace for an empty one
    pub fn new(namespace: &str, group: &str, item: &str) -> Self {
        Self {
            namespace: normalize_namespace(namespace).to_string(),
            group: group.to_string(),
            item: item.to_string(),
        }
    }

    /// Parse a code such as `messages::validation.required`.
    ///
    /// Splits on the first `::`; a missing or empty namespace becomes `*`.
    /// The remainder splits on the first `.`: group before it, the (possibly
    /// dotted) item after it. Both must be non-empty.
    pub fn parse(code: &str) -> Result<Self> {
        let (namespace, path) = match code.split_once(NAMESPACE_SEPARATOR) {
            Some((namespace, path)) => (normalize_namespace(namespace), path),
            None => (DEFAULT_NAMESPACE, code),
        };

        let (group, item) = path
            .split_once(PATH_SEPARATOR)
            .ok_or_else(|| StoreError::MalformedCode(code.to_string()))?;

        if group.is_empty() || item.is_empty() {
            return Err(StoreError::MalformedCode(code.to_string()));
        }

        Ok(Self {
            namespace: namespace.to_string(),
            group: group.to_string(),
            item: item.to_string(),
        })
    }

    /// Render back to code form. The default namespace has no prefix.
    pub fn render(&self) -> String {
        render(&self.namespace, &self.group, &self.item)
    }

    pub fn has_default_namespace(&self) -> bool {
        self.namespace == DEFAULT_NAMESPACE
    }
}

/// Render a code from its parts
pub fn render(namespace: &str, group: &str, item: &str) -> String {
    if normalize_namespace(namespace) == DEFAULT_NAMESPACE {
        format!("{}{}{}", group, PATH_SEPARATOR, item)
    } else {
        format!(
            "{}{}{}{}{}",
            namespace, NAMESPACE_SEPARATOR, group, PATH_SEPARATOR, item
        )
    }
}

/// Empty namespace means the default namespace
pub fn normalize_namespace(namespace: &str) -> &str {
    if namespace.is_empty() {
        DEFAULT_NAMESPACE
    } else {
        namespace
    }
}

impl fmt::Display for TranslationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl FromStr for TranslationKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ==================== parse Tests ====================

    #[test]
    fn test_parse_with_namespace() {
        let key = TranslationKey::parse("messages::validation.required").expect("parse");
        assert_eq!(key.namespace, "messages");
        assert_eq!(key.group, "validation");
        assert_eq!(key.item, "required");
    }

    #[test]
    fn test_parse_without_namespace_defaults() {
        let key = TranslationKey::parse("messages.greeting").expect("parse");
        assert_eq!(key.namespace, "*");
        assert_eq!(key.group, "messages");
        assert_eq!(key.item, "greeting");
    }

    #[test]
    fn test_parse_dotted_item_keeps_remainder() {
        let key = TranslationKey::parse("pkg::auth.messages.success").expect("parse");
        assert_eq!(key.group, "auth");
        assert_eq!(key.item, "messages.success");
    }

    #[test]
    fn test_parse_empty_namespace_prefix() {
        let key = TranslationKey::parse("::auth.failed").expect("parse");
        assert!(key.has_default_namespace());
    }

    #[test]
    fn test_parse_splits_on_first_namespace_separator() {
        let key = TranslationKey::parse("a::b.c::d").expect("parse");
        assert_eq!(key.namespace, "a");
        assert_eq!(key.group, "b");
        assert_eq!(key.item, "c::d");
    }

    #[test]
    fn test_parse_malformed() {
        for code in ["", "group", "ns::group", ".item", "group.", "ns::.item", "ns::"] {
            let err = TranslationKey::parse(code).unwrap_err();
            assert!(
                matches!(err, StoreError::MalformedCode(ref c) if c == code),
                "expected MalformedCode for {:?}, got {:?}",
                code,
                err
            );
        }
    }

    #[test]
    fn test_from_str() {
        let key: TranslationKey = "ns::group.item".parse().expect("parse");
        assert_eq!(key, TranslationKey::new("ns", "group", "item"));
    }

    // ==================== render Tests ====================

    #[test]
    fn test_render_default_namespace_has_no_prefix() {
        assert_eq!(render("*", "messages", "greeting"), "messages.greeting");
        assert_eq!(render("", "messages", "greeting"), "messages.greeting");
    }

    #[test]
    fn test_render_with_namespace() {
        let key = TranslationKey::new("messages", "validation", "required");
        assert_eq!(key.to_string(), "messages::validation.required");
    }

    // ==================== Property Tests ====================

    proptest! {
        #[test]
        fn prop_render_parse_round_trip(
            namespace in "[a-z][a-z0-9_-]{0,8}",
            group in "[a-z][a-z0-9_-]{0,8}",
            item in "[a-z0-9_][a-z0-9_.-]{0,16}",
        ) {
            let key = TranslationKey::new(&namespace, &group, &item);
            let parsed = TranslationKey::parse(&key.render()).expect("round trip parse");
            prop_assert_eq!(parsed, key);
        }

        #[test]
        fn prop_default_namespace_round_trip(
            group in "[a-z][a-z0-9_]{0,8}",
            item in "[a-z][a-z0-9_.]{0,16}",
        ) {
            let key = TranslationKey::new("*", &group, &item);
            prop_assert_eq!(TranslationKey::parse(&key.render()).expect("parse"), key);
        }
    }
}
