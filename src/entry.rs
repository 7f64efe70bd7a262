//! Translation entry model.
//!
//! An entry is one locale's text for one key. The two lifecycle flags the
//! table stores as integers are exposed as small enums so that call sites
//! read as intent rather than as booleans.

use crate::key::{TranslationKey, DEFAULT_NAMESPACE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row id of a stored entry
pub type EntryId = i64;

/// Whether an entry's text is known to be current relative to the
/// default-locale source text of its family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    #[default]
    Stable,
    /// The default-locale text changed after this entry's text was last set
    NeedsReview,
}

impl ReviewState {
    pub fn from_unstable(unstable: bool) -> Self {
        if unstable {
            Self::NeedsReview
        } else {
            Self::Stable
        }
    }

    pub fn is_unstable(self) -> bool {
        self == Self::NeedsReview
    }
}

/// Whether automated writers (bulk merge, plain update) may overwrite an
/// entry's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditPolicy {
    #[default]
    Editable,
    Locked,
}

impl EditPolicy {
    pub fn from_locked(locked: bool) -> Self {
        if locked {
            Self::Locked
        } else {
            Self::Editable
        }
    }

    pub fn is_locked(self) -> bool {
        self == Self::Locked
    }
}

/// A stored translation entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub locale: String,
    pub namespace: String,
    pub group: String,
    pub item: String,
    pub text: String,
    pub review: ReviewState,
    pub policy: EditPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entry {
    /// The locale-independent key of this entry's family
    pub fn key(&self) -> TranslationKey {
        TranslationKey::new(&self.namespace, &self.group, &self.item)
    }

    /// External code for this entry's key (`namespace::group.item`)
    pub fn code(&self) -> String {
        self.key().render()
    }

    pub fn is_locked(&self) -> bool {
        self.policy.is_locked()
    }

    pub fn is_unstable(&self) -> bool {
        self.review.is_unstable()
    }

    /// False for the one illegal flag combination: a default-locale entry
    /// marked as needing review.
    pub fn is_consistent(&self, default_locale: &str) -> bool {
        !(self.locale == default_locale && self.is_unstable())
    }
}

/// Candidate for insertion. Fields are taken as-is; the validator decides
/// what is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub locale: String,
    #[serde(default)]
    pub namespace: String,
    pub group: String,
    pub item: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub review: ReviewState,
    #[serde(default)]
    pub policy: EditPolicy,
}

impl NewEntry {
    /// Editable, stable entry in the default namespace
    pub fn new(
        locale: impl Into<String>,
        group: impl Into<String>,
        item: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            locale: locale.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            group: group.into(),
            item: item.into(),
            text: text.into(),
            review: ReviewState::Stable,
            policy: EditPolicy::Editable,
        }
    }

    /// Entry for a parsed key
    pub fn for_key(locale: impl Into<String>, key: &TranslationKey, text: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            namespace: key.namespace.clone(),
            group: key.group.clone(),
            item: key.item.clone(),
            text: text.into(),
            review: ReviewState::Stable,
            policy: EditPolicy::Editable,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn locked(mut self) -> Self {
        self.policy = EditPolicy::Locked;
        self
    }
}

/// Row shape of the `translations` table
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub id: i64,
    pub locale: String,
    pub namespace: String,
    pub group: String,
    pub item: String,
    pub text: String,
    pub unstable: bool,
    pub locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EntryRow> for Entry {
    fn from(row: EntryRow) -> Self {
        Self {
            id: row.id,
            locale: row.locale,
            namespace: row.namespace,
            group: row.group,
            item: row.item,
            text: row.text,
            review: ReviewState::from_unstable(row.unstable),
            policy: EditPolicy::from_locked(row.locked),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
