//! Entry validation.
//!
//! This module checks a candidate entry against a rule set before any write is
//! applied. Rules are a `{field: constraint}` table and the validator is a pure
//! function. The one rule that needs storage, uniqueness, is answered by the
//! caller passing in the id of the row that currently holds the candidate's key.

use crate::entry::{Entry, EntryId, NewEntry};
use crate::key::normalize_namespace;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

/// Entry fields a rule can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Locale,
    Namespace,
    Group,
    Item,
    Text,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Locale => "locale",
            Field::Namespace => "namespace",
            Field::Group => "group",
            Field::Item => "item",
            Field::Text => "text",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A constraint on a single field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Field must be non-empty
    Required,
    /// Field must look like a locale tag (`en`, `pt_BR`, `zh-Hant`)
    LocaleTag,
    /// No other row may hold the candidate's (locale, namespace, group, item).
    /// Answered from the `key_holder` passed to [`validate`], whatever field
    /// the rule is attached to.
    UniqueKey,
}

/// Field rules applied to a candidate. Fields without an entry are unconstrained.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<(Field, Constraint)>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, field: Field, constraint: Constraint) -> Self {
        self.rules.push((field, constraint));
        self
    }

    /// Rules for translation entries.
    ///
    /// Locale, group and item are required; the four-column key is unique.
    /// Namespace falls back to `*` and text may be empty.
    pub fn entries() -> Self {
        Self::new()
            .rule(Field::Locale, Constraint::Required)
            .rule(Field::Group, Constraint::Required)
            .rule(Field::Item, Constraint::Required)
            .rule(Field::Locale, Constraint::UniqueKey)
    }

    /// Additionally require locales to be shaped like a locale tag
    pub fn with_locale_tags(self) -> Self {
        self.rule(Field::Locale, Constraint::LocaleTag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Field, Constraint)> {
        self.rules.iter()
    }
}

/// A single failed rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: Field,
    pub message: String,
}

impl FieldError {
    pub fn new(field: Field, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Every rule that failed for one candidate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: Field, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Check whether any error was recorded against a field
    pub fn has(&self, field: Field) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// The error reported when the four-column key is already taken
    pub fn duplicate_key() -> Self {
        let mut errors = Self::new();
        errors.push(Field::Locale, duplicate_message());
        errors
    }

    pub(crate) fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

fn duplicate_message() -> &'static str {
    "an entry for this locale, namespace, group and item already exists"
}

/// Field values of a candidate, borrowed from either a new or a stored entry
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub id: Option<EntryId>,
    pub locale: &'a str,
    pub namespace: &'a str,
    pub group: &'a str,
    pub item: &'a str,
    pub text: &'a str,
}

impl<'a> Candidate<'a> {
    fn value(&self, field: Field) -> &'a str {
        match field {
            Field::Locale => self.locale,
            Field::Namespace => normalize_namespace(self.namespace),
            Field::Group => self.group,
            Field::Item => self.item,
            Field::Text => self.text,
        }
    }
}

impl<'a> From<&'a NewEntry> for Candidate<'a> {
    fn from(entry: &'a NewEntry) -> Self {
        Self {
            id: None,
            locale: &entry.locale,
            namespace: &entry.namespace,
            group: &entry.group,
            item: &entry.item,
            text: &entry.text,
        }
    }
}

impl<'a> From<&'a Entry> for Candidate<'a> {
    fn from(entry: &'a Entry) -> Self {
        Self {
            id: Some(entry.id),
            locale: &entry.locale,
            namespace: &entry.namespace,
            group: &entry.group,
            item: &entry.item,
            text: &entry.text,
        }
    }
}

static LOCALE_TAG_REGEX: OnceLock<Regex> = OnceLock::new();

fn is_locale_tag(value: &str) -> bool {
    let regex = LOCALE_TAG_REGEX
        .get_or_init(|| Regex::new(r"^[A-Za-z]{2,8}([_-][A-Za-z0-9]{1,8})*$").unwrap());
    regex.is_match(value)
}

/// Validate a candidate against a rule set.
///
/// `key_holder` is the id of the row that currently owns the candidate's
/// (locale, namespace, group, item), if any. A row never conflicts with
/// itself, so updates that keep their key pass.
///
/// All failures are collected rather than stopping at the first.
pub fn validate(
    candidate: Candidate<'_>,
    rules: &RuleSet,
    key_holder: Option<EntryId>,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    for (field, constraint) in rules.iter() {
        let value = candidate.value(*field);
        match constraint {
            Constraint::Required => {
                if value.is_empty() {
                    errors.push(*field, format!("the {} field is required", field));
                }
            }
            Constraint::LocaleTag => {
                // An empty value is the Required rule's business
                if !value.is_empty() && !is_locale_tag(value) {
                    errors.push(*field, format!("'{}' is not a valid locale tag", value));
                }
            }
            Constraint::UniqueKey => {
                let conflicting = key_holder.is_some_and(|holder| Some(holder) != candidate.id);
                if conflicting {
                    errors.push(*field, duplicate_message());
                }
            }
        }
    }

    errors.into_result()
}
