//! Bulk merge of a flat item -> text mapping into one locale and group.
//!
//! Each item commits on its own. A storage fault on one item is recorded in
//! the report and the merge moves on; items already written stay written.
//! Callers that need all-or-nothing must check [`MergeReport::ensure_complete`]
//! and re-run the failed items.

use super::{propagate, TranslationStore};
use crate::entry::{EntryId, NewEntry};
use crate::error::{Result, StoreError};
use crate::key::{normalize_namespace, TranslationKey, DEFAULT_NAMESPACE};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Lines of one translation source (one locale, one group)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub locale: String,
    pub namespace: String,
    pub group: String,
    /// Item path (may be dotted) -> text
    pub lines: BTreeMap<String, String>,
}

impl MergeRequest {
    pub fn new(
        locale: impl Into<String>,
        group: impl Into<String>,
        lines: BTreeMap<String, String>,
    ) -> Self {
        Self {
            locale: locale.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            group: group.into(),
            lines,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// What happened to one merged item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// No entry existed; one was inserted
    Created { id: EntryId },
    /// Existing entry's text was overwritten; `flagged` siblings now need review
    Updated { id: EntryId, flagged: u64 },
    /// Existing entry is locked; its text was left alone
    SkippedLocked { id: EntryId },
    /// Nothing was written for this item; `retryable` marks transient storage faults
    Failed { reason: String, retryable: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedItem {
    pub key: TranslationKey,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// Per-item account of a merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub locale: String,
    pub namespace: String,
    pub group: String,
    pub items: Vec<MergedItem>,
}

impl MergeReport {
    fn new(request: &MergeRequest) -> Self {
        Self {
            locale: request.locale.clone(),
            namespace: normalize_namespace(&request.namespace).to_string(),
            group: request.group.clone(),
            items: Vec::with_capacity(request.lines.len()),
        }
    }

    /// Outcome recorded for an item path, if it was part of the merge
    pub fn outcome(&self, item: &str) -> Option<&ItemOutcome> {
        self.items
            .iter()
            .find(|merged| merged.key.item == item)
            .map(|merged| &merged.outcome)
    }

    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Created { .. }))
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Updated { .. }))
    }

    pub fn skipped_locked(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::SkippedLocked { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed { .. }))
    }

    /// Keys of items that were not applied because of an error
    pub fn failed_keys(&self) -> Vec<&TranslationKey> {
        self.items
            .iter()
            .filter(|merged| matches!(merged.outcome, ItemOutcome::Failed { .. }))
            .map(|merged| &merged.key)
            .collect()
    }

    /// Item paths whose failure was transient, with the text that was not applied
    pub fn retryable_lines(&self, request: &MergeRequest) -> BTreeMap<String, String> {
        self.items
            .iter()
            .filter(|m| matches!(m.outcome, ItemOutcome::Failed { retryable: true, .. }))
            .filter_map(|m| {
                request
                    .lines
                    .get(&m.key.item)
                    .map(|text| (m.key.item.clone(), text.clone()))
            })
            .collect()
    }

    /// Every failure is transient, so re-running the failed items may succeed
    pub fn is_retryable(&self) -> bool {
        self.failed() > 0
            && self
                .items
                .iter()
                .all(|m| !matches!(m.outcome, ItemOutcome::Failed { retryable: false, .. }))
    }

    /// Locked skips are a designed no-op, not a failure
    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }

    /// Turn a report with failures into [`StoreError::PartialMerge`]
    pub fn ensure_complete(self) -> Result<Self> {
        let failed = self.failed();
        if failed == 0 {
            return Ok(self);
        }
        Err(StoreError::PartialMerge {
            locale: self.locale.clone(),
            group: self.group.clone(),
            failed,
            report: Box::new(self),
        })
    }

    fn count(&self, predicate: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|m| predicate(&m.outcome)).count()
    }
}

impl TranslationStore {
    /// Merge a flat mapping into the store.
    ///
    /// For each item: an unlocked existing entry gets the new text (and, in
    /// the default locale, its siblings get flagged); a locked entry is
    /// skipped, and since its text did not change nothing is flagged; a
    /// missing entry is created.
    pub async fn merge(&self, request: MergeRequest) -> Result<MergeReport> {
        let mut report = MergeReport::new(&request);
        let is_default = self.is_default_locale(&request.locale);

        for (item, text) in &request.lines {
            let key = TranslationKey::new(&request.namespace, &request.group, item);
            let outcome = match self.merge_line(&request.locale, &key, text, is_default).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Merge of {} into '{}' failed: {}", key, request.locale, e);
                    self.metrics.record_merge_failure();
                    ItemOutcome::Failed {
                        reason: e.to_string(),
                        retryable: e.is_retryable(),
                    }
                }
            };
            report.items.push(MergedItem { key, outcome });
        }

        info!(
            "Merged {} line(s) into {}/{}: {} created, {} updated, {} skipped (locked), {} failed",
            report.items.len(),
            report.locale,
            report.group,
            report.created(),
            report.updated(),
            report.skipped_locked(),
            report.failed()
        );
        Ok(report)
    }

    async fn merge_line(
        &self,
        locale: &str,
        key: &TranslationKey,
        text: &str,
        is_default: bool,
    ) -> Result<ItemOutcome> {
        let Some(existing) = self.find_key_optional(key, locale).await? else {
            let id = self.create(NewEntry::for_key(locale, key, text)).await?;
            return Ok(ItemOutcome::Created { id });
        };

        if existing.is_locked() {
            self.metrics.record_merge_skip();
            return Ok(ItemOutcome::SkippedLocked { id: existing.id });
        }

        let mut tx = self.pool.begin().await?;

        // `locked = 0` guards against a lock taken since the lookup
        let result = sqlx::query(
            "UPDATE translations SET text = ?, updated_at = ? WHERE id = ? AND locked = 0",
        )
        .bind(text)
        .bind(Utc::now())
        .bind(existing.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return match self.find_optional(existing.id).await? {
                Some(current) if current.is_locked() => {
                    self.metrics.record_merge_skip();
                    Ok(ItemOutcome::SkippedLocked { id: current.id })
                }
                _ => Err(StoreError::entry_not_found(existing.id)),
            };
        }

        let flagged = if is_default {
            propagate::flag_family(&mut *tx, &self.default_locale, key).await?
        } else {
            0
        };

        tx.commit().await?;

        self.metrics.record_updated();
        if is_default {
            self.metrics.record_propagation(flagged);
        }
        Ok(ItemOutcome::Updated {
            id: existing.id,
            flagged,
        })
    }
}
