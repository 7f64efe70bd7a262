//! Consistency propagation for default-locale writes and deletes.
//!
//! Both operations are single set-based statements, so SQLite applies each
//! one atomically: no reader sees a family half-flagged or half-deleted.

use super::TranslationStore;
use crate::entry::EntryId;
use crate::error::{Result, StoreError};
use crate::key::TranslationKey;
use sqlx::{Executor, Sqlite};
use tracing::{debug, info};

/// Flag every non-default entry of a family as needing review.
///
/// Lock state is deliberately not consulted: a lock protects an entry's text,
/// not its staleness. Returns the number of rows matched.
pub(crate) async fn flag_family<'e, E>(
    executor: E,
    default_locale: &str,
    key: &TranslationKey,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"UPDATE translations SET unstable = 1
           WHERE namespace = ? AND "group" = ? AND item = ? AND locale <> ?"#,
    )
    .bind(key.namespace.clone())
    .bind(key.group.clone())
    .bind(key.item.clone())
    .bind(default_locale.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Delete every entry of a family in every locale
pub(crate) async fn delete_family<'e, E>(executor: E, key: &TranslationKey) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"DELETE FROM translations WHERE namespace = ? AND "group" = ? AND item = ?"#,
    )
    .bind(key.namespace.clone())
    .bind(key.group.clone())
    .bind(key.item.clone())
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

impl TranslationStore {
    /// Mark every other locale of `key`'s family as needing review.
    ///
    /// Idempotent. Returns how many sibling rows are flagged.
    pub async fn on_default_locale_write(&self, key: &TranslationKey) -> Result<u64> {
        let flagged = flag_family(&self.pool, &self.default_locale, key).await?;
        self.metrics.record_propagation(flagged);
        debug!("Flagged {} sibling(s) of {} for review", flagged, key);
        Ok(flagged)
    }

    /// Remove `key`'s whole family, default-locale entry included
    pub async fn on_default_locale_delete(&self, key: &TranslationKey) -> Result<u64> {
        let removed = delete_family(&self.pool, key).await?;
        self.metrics.record_cascade();
        self.metrics.record_deleted(removed);
        info!("Cascade delete of {} removed {} entr(ies)", key, removed);
        Ok(removed)
    }

    /// Mark an entry as reviewed. Text and lock are left alone.
    pub async fn flag_as_reviewed(&self, id: EntryId) -> Result<()> {
        let result = sqlx::query("UPDATE translations SET unstable = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::entry_not_found(id));
        }
        Ok(())
    }

    /// [`Self::on_default_locale_write`] addressed by code
    pub async fn flag_as_unstable(&self, code: &str) -> Result<u64> {
        let key = TranslationKey::parse(code)?;
        self.on_default_locale_write(&key).await
    }
}
