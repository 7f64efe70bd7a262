//! Entry store: durable keyed storage of translation entries.
//!
//! Every mutation goes through the validator, and every default-locale
//! mutation through the propagator, before it is applied. The `translations`
//! table carries a unique index on (locale, namespace, group, item); the
//! validator's uniqueness check only exists to give friendly errors, the index
//! is what actually enforces it.

/// `SELECT` over every entry column, followed by the given clause.
/// Expands to a `&'static str` so queries built from it can back a lazy stream.
macro_rules! select_entries {
    ($tail:literal) => {
        concat!(
            r#"SELECT id, locale, namespace, "group", item, text, unstable, locked, created_at, updated_at FROM translations "#,
            $tail
        )
    };
}

pub mod merge;
mod propagate;
mod query;

pub use merge::{ItemOutcome, MergeReport, MergeRequest, MergedItem};
pub use query::{NamespaceFilter, SearchPattern};

use crate::config::Config;
use crate::entry::{EditPolicy, Entry, EntryId, EntryRow, NewEntry, ReviewState};
use crate::error::{map_unique_violation, Result, StoreError};
use crate::key::{normalize_namespace, TranslationKey};
use crate::metrics::{MetricsReport, StoreMetrics};
use crate::page::{Page, PageRequest};
use crate::validator::{validate, Candidate, RuleSet};
use chrono::Utc;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Lazy, finite sequence of entries read from the store
pub type EntryStream<'a> = BoxStream<'a, Result<Entry>>;

#[derive(Clone)]
pub struct TranslationStore {
    pool: SqlitePool,
    default_locale: Arc<str>,
    rules: Arc<RuleSet>,
    metrics: Arc<StoreMetrics>,
}

impl TranslationStore {
    /// Wrap an existing pool. The schema must already exist (see [`Self::init_schema`]).
    pub fn new(pool: SqlitePool, default_locale: &str) -> Self {
        Self {
            pool,
            default_locale: Arc::from(default_locale),
            rules: Arc::new(RuleSet::entries()),
            metrics: Arc::new(StoreMetrics::new()),
        }
    }

    /// Open (creating if needed) the database named by the config and make
    /// sure the schema exists
    pub async fn connect(config: &Config) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self::new(pool, &config.default_locale);
        store.init_schema().await?;

        info!(
            "Opened translation store at {} (default locale '{}')",
            config.database_url, config.default_locale
        );
        Ok(store)
    }

    /// Create the translations table and its indexes (idempotent)
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS translations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                locale TEXT NOT NULL,
                namespace TEXT NOT NULL DEFAULT '*',
                "group" TEXT NOT NULL,
                item TEXT NOT NULL,
                text TEXT NOT NULL DEFAULT '',
                unstable INTEGER NOT NULL DEFAULT 0 CHECK (unstable IN (0, 1)),
                locked INTEGER NOT NULL DEFAULT 0 CHECK (locked IN (0, 1)),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_translations_locale_key
               ON translations (locale, namespace, "group", item)"#,
        )
        .execute(&self.pool)
        .await?;

        // Family lookups (propagation, cascade, anti-join) go by key alone
        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS idx_translations_key
               ON translations (namespace, "group", item)"#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replace the validation rules applied by `create` and `update`
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn is_default_locale(&self, locale: &str) -> bool {
        *self.default_locale == *locale
    }

    pub fn metrics(&self) -> MetricsReport {
        self.metrics.report()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ==================== Mutations ====================

    /// Insert a new entry.
    ///
    /// Default-locale entries are always stored as stable whatever the
    /// candidate says. Creating a default-locale entry does not propagate:
    /// siblings created earlier were never translated from this text.
    pub async fn create(&self, entry: NewEntry) -> Result<EntryId> {
        let namespace = normalize_namespace(&entry.namespace).to_string();
        let holder = self
            .key_holder(&entry.locale, &namespace, &entry.group, &entry.item)
            .await?;
        validate(Candidate::from(&entry), &self.rules, holder).map_err(StoreError::Validation)?;

        let review = if self.is_default_locale(&entry.locale) {
            ReviewState::Stable
        } else {
            entry.review
        };
        let now = Utc::now();

        let result = sqlx::query(
            r#"INSERT INTO translations
               (locale, namespace, "group", item, text, unstable, locked, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&entry.locale)
        .bind(&namespace)
        .bind(&entry.group)
        .bind(&entry.item)
        .bind(&entry.text)
        .bind(review.is_unstable())
        .bind(entry.policy.is_locked())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        let id = result.last_insert_rowid();
        self.metrics.record_created();
        debug!(
            "Created entry {} ({} {})",
            id,
            entry.locale,
            crate::key::render(&namespace, &entry.group, &entry.item)
        );
        Ok(id)
    }

    /// Full-record update of an existing entry.
    ///
    /// Locked entries are refused with [`StoreError::Locked`]; edit those
    /// through [`Self::update_and_lock`]. A default-locale update flags every
    /// other locale of the family as needing review.
    pub async fn update(&self, entry: Entry) -> Result<()> {
        let current = self.find(entry.id).await?;
        if current.is_locked() {
            return Err(StoreError::Locked(entry.id));
        }
        self.write(&current, entry).await
    }

    /// Update an entry and lock it against automated overwrites.
    ///
    /// Unlike [`Self::update`] this is allowed on entries that are already
    /// locked; it is the manual edit path.
    pub async fn update_and_lock(&self, mut entry: Entry) -> Result<bool> {
        let current = self.find(entry.id).await?;
        entry.policy = EditPolicy::Locked;
        self.write(&current, entry).await?;
        Ok(true)
    }

    /// Validate and persist a full record over `current`, propagating for the
    /// default locale.
    ///
    /// A default-locale entry that moves to another key or locale leaves its
    /// old family without a source, so that family is flagged as well.
    async fn write(&self, current: &Entry, mut entry: Entry) -> Result<()> {
        entry.namespace = normalize_namespace(&entry.namespace).to_string();
        let holder = self
            .key_holder(&entry.locale, &entry.namespace, &entry.group, &entry.item)
            .await?;
        validate(Candidate::from(&entry), &self.rules, holder).map_err(StoreError::Validation)?;

        let is_default = self.is_default_locale(&entry.locale);
        if is_default {
            entry.review = ReviewState::Stable;
        }

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"UPDATE translations
               SET locale = ?, namespace = ?, "group" = ?, item = ?, text = ?,
                   unstable = ?, locked = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&entry.locale)
        .bind(&entry.namespace)
        .bind(&entry.group)
        .bind(&entry.item)
        .bind(&entry.text)
        .bind(entry.review.is_unstable())
        .bind(entry.policy.is_locked())
        .bind(Utc::now())
        .bind(entry.id)
        .execute(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        if result.rows_affected() == 0 {
            // Removed between the lookup and the write; dropping tx rolls back
            return Err(StoreError::entry_not_found(entry.id));
        }

        let mut flagged = if is_default {
            Some(propagate::flag_family(&mut *tx, &self.default_locale, &entry.key()).await?)
        } else {
            None
        };

        let previous = current.key();
        if self.is_default_locale(&current.locale) && (!is_default || previous != entry.key()) {
            let orphaned = propagate::flag_family(&mut *tx, &self.default_locale, &previous).await?;
            flagged = Some(flagged.unwrap_or(0) + orphaned);
        }

        tx.commit().await?;

        self.metrics.record_updated();
        if let Some(flagged) = flagged {
            self.metrics.record_propagation(flagged);
            debug!(
                "Default-locale update of {} flagged {} sibling(s)",
                entry.code(),
                flagged
            );
        }
        Ok(())
    }

    /// Delete an entry.
    ///
    /// Deleting a default-locale entry removes its whole family in every
    /// locale; deleting any other entry removes only that row. Returns false
    /// if the id does not resolve.
    pub async fn delete(&self, id: EntryId) -> Result<bool> {
        let Some(entry) = self.find_optional(id).await? else {
            return Ok(false);
        };

        if self.is_default_locale(&entry.locale) {
            let removed = self.on_default_locale_delete(&entry.key()).await?;
            return Ok(removed > 0);
        }

        let result = sqlx::query("DELETE FROM translations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        self.metrics.record_deleted(removed);
        Ok(removed > 0)
    }

    /// Set the default-locale text for a code, creating the entry if absent.
    ///
    /// This is an explicit edit: an existing entry is written even if locked.
    pub async fn update_default_by_code(&self, code: &str, text: &str) -> Result<EntryId> {
        let key = TranslationKey::parse(code)?;
        let default_locale = self.default_locale.to_string();

        match self.find_key_optional(&key, &default_locale).await? {
            Some(current) => {
                let mut entry = current.clone();
                entry.text = text.to_string();
                self.write(&current, entry).await?;
                Ok(current.id)
            }
            None => {
                self.create(NewEntry::for_key(default_locale, &key, text))
                    .await
            }
        }
    }

    /// Delete a whole family, in every locale, by code. Returns the rows removed.
    pub async fn delete_by_code(&self, code: &str) -> Result<u64> {
        let key = TranslationKey::parse(code)?;
        self.on_default_locale_delete(&key).await
    }

    // ==================== Lookups ====================

    pub async fn find(&self, id: EntryId) -> Result<Entry> {
        self.find_optional(id)
            .await?
            .ok_or_else(|| StoreError::entry_not_found(id))
    }

    pub async fn find_by_key_and_locale(&self, key: &TranslationKey, locale: &str) -> Result<Entry> {
        self.find_key_optional(key, locale)
            .await?
            .ok_or_else(|| StoreError::key_not_found(locale, &key.render()))
    }

    /// Point lookup by external code, e.g. `find_by_code("es", "messages.greeting")`
    pub async fn find_by_code(&self, locale: &str, code: &str) -> Result<Entry> {
        let key = TranslationKey::parse(code)?;
        self.find_by_key_and_locale(&key, locale).await
    }

    async fn find_optional(&self, id: EntryId) -> Result<Option<Entry>> {
        let row: Option<EntryRow> = sqlx::query_as(select_entries!("WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Entry::from))
    }

    async fn find_key_optional(&self, key: &TranslationKey, locale: &str) -> Result<Option<Entry>> {
        let row: Option<EntryRow> = sqlx::query_as(select_entries!(
            r#"WHERE locale = ? AND namespace = ? AND "group" = ? AND item = ?"#
        ))
        .bind(locale)
        .bind(&key.namespace)
        .bind(&key.group)
        .bind(&key.item)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Entry::from))
    }

    /// Id of the row holding a four-column key, if any
    async fn key_holder(
        &self,
        locale: &str,
        namespace: &str,
        group: &str,
        item: &str,
    ) -> Result<Option<EntryId>> {
        let id = sqlx::query_scalar(
            r#"SELECT id FROM translations
               WHERE locale = ? AND namespace = ? AND "group" = ? AND item = ?"#,
        )
        .bind(locale)
        .bind(namespace)
        .bind(group)
        .bind(item)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    // ==================== Listings ====================

    /// Every entry of a locale, in id order, fetched lazily
    pub fn list_by_locale(&self, locale: &str) -> EntryStream<'_> {
        sqlx::query_as::<_, EntryRow>(select_entries!("WHERE locale = ? ORDER BY id"))
            .bind(locale.to_string())
            .fetch(&self.pool)
            .map_ok(Entry::from)
            .map_err(StoreError::from)
            .boxed()
    }

    /// One page of a locale's entries
    pub async fn list_by_locale_page(&self, locale: &str, request: &PageRequest) -> Result<Page<Entry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(select_entries!(
            "WHERE locale = ? AND id > ? ORDER BY id LIMIT ?"
        ))
        .bind(locale)
        .bind(request.after_id())
        .bind(request.fetch_limit())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::from_overfetch(
            rows.into_iter().map(Entry::from).collect(),
            request,
        ))
    }

    /// The item -> text view of one group, as a runtime loader consumes it
    pub async fn items(&self, locale: &str, namespace: &str, group: &str) -> Result<BTreeMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"SELECT item, text FROM translations
               WHERE locale = ? AND namespace = ? AND "group" = ?
               ORDER BY item"#,
        )
        .bind(locale)
        .bind(normalize_namespace(namespace))
        .bind(group)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    /// Distinct locales present in the store
    pub async fn locales(&self) -> Result<Vec<String>> {
        let locales = sqlx::query_scalar("SELECT DISTINCT locale FROM translations ORDER BY locale")
            .fetch_all(&self.pool)
            .await?;
        Ok(locales)
    }
}
