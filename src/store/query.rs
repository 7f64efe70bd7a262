//! Read-only queries: set difference between locales, uniform sampling,
//! segmented search and cross-locale equivalents of a phrase.

use super::{EntryStream, TranslationStore};
use crate::entry::{Entry, EntryId, EntryRow};
use crate::error::{Result, StoreError};
use crate::key::{DEFAULT_NAMESPACE, NAMESPACE_SEPARATOR, PATH_SEPARATOR};
use crate::page::{Page, PageRequest};
use futures::{future, StreamExt, TryStreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::BTreeSet;
use tracing::debug;

/// Namespace restriction of a search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceFilter {
    /// No `::` in the partial code
    Any,
    /// Leading `::` with nothing before it: any namespace except `*`
    NonDefault,
    /// `ns::`: namespace contains `ns`
    Contains(String),
}

/// A partial code broken into its namespace filter and path segments.
///
/// Each segment must match `group`, `item` or `text` as a substring; all
/// segments must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPattern {
    pub namespace: NamespaceFilter,
    pub segments: Vec<String>,
}

impl SearchPattern {
    /// Parse a partial code. Never fails: missing parts simply do not filter.
    pub fn parse(partial: &str) -> Self {
        let (namespace, rest) = match partial.split_once(NAMESPACE_SEPARATOR) {
            None => (NamespaceFilter::Any, partial),
            Some(("", rest)) => (NamespaceFilter::NonDefault, rest),
            Some((ns, rest)) => (NamespaceFilter::Contains(ns.to_string()), rest),
        };

        let segments = rest
            .split(PATH_SEPARATOR)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            namespace,
            segments,
        }
    }

    /// Append this pattern's conditions (each prefixed with `AND`)
    fn push_conditions(&self, builder: &mut QueryBuilder<'static, Sqlite>) {
        match &self.namespace {
            NamespaceFilter::Any => {}
            NamespaceFilter::NonDefault => {
                builder
                    .push(" AND namespace <> ")
                    .push_bind(DEFAULT_NAMESPACE);
            }
            NamespaceFilter::Contains(ns) => {
                builder
                    .push(r" AND namespace LIKE ")
                    .push_bind(like_contains(ns))
                    .push(r" ESCAPE '\'");
            }
        }

        for segment in &self.segments {
            let pattern = like_contains(segment);
            builder
                .push(r#" AND ("group" LIKE "#)
                .push_bind(pattern.clone())
                .push(r" ESCAPE '\' OR item LIKE ")
                .push_bind(pattern.clone())
                .push(r" ESCAPE '\' OR text LIKE ")
                .push_bind(pattern)
                .push(r" ESCAPE '\')");
        }
    }
}

/// `%value%` with LIKE wildcards in `value` escaped by `\`
fn like_contains(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Search query for one locale, ordered by id, keyset-paged
fn search_query(
    locale: &str,
    pattern: &SearchPattern,
    after: EntryId,
    limit: i64,
) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::new(select_entries!("WHERE locale = "));
    builder.push_bind(locale.to_string());
    pattern.push_conditions(&mut builder);
    builder
        .push(" AND id > ")
        .push_bind(after)
        .push(" ORDER BY id LIMIT ")
        .push_bind(limit);
    builder
}

impl TranslationStore {
    // ==================== Untranslated ====================

    /// Reference-locale entries whose key has no entry in `target`.
    ///
    /// `text_filter` keeps only entries whose text contains it, ignoring case.
    pub fn untranslated(
        &self,
        reference: &str,
        target: &str,
        text_filter: Option<&str>,
    ) -> EntryStream<'_> {
        let needle = text_filter
            .filter(|f| !f.is_empty())
            .map(str::to_lowercase);

        sqlx::query_as::<_, EntryRow>(select_entries!(
            r#"r WHERE r.locale = ? AND NOT EXISTS (
                   SELECT 1 FROM translations t
                   WHERE t.locale = ?
                     AND t.namespace = r.namespace
                     AND t."group" = r."group"
                     AND t.item = r.item)
               ORDER BY r.id"#
        ))
        .bind(reference.to_string())
        .bind(target.to_string())
        .fetch(&self.pool)
        .map_ok(Entry::from)
        .map_err(StoreError::from)
        .try_filter(move |entry| {
            let keep = needle
                .as_ref()
                .map_or(true, |n| entry.text.to_lowercase().contains(n.as_str()));
            future::ready(keep)
        })
        .boxed()
    }

    /// Size of [`Self::untranslated`] without a text filter
    pub async fn count_untranslated(&self, reference: &str, target: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM translations r
               WHERE r.locale = ? AND NOT EXISTS (
                   SELECT 1 FROM translations t
                   WHERE t.locale = ?
                     AND t.namespace = r.namespace
                     AND t."group" = r."group"
                     AND t.item = r.item)"#,
        )
        .bind(reference)
        .bind(target)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    /// One untranslated entry drawn uniformly from the whole qualifying set
    pub async fn random_untranslated(&self, reference: &str, target: &str) -> Result<Option<Entry>> {
        let mut rng = StdRng::from_entropy();
        self.random_untranslated_with(reference, target, &mut rng)
            .await
    }

    /// [`Self::random_untranslated`] with a caller-supplied generator.
    ///
    /// Reservoir sampling over the full stream: the n-th candidate replaces
    /// the current pick with probability 1/n.
    pub async fn random_untranslated_with<R>(
        &self,
        reference: &str,
        target: &str,
        rng: &mut R,
    ) -> Result<Option<Entry>>
    where
        R: Rng,
    {
        let mut candidates = self.untranslated(reference, target, None);
        let mut chosen = None;
        let mut seen: u64 = 0;

        while let Some(entry) = candidates.try_next().await? {
            seen += 1;
            if rng.gen_range(0..seen) == 0 {
                chosen = Some(entry);
            }
        }

        debug!(
            "Sampled 1 of {} untranslated {} -> {} entr(ies)",
            seen, reference, target
        );
        Ok(chosen)
    }

    // ==================== Search ====================

    /// Every entry of `locale` matching a partial code, lazily
    pub fn search(&self, locale: &str, partial: &str) -> EntryStream<'_> {
        let pattern = SearchPattern::parse(partial);
        let locale = locale.to_string();
        let pool = &self.pool;

        Box::pin(async_stream::stream! {
            let mut builder = search_query(&locale, &pattern, 0, -1);
            let mut rows = builder.build_query_as::<EntryRow>().fetch(pool);
            while let Some(row) = rows.next().await {
                yield row.map(Entry::from).map_err(StoreError::from);
            }
        })
    }

    /// One page of [`Self::search`]
    pub async fn search_page(
        &self,
        locale: &str,
        partial: &str,
        request: &PageRequest,
    ) -> Result<Page<Entry>> {
        let pattern = SearchPattern::parse(partial);
        let mut builder = search_query(
            locale,
            &pattern,
            request.after_id(),
            request.fetch_limit(),
        );
        let rows: Vec<EntryRow> = builder.build_query_as().fetch_all(&self.pool).await?;

        Ok(Page::from_overfetch(
            rows.into_iter().map(Entry::from).collect(),
            request,
        ))
    }

    // ==================== Equivalents ====================

    /// Distinct `target` texts of every key whose `source` text is exactly `text`
    pub async fn translate_text(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<BTreeSet<String>> {
        let texts: Vec<String> = sqlx::query_scalar(
            r#"SELECT DISTINCT t.text FROM translations s
               JOIN translations t
                 ON t.namespace = s.namespace AND t."group" = s."group" AND t.item = s.item
               WHERE s.locale = ? AND s.text = ? AND t.locale = ?"#,
        )
        .bind(source)
        .bind(text)
        .bind(target)
        .fetch_all(&self.pool)
        .await?;

        Ok(texts.into_iter().collect())
    }

    // ==================== Review Queue ====================

    /// Entries of `locale` that need review, in id order
    pub fn pending_review(&self, locale: &str) -> EntryStream<'_> {
        sqlx::query_as::<_, EntryRow>(select_entries!(
            "WHERE locale = ? AND unstable = 1 ORDER BY id"
        ))
        .bind(locale.to_string())
        .fetch(&self.pool)
        .map_ok(Entry::from)
        .map_err(StoreError::from)
        .boxed()
    }

    pub async fn pending_review_page(&self, locale: &str, request: &PageRequest) -> Result<Page<Entry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(select_entries!(
            "WHERE locale = ? AND unstable = 1 AND id > ? ORDER BY id LIMIT ?"
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
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{create_test_store, seed};
    use super::*;
    use crate::entry::NewEntry;
    use proptest::prelude::*;
    use std::collections::HashMap;

    async fn collect(stream: EntryStream<'_>) -> Vec<Entry> {
        stream.try_collect().await.expect("collect stream")
    }

    fn codes(entries: &[Entry]) -> BTreeSet<String> {
        entries.iter().map(Entry::code).collect()
    }

    // ==================== SearchPattern Tests ====================

    #[test]
    fn test_pattern_without_namespace() {
        let pattern = SearchPattern::parse("mess.greet");
        assert_eq!(pattern.namespace, NamespaceFilter::Any);
        assert_eq!(pattern.segments, vec!["mess", "greet"]);
    }

    #[test]
    fn test_pattern_leading_separator() {
        let pattern = SearchPattern::parse("::valid");
        assert_eq!(pattern.namespace, NamespaceFilter::NonDefault);
        assert_eq!(pattern.segments, vec!["valid"]);
    }

    #[test]
    fn test_pattern_namespace_prefix() {
        let pattern = SearchPattern::parse("pkg::");
        assert_eq!(pattern.namespace, NamespaceFilter::Contains("pkg".to_string()));
        assert!(pattern.segments.is_empty());
    }

    #[test]
    fn test_pattern_skips_empty_segments() {
        let pattern = SearchPattern::parse("..a..b.");
        assert_eq!(pattern.segments, vec!["a", "b"]);
        assert!(SearchPattern::parse("").segments.is_empty());
    }

    #[test]
    fn test_like_contains_escapes_wildcards() {
        assert_eq!(like_contains("abc"), "%abc%");
        assert_eq!(like_contains("50%_off"), r"%50\%\_off%");
        assert_eq!(like_contains(r"a\b"), r"%a\\b%");
    }

    // ==================== Untranslated Tests ====================

    #[tokio::test]
    async fn test_untranslated_is_key_difference() {
        let (store, _temp_dir) = create_test_store().await;
        seed(&store, "en", "messages.greeting", "Hello").await;
        seed(&store, "en", "messages.farewell", "Goodbye").await;
        seed(&store, "en", "pkg::messages.greeting", "Hello there").await;
        seed(&store, "es", "messages.greeting", "Hola").await;
        seed(&store, "es", "messages.only_es", "Solo").await;

        let missing = collect(store.untranslated("en", "es", None)).await;

        assert_eq!(
            codes(&missing),
            BTreeSet::from([
                "messages.farewell".to_string(),
                "pkg::messages.greeting".to_string()
            ])
        );
        assert!(missing.iter().all(|e| e.locale == "en"));
        assert_eq!(store.count_untranslated("en", "es").await.expect("count"), 2);
    }

    #[tokio::test]
    async fn test_untranslated_text_filter_ignores_case() {
        let (store, _temp_dir) = create_test_store().await;
        seed(&store, "en", "messages.greeting", "Hello World").await;
        seed(&store, "en", "messages.farewell", "Goodbye").await;
        seed(&store, "en", "messages.umlaut", "ÜBER alles").await;

        let hits = collect(store.untranslated("en", "es", Some("WORLD"))).await;
        assert_eq!(codes(&hits), BTreeSet::from(["messages.greeting".to_string()]));

        let unicode = collect(store.untranslated("en", "es", Some("über"))).await;
        assert_eq!(unicode.len(), 1);

        let empty_filter = collect(store.untranslated("en", "es", Some(""))).await;
        assert_eq!(empty_filter.len(), 3);
    }

    #[tokio::test]
    async fn test_untranslated_empty_reference() {
        let (store, _temp_dir) = create_test_store().await;
        seed(&store, "es", "messages.greeting", "Hola").await;

        assert!(collect(store.untranslated("en", "es", None)).await.is_empty());
        assert_eq!(store.count_untranslated("en", "es").await.expect("count"), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_untranslated_is_set_difference(
            reference in proptest::collection::btree_set("[a-e]{1,2}", 0..8),
            target in proptest::collection::btree_set("[a-e]{1,2}", 0..8),
        ) {
            tokio_test::block_on(async {
                let (store, _temp_dir) = create_test_store().await;
                for item in &reference {
                    seed(&store, "en", &format!("g.{}", item), item).await;
                }
                for item in &target {
                    seed(&store, "es", &format!("g.{}", item), item).await;
                }

                let missing: BTreeSet<String> = collect(store.untranslated("en", "es", None))
                    .await
                    .into_iter()
                    .map(|e| e.item)
                    .collect();
                let expected: BTreeSet<String> =
                    reference.difference(&target).cloned().collect();
                let translated = reference.intersection(&target).count();

                assert_eq!(missing, expected);
                assert_eq!(missing.len() + translated, reference.len());
            });
        }
    }

    // ==================== Sampling Tests ====================

    #[tokio::test]
    async fn test_random_untranslated_none_when_complete() {
        let (store, _temp_dir) = create_test_store().await;
        seed(&store, "en", "messages.greeting", "Hello").await;
        seed(&store, "es", "messages.greeting", "Hola").await;

        assert!(store
            .random_untranslated("en", "es")
            .await
            .expect("sample")
            .is_none());
    }

    #[tokio::test]
    async fn test_random_untranslated_single_candidate() {
        let (store, _temp_dir) = create_test_store().await;
        let id = seed(&store, "en", "messages.greeting", "Hello").await;

        let picked = store
            .random_untranslated("en", "es")
            .await
            .expect("sample")
            .expect("one candidate");
        assert_eq!(picked.id, id);
    }

    #[tokio::test]
    async fn test_random_untranslated_reaches_every_candidate() {
        let (store, _temp_dir) = create_test_store().await;
        let mut ids = Vec::new();
        for i in 0..4 {
            ids.push(seed(&store, "en", &format!("messages.item{}", i), "x").await);
        }
        seed(&store, "es", "messages.item0", "y").await;

        let mut rng = StdRng::seed_from_u64(7);
        let mut counts: HashMap<EntryId, u32> = HashMap::new();
        for _ in 0..300 {
            let picked = store
                .random_untranslated_with("en", "es", &mut rng)
                .await
                .expect("sample")
                .expect("candidate");
            *counts.entry(picked.id).or_default() += 1;
        }

        assert!(!counts.contains_key(&ids[0]), "translated key must not be drawn");
        for id in &ids[1..] {
            let hits = counts.get(id).copied().unwrap_or(0);
            assert!(hits > 50, "entry {} drawn only {} times of 300", id, hits);
        }
    }

    // ==================== Search Tests ====================

    #[tokio::test]
    async fn test_search_segments_match_group_and_item() {
        let (store, _temp_dir) = create_test_store().await;
        seed(&store, "en", "messages.greeting", "Hello").await;
        let es = seed(&store, "es", "messages.greeting", "Hola").await;
        seed(&store, "es", "messages.farewell", "Adiós").await;

        let hits = collect(store.search("es", "mess.greet")).await;

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, es);
    }

    #[tokio::test]
    async fn test_search_segment_matches_text() {
        let (store, _temp_dir) = create_test_store().await;
        seed(&store, "en", "auth.failed", "These credentials do not match").await;
        seed(&store, "en", "auth.throttle", "Too many attempts").await;

        let hits = collect(store.search("en", "auth.CREDENTIALS")).await;
        assert_eq!(codes(&hits), BTreeSet::from(["auth.failed".to_string()]));
    }

    #[tokio::test]
    async fn test_search_leading_separator_excludes_default_namespace() {
        let (store, _temp_dir) = create_test_store().await;
        seed(&store, "en", "messages.required", "Required").await;
        seed(&store, "en", "pkg::messages.required", "Required").await;

        let hits = collect(store.search("en", "::required")).await;
        assert_eq!(codes(&hits), BTreeSet::from(["pkg::messages.required".to_string()]));
    }

    #[tokio::test]
    async fn test_search_namespace_substring() {
        let (store, _temp_dir) = create_test_store().await;
        seed(&store, "en", "vendor-auth::login.title", "Login").await;
        seed(&store, "en", "billing::login.title", "Login").await;

        let hits = collect(store.search("en", "auth::")).await;
        assert_eq!(codes(&hits), BTreeSet::from(["vendor-auth::login.title".to_string()]));
    }

    #[tokio::test]
    async fn test_search_escapes_wildcards() {
        let (store, _temp_dir) = create_test_store().await;
        seed(&store, "en", "promo.sale", "50% off").await;
        seed(&store, "en", "promo.other", "500 off").await;

        let hits = collect(store.search("en", "50%")).await;
        assert_eq!(codes(&hits), BTreeSet::from(["promo.sale".to_string()]));
    }

    #[tokio::test]
    async fn test_search_empty_partial_lists_locale() {
        let (store, _temp_dir) = create_test_store().await;
        seed(&store, "en", "a.b", "x").await;
        seed(&store, "en", "c.d", "y").await;
        seed(&store, "es", "a.b", "z").await;

        assert_eq!(collect(store.search("en", "")).await.len(), 2);
    }

    #[tokio::test]
    async fn test_search_pages() {
        let (store, _temp_dir) = create_test_store().await;
        for i in 0..5 {
            seed(&store, "en", &format!("messages.item{}", i), "x").await;
        }
        seed(&store, "en", "other.item9", "x").await;

        let first = store
            .search_page("en", "messages", &PageRequest::new(3))
            .await
            .expect("page 1");
        let second = store
            .search_page("en", "messages", &PageRequest::new(3).after(first.next))
            .await
            .expect("page 2");

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 2);
        assert!(second.is_last());
        assert!(second.items.iter().all(|e| e.group == "messages"));
    }

    // ==================== translate_text Tests ====================

    #[tokio::test]
    async fn test_translate_text_distinct_equivalents() {
        let (store, _temp_dir) = create_test_store().await;
        seed(&store, "en", "messages.greeting", "Hello").await;
        seed(&store, "en", "mail.salutation", "Hello").await;
        seed(&store, "en", "chat.hi", "Hello").await;
        seed(&store, "en", "messages.farewell", "Bye").await;
        seed(&store, "es", "messages.greeting", "Hola").await;
        seed(&store, "es", "mail.salutation", "Hola").await;
        seed(&store, "es", "chat.hi", "Buenas").await;
        seed(&store, "es", "messages.farewell", "Adiós").await;

        let texts = store
            .translate_text("Hello", "en", "es")
            .await
            .expect("translate");

        assert_eq!(
            texts,
            BTreeSet::from(["Buenas".to_string(), "Hola".to_string()])
        );
    }

    #[tokio::test]
    async fn test_translate_text_is_exact() {
        let (store, _temp_dir) = create_test_store().await;
        seed(&store, "en", "messages.greeting", "Hello").await;
        seed(&store, "es", "messages.greeting", "Hola").await;

        assert!(store
            .translate_text("hello", "en", "es")
            .await
            .expect("translate")
            .is_empty());
    }

    // ==================== Review Queue Tests ====================

    #[tokio::test]
    async fn test_pending_review() {
        let (store, _temp_dir) = create_test_store().await;
        seed(&store, "en", "messages.greeting", "Hello").await;
        let es = seed(&store, "es", "messages.greeting", "Hola").await;
        seed(&store, "es", "messages.farewell", "Adiós").await;
        store
            .create(NewEntry::new("es", "messages", "orphan", "x").locked())
            .await
            .expect("create");

        store
            .flag_as_unstable("messages.greeting")
            .await
            .expect("flag");

        let pending = collect(store.pending_review("es")).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, es);

        let page = store
            .pending_review_page("es", &PageRequest::new(10))
            .await
            .expect("page");
        assert_eq!(page.len(), 1);
        assert!(page.is_last());

        store.flag_as_reviewed(es).await.expect("review");
        assert!(collect(store.pending_review("es")).await.is_empty());
    }
}
