//! Filtered, joined, paginated retrieval of drops for a river.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use river_types::models::{DropLink, DropPlace, DropSummary, DropTag};

use crate::cache::FeedCache;
use crate::error::CoreError;
use crate::fingerprint::{DropsFingerprint, SinceFingerprint, max_drop_id_key};
use crate::store::{CompiledFilters, DropQuery, DropRow, DropWindow, Store};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const DEFAULT_SINCE_LIMIT: u32 = 100;

/// The max association id changes on every ingested item and is polled on
/// every refresh, so it lives on a short fixed TTL.
pub const MAX_ID_TTL: Duration = Duration::from_secs(90);

/// Raw filter values as supplied by the caller, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropFilters {
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl DropFilters {
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
            && self.tags.is_empty()
            && self.start_date.is_none()
            && self.end_date.is_none()
    }

    /// Canonical serialization: fixed field order, sorted and deduplicated
    /// value lists. Logically identical filter sets serialize identically.
    pub fn canonical(&self) -> String {
        let mut channels = self.channels.clone();
        channels.sort();
        channels.dedup();
        let mut tags = self.tags.clone();
        tags.sort();
        tags.dedup();
        format!(
            "channel=[{}];tags=[{}];start_date={};end_date={}",
            channels.join(","),
            tags.join(","),
            self.start_date.as_deref().unwrap_or(""),
            self.end_date.as_deref().unwrap_or(""),
        )
    }

    /// Validates the filter set into storage predicates. `None` means a
    /// value is syntactically invalid and the query short-circuits to an
    /// empty result instead of erroring.
    pub fn compile(&self) -> Option<CompiledFilters> {
        let date_from = match &self.start_date {
            Some(raw) => Some(parse_filter_date(raw)?),
            None => None,
        };
        let date_to = match &self.end_date {
            Some(raw) => Some(parse_filter_date(raw)?),
            None => None,
        };
        Some(CompiledFilters {
            channels: self.channels.clone(),
            tags: self.tags.clone(),
            date_from,
            date_to,
        })
    }
}

/// Accepts `YYYY-MM-DD` (anchored to midnight UTC) or a full RFC 3339
/// timestamp.
fn parse_filter_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

/// Publish timestamps are presented pre-formatted, e.g.
/// "Jul  9, 2012 14:30:00 UTC".
pub fn format_pub_date(date: DateTime<Utc>) -> String {
    date.format("%b %e, %Y %H:%M:%S UTC").to_string()
}

pub struct FeedQuery<S> {
    store: Arc<S>,
    cache: Arc<dyn FeedCache>,
    feed_ttl: Duration,
}

impl<S: Store> FeedQuery<S> {
    pub fn new(store: Arc<S>, cache: Arc<dyn FeedCache>, feed_ttl: Duration) -> Self {
        Self {
            store,
            cache,
            feed_ttl,
        }
    }

    /// Offset-mode retrieval. With `drop_id` set this is a detail fetch for
    /// exactly that drop; otherwise one page of drops with association id at
    /// most `max_id`, newest publish date first.
    pub fn get_droplets(
        &self,
        viewer_id: i64,
        river_id: i64,
        drop_id: Option<i64>,
        page: u32,
        max_id: i64,
        photos: bool,
        filters: &DropFilters,
        limit: u32,
    ) -> Result<Vec<DropSummary>, CoreError> {
        let key = DropsFingerprint {
            viewer_id,
            river_id,
            drop_id,
            page,
            max_id,
            filters,
            photos,
        }
        .cache_key();

        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let Some(compiled) = filters.compile() else {
            debug!(river_id, "unparseable drop filter, returning empty set");
            return Ok(Vec::new());
        };

        // A detail fetch ignores pagination entirely.
        let offset = if drop_id.is_some() {
            0
        } else {
            limit as u64 * (page.max(1) as u64 - 1)
        };
        let window = DropWindow::Page {
            max_sort_id: max_id,
            limit,
            offset,
        };
        let drops = self.run_query(viewer_id, river_id, drop_id, window, photos, compiled)?;
        self.store_nonempty(&key, &drops);
        Ok(drops)
    }

    /// Cursor-mode retrieval: drops with association id strictly greater
    /// than `since_id`, ascending, for incremental polling.
    pub fn get_droplets_since_id(
        &self,
        viewer_id: i64,
        river_id: i64,
        since_id: i64,
        filters: &DropFilters,
        photos: bool,
        limit: u32,
    ) -> Result<Vec<DropSummary>, CoreError> {
        let key = SinceFingerprint {
            viewer_id,
            river_id,
            since_id,
            filters,
            photos,
        }
        .cache_key();

        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let Some(compiled) = filters.compile() else {
            debug!(river_id, "unparseable drop filter, returning empty set");
            return Ok(Vec::new());
        };

        let window = DropWindow::Since {
            since_sort_id: since_id,
            limit,
        };
        let drops = self.run_query(viewer_id, river_id, None, window, photos, compiled)?;
        self.store_nonempty(&key, &drops);
        Ok(drops)
    }

    /// The river's denormalized max association id; cheap, cached in its own
    /// namespace on a short TTL.
    pub fn get_max_droplet_id(&self, river_id: i64) -> Result<i64, CoreError> {
        let key = max_drop_id_key(river_id);
        if let Some(bytes) = self.cache.get(&key) {
            if let Ok(max_id) = serde_json::from_slice::<i64>(&bytes) {
                return Ok(max_id);
            }
        }

        let max_id = self.store.read(|r| r.max_drop_id(river_id))?;
        if let Ok(bytes) = serde_json::to_vec(&max_id) {
            self.cache.set(&key, bytes, MAX_ID_TTL);
        }
        Ok(max_id)
    }

    fn cached(&self, key: &str) -> Option<Vec<DropSummary>> {
        let bytes = self.cache.get(key)?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Only non-empty result sets are cached; a transient empty response is
    /// recomputed on the next call.
    fn store_nonempty(&self, key: &str, drops: &[DropSummary]) {
        if drops.is_empty() {
            return;
        }
        if let Ok(bytes) = serde_json::to_vec(drops) {
            self.cache.set(key, bytes, self.feed_ttl);
        }
    }

    fn run_query(
        &self,
        viewer_id: i64,
        river_id: i64,
        drop_id: Option<i64>,
        window: DropWindow,
        photos_only: bool,
        filters: CompiledFilters,
    ) -> Result<Vec<DropSummary>, CoreError> {
        self.store
            .read(|reader| {
                let Some(river) = reader.river(river_id)? else {
                    return Ok(None);
                };
                let query = DropQuery {
                    river_id,
                    account_id: river.account_id,
                    viewer_id,
                    drop_id,
                    window: window.clone(),
                    photos_only,
                    filters: filters.clone(),
                };
                let rows = reader.fetch_drops(&query)?;

                let drop_ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
                let tags = reader.drop_tags(river.account_id, &drop_ids)?;
                let places = reader.drop_places(river.account_id, &drop_ids)?;
                let links = reader.drop_links(river.account_id, &drop_ids)?;

                Ok(Some(populate_metadata(rows, tags, places, links)))
            })?
            .ok_or(CoreError::NotFound("river"))
    }
}

/// Enriches raw rows with the tags, places and links the owning account has
/// attached to each drop.
fn populate_metadata(
    rows: Vec<DropRow>,
    tags: Vec<(i64, DropTag)>,
    places: Vec<(i64, DropPlace)>,
    links: Vec<(i64, DropLink)>,
) -> Vec<DropSummary> {
    rows.into_iter()
        .map(|row| {
            let row_tags = tags
                .iter()
                .filter(|(id, _)| *id == row.id)
                .map(|(_, tag)| tag.clone())
                .collect();
            let row_places = places
                .iter()
                .filter(|(id, _)| *id == row.id)
                .map(|(_, place)| place.clone())
                .collect();
            let row_links = links
                .iter()
                .filter(|(id, _)| *id == row.id)
                .map(|(_, link)| link.clone())
                .collect();
            DropSummary {
                id: row.id,
                sort_id: row.sort_id,
                title: row.title,
                content: row.content,
                channel: row.channel,
                identity_name: row.identity_name,
                identity_avatar: row.identity_avatar,
                date_pub: format_pub_date(row.date_pub),
                user_score: row.user_score,
                original_url: row.original_url,
                comment_count: row.comment_count,
                tags: row_tags,
                places: row_places,
                links: row_links,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;

    use river_types::models::{Account, DropTag};

    use crate::cache::MokaFeedCache;
    use crate::memory::{DropletSeed, MemoryStore};
    use crate::store::{NewRiver, StoreError, zero_date};

    const RIVER: i64 = 1;
    const VIEWER: i64 = 9;

    fn pub_date(day: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2012, 7, day, 12, 0, 0).unwrap()
    }

    fn droplet(id: i64, day: u32) -> DropletSeed {
        DropletSeed {
            id,
            title: format!("drop {id}"),
            content: format!("content {id}"),
            channel: "rss".to_string(),
            identity_name: "BBC".to_string(),
            identity_avatar: "avatar.png".to_string(),
            date_pub: pub_date(day),
            image: None,
            original_url: None,
            comment_count: 0,
        }
    }

    fn setup() -> (Arc<MemoryStore>, FeedQuery<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(Account {
            id: 1,
            user_id: 1,
            account_path: "default".to_string(),
            public_account: false,
            river_quota_remaining: 5,
        });
        store
            .with_tx(|tx| {
                tx.insert_river(&NewRiver {
                    name: "Flood Watch".to_string(),
                    slug: "flood-watch".to_string(),
                    account_id: 1,
                    public: true,
                    date_added: Utc::now(),
                    date_expiry: Utc::now() + chrono::Duration::days(14),
                    drop_quota: 10_000,
                })?;
                Ok::<_, StoreError>(())
            })
            .unwrap();
        let feed = FeedQuery::new(
            store.clone(),
            Arc::new(MokaFeedCache::new(10_000)),
            Duration::from_secs(3600),
        );
        (store, feed)
    }

    fn add_drop(store: &MemoryStore, droplet_id: i64, day: u32) -> i64 {
        store
            .with_tx(|tx| tx.add_drop(RIVER, droplet_id, pub_date(day)))
            .unwrap()
    }

    fn seed_three(store: &MemoryStore) {
        for (id, day) in [(101, 1), (102, 2), (103, 3)] {
            store.seed_droplet(droplet(id, day));
            add_drop(store, id, day);
        }
    }

    #[test]
    fn offset_mode_pages_newest_first() {
        let (store, feed) = setup();
        seed_three(&store);

        let page1 = feed
            .get_droplets(VIEWER, RIVER, None, 1, i64::MAX, false, &DropFilters::default(), 2)
            .unwrap();
        assert_eq!(page1.iter().map(|d| d.id).collect::<Vec<_>>(), vec![103, 102]);

        let page2 = feed
            .get_droplets(VIEWER, RIVER, None, 2, i64::MAX, false, &DropFilters::default(), 2)
            .unwrap();
        assert_eq!(page2.iter().map(|d| d.id).collect::<Vec<_>>(), vec![101]);
    }

    #[test]
    fn page_past_the_end_is_empty_not_an_error() {
        let (store, feed) = setup();
        seed_three(&store);

        let drops = feed
            .get_droplets(VIEWER, RIVER, None, 2, 2, false, &DropFilters::default(), 50)
            .unwrap();
        assert!(drops.is_empty());
    }

    #[test]
    fn max_id_ceiling_excludes_newer_associations() {
        let (store, feed) = setup();
        seed_three(&store);

        let drops = feed
            .get_droplets(VIEWER, RIVER, None, 1, 2, false, &DropFilters::default(), 50)
            .unwrap();
        assert_eq!(drops.iter().map(|d| d.sort_id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn drop_id_is_a_detail_fetch() {
        let (store, feed) = setup();
        seed_three(&store);

        let drops = feed
            .get_droplets(VIEWER, RIVER, Some(102), 5, 1, false, &DropFilters::default(), 50)
            .unwrap();
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].id, 102);
    }

    #[test]
    fn zero_date_rows_are_excluded() {
        let (store, feed) = setup();
        seed_three(&store);
        store.seed_droplet(droplet(104, 4));
        store.seed_river_drop(50, RIVER, 104, zero_date());

        let drops = feed
            .get_droplets(VIEWER, RIVER, None, 1, i64::MAX, false, &DropFilters::default(), 50)
            .unwrap();
        assert!(drops.iter().all(|d| d.id != 104));
    }

    #[test]
    fn photos_only_requires_an_image() {
        let (store, feed) = setup();
        seed_three(&store);
        let mut with_photo = droplet(104, 4);
        with_photo.image = Some(77);
        store.seed_droplet(with_photo);
        add_drop(&store, 104, 4);

        let drops = feed
            .get_droplets(VIEWER, RIVER, None, 1, i64::MAX, true, &DropFilters::default(), 50)
            .unwrap();
        assert_eq!(drops.iter().map(|d| d.id).collect::<Vec<_>>(), vec![104]);
    }

    #[test]
    fn channel_filter_narrows_results() {
        let (store, feed) = setup();
        seed_three(&store);
        let mut tweet = droplet(104, 4);
        tweet.channel = "twitter".to_string();
        store.seed_droplet(tweet);
        add_drop(&store, 104, 4);

        let filters = DropFilters {
            channels: vec!["twitter".to_string()],
            ..Default::default()
        };
        let drops = feed
            .get_droplets(VIEWER, RIVER, None, 1, i64::MAX, false, &filters, 50)
            .unwrap();
        assert_eq!(drops.iter().map(|d| d.id).collect::<Vec<_>>(), vec![104]);
    }

    #[test]
    fn tag_filter_is_account_scoped() {
        let (store, feed) = setup();
        seed_three(&store);
        store.seed_tag(101, 1, DropTag { id: 1, tag: "floods".to_string() });
        // Same tag under a different account must not match.
        store.seed_tag(102, 2, DropTag { id: 2, tag: "floods".to_string() });

        let filters = DropFilters {
            tags: vec!["floods".to_string()],
            ..Default::default()
        };
        let drops = feed
            .get_droplets(VIEWER, RIVER, None, 1, i64::MAX, false, &filters, 50)
            .unwrap();
        assert_eq!(drops.iter().map(|d| d.id).collect::<Vec<_>>(), vec![101]);
    }

    #[test]
    fn invalid_date_filter_short_circuits_to_empty() {
        let (store, feed) = setup();
        seed_three(&store);

        let filters = DropFilters {
            start_date: Some("not-a-date".to_string()),
            ..Default::default()
        };
        let drops = feed
            .get_droplets(VIEWER, RIVER, None, 1, i64::MAX, false, &filters, 50)
            .unwrap();
        assert!(drops.is_empty());
    }

    #[test]
    fn date_range_filter_applies() {
        let (store, feed) = setup();
        seed_three(&store);

        let filters = DropFilters {
            start_date: Some("2012-07-02".to_string()),
            end_date: Some("2012-07-02".to_string()),
            ..Default::default()
        };
        // Day 2 publishes at noon; the end date anchors to midnight.
        let filters_wide = DropFilters {
            start_date: Some("2012-07-02".to_string()),
            end_date: Some("2012-07-03".to_string()),
            ..Default::default()
        };
        assert!(feed
            .get_droplets(VIEWER, RIVER, None, 1, i64::MAX, false, &filters, 50)
            .unwrap()
            .is_empty());
        assert_eq!(
            feed.get_droplets(VIEWER, RIVER, None, 1, i64::MAX, false, &filters_wide, 50)
                .unwrap()
                .iter()
                .map(|d| d.id)
                .collect::<Vec<_>>(),
            vec![102]
        );
    }

    #[test]
    fn viewer_score_is_a_left_join() {
        let (store, feed) = setup();
        seed_three(&store);
        store.seed_score(103, VIEWER, 2);

        let drops = feed
            .get_droplets(VIEWER, RIVER, None, 1, i64::MAX, false, &DropFilters::default(), 50)
            .unwrap();
        assert_eq!(drops[0].user_score, Some(2));
        assert_eq!(drops[1].user_score, None);
    }

    #[test]
    fn metadata_and_original_url_are_attached() {
        let (store, feed) = setup();
        store.seed_link(5, "https://example.org/original");
        let mut d = droplet(101, 1);
        d.original_url = Some(5);
        d.comment_count = 3;
        store.seed_droplet(d);
        add_drop(&store, 101, 1);
        store.seed_tag(101, 1, DropTag { id: 1, tag: "floods".to_string() });

        let drops = feed
            .get_droplets(VIEWER, RIVER, None, 1, i64::MAX, false, &DropFilters::default(), 50)
            .unwrap();
        assert_eq!(drops[0].original_url.as_deref(), Some("https://example.org/original"));
        assert_eq!(drops[0].comment_count, 3);
        assert_eq!(drops[0].tags.len(), 1);
        assert_eq!(drops[0].tags[0].tag, "floods");
        assert_eq!(drops[0].date_pub, "Jul  1, 2012 12:00:00 UTC");
    }

    #[test]
    fn cursor_mode_returns_ascending_after_cursor() {
        let (store, feed) = setup();
        seed_three(&store);

        let drops = feed
            .get_droplets_since_id(VIEWER, RIVER, 1, &DropFilters::default(), false, 100)
            .unwrap();
        assert_eq!(drops.iter().map(|d| d.sort_id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn cursor_at_the_head_is_empty() {
        let (store, feed) = setup();
        seed_three(&store);

        let drops = feed
            .get_droplets_since_id(VIEWER, RIVER, 3, &DropFilters::default(), false, 100)
            .unwrap();
        assert!(drops.is_empty());
    }

    #[test]
    fn nonempty_results_are_served_from_cache() {
        let (store, feed) = setup();
        seed_three(&store);

        let first = feed
            .get_droplets(VIEWER, RIVER, None, 1, i64::MAX, false, &DropFilters::default(), 50)
            .unwrap();
        assert_eq!(first.len(), 3);

        // A new drop is invisible to the identical request until the TTL
        // lapses.
        store.seed_droplet(droplet(104, 4));
        add_drop(&store, 104, 4);
        let second = feed
            .get_droplets(VIEWER, RIVER, None, 1, i64::MAX, false, &DropFilters::default(), 50)
            .unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn empty_results_are_never_cached() {
        let (store, feed) = setup();

        let empty = feed
            .get_droplets(VIEWER, RIVER, None, 1, i64::MAX, false, &DropFilters::default(), 50)
            .unwrap();
        assert!(empty.is_empty());

        store.seed_droplet(droplet(101, 1));
        add_drop(&store, 101, 1);
        let now_there = feed
            .get_droplets(VIEWER, RIVER, None, 1, i64::MAX, false, &DropFilters::default(), 50)
            .unwrap();
        assert_eq!(now_there.len(), 1);
    }

    #[test]
    fn max_droplet_id_is_cached_independently() {
        let (store, feed) = setup();
        seed_three(&store);

        assert_eq!(feed.get_max_droplet_id(RIVER).unwrap(), 3);

        store.seed_droplet(droplet(104, 4));
        add_drop(&store, 104, 4);
        // Stale for up to the short TTL.
        assert_eq!(feed.get_max_droplet_id(RIVER).unwrap(), 3);
    }

    #[test]
    fn missing_river_is_not_found() {
        let (_store, feed) = setup();
        let err = feed
            .get_droplets(VIEWER, 99, None, 1, i64::MAX, false, &DropFilters::default(), 50)
            .unwrap_err();
        assert!(matches!(err, crate::error::CoreError::NotFound("river")));
    }
}
