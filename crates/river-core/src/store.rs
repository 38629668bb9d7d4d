//! Storage seams.
//!
//! The engine talks to its storage backend through `Store`: plain reads go
//! through [`Store::read`], multi-table mutations through [`Store::with_tx`]
//! which must apply everything or nothing. `river-db` implements these over
//! rusqlite; [`crate::memory::MemoryStore`] is an in-memory implementation
//! used by the test suites.

use chrono::{DateTime, Utc};
use thiserror::Error;

use river_types::models::{
    Account, ChannelFilter, ChannelFilterOption, Collaborator, DropLink, DropPlace, DropTag, River,
    User,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),

    /// A write would break a structural invariant (e.g. a quota counter
    /// driven below zero).
    #[error("storage constraint violated: {0}")]
    Constraint(&'static str),
}

/// Sentinel publish timestamp guarding against unmigrated rows; association
/// rows carrying it are excluded from every feed query.
pub fn zero_date() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

/// Fields of a river not yet assigned an id.
#[derive(Debug, Clone)]
pub struct NewRiver {
    pub name: String,
    pub slug: String,
    pub account_id: i64,
    pub public: bool,
    pub date_added: DateTime<Utc>,
    pub date_expiry: DateTime<Utc>,
    pub drop_quota: i64,
}

/// Raw feed row before metadata enrichment.
#[derive(Debug, Clone)]
pub struct DropRow {
    pub id: i64,
    pub sort_id: i64,
    pub title: String,
    pub content: String,
    pub channel: String,
    pub identity_name: String,
    pub identity_avatar: String,
    pub date_pub: DateTime<Utc>,
    pub user_score: Option<i64>,
    pub original_url: Option<String>,
    pub comment_count: i64,
}

/// Windowing for a feed query: one page of history, or everything after a
/// cursor.
#[derive(Debug, Clone)]
pub enum DropWindow {
    /// Association id ≤ `max_sort_id`, newest publish date first.
    Page {
        max_sort_id: i64,
        limit: u32,
        offset: u64,
    },
    /// Association id > `since_sort_id`, ascending, from offset 0.
    Since { since_sort_id: i64, limit: u32 },
}

/// Validated filter predicates, produced by
/// [`crate::feed::DropFilters::compile`].
#[derive(Debug, Clone, Default)]
pub struct CompiledFilters {
    pub channels: Vec<String>,
    pub tags: Vec<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct DropQuery {
    pub river_id: i64,
    /// Account owning the river; scopes the tag filter.
    pub account_id: i64,
    /// Viewer whose personalized score is left-joined onto each row.
    pub viewer_id: i64,
    /// Detail fetch: return exactly this drop, ignoring the window.
    pub drop_id: Option<i64>,
    pub window: DropWindow,
    pub photos_only: bool,
    pub filters: CompiledFilters,
}

/// Account-level usage counter for one (channel, option key) pair.
/// `limit == 0` means unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelQuota {
    pub used: i64,
    pub limit: i64,
}

/// A river row as matched by the search operation.
#[derive(Debug, Clone)]
pub struct SearchRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub account_id: i64,
    pub account_path: String,
    pub public: bool,
}

pub trait StoreReader {
    fn river(&self, id: i64) -> Result<Option<River>, StoreError>;
    fn river_by_slug(&self, account_id: i64, slug: &str) -> Result<Option<River>, StoreError>;
    fn rivers_by_ids(&self, ids: &[i64]) -> Result<Vec<River>, StoreError>;
    fn rivers_for_account(&self, account_id: i64) -> Result<Vec<River>, StoreError>;

    fn account(&self, id: i64) -> Result<Option<Account>, StoreError>;
    fn account_for_user(&self, user_id: i64) -> Result<Option<Account>, StoreError>;
    fn user(&self, id: i64) -> Result<Option<User>, StoreError>;

    fn collaborator(&self, river_id: i64, user_id: i64)
    -> Result<Option<Collaborator>, StoreError>;
    /// Collaborator rows joined with user identity and account path.
    fn collaborators(&self, river_id: i64)
    -> Result<Vec<(Collaborator, User, String)>, StoreError>;
    /// Ids of rivers the user actively collaborates on.
    fn active_collaborations(&self, user_id: i64) -> Result<Vec<i64>, StoreError>;

    fn is_subscriber(&self, river_id: i64, user_id: i64) -> Result<bool, StoreError>;
    fn subscriber_count(&self, river_id: i64) -> Result<u64, StoreError>;

    fn channel_filters(
        &self,
        river_id: i64,
        enabled_only: bool,
    ) -> Result<Vec<ChannelFilter>, StoreError>;
    fn channel_filter_by_key(
        &self,
        river_id: i64,
        channel: &str,
    ) -> Result<Option<ChannelFilter>, StoreError>;
    fn channel_filter_by_id(
        &self,
        river_id: i64,
        id: i64,
    ) -> Result<Option<ChannelFilter>, StoreError>;
    fn channel_filter_options(
        &self,
        channel_filter_id: i64,
    ) -> Result<Vec<ChannelFilterOption>, StoreError>;
    /// Per-option-key usage counts for one channel filter, credited back to
    /// the account ledger when the river is deleted.
    fn channel_quota_usage(&self, channel_filter_id: i64)
    -> Result<Vec<(String, i64)>, StoreError>;
    fn channel_quota(
        &self,
        account_id: i64,
        channel: &str,
        key: &str,
    ) -> Result<ChannelQuota, StoreError>;

    fn fetch_drops(&self, query: &DropQuery) -> Result<Vec<DropRow>, StoreError>;
    fn drop_tags(
        &self,
        account_id: i64,
        drop_ids: &[i64],
    ) -> Result<Vec<(i64, DropTag)>, StoreError>;
    fn drop_places(
        &self,
        account_id: i64,
        drop_ids: &[i64],
    ) -> Result<Vec<(i64, DropPlace)>, StoreError>;
    fn drop_links(
        &self,
        account_id: i64,
        drop_ids: &[i64],
    ) -> Result<Vec<(i64, DropLink)>, StoreError>;

    /// The river's denormalized max association id.
    fn max_drop_id(&self, river_id: i64) -> Result<i64, StoreError>;

    /// Rivers whose name or slug contains `term`, case-insensitively.
    fn rivers_like(&self, term: &str) -> Result<Vec<SearchRow>, StoreError>;
}

pub trait StoreWriter: StoreReader {
    fn insert_river(&mut self, river: &NewRiver) -> Result<River, StoreError>;
    fn update_river(&mut self, river: &River) -> Result<(), StoreError>;
    fn delete_river(&mut self, river_id: i64) -> Result<(), StoreError>;

    /// Decrements the account's remaining river quota by one. The caller
    /// checks availability first; a counter at zero is a constraint error.
    fn debit_river_quota(&mut self, account_id: i64) -> Result<(), StoreError>;
    fn credit_river_quota(&mut self, account_id: i64, amount: i64) -> Result<(), StoreError>;
    fn debit_channel_quota(
        &mut self,
        account_id: i64,
        channel: &str,
        key: &str,
        amount: i64,
    ) -> Result<(), StoreError>;
    fn credit_channel_quota(
        &mut self,
        account_id: i64,
        channel: &str,
        key: &str,
        amount: i64,
    ) -> Result<(), StoreError>;

    fn delete_channel_filter_options_for_river(&mut self, river_id: i64)
    -> Result<(), StoreError>;
    fn delete_channel_filters_for_river(&mut self, river_id: i64) -> Result<(), StoreError>;
    fn delete_river_drops(&mut self, river_id: i64) -> Result<(), StoreError>;
    fn delete_subscriptions_for_river(&mut self, river_id: i64) -> Result<(), StoreError>;
    fn delete_collaborators_for_river(&mut self, river_id: i64) -> Result<(), StoreError>;

    fn insert_channel_filter(
        &mut self,
        river_id: i64,
        channel: &str,
        enabled: bool,
        date_added: DateTime<Utc>,
    ) -> Result<ChannelFilter, StoreError>;
    fn set_channel_filter_enabled(&mut self, id: i64, enabled: bool) -> Result<(), StoreError>;
    fn delete_channel_filter(&mut self, id: i64) -> Result<(), StoreError>;
    fn insert_channel_filter_option(
        &mut self,
        channel_filter_id: i64,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<ChannelFilterOption, StoreError>;
    fn delete_channel_filter_option(
        &mut self,
        channel_filter_id: i64,
        option_id: i64,
    ) -> Result<(), StoreError>;

    /// At most one row per (river, user); replaces the flags when the pair
    /// already exists.
    fn upsert_collaborator(&mut self, collaborator: &Collaborator) -> Result<(), StoreError>;
    fn remove_collaborator(&mut self, river_id: i64, user_id: i64) -> Result<(), StoreError>;

    fn add_subscription(&mut self, river_id: i64, user_id: i64) -> Result<(), StoreError>;
    fn remove_subscription(&mut self, river_id: i64, user_id: i64) -> Result<(), StoreError>;

    /// Links a droplet into the river and bumps the denormalized max
    /// association id. Returns the new association (sort) id.
    fn add_drop(
        &mut self,
        river_id: i64,
        droplet_id: i64,
        date_pub: DateTime<Utc>,
    ) -> Result<i64, StoreError>;
    /// Removes the association only, never the droplet itself.
    fn remove_drop(&mut self, river_id: i64, droplet_id: i64) -> Result<(), StoreError>;
}

pub trait Store: Send + Sync + 'static {
    fn read<T>(&self, f: impl FnOnce(&dyn StoreReader) -> Result<T, StoreError>)
    -> Result<T, StoreError>
    where
        Self: Sized;

    /// Runs `f` inside a transaction. Committed only when `f` returns `Ok`;
    /// any error rolls every mutation back.
    fn with_tx<T, E>(&self, f: impl FnOnce(&mut dyn StoreWriter) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
        Self: Sized;
}
