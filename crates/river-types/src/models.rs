use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default view a river opens in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiverLayout {
    Drops,
    List,
    Photos,
}

impl RiverLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiverLayout::Drops => "drops",
            RiverLayout::List => "list",
            RiverLayout::Photos => "photos",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "drops" => Some(RiverLayout::Drops),
            "list" => Some(RiverLayout::List),
            "photos" => Some(RiverLayout::Photos),
            _ => None,
        }
    }
}

impl Default for RiverLayout {
    fn default() -> Self {
        RiverLayout::Drops
    }
}

/// A named, owned, filterable feed of content items.
///
/// The slug is derived from the name once at creation and is not re-derived
/// on rename. It is not guaranteed unique; callers detect collisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct River {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub account_id: i64,
    pub public: bool,
    pub default_layout: RiverLayout,
    pub date_added: DateTime<Utc>,
    pub date_expiry: DateTime<Utc>,
    pub active: bool,
    pub expired: bool,
    pub full: bool,
    pub expiry_notification_sent: bool,
    pub extension_count: u32,
    pub drop_quota: i64,
    /// Denormalized highest rivers_drops association id, bumped on ingest.
    pub max_drop_id: i64,
    /// Opaque secret granting access to a private river. Unset until first
    /// requested.
    pub public_token: Option<String>,
}

/// Per-river filter on a single source type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelFilter {
    pub id: i64,
    pub river_id: i64,
    pub channel: String,
    pub enabled: bool,
    pub date_added: DateTime<Utc>,
}

/// Key/value option attached to a channel filter. The value is an opaque
/// structured payload owned by the channel plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelFilterOption {
    pub id: i64,
    pub channel_filter_id: i64,
    pub key: String,
    pub value: serde_json::Value,
}

/// A user granted read or read-write access to a non-owned river.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collaborator {
    pub river_id: i64,
    pub user_id: i64,
    pub read_only: bool,
    pub active: bool,
}

/// Owning account, referenced by rivers. Holds the quota counters the
/// ledger mutates. `public_account` marks the distinguished system account
/// whose rivers are owned by everyone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub account_path: String,
    pub public_account: bool,
    pub river_quota_remaining: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub email: String,
}

/// One enriched feed row, as returned by both retrieval modes and stored
/// in the fingerprint cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropSummary {
    pub id: i64,
    /// Monotonically increasing association-row id; the cursor for
    /// since-id polling.
    pub sort_id: i64,
    pub title: String,
    pub content: String,
    pub channel: String,
    pub identity_name: String,
    pub identity_avatar: String,
    /// Formatted as e.g. "Jul  9, 2012 14:30:00 UTC".
    pub date_pub: String,
    pub user_score: Option<i64>,
    pub original_url: Option<String>,
    pub comment_count: i64,
    pub tags: Vec<DropTag>,
    pub places: Vec<DropPlace>,
    pub links: Vec<DropLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropTag {
    pub id: i64,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropPlace {
    pub id: i64,
    pub place_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropLink {
    pub id: i64,
    pub url: String,
}
