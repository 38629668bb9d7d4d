//! Database row types, distinct from the domain models so the column
//! encodings (TEXT datetimes, JSON option values) stay local to this crate.

use chrono::{DateTime, NaiveDateTime, Utc};

use river_core::store::StoreError;
use river_types::models::{ChannelFilter, ChannelFilterOption, River, RiverLayout};

/// Column encoding for timestamps: second precision, lexicographic order is
/// chronological.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.format(DATETIME_FORMAT).to_string()
}

pub fn decode_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| StoreError::Constraint("unparseable stored timestamp"))
}

pub struct RiverRow {
    pub id: i64,
    pub river_name: String,
    pub river_name_url: String,
    pub account_id: i64,
    pub river_public: bool,
    pub default_layout: String,
    pub river_date_add: String,
    pub river_date_expiry: String,
    pub river_active: bool,
    pub river_expired: bool,
    pub river_full: bool,
    pub expiry_notification_sent: bool,
    pub extension_count: i64,
    pub drop_quota: i64,
    pub max_drop_id: i64,
    pub public_token: Option<String>,
}

impl RiverRow {
    pub fn into_river(self) -> Result<River, StoreError> {
        Ok(River {
            id: self.id,
            name: self.river_name,
            slug: self.river_name_url,
            account_id: self.account_id,
            public: self.river_public,
            default_layout: RiverLayout::parse(&self.default_layout)
                .ok_or(StoreError::Constraint("unknown stored layout"))?,
            date_added: decode_ts(&self.river_date_add)?,
            date_expiry: decode_ts(&self.river_date_expiry)?,
            active: self.river_active,
            expired: self.river_expired,
            full: self.river_full,
            expiry_notification_sent: self.expiry_notification_sent,
            extension_count: self.extension_count as u32,
            drop_quota: self.drop_quota,
            max_drop_id: self.max_drop_id,
            public_token: self.public_token,
        })
    }
}

pub struct ChannelFilterRow {
    pub id: i64,
    pub river_id: i64,
    pub channel: String,
    pub filter_enabled: bool,
    pub filter_date_add: String,
}

impl ChannelFilterRow {
    pub fn into_filter(self) -> Result<ChannelFilter, StoreError> {
        Ok(ChannelFilter {
            id: self.id,
            river_id: self.river_id,
            channel: self.channel,
            enabled: self.filter_enabled,
            date_added: decode_ts(&self.filter_date_add)?,
        })
    }
}

pub struct ChannelFilterOptionRow {
    pub id: i64,
    pub channel_filter_id: i64,
    pub key: String,
    pub value: String,
}

impl ChannelFilterOptionRow {
    pub fn into_option(self) -> Result<ChannelFilterOption, StoreError> {
        Ok(ChannelFilterOption {
            id: self.id,
            channel_filter_id: self.channel_filter_id,
            key: self.key,
            value: serde_json::from_str(&self.value)
                .map_err(|_| StoreError::Constraint("unparseable stored option value"))?,
        })
    }
}
