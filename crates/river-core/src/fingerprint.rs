//! Deterministic cache keys.
//!
//! A fingerprint hashes the full semantic parameter set of a feed request,
//! each field on its own line so that adjacent numeric fields can never
//! collide. Filter sets are folded in through their canonical serialization,
//! so two logically identical filter sets always produce the same key.

use sha2::{Digest, Sha256};

use crate::feed::DropFilters;

/// Parameters of an offset-mode retrieval.
#[derive(Debug)]
pub struct DropsFingerprint<'a> {
    pub viewer_id: i64,
    pub river_id: i64,
    pub drop_id: Option<i64>,
    pub page: u32,
    pub max_id: i64,
    pub filters: &'a DropFilters,
    pub photos: bool,
}

impl DropsFingerprint<'_> {
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "viewer={}\nriver={}\ndrop={}\npage={}\nmax_id={}\nfilters={}\nphotos={}",
            self.viewer_id,
            self.river_id,
            self.drop_id.unwrap_or(0),
            self.page,
            self.max_id,
            self.filters.canonical(),
            self.photos as u8,
        ));
        format!("river_drops_{}", hex::encode(hasher.finalize()))
    }
}

/// Parameters of a cursor-mode retrieval.
#[derive(Debug)]
pub struct SinceFingerprint<'a> {
    pub viewer_id: i64,
    pub river_id: i64,
    pub since_id: i64,
    pub filters: &'a DropFilters,
    pub photos: bool,
}

impl SinceFingerprint<'_> {
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "viewer={}\nriver={}\nsince={}\nfilters={}\nphotos={}",
            self.viewer_id,
            self.river_id,
            self.since_id,
            self.filters.canonical(),
            self.photos as u8,
        ));
        format!("river_drops_since_{}", hex::encode(hasher.finalize()))
    }
}

/// Key for the river's max association id; its own namespace because it is
/// polled on every refresh and cached on a short TTL.
pub fn max_drop_id_key(river_id: i64) -> String {
    format!("river_max_id_{river_id}")
}

/// Key for a user's cached river listing; the only key explicitly purged on
/// river creation.
pub fn user_rivers_key(user_id: i64) -> String {
    format!("user_rivers_{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters() -> DropFilters {
        DropFilters {
            channels: vec!["rss".to_string(), "twitter".to_string()],
            tags: vec!["floods".to_string()],
            start_date: Some("2012-01-01".to_string()),
            end_date: None,
        }
    }

    fn base<'a>(f: &'a DropFilters) -> DropsFingerprint<'a> {
        DropsFingerprint {
            viewer_id: 7,
            river_id: 3,
            drop_id: None,
            page: 1,
            max_id: 1000,
            filters: f,
            photos: false,
        }
    }

    #[test]
    fn identical_requests_share_a_key() {
        let f = filters();
        assert_eq!(base(&f).cache_key(), base(&f).cache_key());
    }

    #[test]
    fn every_field_participates() {
        let f = filters();
        let reference = base(&f).cache_key();

        let mut fp = base(&f);
        fp.viewer_id = 8;
        assert_ne!(fp.cache_key(), reference);

        let mut fp = base(&f);
        fp.river_id = 4;
        assert_ne!(fp.cache_key(), reference);

        let mut fp = base(&f);
        fp.drop_id = Some(42);
        assert_ne!(fp.cache_key(), reference);

        let mut fp = base(&f);
        fp.page = 2;
        assert_ne!(fp.cache_key(), reference);

        let mut fp = base(&f);
        fp.max_id = 999;
        assert_ne!(fp.cache_key(), reference);

        let mut fp = base(&f);
        fp.photos = true;
        assert_ne!(fp.cache_key(), reference);

        let other = DropFilters::default();
        let mut fp = base(&other);
        fp.filters = &other;
        assert_ne!(fp.cache_key(), reference);
    }

    #[test]
    fn adjacent_numeric_fields_cannot_collide() {
        let f = DropFilters::default();
        let a = DropsFingerprint {
            viewer_id: 1,
            river_id: 23,
            drop_id: None,
            page: 1,
            max_id: 10,
            filters: &f,
            photos: false,
        };
        let b = DropsFingerprint {
            viewer_id: 12,
            river_id: 3,
            drop_id: None,
            page: 1,
            max_id: 10,
            filters: &f,
            photos: false,
        };
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn filter_order_is_canonicalized() {
        let a = DropFilters {
            channels: vec!["twitter".to_string(), "rss".to_string()],
            tags: vec!["b".to_string(), "a".to_string()],
            ..Default::default()
        };
        let b = DropFilters {
            channels: vec!["rss".to_string(), "twitter".to_string()],
            tags: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        };
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn modes_use_distinct_namespaces() {
        let f = DropFilters::default();
        let page = base(&f).cache_key();
        let since = SinceFingerprint {
            viewer_id: 7,
            river_id: 3,
            since_id: 0,
            filters: &f,
            photos: false,
        }
        .cache_key();
        assert!(page.starts_with("river_drops_"));
        assert!(since.starts_with("river_drops_since_"));
        assert_ne!(page, since);
    }
}
