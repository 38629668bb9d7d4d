//! Expiry/extension state machine and public token handling.
//!
//! The engine never recomputes expiry from the clock on read: `is_expired`
//! reports the persisted flag, which an external scheduled process flips
//! when the wall-clock expiry passes.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

use river_types::models::River;

use crate::error::CoreError;

pub fn is_expired(river: &River) -> bool {
    river.expired
}

pub fn is_full(river: &River) -> bool {
    river.full
}

pub fn is_notified(river: &River) -> bool {
    river.expiry_notification_sent
}

/// Whole days remaining before expiry. Zero for an expired river, and zero
/// (never negative) once `now` is past the stored expiry even if the flag
/// has not been flipped yet.
pub fn days_to_expiry(river: &River, now: DateTime<Utc>) -> i64 {
    if river.expired {
        return 0;
    }
    let remaining = (river.date_expiry - now).num_seconds();
    if remaining <= 0 { 0 } else { remaining / 86_400 }
}

/// Pushes the expiry forward by `lifetime_days`, anchored on the current
/// expiry while it is still in the future, otherwise on `now`. Clears the
/// expired and notification flags, reactivates the river and increments the
/// extension counter. Full rivers are never reactivated.
pub fn extend(river: &mut River, lifetime_days: i64, now: DateTime<Utc>) -> Result<(), CoreError> {
    if river.full {
        return Err(CoreError::RiverFull);
    }
    let anchor = if days_to_expiry(river, now) > 0 {
        river.date_expiry
    } else {
        now
    };
    river.date_expiry = anchor + Duration::days(lifetime_days);
    river.expired = false;
    river.active = true;
    river.expiry_notification_sent = false;
    river.extension_count += 1;
    Ok(())
}

/// Fresh opaque token: random seed mixed with the account path and river
/// name, hashed.
pub fn generate_token(account_path: &str, river_name: &str) -> String {
    let seed: u128 = rand::rng().random();
    let mut hasher = Sha256::new();
    hasher.update(seed.to_be_bytes());
    hasher.update(account_path.as_bytes());
    hasher.update(river_name.as_bytes());
    hex::encode(hasher.finalize())
}

/// Exact match against the stored token; a river with no token set never
/// validates.
pub fn is_valid_token(river: &River, candidate: &str) -> bool {
    matches!(river.public_token.as_deref(), Some(token) if token == candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use river_types::models::RiverLayout;

    fn river(expiry: DateTime<Utc>) -> River {
        River {
            id: 1,
            name: "Flood Watch".to_string(),
            slug: "flood-watch".to_string(),
            account_id: 1,
            public: false,
            default_layout: RiverLayout::Drops,
            date_added: Utc::now(),
            date_expiry: expiry,
            active: true,
            expired: false,
            full: false,
            expiry_notification_sent: false,
            extension_count: 0,
            drop_quota: 10_000,
            max_drop_id: 0,
            public_token: None,
        }
    }

    #[test]
    fn days_to_expiry_is_zero_when_expired() {
        let now = Utc::now();
        let mut r = river(now + Duration::days(10));
        r.expired = true;
        assert_eq!(days_to_expiry(&r, now), 0);
    }

    #[test]
    fn days_to_expiry_never_negative() {
        let now = Utc::now();
        // Past the stored expiry but the flag has not been flipped yet.
        let r = river(now - Duration::days(3));
        assert_eq!(days_to_expiry(&r, now), 0);
    }

    #[test]
    fn days_to_expiry_counts_whole_days() {
        let now = Utc::now();
        let r = river(now + Duration::days(5) + Duration::hours(3));
        assert_eq!(days_to_expiry(&r, now), 5);
    }

    #[test]
    fn extend_refuses_full_river() {
        let now = Utc::now();
        let expiry = now + Duration::days(2);
        let mut r = river(expiry);
        r.full = true;
        r.expired = true;

        let err = extend(&mut r, 14, now).unwrap_err();
        assert!(matches!(err, CoreError::RiverFull));
        // Nothing changed.
        assert_eq!(r.date_expiry, expiry);
        assert!(r.expired);
        assert_eq!(r.extension_count, 0);
    }

    #[test]
    fn extend_anchors_on_future_expiry() {
        let now = Utc::now();
        let expiry = now + Duration::days(2);
        let mut r = river(expiry);
        r.expiry_notification_sent = true;

        extend(&mut r, 14, now).unwrap();
        assert_eq!(r.date_expiry, expiry + Duration::days(14));
        assert_eq!(r.extension_count, 1);
        assert!(r.active);
        assert!(!r.expired);
        assert!(!r.expiry_notification_sent);
    }

    #[test]
    fn extend_anchors_on_now_once_lapsed() {
        let now = Utc::now();
        let mut r = river(now - Duration::days(30));
        r.expired = true;
        r.active = false;

        extend(&mut r, 14, now).unwrap();
        assert_eq!(r.date_expiry, now + Duration::days(14));
        assert!(r.active);
        assert!(!r.expired);
    }

    #[test]
    fn token_requires_one_to_be_set() {
        let r = river(Utc::now());
        assert!(!is_valid_token(&r, "anything"));
    }

    #[test]
    fn token_matches_exactly() {
        let mut r = river(Utc::now());
        r.public_token = Some("abc123".to_string());
        assert!(is_valid_token(&r, "abc123"));
        assert!(!is_valid_token(&r, "abc124"));
    }

    #[test]
    fn generated_tokens_are_unique() {
        let a = generate_token("default", "Flood Watch");
        let b = generate_token("default", "Flood Watch");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
