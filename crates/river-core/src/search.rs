//! Name/slug substring search over rivers visible to a user.

use std::collections::HashSet;
use std::sync::Arc;

use river_types::api::SearchHit;

use crate::error::CoreError;
use crate::store::Store;

pub struct SearchMatcher<S> {
    store: Arc<S>,
}

impl<S: Store> SearchMatcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Rivers whose name or slug contains `term`, case-insensitively.
    /// Visible set: rivers of the searching user's account and rivers the
    /// user actively collaborates on (regardless of visibility), plus all
    /// other public rivers. A river collaborated on is reported once, from
    /// the user's set, never again from the public set.
    pub fn rivers_like(&self, term: &str, user_id: i64) -> Result<Vec<SearchHit>, CoreError> {
        let hits = self.store.read(|r| {
            if r.user(user_id)?.is_none() {
                return Ok(Vec::new());
            }
            let account_id = r.account_for_user(user_id)?.map(|a| a.id);
            let collaborating: HashSet<i64> =
                r.active_collaborations(user_id)?.into_iter().collect();

            let mut seen = HashSet::new();
            let mut hits = Vec::new();
            for row in r.rivers_like(term)? {
                let own = Some(row.account_id) == account_id || collaborating.contains(&row.id);
                let visible = own || (row.public && Some(row.account_id) != account_id);
                if visible && seen.insert(row.id) {
                    hits.push(SearchHit {
                        id: row.id,
                        name: row.name,
                        slug: row.slug,
                        account_path: row.account_path,
                    });
                }
            }
            Ok(hits)
        })?;
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    use river_types::models::{Account, Collaborator, User};

    use crate::memory::MemoryStore;
    use crate::store::{NewRiver, StoreError};

    fn seed_user(store: &MemoryStore, id: i64, account_id: i64, path: &str) {
        store.seed_user(User {
            id,
            username: path.to_string(),
            name: path.to_string(),
            email: format!("{path}@example.org"),
        });
        store.seed_account(Account {
            id: account_id,
            user_id: id,
            account_path: path.to_string(),
            public_account: false,
            river_quota_remaining: 5,
        });
    }

    fn seed_river(store: &MemoryStore, account_id: i64, name: &str, slug: &str, public: bool) -> i64 {
        store
            .with_tx(|tx| {
                let river = tx.insert_river(&NewRiver {
                    name: name.to_string(),
                    slug: slug.to_string(),
                    account_id,
                    public,
                    date_added: Utc::now(),
                    date_expiry: Utc::now() + chrono::Duration::days(14),
                    drop_quota: 10_000,
                })?;
                Ok::<_, StoreError>(river.id)
            })
            .unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, SearchMatcher<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        seed_user(&store, 1, 1, "mine");
        seed_user(&store, 2, 2, "theirs");
        let matcher = SearchMatcher::new(store.clone());
        (store, matcher)
    }

    #[test]
    fn own_private_rivers_match() {
        let (store, matcher) = setup();
        seed_river(&store, 1, "Flood Watch", "flood-watch", false);

        let hits = matcher.rivers_like("flood", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].account_path, "mine");
    }

    #[test]
    fn foreign_private_rivers_do_not_match() {
        let (store, matcher) = setup();
        seed_river(&store, 2, "Flood Watch", "flood-watch", false);

        assert!(matcher.rivers_like("flood", 1).unwrap().is_empty());
    }

    #[test]
    fn foreign_public_rivers_match() {
        let (store, matcher) = setup();
        seed_river(&store, 2, "Flood Watch", "flood-watch", true);

        let hits = matcher.rivers_like("FLOOD", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].account_path, "theirs");
    }

    #[test]
    fn collaborated_public_river_is_reported_once() {
        let (store, matcher) = setup();
        let river_id = seed_river(&store, 2, "Flood Watch", "flood-watch", true);
        store
            .with_tx(|tx| {
                tx.upsert_collaborator(&Collaborator {
                    river_id,
                    user_id: 1,
                    read_only: false,
                    active: true,
                })
            })
            .unwrap();

        let hits = matcher.rivers_like("flood", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, river_id);
    }

    #[test]
    fn collaborated_private_river_is_visible() {
        let (store, matcher) = setup();
        let river_id = seed_river(&store, 2, "Flood Watch", "flood-watch", false);
        store
            .with_tx(|tx| {
                tx.upsert_collaborator(&Collaborator {
                    river_id,
                    user_id: 1,
                    read_only: true,
                    active: true,
                })
            })
            .unwrap();

        let hits = matcher.rivers_like("flood", 1).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn slug_matches_too() {
        let (store, matcher) = setup();
        seed_river(&store, 1, "Nairobi Updates", "nairobi-updates", false);

        let hits = matcher.rivers_like("nairobi-up", 1).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn unknown_searcher_sees_nothing() {
        let (store, matcher) = setup();
        seed_river(&store, 1, "Flood Watch", "flood-watch", true);

        assert!(matcher.rivers_like("flood", 99).unwrap().is_empty());
    }
}
