//! Capability resolution for a (river, viewer) pair.
//!
//! These are boolean facts, not enforcement: the boundary layer decides
//! what to do with them.

use std::sync::Arc;

use river_types::models::River;

use crate::error::CoreError;
use crate::store::{Store, StoreError, StoreReader};

pub struct Permissions<S> {
    store: Arc<S>,
}

impl<S: Store> Permissions<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Ownership: the account creator, any user at all when the river
    /// belongs to the distinguished public account, or an active
    /// non-read-only collaborator. A viewer that does not exist owns
    /// nothing.
    pub fn is_owner(&self, river: &River, user_id: i64) -> Result<bool, CoreError> {
        let owned = self.store.read(|r| {
            if r.user(user_id)?.is_none() {
                return Ok(false);
            }
            let account = river_account(r, river)?;
            if account.public_account || account.user_id == user_id {
                return Ok(true);
            }
            Ok(match r.collaborator(river.id, user_id)? {
                Some(c) => c.active && !c.read_only,
                None => false,
            })
        })?;
        Ok(owned)
    }

    /// Any collaborator row at all, active or not, read-only or not.
    /// Broader than `is_owner`.
    pub fn is_collaborator(&self, river: &River, user_id: i64) -> Result<bool, CoreError> {
        let collaborating = self.store.read(|r| {
            if r.user(user_id)?.is_none() {
                return Ok(false);
            }
            Ok(r.collaborator(river.id, user_id)?.is_some())
        })?;
        Ok(collaborating)
    }

    pub fn is_subscriber(&self, river: &River, user_id: i64) -> Result<bool, CoreError> {
        Ok(self.store.read(|r| r.is_subscriber(river.id, user_id))?)
    }

    /// Strict creator check: ignores collaborators and the public-account
    /// exception.
    pub fn is_creator(&self, river: &River, user_id: i64) -> Result<bool, CoreError> {
        let created = self
            .store
            .read(|r| Ok(river_account(r, river)?.user_id == user_id))?;
        Ok(created)
    }
}

fn river_account(
    reader: &dyn StoreReader,
    river: &River,
) -> Result<river_types::models::Account, StoreError> {
    reader
        .account(river.account_id)?
        .ok_or(StoreError::Constraint("river references missing account"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    use river_types::models::{Account, Collaborator, User};

    use crate::memory::MemoryStore;
    use crate::store::NewRiver;

    const CREATOR: i64 = 1;
    const VISITOR: i64 = 2;

    fn user(id: i64, username: &str) -> User {
        User {
            id,
            username: username.to_string(),
            name: username.to_string(),
            email: format!("{username}@example.org"),
        }
    }

    fn setup(public_account: bool) -> (Arc<MemoryStore>, River, Permissions<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(Account {
            id: 1,
            user_id: CREATOR,
            account_path: "default".to_string(),
            public_account,
            river_quota_remaining: 5,
        });
        store.seed_user(user(CREATOR, "creator"));
        store.seed_user(user(VISITOR, "visitor"));
        let river = store
            .with_tx(|tx| {
                tx.insert_river(&NewRiver {
                    name: "Flood Watch".to_string(),
                    slug: "flood-watch".to_string(),
                    account_id: 1,
                    public: false,
                    date_added: Utc::now(),
                    date_expiry: Utc::now() + chrono::Duration::days(14),
                    drop_quota: 10_000,
                })
            })
            .unwrap();
        let permissions = Permissions::new(store.clone());
        (store, river, permissions)
    }

    fn collaborate(store: &MemoryStore, river_id: i64, user_id: i64, read_only: bool, active: bool) {
        store
            .with_tx(|tx| {
                tx.upsert_collaborator(&Collaborator {
                    river_id,
                    user_id,
                    read_only,
                    active,
                })
            })
            .unwrap();
    }

    #[test]
    fn missing_viewer_owns_nothing() {
        let (_store, river, permissions) = setup(false);
        assert!(!permissions.is_owner(&river, 99).unwrap());
        assert!(!permissions.is_collaborator(&river, 99).unwrap());
    }

    #[test]
    fn creator_is_owner_and_creator() {
        let (_store, river, permissions) = setup(false);
        assert!(permissions.is_owner(&river, CREATOR).unwrap());
        assert!(permissions.is_creator(&river, CREATOR).unwrap());
        assert!(!permissions.is_owner(&river, VISITOR).unwrap());
        assert!(!permissions.is_creator(&river, VISITOR).unwrap());
    }

    #[test]
    fn public_account_rivers_are_owned_by_everyone() {
        let (_store, river, permissions) = setup(true);
        assert!(permissions.is_owner(&river, VISITOR).unwrap());
        // Strict creator check ignores the public-account exception.
        assert!(!permissions.is_creator(&river, VISITOR).unwrap());
    }

    #[test]
    fn read_only_collaborator_is_not_an_owner() {
        let (store, river, permissions) = setup(false);
        collaborate(&store, river.id, VISITOR, true, true);
        assert!(!permissions.is_owner(&river, VISITOR).unwrap());
        assert!(permissions.is_collaborator(&river, VISITOR).unwrap());
    }

    #[test]
    fn active_read_write_collaborator_is_an_owner() {
        let (store, river, permissions) = setup(false);
        collaborate(&store, river.id, VISITOR, false, true);
        assert!(permissions.is_owner(&river, VISITOR).unwrap());
    }

    #[test]
    fn inactive_collaborator_is_not_an_owner() {
        let (store, river, permissions) = setup(false);
        collaborate(&store, river.id, VISITOR, false, false);
        assert!(!permissions.is_owner(&river, VISITOR).unwrap());
        assert!(permissions.is_collaborator(&river, VISITOR).unwrap());
    }

    #[test]
    fn subscription_is_independent_of_collaboration() {
        let (store, river, permissions) = setup(false);
        store
            .with_tx(|tx| tx.add_subscription(river.id, VISITOR))
            .unwrap();
        assert!(permissions.is_subscriber(&river, VISITOR).unwrap());
        assert!(!permissions.is_collaborator(&river, VISITOR).unwrap());
    }
}
