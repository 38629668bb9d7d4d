//! River CRUD, lifecycle, collaborator and subscription operations.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use river_types::api::{CollaboratorInfo, RiverSummary, UpdateRiverRequest};
use river_types::events::RiverEvent;
use river_types::models::{Account, Collaborator, River, RiverLayout};

use crate::cache::FeedCache;
use crate::error::CoreError;
use crate::events::EventSink;
use crate::fingerprint::user_rivers_key;
use crate::lifecycle;
use crate::permissions::Permissions;
use crate::quota;
use crate::store::{NewRiver, Store};

pub const MAX_NAME_LEN: usize = 255;

/// Installation-wide river defaults, read from the environment by the
/// server binary.
#[derive(Debug, Clone)]
pub struct RiverDefaults {
    /// Days a river stays active before it expires.
    pub lifetime_days: i64,
    /// Drops a river may hold before it is flagged full.
    pub drop_quota: i64,
    /// TTL of the cached per-user river listing.
    pub listing_ttl: Duration,
}

impl Default for RiverDefaults {
    fn default() -> Self {
        Self {
            lifetime_days: 14,
            drop_quota: 10_000,
            listing_ttl: Duration::from_secs(3600),
        }
    }
}

pub struct RiverService<S> {
    store: Arc<S>,
    cache: Arc<dyn FeedCache>,
    events: Arc<dyn EventSink>,
    permissions: Permissions<S>,
    defaults: RiverDefaults,
}

impl<S: Store> RiverService<S> {
    pub fn new(
        store: Arc<S>,
        cache: Arc<dyn FeedCache>,
        events: Arc<dyn EventSink>,
        defaults: RiverDefaults,
    ) -> Self {
        Self {
            permissions: Permissions::new(store.clone()),
            store,
            cache,
            events,
            defaults,
        }
    }

    pub fn river(&self, river_id: i64) -> Result<River, CoreError> {
        self.store
            .read(|r| r.river(river_id))?
            .ok_or(CoreError::NotFound("river"))
    }

    pub fn river_by_slug(&self, account_id: i64, slug: &str) -> Result<River, CoreError> {
        self.store
            .read(|r| r.river_by_slug(account_id, slug))?
            .ok_or(CoreError::NotFound("river"))
    }

    pub fn is_valid_river_id(&self, river_id: i64) -> Result<bool, CoreError> {
        Ok(self.store.read(|r| r.river(river_id))?.is_some())
    }

    pub fn rivers_by_ids(&self, ids: &[i64]) -> Result<Vec<River>, CoreError> {
        Ok(self.store.read(|r| r.rivers_by_ids(ids))?)
    }

    pub fn account_for_user(&self, user_id: i64) -> Result<Account, CoreError> {
        self.store
            .read(|r| r.account_for_user(user_id))?
            .ok_or(CoreError::NotFound("account"))
    }

    /// Creates a river inside one transaction: the quota gate runs before
    /// the insert, so an exhausted quota commits nothing. On success the
    /// viewer's cached river listing is purged and a save event fires.
    pub fn create_river(
        &self,
        account_id: i64,
        name: &str,
        public: bool,
        slug: Option<&str>,
    ) -> Result<River, CoreError> {
        let name = name.trim();
        validate_name(name)?;

        let now = Utc::now();
        let new = NewRiver {
            name: name.to_string(),
            slug: slug.map(str::to_string).unwrap_or_else(|| slugify(name)),
            account_id,
            public,
            date_added: now,
            date_expiry: now + chrono::Duration::days(self.defaults.lifetime_days),
            drop_quota: self.defaults.drop_quota,
        };

        let (river, account) = self.store.with_tx(|tx| {
            quota::charge_river_creation(tx, account_id)?;
            let river = tx.insert_river(&new)?;
            let account = tx
                .account(account_id)?
                .ok_or(CoreError::NotFound("account"))?;
            Ok::<_, CoreError>((river, account))
        })?;

        info!(river_id = river.id, account_id, "river created");
        self.events.publish(RiverEvent::Save {
            river_id: river.id,
            name: river.name.clone(),
        });
        // Force a refresh of the owner's cached river listing.
        self.cache.delete(&user_rivers_key(account.user_id));

        Ok(river)
    }

    /// Settings update. The slug is never re-derived on rename.
    pub fn update_river(
        &self,
        river_id: i64,
        changes: &UpdateRiverRequest,
    ) -> Result<River, CoreError> {
        let layout = match changes.default_layout.as_deref() {
            Some(raw) => Some(
                RiverLayout::parse(raw)
                    .ok_or_else(|| CoreError::validation("unknown default layout"))?,
            ),
            None => None,
        };
        if let Some(name) = &changes.name {
            validate_name(name.trim())?;
        }

        let river = self.store.with_tx(|tx| {
            let mut river = tx.river(river_id)?.ok_or(CoreError::NotFound("river"))?;
            if let Some(name) = &changes.name {
                river.name = name.trim().to_string();
            }
            if let Some(public) = changes.public {
                river.public = public;
            }
            if let Some(layout) = layout {
                river.default_layout = layout;
            }
            tx.update_river(&river)?;
            Ok::<_, CoreError>(river)
        })?;

        self.events.publish(RiverEvent::Save {
            river_id: river.id,
            name: river.name.clone(),
        });
        Ok(river)
    }

    /// Deletes the river and everything it owns in one transaction: channel
    /// quota usage is credited back per filter and key, then filter options,
    /// filters, drop associations, subscriptions and collaborators go, then
    /// the river row, then the river quota unit is returned. A storage
    /// failure at any step leaves the river and all children untouched.
    pub fn delete_river(&self, river_id: i64) -> Result<(), CoreError> {
        let river = self.river(river_id)?;

        self.events.publish(RiverEvent::Disable {
            river_id: river.id,
            name: river.name.clone(),
        });

        self.store.with_tx(|tx| {
            quota::refund_river_deletion(tx, &river)?;
            tx.delete_channel_filter_options_for_river(river.id)?;
            tx.delete_channel_filters_for_river(river.id)?;
            tx.delete_river_drops(river.id)?;
            tx.delete_subscriptions_for_river(river.id)?;
            tx.delete_collaborators_for_river(river.id)?;
            tx.delete_river(river.id)?;
            Ok::<_, CoreError>(())
        })?;

        info!(river_id, "river deleted");
        Ok(())
    }

    pub fn extend_lifetime(&self, river_id: i64) -> Result<River, CoreError> {
        self.extend_lifetime_at(river_id, Utc::now())
    }

    /// Extension with an explicit clock, persisted atomically with the flag
    /// changes. Full rivers fail without touching any state.
    pub fn extend_lifetime_at(
        &self,
        river_id: i64,
        now: DateTime<Utc>,
    ) -> Result<River, CoreError> {
        let river = self.store.with_tx(|tx| {
            let mut river = tx.river(river_id)?.ok_or(CoreError::NotFound("river"))?;
            lifecycle::extend(&mut river, self.defaults.lifetime_days, now)?;
            tx.update_river(&river)?;
            Ok::<_, CoreError>(river)
        })?;

        info!(river_id, extension_count = river.extension_count, "river lifetime extended");
        self.events.publish(RiverEvent::Enable {
            river_id: river.id,
            name: river.name.clone(),
        });
        Ok(river)
    }

    pub fn days_to_expiry(&self, river_id: i64) -> Result<i64, CoreError> {
        let river = self.river(river_id)?;
        Ok(lifecycle::days_to_expiry(&river, Utc::now()))
    }

    /// Assigns a fresh public token, overwriting any previous one.
    pub fn set_token(&self, river_id: i64) -> Result<String, CoreError> {
        let token = self.store.with_tx(|tx| {
            let mut river = tx.river(river_id)?.ok_or(CoreError::NotFound("river"))?;
            let account = tx
                .account(river.account_id)?
                .ok_or(CoreError::NotFound("account"))?;
            let token = lifecycle::generate_token(&account.account_path, &river.name);
            river.public_token = Some(token.clone());
            tx.update_river(&river)?;
            Ok::<_, CoreError>(token)
        })?;
        Ok(token)
    }

    /// Boundary-facing token check: mismatch or an unset token is a typed
    /// failure.
    pub fn validate_token(&self, river_id: i64, candidate: &str) -> Result<(), CoreError> {
        let river = self.river(river_id)?;
        if lifecycle::is_valid_token(&river, candidate) {
            Ok(())
        } else {
            Err(CoreError::InvalidToken)
        }
    }

    pub fn permissions(&self) -> &Permissions<S> {
        &self.permissions
    }

    /// River as seen by one viewer, with ownership, collaboration and
    /// subscription status resolved. A collaborator counts as subscribed.
    pub fn summary(&self, river_id: i64, viewer_id: i64) -> Result<RiverSummary, CoreError> {
        let river = self.river(river_id)?;
        let account = self.account(river.account_id)?;
        let collaborator = self.permissions.is_collaborator(&river, viewer_id)?;
        let subscribed =
            collaborator || self.permissions.is_subscriber(&river, viewer_id)?;
        Ok(RiverSummary {
            id: river.id,
            name: river.name.clone(),
            kind: "river".to_string(),
            url: base_url(&account, &river),
            account_id: account.id,
            user_id: account.user_id,
            account_path: account.account_path.clone(),
            subscriber_count: self.store.read(|r| r.subscriber_count(river.id))?,
            is_owner: self.permissions.is_owner(&river, viewer_id)?,
            collaborator,
            subscribed,
            public: river.public,
        })
    }

    /// Rivers the user owns or actively collaborates on, cached under the
    /// key purged by `create_river`. Only non-empty listings are cached.
    pub fn rivers_for_user(&self, user_id: i64) -> Result<Vec<River>, CoreError> {
        let key = user_rivers_key(user_id);
        if let Some(bytes) = self.cache.get(&key) {
            if let Ok(rivers) = serde_json::from_slice(&bytes) {
                return Ok(rivers);
            }
        }

        let rivers = self.store.read(|r| {
            let Some(account) = r.account_for_user(user_id)? else {
                return Ok(Vec::new());
            };
            let mut rivers = r.rivers_for_account(account.id)?;
            let collaborating = r.active_collaborations(user_id)?;
            for river in r.rivers_by_ids(&collaborating)? {
                if rivers.iter().all(|existing| existing.id != river.id) {
                    rivers.push(river);
                }
            }
            Ok(rivers)
        })?;

        if !rivers.is_empty() {
            if let Ok(bytes) = serde_json::to_vec(&rivers) {
                self.cache.set(&key, bytes, self.defaults.listing_ttl);
            }
        }
        Ok(rivers)
    }

    pub fn collaborators(
        &self,
        river_id: i64,
        active_only: bool,
    ) -> Result<Vec<CollaboratorInfo>, CoreError> {
        let rows = self.store.read(|r| r.collaborators(river_id))?;
        Ok(rows
            .into_iter()
            .filter(|(c, _, _)| !active_only || c.active)
            .map(|(c, user, account_path)| CollaboratorInfo {
                id: user.id,
                name: user.name,
                email: user.email,
                account_path,
                collaborator_active: c.active,
                read_only: c.read_only,
            })
            .collect())
    }

    /// Adds or updates a collaborator; at most one row per (river, user).
    pub fn add_collaborator(
        &self,
        river_id: i64,
        user_id: i64,
        read_only: bool,
    ) -> Result<(), CoreError> {
        self.store.with_tx(|tx| {
            if tx.river(river_id)?.is_none() {
                return Err(CoreError::NotFound("river"));
            }
            if tx.user(user_id)?.is_none() {
                return Err(CoreError::NotFound("user"));
            }
            tx.upsert_collaborator(&Collaborator {
                river_id,
                user_id,
                read_only,
                active: true,
            })?;
            Ok(())
        })
    }

    pub fn remove_collaborator(&self, river_id: i64, user_id: i64) -> Result<(), CoreError> {
        self.store.with_tx(|tx| {
            if tx.collaborator(river_id, user_id)?.is_none() {
                return Err(CoreError::NotFound("collaborator"));
            }
            tx.remove_collaborator(river_id, user_id)?;
            Ok(())
        })
    }

    pub fn subscribe(&self, river_id: i64, user_id: i64) -> Result<(), CoreError> {
        self.store.with_tx(|tx| {
            if tx.river(river_id)?.is_none() {
                return Err(CoreError::NotFound("river"));
            }
            if tx.user(user_id)?.is_none() {
                return Err(CoreError::NotFound("user"));
            }
            tx.add_subscription(river_id, user_id)?;
            Ok(())
        })
    }

    pub fn unsubscribe(&self, river_id: i64, user_id: i64) -> Result<(), CoreError> {
        self.store.with_tx(|tx| {
            tx.remove_subscription(river_id, user_id)?;
            Ok::<_, CoreError>(())
        })
    }

    pub fn subscriber_count(&self, river_id: i64) -> Result<u64, CoreError> {
        Ok(self.store.read(|r| r.subscriber_count(river_id))?)
    }

    /// Links a droplet into the river. Returns the association (sort) id.
    pub fn add_drop(
        &self,
        river_id: i64,
        droplet_id: i64,
        date_pub: DateTime<Utc>,
    ) -> Result<i64, CoreError> {
        self.store.with_tx(|tx| {
            if tx.river(river_id)?.is_none() {
                return Err(CoreError::NotFound("river"));
            }
            Ok(tx.add_drop(river_id, droplet_id, date_pub)?)
        })
    }

    /// Removes the association row only; the droplet itself survives.
    pub fn remove_drop(&self, river_id: i64, droplet_id: i64) -> Result<(), CoreError> {
        self.store.with_tx(|tx| {
            if tx.river(river_id)?.is_none() {
                return Err(CoreError::NotFound("river"));
            }
            tx.remove_drop(river_id, droplet_id)?;
            Ok(())
        })
    }

    fn account(&self, account_id: i64) -> Result<Account, CoreError> {
        self.store
            .read(|r| r.account(account_id))?
            .ok_or(CoreError::NotFound("account"))
    }
}

fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::validation("river name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CoreError::validation("river name too long"));
    }
    Ok(())
}

/// URL-safe slug, derived from the name once at creation. Collisions are
/// possible and detected by callers.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn base_url(account: &Account, river: &River) -> String {
    format!("/{}/river/{}", account.account_path, river.slug)
}
