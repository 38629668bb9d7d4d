//! Channel registry and per-river channel filter management.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use river_types::api::{ChannelOptionView, ChannelView};
use river_types::models::{ChannelFilter, ChannelFilterOption};

use crate::error::CoreError;
use crate::quota;
use crate::store::Store;

/// Display metadata for one source type. `option_keys` is the set of option
/// keys the channel understands; options carrying any other key are not
/// shown.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub name: String,
    pub option_keys: Vec<String>,
}

/// Map from channel identifier to its descriptor. A channel key with no
/// registration is skipped wherever channels are displayed, never an error.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    configs: HashMap<String, ChannelConfig>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: &str, config: ChannelConfig) {
        self.configs.insert(key.to_string(), config);
    }

    pub fn config(&self, key: &str) -> Option<&ChannelConfig> {
        self.configs.get(key)
    }
}

pub struct ChannelManager<S> {
    store: Arc<S>,
    registry: Arc<ChannelRegistry>,
}

impl<S: Store> ChannelManager<S> {
    pub fn new(store: Arc<S>, registry: Arc<ChannelRegistry>) -> Self {
        Self { store, registry }
    }

    /// Channels of a river joined with their registry descriptors; channels
    /// unknown to the registry are skipped.
    pub fn get_channels(
        &self,
        river_id: i64,
        active_only: bool,
    ) -> Result<Vec<ChannelView>, CoreError> {
        let filters = self
            .store
            .read(|r| r.channel_filters(river_id, active_only))?;

        let mut channels = Vec::new();
        for filter in filters {
            let Some(config) = self.registry.config(&filter.channel) else {
                warn!(channel = %filter.channel, river_id, "unregistered channel, skipping");
                continue;
            };
            let options = self.get_channel_options(&filter)?;
            channels.push(ChannelView {
                id: filter.id,
                channel: filter.channel,
                name: config.name.clone(),
                enabled: filter.enabled,
                options,
            });
        }
        Ok(channels)
    }

    /// Pure lookup half of the get-or-create contract.
    pub fn find_channel(
        &self,
        river_id: i64,
        channel: &str,
    ) -> Result<Option<ChannelFilter>, CoreError> {
        Ok(self
            .store
            .read(|r| r.channel_filter_by_key(river_id, channel))?)
    }

    /// Creation half: inserts an enabled filter for the channel key.
    pub fn create_channel(&self, river_id: i64, channel: &str) -> Result<ChannelFilter, CoreError> {
        self.store.with_tx(|tx| {
            if tx.river(river_id)?.is_none() {
                return Err(CoreError::NotFound("river"));
            }
            Ok(tx.insert_channel_filter(river_id, channel, true, Utc::now())?)
        })
    }

    pub fn channel_by_id(&self, river_id: i64, id: i64) -> Result<ChannelFilter, CoreError> {
        self.store
            .read(|r| r.channel_filter_by_id(river_id, id))?
            .ok_or(CoreError::NotFound("channel filter"))
    }

    pub fn set_enabled(&self, river_id: i64, id: i64, enabled: bool) -> Result<(), CoreError> {
        self.store.with_tx(|tx| {
            if tx.channel_filter_by_id(river_id, id)?.is_none() {
                return Err(CoreError::NotFound("channel filter"));
            }
            tx.set_channel_filter_enabled(id, enabled)?;
            Ok(())
        })
    }

    /// Options of one filter, limited to the keys its registry descriptor
    /// declares.
    pub fn get_channel_options(
        &self,
        filter: &ChannelFilter,
    ) -> Result<Vec<ChannelOptionView>, CoreError> {
        let options = self
            .store
            .read(|r| r.channel_filter_options(filter.id))?;
        let known = self
            .registry
            .config(&filter.channel)
            .map(|c| c.option_keys.clone())
            .unwrap_or_default();
        Ok(options
            .into_iter()
            .filter(|o| known.iter().any(|k| k == &o.key))
            .map(|o| ChannelOptionView {
                id: o.id,
                key: o.key,
                value: o.value,
            })
            .collect())
    }

    /// Adds an option and debits the account's per-key channel quota in the
    /// same transaction.
    pub fn add_option(
        &self,
        river_id: i64,
        channel_id: i64,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<ChannelFilterOption, CoreError> {
        self.store.with_tx(|tx| {
            let river = tx.river(river_id)?.ok_or(CoreError::NotFound("river"))?;
            let filter = tx
                .channel_filter_by_id(river_id, channel_id)?
                .ok_or(CoreError::NotFound("channel filter"))?;
            quota::charge_channel_option(tx, river.account_id, &filter.channel, key)?;
            Ok(tx.insert_channel_filter_option(channel_id, key, value)?)
        })
    }

    /// Removes an option and credits the quota unit back.
    pub fn remove_option(
        &self,
        river_id: i64,
        channel_id: i64,
        option_id: i64,
    ) -> Result<(), CoreError> {
        self.store.with_tx(|tx| {
            let river = tx.river(river_id)?.ok_or(CoreError::NotFound("river"))?;
            let filter = tx
                .channel_filter_by_id(river_id, channel_id)?
                .ok_or(CoreError::NotFound("channel filter"))?;
            let option = tx
                .channel_filter_options(channel_id)?
                .into_iter()
                .find(|o| o.id == option_id)
                .ok_or(CoreError::NotFound("channel filter option"))?;
            tx.delete_channel_filter_option(channel_id, option_id)?;
            quota::refund_channel_option(tx, river.account_id, &filter.channel, &option.key)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use river_types::models::Account;

    use crate::memory::MemoryStore;
    use crate::store::{NewRiver, StoreError};

    const RIVER: i64 = 1;

    fn registry() -> Arc<ChannelRegistry> {
        let mut registry = ChannelRegistry::new();
        registry.register(
            "twitter",
            ChannelConfig {
                name: "Twitter".to_string(),
                option_keys: vec!["keyword".to_string(), "user".to_string()],
            },
        );
        registry.register(
            "rss",
            ChannelConfig {
                name: "RSS".to_string(),
                option_keys: vec!["url".to_string()],
            },
        );
        Arc::new(registry)
    }

    fn setup() -> (Arc<MemoryStore>, ChannelManager<MemoryStore>) {
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
        let manager = ChannelManager::new(store.clone(), registry());
        (store, manager)
    }

    #[test]
    fn find_and_create_are_distinct_steps() {
        let (_store, manager) = setup();

        assert!(manager.find_channel(RIVER, "twitter").unwrap().is_none());
        let created = manager.create_channel(RIVER, "twitter").unwrap();
        assert!(created.enabled);

        let found = manager.find_channel(RIVER, "twitter").unwrap().unwrap();
        assert_eq!(found.id, created.id);
    }

    #[test]
    fn unknown_channels_are_skipped_in_listings() {
        let (_store, manager) = setup();
        manager.create_channel(RIVER, "twitter").unwrap();
        manager.create_channel(RIVER, "carrier-pigeon").unwrap();

        let channels = manager.get_channels(RIVER, false).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].channel, "twitter");
        assert_eq!(channels[0].name, "Twitter");
    }

    #[test]
    fn disabled_channels_drop_out_of_the_active_listing() {
        let (_store, manager) = setup();
        let filter = manager.create_channel(RIVER, "twitter").unwrap();
        manager.set_enabled(RIVER, filter.id, false).unwrap();

        assert!(manager.get_channels(RIVER, true).unwrap().is_empty());
        assert_eq!(manager.get_channels(RIVER, false).unwrap().len(), 1);
    }

    #[test]
    fn options_debit_and_refund_the_channel_quota() {
        let (store, manager) = setup();
        let filter = manager.create_channel(RIVER, "twitter").unwrap();

        let option = manager
            .add_option(RIVER, filter.id, "keyword", &serde_json::json!("floods"))
            .unwrap();
        assert_eq!(
            store.read(|r| r.channel_quota(1, "twitter", "keyword")).unwrap().used,
            1
        );

        manager.remove_option(RIVER, filter.id, option.id).unwrap();
        assert_eq!(
            store.read(|r| r.channel_quota(1, "twitter", "keyword")).unwrap().used,
            0
        );
    }

    #[test]
    fn exhausted_channel_quota_rejects_new_options() {
        let (store, manager) = setup();
        store.seed_channel_quota_limit(1, "twitter", "keyword", 1);
        let filter = manager.create_channel(RIVER, "twitter").unwrap();

        manager
            .add_option(RIVER, filter.id, "keyword", &serde_json::json!("floods"))
            .unwrap();
        let err = manager
            .add_option(RIVER, filter.id, "keyword", &serde_json::json!("rains"))
            .unwrap_err();
        assert!(matches!(err, CoreError::QuotaExceeded));
        // The rejected insert left nothing behind.
        assert_eq!(
            store.read(|r| r.channel_filter_options(filter.id)).unwrap().len(),
            1
        );
    }

    #[test]
    fn option_listing_hides_keys_the_channel_does_not_declare() {
        let (store, manager) = setup();
        let filter = manager.create_channel(RIVER, "rss").unwrap();
        manager
            .add_option(RIVER, filter.id, "url", &serde_json::json!("https://feeds.example.org"))
            .unwrap();
        // Written directly: a key the rss descriptor does not know.
        store
            .with_tx(|tx| {
                tx.insert_channel_filter_option(filter.id, "legacy", &serde_json::json!(1))?;
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let options = manager.get_channel_options(&filter).unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].key, "url");
    }

    #[test]
    fn missing_targets_are_not_found() {
        let (_store, manager) = setup();
        assert!(matches!(
            manager.create_channel(99, "twitter").unwrap_err(),
            CoreError::NotFound("river")
        ));
        assert!(matches!(
            manager.channel_by_id(RIVER, 99).unwrap_err(),
            CoreError::NotFound("channel filter")
        ));
    }
}
