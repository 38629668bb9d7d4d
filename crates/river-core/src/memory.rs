//! In-memory store.
//!
//! Implements the same repository traits as the SQLite adapter, with
//! copy-on-write transactions: `with_tx` runs against a clone of the state
//! and swaps it in only on success, so a failing step rolls everything back
//! exactly like a storage transaction would.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use river_types::models::{
    Account, ChannelFilter, ChannelFilterOption, Collaborator, DropLink, DropPlace, DropTag, River,
    RiverLayout, User,
};

use crate::store::{
    ChannelQuota, DropQuery, DropRow, DropWindow, NewRiver, SearchRow, Store, StoreError,
    StoreReader, StoreWriter, zero_date,
};

/// Denormalized droplet used to seed feed tests.
#[derive(Debug, Clone)]
pub struct DropletSeed {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub channel: String,
    pub identity_name: String,
    pub identity_avatar: String,
    pub date_pub: DateTime<Utc>,
    /// Non-zero when the drop carries an image.
    pub image: Option<i64>,
    /// Link id of the canonical original URL.
    pub original_url: Option<i64>,
    pub comment_count: i64,
}

#[derive(Debug, Clone)]
struct RiverDrop {
    river_id: i64,
    droplet_id: i64,
    date_pub: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct State {
    rivers: BTreeMap<i64, River>,
    accounts: BTreeMap<i64, Account>,
    users: BTreeMap<i64, User>,
    channel_filters: BTreeMap<i64, ChannelFilter>,
    channel_options: BTreeMap<i64, ChannelFilterOption>,
    collaborators: BTreeMap<(i64, i64), Collaborator>,
    subscriptions: BTreeSet<(i64, i64)>,
    /// sort id -> association row
    river_drops: BTreeMap<i64, RiverDrop>,
    droplets: BTreeMap<i64, DropletSeed>,
    links: BTreeMap<i64, String>,
    /// (droplet, user) -> score
    scores: BTreeMap<(i64, i64), i64>,
    /// (droplet, account) -> tags
    tags: BTreeMap<(i64, i64), Vec<DropTag>>,
    places: BTreeMap<(i64, i64), Vec<DropPlace>>,
    /// (account, channel, key) -> quota
    channel_quotas: BTreeMap<(i64, String, String), ChannelQuota>,
    next_river_id: i64,
    next_filter_id: i64,
    next_option_id: i64,
    next_sort_id: i64,
    /// Test hook: the named writer op fails with a backend error.
    fail_on: Option<&'static str>,
}

impl State {
    fn check_fail(&self, op: &'static str) -> Result<(), StoreError> {
        if self.fail_on == Some(op) {
            return Err(StoreError::Backend(format!("injected failure in {op}")));
        }
        Ok(())
    }

    fn droplet(&self, id: i64) -> Result<&DropletSeed, StoreError> {
        self.droplets
            .get(&id)
            .ok_or(StoreError::Constraint("association references missing droplet"))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the named writer operation fail until cleared; lets tests force
    /// a storage failure mid-transaction.
    pub fn fail_on(&self, op: &'static str) {
        self.state.lock().unwrap().fail_on = Some(op);
    }

    pub fn clear_failure(&self) {
        self.state.lock().unwrap().fail_on = None;
    }

    pub fn seed_account(&self, account: Account) {
        self.state.lock().unwrap().accounts.insert(account.id, account);
    }

    pub fn seed_user(&self, user: User) {
        self.state.lock().unwrap().users.insert(user.id, user);
    }

    pub fn seed_droplet(&self, droplet: DropletSeed) {
        self.state.lock().unwrap().droplets.insert(droplet.id, droplet);
    }

    pub fn seed_link(&self, id: i64, url: &str) {
        self.state.lock().unwrap().links.insert(id, url.to_string());
    }

    pub fn seed_score(&self, droplet_id: i64, user_id: i64, score: i64) {
        self.state.lock().unwrap().scores.insert((droplet_id, user_id), score);
    }

    pub fn seed_tag(&self, droplet_id: i64, account_id: i64, tag: DropTag) {
        self.state
            .lock()
            .unwrap()
            .tags
            .entry((droplet_id, account_id))
            .or_default()
            .push(tag);
    }

    pub fn seed_place(&self, droplet_id: i64, account_id: i64, place: DropPlace) {
        self.state
            .lock()
            .unwrap()
            .places
            .entry((droplet_id, account_id))
            .or_default()
            .push(place);
    }

    pub fn seed_channel_quota_limit(&self, account_id: i64, channel: &str, key: &str, limit: i64) {
        self.state
            .lock()
            .unwrap()
            .channel_quotas
            .entry((account_id, channel.to_string(), key.to_string()))
            .or_default()
            .limit = limit;
    }

    /// Seeds an association row directly, bypassing the max-id bump; used to
    /// construct corrupt (zero-date) rows.
    pub fn seed_river_drop(&self, sort_id: i64, river_id: i64, droplet_id: i64, date_pub: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        state.river_drops.insert(
            sort_id,
            RiverDrop {
                river_id,
                droplet_id,
                date_pub,
            },
        );
        state.next_sort_id = state.next_sort_id.max(sort_id);
    }
}

impl Store for MemoryStore {
    fn read<T>(
        &self,
        f: impl FnOnce(&dyn StoreReader) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let state = self
            .state
            .lock()
            .map_err(|e| StoreError::Backend(format!("state lock poisoned: {e}")))?;
        f(&*state)
    }

    fn with_tx<T, E>(&self, f: impl FnOnce(&mut dyn StoreWriter) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut state = self
            .state
            .lock()
            .map_err(|e| StoreError::Backend(format!("state lock poisoned: {e}")))?;
        let mut staged = state.clone();
        let out = f(&mut staged)?;
        *state = staged;
        Ok(out)
    }
}

impl StoreReader for State {
    fn river(&self, id: i64) -> Result<Option<River>, StoreError> {
        Ok(self.rivers.get(&id).cloned())
    }

    fn river_by_slug(&self, account_id: i64, slug: &str) -> Result<Option<River>, StoreError> {
        Ok(self
            .rivers
            .values()
            .find(|r| r.account_id == account_id && r.slug == slug)
            .cloned())
    }

    fn rivers_by_ids(&self, ids: &[i64]) -> Result<Vec<River>, StoreError> {
        Ok(ids.iter().filter_map(|id| self.rivers.get(id).cloned()).collect())
    }

    fn rivers_for_account(&self, account_id: i64) -> Result<Vec<River>, StoreError> {
        Ok(self
            .rivers
            .values()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect())
    }

    fn account(&self, id: i64) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(&id).cloned())
    }

    fn account_for_user(&self, user_id: i64) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.values().find(|a| a.user_id == user_id).cloned())
    }

    fn user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&id).cloned())
    }

    fn collaborator(
        &self,
        river_id: i64,
        user_id: i64,
    ) -> Result<Option<Collaborator>, StoreError> {
        Ok(self.collaborators.get(&(river_id, user_id)).cloned())
    }

    fn collaborators(
        &self,
        river_id: i64,
    ) -> Result<Vec<(Collaborator, User, String)>, StoreError> {
        let mut out = Vec::new();
        for collaborator in self.collaborators.values().filter(|c| c.river_id == river_id) {
            let user = self
                .users
                .get(&collaborator.user_id)
                .ok_or(StoreError::Constraint("collaborator references missing user"))?;
            let path = self
                .accounts
                .values()
                .find(|a| a.user_id == user.id)
                .map(|a| a.account_path.clone())
                .unwrap_or_default();
            out.push((collaborator.clone(), user.clone(), path));
        }
        Ok(out)
    }

    fn active_collaborations(&self, user_id: i64) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .collaborators
            .values()
            .filter(|c| c.user_id == user_id && c.active)
            .map(|c| c.river_id)
            .collect())
    }

    fn is_subscriber(&self, river_id: i64, user_id: i64) -> Result<bool, StoreError> {
        Ok(self.subscriptions.contains(&(river_id, user_id)))
    }

    fn subscriber_count(&self, river_id: i64) -> Result<u64, StoreError> {
        Ok(self.subscriptions.iter().filter(|(r, _)| *r == river_id).count() as u64)
    }

    fn channel_filters(
        &self,
        river_id: i64,
        enabled_only: bool,
    ) -> Result<Vec<ChannelFilter>, StoreError> {
        Ok(self
            .channel_filters
            .values()
            .filter(|f| f.river_id == river_id && (!enabled_only || f.enabled))
            .cloned()
            .collect())
    }

    fn channel_filter_by_key(
        &self,
        river_id: i64,
        channel: &str,
    ) -> Result<Option<ChannelFilter>, StoreError> {
        Ok(self
            .channel_filters
            .values()
            .find(|f| f.river_id == river_id && f.channel == channel)
            .cloned())
    }

    fn channel_filter_by_id(
        &self,
        river_id: i64,
        id: i64,
    ) -> Result<Option<ChannelFilter>, StoreError> {
        Ok(self
            .channel_filters
            .get(&id)
            .filter(|f| f.river_id == river_id)
            .cloned())
    }

    fn channel_filter_options(
        &self,
        channel_filter_id: i64,
    ) -> Result<Vec<ChannelFilterOption>, StoreError> {
        Ok(self
            .channel_options
            .values()
            .filter(|o| o.channel_filter_id == channel_filter_id)
            .cloned()
            .collect())
    }

    fn channel_quota_usage(
        &self,
        channel_filter_id: i64,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let mut usage: BTreeMap<String, i64> = BTreeMap::new();
        for option in self
            .channel_options
            .values()
            .filter(|o| o.channel_filter_id == channel_filter_id)
        {
            *usage.entry(option.key.clone()).or_default() += 1;
        }
        Ok(usage.into_iter().collect())
    }

    fn channel_quota(
        &self,
        account_id: i64,
        channel: &str,
        key: &str,
    ) -> Result<ChannelQuota, StoreError> {
        Ok(self
            .channel_quotas
            .get(&(account_id, channel.to_string(), key.to_string()))
            .copied()
            .unwrap_or_default())
    }

    fn fetch_drops(&self, query: &DropQuery) -> Result<Vec<DropRow>, StoreError> {
        let mut matched: Vec<(i64, &RiverDrop)> = Vec::new();
        for (sort_id, assoc) in &self.river_drops {
            if assoc.river_id != query.river_id || assoc.date_pub <= zero_date() {
                continue;
            }
            let droplet = self.droplet(assoc.droplet_id)?;
            if let Some(drop_id) = query.drop_id {
                if assoc.droplet_id != drop_id {
                    continue;
                }
            } else {
                match query.window {
                    DropWindow::Page { max_sort_id, .. } => {
                        if *sort_id > max_sort_id {
                            continue;
                        }
                    }
                    DropWindow::Since { since_sort_id, .. } => {
                        if *sort_id <= since_sort_id {
                            continue;
                        }
                    }
                }
            }
            if query.photos_only && droplet.image.unwrap_or(0) <= 0 {
                continue;
            }
            let filters = &query.filters;
            if !filters.channels.is_empty() && !filters.channels.contains(&droplet.channel) {
                continue;
            }
            if !filters.tags.is_empty() {
                let tagged = self
                    .tags
                    .get(&(droplet.id, query.account_id))
                    .map(|tags| tags.iter().any(|t| filters.tags.contains(&t.tag)))
                    .unwrap_or(false);
                if !tagged {
                    continue;
                }
            }
            if let Some(from) = filters.date_from {
                if droplet.date_pub < from {
                    continue;
                }
            }
            if let Some(to) = filters.date_to {
                if droplet.date_pub > to {
                    continue;
                }
            }
            matched.push((*sort_id, assoc));
        }

        let rows: Vec<DropRow> = match query.window {
            DropWindow::Page { limit, offset, .. } => {
                matched.sort_by(|a, b| {
                    b.1.date_pub.cmp(&a.1.date_pub).then_with(|| b.0.cmp(&a.0))
                });
                matched
                    .into_iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .map(|(sort_id, assoc)| self.drop_row(sort_id, assoc, query.viewer_id))
                    .collect::<Result<_, _>>()?
            }
            DropWindow::Since { limit, .. } => {
                matched.sort_by_key(|(sort_id, _)| *sort_id);
                matched
                    .into_iter()
                    .take(limit as usize)
                    .map(|(sort_id, assoc)| self.drop_row(sort_id, assoc, query.viewer_id))
                    .collect::<Result<_, _>>()?
            }
        };
        Ok(rows)
    }

    fn drop_tags(
        &self,
        account_id: i64,
        drop_ids: &[i64],
    ) -> Result<Vec<(i64, DropTag)>, StoreError> {
        let mut out = Vec::new();
        for id in drop_ids {
            if let Some(tags) = self.tags.get(&(*id, account_id)) {
                out.extend(tags.iter().map(|t| (*id, t.clone())));
            }
        }
        Ok(out)
    }

    fn drop_places(
        &self,
        account_id: i64,
        drop_ids: &[i64],
    ) -> Result<Vec<(i64, DropPlace)>, StoreError> {
        let mut out = Vec::new();
        for id in drop_ids {
            if let Some(places) = self.places.get(&(*id, account_id)) {
                out.extend(places.iter().map(|p| (*id, p.clone())));
            }
        }
        Ok(out)
    }

    fn drop_links(
        &self,
        _account_id: i64,
        drop_ids: &[i64],
    ) -> Result<Vec<(i64, DropLink)>, StoreError> {
        let mut out = Vec::new();
        for id in drop_ids {
            if let Some(droplet) = self.droplets.get(id) {
                if let Some(link_id) = droplet.original_url {
                    if let Some(url) = self.links.get(&link_id) {
                        out.push((
                            *id,
                            DropLink {
                                id: link_id,
                                url: url.clone(),
                            },
                        ));
                    }
                }
            }
        }
        Ok(out)
    }

    fn max_drop_id(&self, river_id: i64) -> Result<i64, StoreError> {
        Ok(self.rivers.get(&river_id).map(|r| r.max_drop_id).unwrap_or(0))
    }

    fn rivers_like(&self, term: &str) -> Result<Vec<SearchRow>, StoreError> {
        let needle = term.to_lowercase();
        let mut out = Vec::new();
        for river in self.rivers.values() {
            if !river.name.to_lowercase().contains(&needle)
                && !river.slug.to_lowercase().contains(&needle)
            {
                continue;
            }
            let account = self
                .accounts
                .get(&river.account_id)
                .ok_or(StoreError::Constraint("river references missing account"))?;
            out.push(SearchRow {
                id: river.id,
                name: river.name.clone(),
                slug: river.slug.clone(),
                account_id: account.id,
                account_path: account.account_path.clone(),
                public: river.public,
            });
        }
        Ok(out)
    }
}

impl State {
    fn drop_row(&self, sort_id: i64, assoc: &RiverDrop, viewer_id: i64) -> Result<DropRow, StoreError> {
        let droplet = self.droplet(assoc.droplet_id)?;
        Ok(DropRow {
            id: droplet.id,
            sort_id,
            title: droplet.title.clone(),
            content: droplet.content.clone(),
            channel: droplet.channel.clone(),
            identity_name: droplet.identity_name.clone(),
            identity_avatar: droplet.identity_avatar.clone(),
            date_pub: droplet.date_pub,
            user_score: self.scores.get(&(droplet.id, viewer_id)).copied(),
            original_url: droplet
                .original_url
                .and_then(|link_id| self.links.get(&link_id).cloned()),
            comment_count: droplet.comment_count,
        })
    }
}

impl StoreWriter for State {
    fn insert_river(&mut self, river: &NewRiver) -> Result<River, StoreError> {
        self.check_fail("insert_river")?;
        self.next_river_id += 1;
        let row = River {
            id: self.next_river_id,
            name: river.name.clone(),
            slug: river.slug.clone(),
            account_id: river.account_id,
            public: river.public,
            default_layout: RiverLayout::default(),
            date_added: river.date_added,
            date_expiry: river.date_expiry,
            active: true,
            expired: false,
            full: false,
            expiry_notification_sent: false,
            extension_count: 0,
            drop_quota: river.drop_quota,
            max_drop_id: 0,
            public_token: None,
        };
        self.rivers.insert(row.id, row.clone());
        Ok(row)
    }

    fn update_river(&mut self, river: &River) -> Result<(), StoreError> {
        self.check_fail("update_river")?;
        if !self.rivers.contains_key(&river.id) {
            return Err(StoreError::Constraint("update of missing river"));
        }
        self.rivers.insert(river.id, river.clone());
        Ok(())
    }

    fn delete_river(&mut self, river_id: i64) -> Result<(), StoreError> {
        self.check_fail("delete_river")?;
        self.rivers.remove(&river_id);
        Ok(())
    }

    fn debit_river_quota(&mut self, account_id: i64) -> Result<(), StoreError> {
        self.check_fail("debit_river_quota")?;
        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(StoreError::Constraint("debit against missing account"))?;
        if account.river_quota_remaining <= 0 {
            return Err(StoreError::Constraint("river quota counter underflow"));
        }
        account.river_quota_remaining -= 1;
        Ok(())
    }

    fn credit_river_quota(&mut self, account_id: i64, amount: i64) -> Result<(), StoreError> {
        self.check_fail("credit_river_quota")?;
        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(StoreError::Constraint("credit against missing account"))?;
        account.river_quota_remaining += amount;
        Ok(())
    }

    fn debit_channel_quota(
        &mut self,
        account_id: i64,
        channel: &str,
        key: &str,
        amount: i64,
    ) -> Result<(), StoreError> {
        self.check_fail("debit_channel_quota")?;
        let quota = self
            .channel_quotas
            .entry((account_id, channel.to_string(), key.to_string()))
            .or_default();
        quota.used += amount;
        Ok(())
    }

    fn credit_channel_quota(
        &mut self,
        account_id: i64,
        channel: &str,
        key: &str,
        amount: i64,
    ) -> Result<(), StoreError> {
        self.check_fail("credit_channel_quota")?;
        let quota = self
            .channel_quotas
            .entry((account_id, channel.to_string(), key.to_string()))
            .or_default();
        if quota.used < amount {
            return Err(StoreError::Constraint("channel quota counter underflow"));
        }
        quota.used -= amount;
        Ok(())
    }

    fn delete_channel_filter_options_for_river(
        &mut self,
        river_id: i64,
    ) -> Result<(), StoreError> {
        self.check_fail("delete_channel_filter_options_for_river")?;
        let filter_ids: BTreeSet<i64> = self
            .channel_filters
            .values()
            .filter(|f| f.river_id == river_id)
            .map(|f| f.id)
            .collect();
        self.channel_options
            .retain(|_, o| !filter_ids.contains(&o.channel_filter_id));
        Ok(())
    }

    fn delete_channel_filters_for_river(&mut self, river_id: i64) -> Result<(), StoreError> {
        self.check_fail("delete_channel_filters_for_river")?;
        self.channel_filters.retain(|_, f| f.river_id != river_id);
        Ok(())
    }

    fn delete_river_drops(&mut self, river_id: i64) -> Result<(), StoreError> {
        self.check_fail("delete_river_drops")?;
        self.river_drops.retain(|_, d| d.river_id != river_id);
        Ok(())
    }

    fn delete_subscriptions_for_river(&mut self, river_id: i64) -> Result<(), StoreError> {
        self.check_fail("delete_subscriptions_for_river")?;
        self.subscriptions.retain(|(r, _)| *r != river_id);
        Ok(())
    }

    fn delete_collaborators_for_river(&mut self, river_id: i64) -> Result<(), StoreError> {
        self.check_fail("delete_collaborators_for_river")?;
        self.collaborators.retain(|_, c| c.river_id != river_id);
        Ok(())
    }

    fn insert_channel_filter(
        &mut self,
        river_id: i64,
        channel: &str,
        enabled: bool,
        date_added: DateTime<Utc>,
    ) -> Result<ChannelFilter, StoreError> {
        self.check_fail("insert_channel_filter")?;
        self.next_filter_id += 1;
        let filter = ChannelFilter {
            id: self.next_filter_id,
            river_id,
            channel: channel.to_string(),
            enabled,
            date_added,
        };
        self.channel_filters.insert(filter.id, filter.clone());
        Ok(filter)
    }

    fn set_channel_filter_enabled(&mut self, id: i64, enabled: bool) -> Result<(), StoreError> {
        self.check_fail("set_channel_filter_enabled")?;
        let filter = self
            .channel_filters
            .get_mut(&id)
            .ok_or(StoreError::Constraint("toggle of missing channel filter"))?;
        filter.enabled = enabled;
        Ok(())
    }

    fn delete_channel_filter(&mut self, id: i64) -> Result<(), StoreError> {
        self.check_fail("delete_channel_filter")?;
        self.channel_filters.remove(&id);
        self.channel_options.retain(|_, o| o.channel_filter_id != id);
        Ok(())
    }

    fn insert_channel_filter_option(
        &mut self,
        channel_filter_id: i64,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<ChannelFilterOption, StoreError> {
        self.check_fail("insert_channel_filter_option")?;
        self.next_option_id += 1;
        let option = ChannelFilterOption {
            id: self.next_option_id,
            channel_filter_id,
            key: key.to_string(),
            value: value.clone(),
        };
        self.channel_options.insert(option.id, option.clone());
        Ok(option)
    }

    fn delete_channel_filter_option(
        &mut self,
        channel_filter_id: i64,
        option_id: i64,
    ) -> Result<(), StoreError> {
        self.check_fail("delete_channel_filter_option")?;
        self.channel_options
            .retain(|id, o| !(*id == option_id && o.channel_filter_id == channel_filter_id));
        Ok(())
    }

    fn upsert_collaborator(&mut self, collaborator: &Collaborator) -> Result<(), StoreError> {
        self.check_fail("upsert_collaborator")?;
        self.collaborators.insert(
            (collaborator.river_id, collaborator.user_id),
            collaborator.clone(),
        );
        Ok(())
    }

    fn remove_collaborator(&mut self, river_id: i64, user_id: i64) -> Result<(), StoreError> {
        self.check_fail("remove_collaborator")?;
        self.collaborators.remove(&(river_id, user_id));
        Ok(())
    }

    fn add_subscription(&mut self, river_id: i64, user_id: i64) -> Result<(), StoreError> {
        self.check_fail("add_subscription")?;
        self.subscriptions.insert((river_id, user_id));
        Ok(())
    }

    fn remove_subscription(&mut self, river_id: i64, user_id: i64) -> Result<(), StoreError> {
        self.check_fail("remove_subscription")?;
        self.subscriptions.remove(&(river_id, user_id));
        Ok(())
    }

    fn add_drop(
        &mut self,
        river_id: i64,
        droplet_id: i64,
        date_pub: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.check_fail("add_drop")?;
        self.next_sort_id += 1;
        let sort_id = self.next_sort_id;
        self.river_drops.insert(
            sort_id,
            RiverDrop {
                river_id,
                droplet_id,
                date_pub,
            },
        );
        let river = self
            .rivers
            .get_mut(&river_id)
            .ok_or(StoreError::Constraint("drop added to missing river"))?;
        river.max_drop_id = river.max_drop_id.max(sort_id);
        Ok(sort_id)
    }

    fn remove_drop(&mut self, river_id: i64, droplet_id: i64) -> Result<(), StoreError> {
        self.check_fail("remove_drop")?;
        self.river_drops
            .retain(|_, d| !(d.river_id == river_id && d.droplet_id == droplet_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_counters_never_go_below_zero() {
        let store = MemoryStore::new();
        store.seed_account(Account {
            id: 1,
            user_id: 1,
            account_path: "default".to_string(),
            public_account: false,
            river_quota_remaining: 0,
        });

        let err = store
            .with_tx(|tx| tx.debit_river_quota(1))
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));

        let err = store
            .with_tx(|tx| tx.credit_channel_quota(1, "twitter", "keyword", 1))
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[test]
    fn failed_transactions_discard_staged_writes() {
        let store = MemoryStore::new();
        store.seed_account(Account {
            id: 1,
            user_id: 1,
            account_path: "default".to_string(),
            public_account: false,
            river_quota_remaining: 1,
        });

        let result: Result<(), StoreError> = store.with_tx(|tx| {
            tx.debit_river_quota(1)?;
            Err(StoreError::Backend("boom".to_string()))
        });
        assert!(result.is_err());

        let quota = store
            .read(|r| r.account(1))
            .unwrap()
            .unwrap()
            .river_quota_remaining;
        assert_eq!(quota, 1);
    }
}
