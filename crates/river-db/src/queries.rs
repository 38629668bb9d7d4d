//! Store trait implementations over a live connection, plus the seed
//! helpers used by operational tooling and the test suites.

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row};

use river_core::store::{
    ChannelQuota, DropQuery, DropRow, DropWindow, NewRiver, SearchRow, StoreError, StoreReader,
    StoreWriter,
};
use river_types::models::{
    Account, ChannelFilter, ChannelFilterOption, Collaborator, DropLink, DropPlace, DropTag, River,
    User,
};

use crate::models::{
    ChannelFilterOptionRow, ChannelFilterRow, RiverRow, decode_ts, encode_ts,
};
use crate::{Database, db_err};

const RIVER_COLS: &str = "id, river_name, river_name_url, account_id, river_public, \
     default_layout, river_date_add, river_date_expiry, river_active, river_expired, \
     river_full, expiry_notification_sent, extension_count, drop_quota, max_drop_id, \
     public_token";

/// One borrowed connection, either autocommit or inside a transaction.
pub struct Session<'a> {
    pub(crate) conn: &'a Connection,
}

fn river_row(row: &Row) -> rusqlite::Result<RiverRow> {
    Ok(RiverRow {
        id: row.get(0)?,
        river_name: row.get(1)?,
        river_name_url: row.get(2)?,
        account_id: row.get(3)?,
        river_public: row.get(4)?,
        default_layout: row.get(5)?,
        river_date_add: row.get(6)?,
        river_date_expiry: row.get(7)?,
        river_active: row.get(8)?,
        river_expired: row.get(9)?,
        river_full: row.get(10)?,
        expiry_notification_sent: row.get(11)?,
        extension_count: row.get(12)?,
        drop_quota: row.get(13)?,
        max_drop_id: row.get(14)?,
        public_token: row.get(15)?,
    })
}

fn account_row(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        user_id: row.get(1)?,
        account_path: row.get(2)?,
        public_account: row.get(3)?,
        river_quota_remaining: row.get(4)?,
    })
}

fn placeholders(n: usize) -> String {
    let mut out = String::new();
    for i in 1..=n {
        if i > 1 {
            out.push_str(", ");
        }
        out.push('?');
    }
    out
}

impl Session<'_> {
    fn rivers_where(&self, clause: &str, params: &[&dyn ToSql]) -> Result<Vec<River>, StoreError> {
        let sql = format!("SELECT {RIVER_COLS} FROM rivers WHERE {clause}");
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params, river_row)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(RiverRow::into_river).collect()
    }

    fn filters_where(
        &self,
        clause: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<ChannelFilter>, StoreError> {
        let sql = format!(
            "SELECT id, river_id, channel, filter_enabled, filter_date_add \
             FROM channel_filters WHERE {clause}"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(ChannelFilterRow {
                    id: row.get(0)?,
                    river_id: row.get(1)?,
                    channel: row.get(2)?,
                    filter_enabled: row.get(3)?,
                    filter_date_add: row.get(4)?,
                })
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(ChannelFilterRow::into_filter).collect()
    }
}

impl StoreReader for Session<'_> {
    fn river(&self, id: i64) -> Result<Option<River>, StoreError> {
        Ok(self.rivers_where("id = ?1", rusqlite::params![id])?.into_iter().next())
    }

    fn river_by_slug(&self, account_id: i64, slug: &str) -> Result<Option<River>, StoreError> {
        Ok(self
            .rivers_where(
                "account_id = ?1 AND river_name_url = ?2",
                rusqlite::params![account_id, slug],
            )?
            .into_iter()
            .next())
    }

    fn rivers_by_ids(&self, ids: &[i64]) -> Result<Vec<River>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let clause = format!("id IN ({})", placeholders(ids.len()));
        let params: Vec<&dyn ToSql> = ids.iter().map(|id| id as &dyn ToSql).collect();
        self.rivers_where(&clause, &params)
    }

    fn rivers_for_account(&self, account_id: i64) -> Result<Vec<River>, StoreError> {
        self.rivers_where("account_id = ?1", rusqlite::params![account_id])
    }

    fn account(&self, id: i64) -> Result<Option<Account>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, user_id, account_path, public_account, river_quota_remaining \
                 FROM accounts WHERE id = ?1",
                [id],
                account_row,
            )
            .optional()
            .map_err(db_err)
    }

    fn account_for_user(&self, user_id: i64) -> Result<Option<Account>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, user_id, account_path, public_account, river_quota_remaining \
                 FROM accounts WHERE user_id = ?1",
                [user_id],
                account_row,
            )
            .optional()
            .map_err(db_err)
    }

    fn user(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, username, name, email FROM users WHERE id = ?1",
                [id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        name: row.get(2)?,
                        email: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)
    }

    fn collaborator(
        &self,
        river_id: i64,
        user_id: i64,
    ) -> Result<Option<Collaborator>, StoreError> {
        self.conn
            .query_row(
                "SELECT river_id, user_id, read_only, collaborator_active \
                 FROM river_collaborators WHERE river_id = ?1 AND user_id = ?2",
                [river_id, user_id],
                |row| {
                    Ok(Collaborator {
                        river_id: row.get(0)?,
                        user_id: row.get(1)?,
                        read_only: row.get(2)?,
                        active: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)
    }

    fn collaborators(
        &self,
        river_id: i64,
    ) -> Result<Vec<(Collaborator, User, String)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.river_id, c.user_id, c.read_only, c.collaborator_active, \
                        u.username, u.name, u.email, COALESCE(a.account_path, '') \
                 FROM river_collaborators c \
                 INNER JOIN users u ON c.user_id = u.id \
                 LEFT JOIN accounts a ON a.user_id = u.id \
                 WHERE c.river_id = ?1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([river_id], |row| {
                Ok((
                    Collaborator {
                        river_id: row.get(0)?,
                        user_id: row.get(1)?,
                        read_only: row.get(2)?,
                        active: row.get(3)?,
                    },
                    User {
                        id: row.get(1)?,
                        username: row.get(4)?,
                        name: row.get(5)?,
                        email: row.get(6)?,
                    },
                    row.get(7)?,
                ))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    fn active_collaborations(&self, user_id: i64) -> Result<Vec<i64>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT river_id FROM river_collaborators \
                 WHERE user_id = ?1 AND collaborator_active = 1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([user_id], |row| row.get(0))
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    fn is_subscriber(&self, river_id: i64, user_id: i64) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM river_subscriptions WHERE river_id = ?1 AND user_id = ?2",
                [river_id, user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(found.is_some())
    }

    fn subscriber_count(&self, river_id: i64) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM river_subscriptions WHERE river_id = ?1",
                [river_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as u64)
    }

    fn channel_filters(
        &self,
        river_id: i64,
        enabled_only: bool,
    ) -> Result<Vec<ChannelFilter>, StoreError> {
        if enabled_only {
            self.filters_where("river_id = ?1 AND filter_enabled = 1", rusqlite::params![river_id])
        } else {
            self.filters_where("river_id = ?1", rusqlite::params![river_id])
        }
    }

    fn channel_filter_by_key(
        &self,
        river_id: i64,
        channel: &str,
    ) -> Result<Option<ChannelFilter>, StoreError> {
        Ok(self
            .filters_where("river_id = ?1 AND channel = ?2", rusqlite::params![river_id, channel])?
            .into_iter()
            .next())
    }

    fn channel_filter_by_id(
        &self,
        river_id: i64,
        id: i64,
    ) -> Result<Option<ChannelFilter>, StoreError> {
        Ok(self
            .filters_where("river_id = ?1 AND id = ?2", rusqlite::params![river_id, id])?
            .into_iter()
            .next())
    }

    fn channel_filter_options(
        &self,
        channel_filter_id: i64,
    ) -> Result<Vec<ChannelFilterOption>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, channel_filter_id, key, value \
                 FROM channel_filter_options WHERE channel_filter_id = ?1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([channel_filter_id], |row| {
                Ok(ChannelFilterOptionRow {
                    id: row.get(0)?,
                    channel_filter_id: row.get(1)?,
                    key: row.get(2)?,
                    value: row.get(3)?,
                })
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter()
            .map(ChannelFilterOptionRow::into_option)
            .collect()
    }

    fn channel_quota_usage(
        &self,
        channel_filter_id: i64,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT key, COUNT(*) FROM channel_filter_options \
                 WHERE channel_filter_id = ?1 GROUP BY key",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([channel_filter_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    fn channel_quota(
        &self,
        account_id: i64,
        channel: &str,
        key: &str,
    ) -> Result<ChannelQuota, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT quota_used, quota_limit FROM account_channel_quotas \
                 WHERE account_id = ?1 AND channel = ?2 AND key = ?3",
                rusqlite::params![account_id, channel, key],
                |row| {
                    Ok(ChannelQuota {
                        used: row.get(0)?,
                        limit: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)?
            .unwrap_or_default())
    }

    fn fetch_drops(&self, query: &DropQuery) -> Result<Vec<DropRow>, StoreError> {
        let mut sql = String::from(
            "SELECT d.id, rd.id, d.droplet_title, d.droplet_content, d.channel, \
                    i.identity_name, i.identity_avatar, d.droplet_date_pub, \
                    s.score, l.url, d.comment_count \
             FROM rivers_droplets rd \
             INNER JOIN droplets d ON rd.droplet_id = d.id \
             INNER JOIN identities i ON d.identity_id = i.id \
             LEFT JOIN droplet_scores s ON s.droplet_id = d.id AND s.user_id = ? \
             LEFT JOIN links l ON l.id = d.original_url \
             WHERE rd.river_id = ? AND rd.droplet_date_pub > ?",
        );
        let mut params: Vec<Box<dyn ToSql>> = vec![
            Box::new(query.viewer_id),
            Box::new(query.river_id),
            Box::new(encode_ts(river_core::store::zero_date())),
        ];

        if let Some(drop_id) = query.drop_id {
            sql.push_str(" AND d.id = ?");
            params.push(Box::new(drop_id));
        } else {
            match query.window {
                DropWindow::Page { max_sort_id, .. } => {
                    sql.push_str(" AND rd.id <= ?");
                    params.push(Box::new(max_sort_id));
                }
                DropWindow::Since { since_sort_id, .. } => {
                    sql.push_str(" AND rd.id > ?");
                    params.push(Box::new(since_sort_id));
                }
            }
        }

        if query.photos_only {
            sql.push_str(" AND d.droplet_image > 0");
        }

        let filters = &query.filters;
        if !filters.channels.is_empty() {
            sql.push_str(&format!(
                " AND d.channel IN ({})",
                placeholders(filters.channels.len())
            ));
            for channel in &filters.channels {
                params.push(Box::new(channel.clone()));
            }
        }
        if !filters.tags.is_empty() {
            sql.push_str(&format!(
                " AND d.id IN (SELECT droplet_id FROM droplet_tags \
                   WHERE account_id = ? AND tag IN ({}))",
                placeholders(filters.tags.len())
            ));
            params.push(Box::new(query.account_id));
            for tag in &filters.tags {
                params.push(Box::new(tag.clone()));
            }
        }
        if let Some(from) = filters.date_from {
            sql.push_str(" AND d.droplet_date_pub >= ?");
            params.push(Box::new(encode_ts(from)));
        }
        if let Some(to) = filters.date_to {
            sql.push_str(" AND d.droplet_date_pub <= ?");
            params.push(Box::new(encode_ts(to)));
        }

        match query.window {
            DropWindow::Page { limit, offset, .. } => {
                sql.push_str(" ORDER BY rd.droplet_date_pub DESC, rd.id DESC LIMIT ? OFFSET ?");
                params.push(Box::new(limit as i64));
                params.push(Box::new(offset as i64));
            }
            DropWindow::Since { limit, .. } => {
                sql.push_str(" ORDER BY rd.id ASC LIMIT ?");
                params.push(Box::new(limit as i64));
            }
        }

        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok((
                    DropRow {
                        id: row.get(0)?,
                        sort_id: row.get(1)?,
                        title: row.get(2)?,
                        content: row.get(3)?,
                        channel: row.get(4)?,
                        identity_name: row.get(5)?,
                        identity_avatar: row.get(6)?,
                        date_pub: DateTime::UNIX_EPOCH,
                        user_score: row.get(8)?,
                        original_url: row.get(9)?,
                        comment_count: row.get(10)?,
                    },
                    row.get::<_, String>(7)?,
                ))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        rows.into_iter()
            .map(|(mut drop, raw_date)| {
                drop.date_pub = decode_ts(&raw_date)?;
                Ok(drop)
            })
            .collect()
    }

    fn drop_tags(
        &self,
        account_id: i64,
        drop_ids: &[i64],
    ) -> Result<Vec<(i64, DropTag)>, StoreError> {
        if drop_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT droplet_id, id, tag FROM droplet_tags \
             WHERE account_id = ?1 AND droplet_id IN ({})",
            placeholders(drop_ids.len())
        );
        let mut params: Vec<&dyn ToSql> = vec![&account_id];
        params.extend(drop_ids.iter().map(|id| id as &dyn ToSql));
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params.as_slice(), |row| {
                Ok((
                    row.get(0)?,
                    DropTag {
                        id: row.get(1)?,
                        tag: row.get(2)?,
                    },
                ))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    fn drop_places(
        &self,
        account_id: i64,
        drop_ids: &[i64],
    ) -> Result<Vec<(i64, DropPlace)>, StoreError> {
        if drop_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT droplet_id, id, place_name FROM droplet_places \
             WHERE account_id = ?1 AND droplet_id IN ({})",
            placeholders(drop_ids.len())
        );
        let mut params: Vec<&dyn ToSql> = vec![&account_id];
        params.extend(drop_ids.iter().map(|id| id as &dyn ToSql));
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params.as_slice(), |row| {
                Ok((
                    row.get(0)?,
                    DropPlace {
                        id: row.get(1)?,
                        place_name: row.get(2)?,
                    },
                ))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    fn drop_links(
        &self,
        _account_id: i64,
        drop_ids: &[i64],
    ) -> Result<Vec<(i64, DropLink)>, StoreError> {
        if drop_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT d.id, l.id, l.url FROM droplets d \
             INNER JOIN links l ON l.id = d.original_url \
             WHERE d.id IN ({})",
            placeholders(drop_ids.len())
        );
        let params: Vec<&dyn ToSql> = drop_ids.iter().map(|id| id as &dyn ToSql).collect();
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params.as_slice(), |row| {
                Ok((
                    row.get(0)?,
                    DropLink {
                        id: row.get(1)?,
                        url: row.get(2)?,
                    },
                ))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    fn max_drop_id(&self, river_id: i64) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT max_drop_id FROM rivers WHERE id = ?1",
                [river_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?
            .unwrap_or(0))
    }

    fn rivers_like(&self, term: &str) -> Result<Vec<SearchRow>, StoreError> {
        let pattern = format!("%{}%", term.to_lowercase());
        let mut stmt = self
            .conn
            .prepare(
                "SELECT r.id, r.river_name, r.river_name_url, r.account_id, \
                        a.account_path, r.river_public \
                 FROM rivers r \
                 INNER JOIN accounts a ON r.account_id = a.id \
                 WHERE LOWER(r.river_name) LIKE ?1 OR LOWER(r.river_name_url) LIKE ?1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([&pattern], |row| {
                Ok(SearchRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    slug: row.get(2)?,
                    account_id: row.get(3)?,
                    account_path: row.get(4)?,
                    public: row.get(5)?,
                })
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }
}

impl StoreWriter for Session<'_> {
    fn insert_river(&mut self, river: &NewRiver) -> Result<River, StoreError> {
        self.conn
            .execute(
                "INSERT INTO rivers (river_name, river_name_url, account_id, river_public, \
                    river_date_add, river_date_expiry, drop_quota) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    river.name,
                    river.slug,
                    river.account_id,
                    river.public,
                    encode_ts(river.date_added),
                    encode_ts(river.date_expiry),
                    river.drop_quota,
                ],
            )
            .map_err(db_err)?;
        let id = self.conn.last_insert_rowid();
        self.river(id)?
            .ok_or(StoreError::Constraint("inserted river not readable"))
    }

    fn update_river(&mut self, river: &River) -> Result<(), StoreError> {
        let updated = self
            .conn
            .execute(
                "UPDATE rivers SET river_name = ?1, river_name_url = ?2, river_public = ?3, \
                    default_layout = ?4, river_date_expiry = ?5, river_active = ?6, \
                    river_expired = ?7, river_full = ?8, expiry_notification_sent = ?9, \
                    extension_count = ?10, drop_quota = ?11, public_token = ?12 \
                 WHERE id = ?13",
                rusqlite::params![
                    river.name,
                    river.slug,
                    river.public,
                    river.default_layout.as_str(),
                    encode_ts(river.date_expiry),
                    river.active,
                    river.expired,
                    river.full,
                    river.expiry_notification_sent,
                    river.extension_count,
                    river.drop_quota,
                    river.public_token,
                    river.id,
                ],
            )
            .map_err(db_err)?;
        if updated == 0 {
            return Err(StoreError::Constraint("update of missing river"));
        }
        Ok(())
    }

    fn delete_river(&mut self, river_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM rivers WHERE id = ?1", [river_id])
            .map_err(db_err)?;
        Ok(())
    }

    fn debit_river_quota(&mut self, account_id: i64) -> Result<(), StoreError> {
        let updated = self
            .conn
            .execute(
                "UPDATE accounts SET river_quota_remaining = river_quota_remaining - 1 \
                 WHERE id = ?1 AND river_quota_remaining > 0",
                [account_id],
            )
            .map_err(db_err)?;
        if updated == 0 {
            return Err(StoreError::Constraint("river quota counter underflow"));
        }
        Ok(())
    }

    fn credit_river_quota(&mut self, account_id: i64, amount: i64) -> Result<(), StoreError> {
        let updated = self
            .conn
            .execute(
                "UPDATE accounts SET river_quota_remaining = river_quota_remaining + ?2 \
                 WHERE id = ?1",
                rusqlite::params![account_id, amount],
            )
            .map_err(db_err)?;
        if updated == 0 {
            return Err(StoreError::Constraint("credit against missing account"));
        }
        Ok(())
    }

    fn debit_channel_quota(
        &mut self,
        account_id: i64,
        channel: &str,
        key: &str,
        amount: i64,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO account_channel_quotas (account_id, channel, key, quota_used) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(account_id, channel, key) \
                 DO UPDATE SET quota_used = quota_used + excluded.quota_used",
                rusqlite::params![account_id, channel, key, amount],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn credit_channel_quota(
        &mut self,
        account_id: i64,
        channel: &str,
        key: &str,
        amount: i64,
    ) -> Result<(), StoreError> {
        let updated = self
            .conn
            .execute(
                "UPDATE account_channel_quotas SET quota_used = quota_used - ?4 \
                 WHERE account_id = ?1 AND channel = ?2 AND key = ?3 AND quota_used >= ?4",
                rusqlite::params![account_id, channel, key, amount],
            )
            .map_err(db_err)?;
        if updated == 0 {
            return Err(StoreError::Constraint("channel quota counter underflow"));
        }
        Ok(())
    }

    fn delete_channel_filter_options_for_river(
        &mut self,
        river_id: i64,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM channel_filter_options WHERE channel_filter_id IN \
                 (SELECT id FROM channel_filters WHERE river_id = ?1)",
                [river_id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn delete_channel_filters_for_river(&mut self, river_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM channel_filters WHERE river_id = ?1", [river_id])
            .map_err(db_err)?;
        Ok(())
    }

    fn delete_river_drops(&mut self, river_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM rivers_droplets WHERE river_id = ?1", [river_id])
            .map_err(db_err)?;
        Ok(())
    }

    fn delete_subscriptions_for_river(&mut self, river_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM river_subscriptions WHERE river_id = ?1", [river_id])
            .map_err(db_err)?;
        Ok(())
    }

    fn delete_collaborators_for_river(&mut self, river_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM river_collaborators WHERE river_id = ?1", [river_id])
            .map_err(db_err)?;
        Ok(())
    }

    fn insert_channel_filter(
        &mut self,
        river_id: i64,
        channel: &str,
        enabled: bool,
        date_added: DateTime<Utc>,
    ) -> Result<ChannelFilter, StoreError> {
        self.conn
            .execute(
                "INSERT INTO channel_filters (river_id, channel, filter_enabled, filter_date_add) \
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![river_id, channel, enabled, encode_ts(date_added)],
            )
            .map_err(db_err)?;
        let id = self.conn.last_insert_rowid();
        self.channel_filter_by_id(river_id, id)?
            .ok_or(StoreError::Constraint("inserted channel filter not readable"))
    }

    fn set_channel_filter_enabled(&mut self, id: i64, enabled: bool) -> Result<(), StoreError> {
        let updated = self
            .conn
            .execute(
                "UPDATE channel_filters SET filter_enabled = ?2 WHERE id = ?1",
                rusqlite::params![id, enabled],
            )
            .map_err(db_err)?;
        if updated == 0 {
            return Err(StoreError::Constraint("toggle of missing channel filter"));
        }
        Ok(())
    }

    fn delete_channel_filter(&mut self, id: i64) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM channel_filter_options WHERE channel_filter_id = ?1",
                [id],
            )
            .map_err(db_err)?;
        self.conn
            .execute("DELETE FROM channel_filters WHERE id = ?1", [id])
            .map_err(db_err)?;
        Ok(())
    }

    fn insert_channel_filter_option(
        &mut self,
        channel_filter_id: i64,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<ChannelFilterOption, StoreError> {
        let encoded = serde_json::to_string(value)
            .map_err(|_| StoreError::Constraint("unencodable option value"))?;
        self.conn
            .execute(
                "INSERT INTO channel_filter_options (channel_filter_id, key, value) \
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![channel_filter_id, key, encoded],
            )
            .map_err(db_err)?;
        Ok(ChannelFilterOption {
            id: self.conn.last_insert_rowid(),
            channel_filter_id,
            key: key.to_string(),
            value: value.clone(),
        })
    }

    fn delete_channel_filter_option(
        &mut self,
        channel_filter_id: i64,
        option_id: i64,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM channel_filter_options WHERE id = ?1 AND channel_filter_id = ?2",
                [option_id, channel_filter_id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn upsert_collaborator(&mut self, collaborator: &Collaborator) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO river_collaborators (river_id, user_id, read_only, collaborator_active) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(river_id, user_id) \
                 DO UPDATE SET read_only = excluded.read_only, \
                               collaborator_active = excluded.collaborator_active",
                rusqlite::params![
                    collaborator.river_id,
                    collaborator.user_id,
                    collaborator.read_only,
                    collaborator.active,
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn remove_collaborator(&mut self, river_id: i64, user_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM river_collaborators WHERE river_id = ?1 AND user_id = ?2",
                [river_id, user_id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn add_subscription(&mut self, river_id: i64, user_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO river_subscriptions (river_id, user_id) VALUES (?1, ?2)",
                [river_id, user_id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn remove_subscription(&mut self, river_id: i64, user_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM river_subscriptions WHERE river_id = ?1 AND user_id = ?2",
                [river_id, user_id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn add_drop(
        &mut self,
        river_id: i64,
        droplet_id: i64,
        date_pub: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.conn
            .execute(
                "INSERT INTO rivers_droplets (river_id, droplet_id, droplet_date_pub) \
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![river_id, droplet_id, encode_ts(date_pub)],
            )
            .map_err(db_err)?;
        let sort_id = self.conn.last_insert_rowid();
        self.conn
            .execute(
                "UPDATE rivers SET max_drop_id = MAX(max_drop_id, ?2) WHERE id = ?1",
                rusqlite::params![river_id, sort_id],
            )
            .map_err(db_err)?;
        Ok(sort_id)
    }

    fn remove_drop(&mut self, river_id: i64, droplet_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM rivers_droplets WHERE river_id = ?1 AND droplet_id = ?2",
                [river_id, droplet_id],
            )
            .map_err(db_err)?;
        Ok(())
    }
}

/// Droplet fields for seeding; ingestion itself lives outside this system.
pub struct NewDroplet<'a> {
    pub id: i64,
    pub identity_id: i64,
    pub channel: &'a str,
    pub title: &'a str,
    pub content: &'a str,
    pub date_pub: DateTime<Utc>,
    pub image: i64,
    pub original_url: Option<i64>,
    pub comment_count: i64,
}

impl Database {
    pub fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, name, email) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![user.id, user.username, user.name, user.email],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    pub fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO accounts (id, user_id, account_path, public_account, \
                    river_quota_remaining) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    account.id,
                    account.user_id,
                    account.account_path,
                    account.public_account,
                    account.river_quota_remaining,
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    pub fn insert_identity(&self, id: i64, name: &str, avatar: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO identities (id, identity_name, identity_avatar) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, name, avatar],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    pub fn insert_link(&self, id: i64, url: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO links (id, url) VALUES (?1, ?2)",
                rusqlite::params![id, url],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    pub fn insert_droplet(&self, droplet: &NewDroplet) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO droplets (id, identity_id, channel, droplet_title, \
                    droplet_content, droplet_date_pub, droplet_image, original_url, \
                    comment_count) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    droplet.id,
                    droplet.identity_id,
                    droplet.channel,
                    droplet.title,
                    droplet.content,
                    encode_ts(droplet.date_pub),
                    droplet.image,
                    droplet.original_url,
                    droplet.comment_count,
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    pub fn insert_score(
        &self,
        droplet_id: i64,
        user_id: i64,
        score: i64,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO droplet_scores (droplet_id, user_id, score) VALUES (?1, ?2, ?3)",
                rusqlite::params![droplet_id, user_id, score],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    pub fn insert_tag(
        &self,
        droplet_id: i64,
        account_id: i64,
        tag: &str,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO droplet_tags (droplet_id, account_id, tag) VALUES (?1, ?2, ?3)",
                rusqlite::params![droplet_id, account_id, tag],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    pub fn insert_place(
        &self,
        droplet_id: i64,
        account_id: i64,
        place_name: &str,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO droplet_places (droplet_id, account_id, place_name) \
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![droplet_id, account_id, place_name],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;

    use river_core::feed::{DropFilters, FeedQuery};
    use river_core::rivers::{RiverDefaults, RiverService};
    use river_core::search::SearchMatcher;
    use river_core::store::Store;
    use river_core::{CoreError, NoopCache, NoopEvents};

    fn service(db: Arc<Database>) -> RiverService<Database> {
        RiverService::new(
            db,
            Arc::new(NoopCache),
            Arc::new(NoopEvents),
            RiverDefaults::default(),
        )
    }

    fn seeded_db(river_quota: i64) -> Arc<Database> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.insert_user(&User {
            id: 1,
            username: "owner".to_string(),
            name: "Owner".to_string(),
            email: "owner@example.org".to_string(),
        })
        .unwrap();
        db.insert_account(&Account {
            id: 1,
            user_id: 1,
            account_path: "default".to_string(),
            public_account: false,
            river_quota_remaining: river_quota,
        })
        .unwrap();
        db
    }

    fn pub_date(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2012, 7, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn river_rows_round_trip() {
        let db = seeded_db(5);
        let service = service(db.clone());

        let created = service
            .create_river(1, "Flood Watch", true, None)
            .unwrap();
        let loaded = service.river(created.id).unwrap();
        assert_eq!(loaded.name, "Flood Watch");
        assert_eq!(loaded.slug, "flood-watch");
        assert_eq!(loaded.date_expiry, created.date_expiry);
        assert!(loaded.public_token.is_none());
    }

    #[test]
    fn quota_gate_commits_nothing_when_exhausted() {
        let db = seeded_db(1);
        let service = service(db.clone());

        service.create_river(1, "River A", true, None).unwrap();
        let err = service.create_river(1, "River B", true, None).unwrap_err();
        assert!(matches!(err, CoreError::QuotaExceeded));

        let rivers = db.read(|r| r.rivers_for_account(1)).unwrap();
        assert_eq!(rivers.len(), 1);
        let account = db.read(|r| r.account(1)).unwrap().unwrap();
        assert_eq!(account.river_quota_remaining, 0);
    }

    #[test]
    fn transaction_errors_roll_back_the_insert() {
        let db = seeded_db(5);

        let result: Result<(), StoreError> = db.with_tx(|tx| {
            tx.insert_river(&NewRiver {
                name: "Doomed".to_string(),
                slug: "doomed".to_string(),
                account_id: 1,
                public: false,
                date_added: pub_date(1),
                date_expiry: pub_date(15),
                drop_quota: 10_000,
            })?;
            Err(StoreError::Backend("forced".to_string()))
        });
        assert!(result.is_err());
        assert!(db.read(|r| r.rivers_for_account(1)).unwrap().is_empty());
    }

    #[test]
    fn delete_cascades_across_all_tables() {
        let db = seeded_db(1);
        let service = service(db.clone());
        let river = service.create_river(1, "Busy River", true, None).unwrap();

        db.insert_identity(1, "BBC", "avatar.png").unwrap();
        db.insert_droplet(&NewDroplet {
            id: 500,
            identity_id: 1,
            channel: "rss",
            title: "t",
            content: "c",
            date_pub: pub_date(1),
            image: 0,
            original_url: None,
            comment_count: 0,
        })
        .unwrap();

        db.with_tx(|tx| {
            let filter = tx.insert_channel_filter(river.id, "twitter", true, Utc::now())?;
            tx.insert_channel_filter_option(filter.id, "keyword", &serde_json::json!("floods"))?;
            tx.debit_channel_quota(1, "twitter", "keyword", 1)?;
            tx.add_drop(river.id, 500, pub_date(1))?;
            tx.add_subscription(river.id, 1)?;
            tx.upsert_collaborator(&Collaborator {
                river_id: river.id,
                user_id: 1,
                read_only: false,
                active: true,
            })?;
            Ok::<_, StoreError>(())
        })
        .unwrap();

        service.delete_river(river.id).unwrap();

        db.read(|r| {
            assert!(r.river(river.id)?.is_none());
            assert!(r.channel_filters(river.id, false)?.is_empty());
            assert_eq!(r.subscriber_count(river.id)?, 0);
            assert!(r.collaborators(river.id)?.is_empty());
            assert_eq!(r.channel_quota(1, "twitter", "keyword")?.used, 0);
            Ok(())
        })
        .unwrap();
        let account = db.read(|r| r.account(1)).unwrap().unwrap();
        assert_eq!(account.river_quota_remaining, 1);

        // The droplet itself is never deleted with the river.
        let orphaned: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM droplets", [], |row| row.get(0))
                    .map_err(db_err)
            })
            .unwrap();
        assert_eq!(orphaned, 1);
    }

    #[test]
    fn feed_query_joins_filter_and_order() {
        let db = seeded_db(5);
        let service = service(db.clone());
        let river = service.create_river(1, "Flood Watch", true, None).unwrap();

        db.insert_identity(1, "BBC", "avatar.png").unwrap();
        db.insert_link(5, "https://example.org/original").unwrap();
        for (id, day, channel, image, link) in [
            (101, 1, "rss", 0, None),
            (102, 2, "twitter", 7, Some(5)),
            (103, 3, "rss", 0, None),
        ] {
            db.insert_droplet(&NewDroplet {
                id,
                identity_id: 1,
                channel,
                title: "t",
                content: "c",
                date_pub: pub_date(day),
                image,
                original_url: link,
                comment_count: 2,
            })
            .unwrap();
            db.with_tx(|tx| tx.add_drop(river.id, id, pub_date(day)))
                .unwrap();
        }
        db.insert_score(103, 1, 2).unwrap();
        db.insert_tag(101, 1, "floods").unwrap();

        let feed = FeedQuery::new(db.clone(), Arc::new(NoopCache), std::time::Duration::from_secs(60));

        let all = feed
            .get_droplets(1, river.id, None, 1, i64::MAX, false, &DropFilters::default(), 50)
            .unwrap();
        assert_eq!(all.iter().map(|d| d.id).collect::<Vec<_>>(), vec![103, 102, 101]);
        assert_eq!(all[0].user_score, Some(2));
        assert_eq!(all[1].user_score, None);
        assert_eq!(all[1].original_url.as_deref(), Some("https://example.org/original"));
        assert_eq!(all[0].identity_name, "BBC");

        let photos = feed
            .get_droplets(1, river.id, None, 1, i64::MAX, true, &DropFilters::default(), 50)
            .unwrap();
        assert_eq!(photos.iter().map(|d| d.id).collect::<Vec<_>>(), vec![102]);

        let tagged = feed
            .get_droplets(
                1,
                river.id,
                None,
                1,
                i64::MAX,
                false,
                &DropFilters {
                    tags: vec!["floods".to_string()],
                    ..Default::default()
                },
                50,
            )
            .unwrap();
        assert_eq!(tagged.iter().map(|d| d.id).collect::<Vec<_>>(), vec![101]);
        assert_eq!(tagged[0].tags.len(), 1);

        let since = feed
            .get_droplets_since_id(1, river.id, 1, &DropFilters::default(), false, 100)
            .unwrap();
        assert_eq!(since.iter().map(|d| d.sort_id).collect::<Vec<_>>(), vec![2, 3]);

        assert_eq!(feed.get_max_droplet_id(river.id).unwrap(), 3);
    }

    #[test]
    fn collaborator_upsert_is_unique_per_pair() {
        let db = seeded_db(5);
        let service = service(db.clone());
        let river = service.create_river(1, "River A", true, None).unwrap();

        service.add_collaborator(river.id, 1, true).unwrap();
        service.add_collaborator(river.id, 1, false).unwrap();

        let collaborators = service.collaborators(river.id, false).unwrap();
        assert_eq!(collaborators.len(), 1);
        assert!(!collaborators[0].read_only);
        assert_eq!(collaborators[0].account_path, "default");
    }

    #[test]
    fn search_goes_through_sql_like() {
        let db = seeded_db(5);
        let service = service(db.clone());
        service.create_river(1, "Nairobi Floods", true, None).unwrap();

        let matcher = SearchMatcher::new(db);
        let hits = matcher.rivers_like("FLOOD", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "nairobi-floods");
    }

    #[test]
    fn token_persists_through_sqlite() {
        let db = seeded_db(5);
        let service = service(db.clone());
        let river = service.create_river(1, "River A", true, None).unwrap();

        let token = service.set_token(river.id).unwrap();
        service.validate_token(river.id, &token).unwrap();
        assert!(matches!(
            service.validate_token(river.id, "wrong").unwrap_err(),
            CoreError::InvalidToken
        ));
    }
}
