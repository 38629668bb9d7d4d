use rusqlite::Connection;
use tracing::info;

use river_core::store::StoreError;

use crate::db_err;

pub fn run(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS accounts (
            id                      INTEGER PRIMARY KEY,
            user_id                 INTEGER NOT NULL REFERENCES users(id),
            account_path            TEXT NOT NULL UNIQUE,
            public_account          INTEGER NOT NULL DEFAULT 0,
            river_quota_remaining   INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS rivers (
            id                          INTEGER PRIMARY KEY AUTOINCREMENT,
            river_name                  TEXT NOT NULL,
            river_name_url              TEXT NOT NULL,
            account_id                  INTEGER NOT NULL REFERENCES accounts(id),
            river_public                INTEGER NOT NULL DEFAULT 0,
            default_layout              TEXT NOT NULL DEFAULT 'drops',
            river_date_add              TEXT NOT NULL,
            river_date_expiry           TEXT NOT NULL,
            river_active                INTEGER NOT NULL DEFAULT 1,
            river_expired               INTEGER NOT NULL DEFAULT 0,
            river_full                  INTEGER NOT NULL DEFAULT 0,
            expiry_notification_sent    INTEGER NOT NULL DEFAULT 0,
            extension_count             INTEGER NOT NULL DEFAULT 0,
            drop_quota                  INTEGER NOT NULL DEFAULT 0,
            max_drop_id                 INTEGER NOT NULL DEFAULT 0,
            public_token                TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_rivers_account
            ON rivers(account_id);

        CREATE TABLE IF NOT EXISTS channel_filters (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            river_id            INTEGER NOT NULL REFERENCES rivers(id),
            channel             TEXT NOT NULL,
            filter_enabled      INTEGER NOT NULL DEFAULT 1,
            filter_date_add     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_channel_filters_river
            ON channel_filters(river_id);

        CREATE TABLE IF NOT EXISTS channel_filter_options (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            channel_filter_id   INTEGER NOT NULL REFERENCES channel_filters(id),
            key                 TEXT NOT NULL,
            value               TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS river_collaborators (
            river_id            INTEGER NOT NULL REFERENCES rivers(id),
            user_id             INTEGER NOT NULL REFERENCES users(id),
            read_only           INTEGER NOT NULL DEFAULT 0,
            collaborator_active INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (river_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS river_subscriptions (
            river_id    INTEGER NOT NULL REFERENCES rivers(id),
            user_id     INTEGER NOT NULL REFERENCES users(id),
            PRIMARY KEY (river_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS identities (
            id              INTEGER PRIMARY KEY,
            identity_name   TEXT NOT NULL,
            identity_avatar TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS links (
            id  INTEGER PRIMARY KEY,
            url TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS droplets (
            id                  INTEGER PRIMARY KEY,
            identity_id         INTEGER NOT NULL REFERENCES identities(id),
            channel             TEXT NOT NULL,
            droplet_title       TEXT NOT NULL,
            droplet_content     TEXT NOT NULL,
            droplet_date_pub    TEXT NOT NULL,
            droplet_image       INTEGER NOT NULL DEFAULT 0,
            original_url        INTEGER REFERENCES links(id),
            comment_count       INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS rivers_droplets (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            river_id            INTEGER NOT NULL REFERENCES rivers(id),
            droplet_id          INTEGER NOT NULL REFERENCES droplets(id),
            droplet_date_pub    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_rivers_droplets_river
            ON rivers_droplets(river_id, droplet_date_pub);

        CREATE TABLE IF NOT EXISTS droplet_scores (
            droplet_id  INTEGER NOT NULL REFERENCES droplets(id),
            user_id     INTEGER NOT NULL REFERENCES users(id),
            score       INTEGER NOT NULL,
            PRIMARY KEY (droplet_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS droplet_tags (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            droplet_id  INTEGER NOT NULL REFERENCES droplets(id),
            account_id  INTEGER NOT NULL REFERENCES accounts(id),
            tag         TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_droplet_tags
            ON droplet_tags(droplet_id, account_id);

        CREATE TABLE IF NOT EXISTS droplet_places (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            droplet_id  INTEGER NOT NULL REFERENCES droplets(id),
            account_id  INTEGER NOT NULL REFERENCES accounts(id),
            place_name  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_droplet_places
            ON droplet_places(droplet_id, account_id);

        CREATE TABLE IF NOT EXISTS account_channel_quotas (
            account_id  INTEGER NOT NULL REFERENCES accounts(id),
            channel     TEXT NOT NULL,
            key         TEXT NOT NULL,
            quota_used  INTEGER NOT NULL DEFAULT 0,
            quota_limit INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (account_id, channel, key)
        );
        ",
    )
    .map_err(db_err)?;

    info!("Database migrations complete");
    Ok(())
}
