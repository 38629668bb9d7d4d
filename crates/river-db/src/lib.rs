//! SQLite implementation of the engine's store traits.

pub mod migrations;
pub mod models;
pub mod queries;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use river_core::store::{Store, StoreError, StoreReader, StoreWriter};

use crate::queries::Session;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::init(conn, Some(path))
    }

    /// Private in-memory database; used by the test suites.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<&Path>) -> Result<Self, StoreError> {
        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL").map_err(db_err)?;
        conn.pragma_update(None, "foreign_keys", "ON").map_err(db_err)?;

        migrations::run(&conn)?;

        if let Some(path) = path {
            info!("Database opened at {}", path.display());
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Backend(format!("DB lock poisoned: {e}")))?;
        f(&conn)
    }
}

impl Store for Database {
    fn read<T>(
        &self,
        f: impl FnOnce(&dyn StoreReader) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.with_conn(|conn| f(&Session { conn }))
    }

    fn with_tx<T, E>(&self, f: impl FnOnce(&mut dyn StoreWriter) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Backend(format!("DB lock poisoned: {e}")))?;
        let tx = conn.transaction().map_err(|e| E::from(db_err(e)))?;

        let out = {
            let mut session = Session { conn: &*tx };
            f(&mut session)
        };

        match out {
            Ok(value) => {
                tx.commit().map_err(|e| E::from(db_err(e)))?;
                Ok(value)
            }
            Err(e) => {
                // Dropping the transaction rolls it back; make it explicit.
                let _ = tx.rollback();
                Err(e)
            }
        }
    }
}

pub(crate) fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}
