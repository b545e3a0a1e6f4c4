use std::fs;
use std::path::{Path, PathBuf};

use sqlx::{SqlitePool, migrate::Migrator, sqlite::SqliteConnectOptions};
use thiserror::Error;

use super::association::AssociationManager;
use super::records::{Record, RecordRef, Table};
use super::staleness::now_unix;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("record body is not valid: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("XDG data directory is unavailable")]
    MissingDataDir,
    #[error("invalid table: {0}")]
    InvalidTable(String),
    #[error("record not found: {0}")]
    Missing(RecordRef),
}

/// Outcome of a point lookup. Absence is an expected answer, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    Absent,
}

impl<T> Lookup<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Found(record) => Some(record),
            Lookup::Absent => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted<T> {
    pub record: T,
    pub created: bool,
}

/// Document store addressed by `(table, id)`.
///
/// Cloning is cheap and every clone shares the same connection pool.
#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn new_at(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub fn associations(&self) -> AssociationManager {
        AssociationManager::new(self.pool.clone())
    }

    pub async fn lookup<T: Record>(&self, id: &str) -> Result<Lookup<T>, StoreError> {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM records WHERE tbl = ?1 AND id = ?2")
                .bind(T::TABLE.as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match body {
            Some(body) => Ok(Lookup::Found(serde_json::from_str(&body)?)),
            None => Ok(Lookup::Absent),
        }
    }

    /// Return the stored record for `proposed`'s id, creating it from
    /// `proposed` when absent. An existing record is never overwritten.
    pub async fn upsert_or_create<T: Record + Clone>(
        &self,
        proposed: &T,
    ) -> Result<Upserted<T>, StoreError> {
        if let Lookup::Found(record) = self.lookup::<T>(proposed.id()).await? {
            return Ok(Upserted {
                record,
                created: false,
            });
        }

        let now = now_unix();
        let inserted = sqlx::query(
            "INSERT INTO records (tbl, id, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(tbl, id) DO NOTHING",
        )
        .bind(T::TABLE.as_str())
        .bind(proposed.id())
        .bind(serde_json::to_string(proposed)?)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            // Another writer created it between the lookup and the insert.
            return match self.lookup::<T>(proposed.id()).await? {
                Lookup::Found(record) => Ok(Upserted {
                    record,
                    created: false,
                }),
                Lookup::Absent => Err(StoreError::Missing(proposed.record_ref())),
            };
        }

        Ok(Upserted {
            record: proposed.clone(),
            created: true,
        })
    }

    /// Overwrite the body of an existing record.
    pub async fn replace<T: Record>(&self, record: &T) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE records SET body = ?1, updated_at = ?2 WHERE tbl = ?3 AND id = ?4",
        )
        .bind(serde_json::to_string(record)?)
        .bind(now_unix())
        .bind(T::TABLE.as_str())
        .bind(record.id())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::Missing(record.record_ref()));
        }
        Ok(())
    }

    pub async fn count(&self, table: Table) -> Result<i64, StoreError> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE tbl = ?1")
                .bind(table.as_str())
                .fetch_one(&self.pool)
                .await?,
        )
    }
}

pub fn default_db_path() -> Result<PathBuf, StoreError> {
    let mut path = dirs::data_dir().ok_or(StoreError::MissingDataDir)?;
    path.push("ytdig");
    path.push("index.db");
    Ok(path)
}
