use sqlx::{Row, SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::warn;

use super::records::{Record, RecordRef, Table};
use super::store::StoreError;

#[derive(Debug, Error)]
pub enum AssociationError {
    #[error("{0} does not resolve to a stored record")]
    Dangling(RecordRef),
    #[error("{child} is already listed in {parent}.{field}")]
    Duplicate {
        parent: RecordRef,
        field: String,
        child: RecordRef,
    },
    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Ordered, duplicate-free lists of references hanging off a parent record.
///
/// Every member must resolve to a stored record; the relation table enforces
/// it with foreign keys and [`AssociationManager::append`] checks it up front.
#[derive(Clone)]
pub struct AssociationManager {
    pool: SqlitePool,
}

impl AssociationManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Drop every member of `parent.field`. Returns how many were removed.
    pub async fn clear(&self, parent: &RecordRef, field: &str) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(clear_on(&mut conn, parent, field).await?)
    }

    /// Add `child` at the end of `parent.field` and return the new length.
    pub async fn append(
        &self,
        parent: &RecordRef,
        field: &str,
        child: &RecordRef,
    ) -> Result<usize, AssociationError> {
        let mut conn = self.pool.acquire().await?;
        append_on(&mut conn, parent, field, child).await
    }

    /// Replace the members of `parent.field` with `children`, in order.
    ///
    /// Runs in a single transaction, so readers see either the previous list
    /// or the rebuilt one. Children that cannot be appended (dangling or
    /// repeated) are logged and skipped; the returned count tells how many
    /// made it in. Only a database fault fails the whole rebuild.
    pub async fn rebuild(
        &self,
        parent: &RecordRef,
        field: &str,
        children: &[RecordRef],
    ) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        if !record_exists(&mut tx, parent).await? {
            return Err(StoreError::Missing(parent.clone()));
        }
        clear_on(&mut tx, parent, field).await?;

        let mut appended = 0usize;
        for child in children {
            match append_on(&mut tx, parent, field, child).await {
                Ok(_) => appended += 1,
                Err(AssociationError::Store(err)) => return Err(err.into()),
                Err(err) => {
                    warn!(
                        parent = %parent,
                        field,
                        child = %child,
                        error = %err,
                        "association member skipped"
                    );
                }
            }
        }

        tx.commit().await?;
        Ok(appended)
    }

    pub async fn members(
        &self,
        parent: &RecordRef,
        field: &str,
    ) -> Result<Vec<RecordRef>, StoreError> {
        let rows = sqlx::query(
            "SELECT child_tbl, child_id
             FROM relations
             WHERE parent_tbl = ?1 AND parent_id = ?2 AND field = ?3
             ORDER BY position ASC",
        )
        .bind(parent.table.as_str())
        .bind(&parent.id)
        .bind(field)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let table: String = row.try_get("child_tbl")?;
            let id: String = row.try_get("child_id")?;
            out.push(RecordRef::new(Table::parse(&table)?, id));
        }
        Ok(out)
    }

    /// Follow every reference in `parent.field` one level and return the
    /// stored records in relation order.
    pub async fn dereference<T: Record>(
        &self,
        parent: &RecordRef,
        field: &str,
    ) -> Result<Vec<T>, StoreError> {
        let bodies: Vec<String> = sqlx::query_scalar(
            "SELECT r.body
             FROM relations rel
             JOIN records r ON r.tbl = rel.child_tbl AND r.id = rel.child_id
             WHERE rel.parent_tbl = ?1 AND rel.parent_id = ?2 AND rel.field = ?3
               AND rel.child_tbl = ?4
             ORDER BY rel.position ASC",
        )
        .bind(parent.table.as_str())
        .bind(&parent.id)
        .bind(field)
        .bind(T::TABLE.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(bodies.len());
        for body in bodies {
            out.push(serde_json::from_str(&body)?);
        }
        Ok(out)
    }
}

async fn clear_on(
    conn: &mut SqliteConnection,
    parent: &RecordRef,
    field: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM relations WHERE parent_tbl = ?1 AND parent_id = ?2 AND field = ?3",
    )
    .bind(parent.table.as_str())
    .bind(&parent.id)
    .bind(field)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

async fn record_exists(
    conn: &mut SqliteConnection,
    record: &RecordRef,
) -> Result<bool, sqlx::Error> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM records WHERE tbl = ?1 AND id = ?2")
            .bind(record.table.as_str())
            .bind(&record.id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(found.is_some())
}

async fn append_on(
    conn: &mut SqliteConnection,
    parent: &RecordRef,
    field: &str,
    child: &RecordRef,
) -> Result<usize, AssociationError> {
    if !record_exists(conn, parent).await? {
        return Err(AssociationError::Dangling(parent.clone()));
    }
    if !record_exists(conn, child).await? {
        return Err(AssociationError::Dangling(child.clone()));
    }

    let listed: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM relations
         WHERE parent_tbl = ?1 AND parent_id = ?2 AND field = ?3
           AND child_tbl = ?4 AND child_id = ?5",
    )
    .bind(parent.table.as_str())
    .bind(&parent.id)
    .bind(field)
    .bind(child.table.as_str())
    .bind(&child.id)
    .fetch_optional(&mut *conn)
    .await?;
    if listed.is_some() {
        return Err(AssociationError::Duplicate {
            parent: parent.clone(),
            field: field.to_string(),
            child: child.clone(),
        });
    }

    sqlx::query(
        "INSERT INTO relations (parent_tbl, parent_id, field, position, child_tbl, child_id)
         SELECT ?1, ?2, ?3, COALESCE(MAX(position) + 1, 0), ?4, ?5
         FROM relations
         WHERE parent_tbl = ?1 AND parent_id = ?2 AND field = ?3",
    )
    .bind(parent.table.as_str())
    .bind(&parent.id)
    .bind(field)
    .bind(child.table.as_str())
    .bind(&child.id)
    .execute(&mut *conn)
    .await?;

    let len: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM relations WHERE parent_tbl = ?1 AND parent_id = ?2 AND field = ?3",
    )
    .bind(parent.table.as_str())
    .bind(&parent.id)
    .bind(field)
    .fetch_one(&mut *conn)
    .await?;
    Ok(len as usize)
}
