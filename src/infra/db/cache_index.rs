use sqlx::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::cache::{IndexError, IndexRecord, IndexStore, NewIndexRecord};

use super::{PostgresIndexStore, map_sqlx_error};

#[derive(Debug, sqlx::FromRow)]
struct CacheIndexRow {
    id: Uuid,
    path: String,
    page_type: Option<String>,
    expire_at: OffsetDateTime,
    created_at: OffsetDateTime,
}

impl From<CacheIndexRow> for IndexRecord {
    fn from(row: CacheIndexRow) -> Self {
        IndexRecord {
            id: row.id,
            path: row.path,
            page_type: row.page_type,
            expire_at: row.expire_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait::async_trait]
impl IndexStore for PostgresIndexStore {
    async fn create(&self, record: NewIndexRecord) -> Result<IndexRecord, IndexError> {
        let row = query_as::<_, CacheIndexRow>(
            r#"
            INSERT INTO cache_index (id, path, page_type, expire_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, path, page_type, expire_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.path)
        .bind(record.page_type)
        .bind(record.expire_at)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn list_expired(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<IndexRecord>, IndexError> {
        let rows = query_as::<_, CacheIndexRow>(
            r#"
            SELECT id, path, page_type, expire_at, created_at
            FROM cache_index
            WHERE expire_at <= $1
            ORDER BY expire_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(IndexRecord::from).collect())
    }

    async fn has_live(&self, path: &str, now: OffsetDateTime) -> Result<bool, IndexError> {
        let (live,) = query_as::<_, (bool,)>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM cache_index WHERE path = $1 AND expire_at > $2
            )
            "#,
        )
        .bind(path)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(live)
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<u64, IndexError> {
        let result = sqlx::query("DELETE FROM cache_index WHERE id = ANY($1)")
            .bind(ids)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
