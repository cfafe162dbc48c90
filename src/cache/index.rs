//! Cache index bookkeeping.
//!
//! Every successful artifact write appends an `IndexRecord` carrying the
//! artifact path and its expiry. Records are never updated in place; an
//! expiry sweep reconciles the index with the filesystem.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::{
    error::IndexError,
    lock::{rw_read, rw_write},
};

const SOURCE: &str = "cache::index";

/// Metadata describing one cached artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    pub id: Uuid,
    pub path: String,
    pub page_type: Option<String>,
    pub expire_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewIndexRecord {
    pub path: String,
    pub page_type: Option<String>,
    pub expire_at: OffsetDateTime,
}

/// Persistence backend for index records.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Append a record. Duplicate paths are allowed.
    async fn create(&self, record: NewIndexRecord) -> Result<IndexRecord, IndexError>;

    /// Records whose `expire_at` is at or before `now`, oldest first.
    async fn list_expired(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<IndexRecord>, IndexError>;

    /// Whether any record for `path` is still valid after `now`.
    async fn has_live(&self, path: &str, now: OffsetDateTime) -> Result<bool, IndexError>;

    /// Remove records by id, returning how many were deleted.
    async fn delete(&self, ids: &[Uuid]) -> Result<u64, IndexError>;
}

/// Computes expiry and appends records to an `IndexStore`.
#[derive(Clone)]
pub struct IndexRecorder {
    store: Arc<dyn IndexStore>,
}

impl IndexRecorder {
    pub fn new(store: Arc<dyn IndexStore>) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        path: &str,
        page_type: Option<&str>,
        ttl_minutes: u32,
    ) -> Result<IndexRecord, IndexError> {
        let record = NewIndexRecord {
            path: path.to_string(),
            page_type: page_type.map(str::to_string),
            expire_at: expire_at(OffsetDateTime::now_utc(), ttl_minutes),
        };
        self.store.create(record).await
    }

    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.store
    }
}

/// `now` plus `ttl_minutes`, truncated to whole seconds.
pub fn expire_at(now: OffsetDateTime, ttl_minutes: u32) -> OffsetDateTime {
    let base = now.replace_nanosecond(0).unwrap_or(now);
    base + Duration::minutes(i64::from(ttl_minutes))
}

/// In-process index store.
#[derive(Default)]
pub struct MemoryIndexStore {
    records: RwLock<Vec<IndexRecord>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record in insertion order.
    pub fn records(&self) -> Vec<IndexRecord> {
        rw_read(&self.records, SOURCE, "records").clone()
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn create(&self, record: NewIndexRecord) -> Result<IndexRecord, IndexError> {
        let stored = IndexRecord {
            id: Uuid::new_v4(),
            path: record.path,
            page_type: record.page_type,
            expire_at: record.expire_at,
            created_at: OffsetDateTime::now_utc(),
        };
        rw_write(&self.records, SOURCE, "create").push(stored.clone());
        Ok(stored)
    }

    async fn list_expired(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<IndexRecord>, IndexError> {
        let mut expired: Vec<IndexRecord> = rw_read(&self.records, SOURCE, "list_expired")
            .iter()
            .filter(|record| record.expire_at <= now)
            .cloned()
            .collect();
        expired.sort_by_key(|record| record.expire_at);
        expired.truncate(limit as usize);
        Ok(expired)
    }

    async fn has_live(&self, path: &str, now: OffsetDateTime) -> Result<bool, IndexError> {
        Ok(rw_read(&self.records, SOURCE, "has_live")
            .iter()
            .any(|record| record.path == path && record.expire_at > now))
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<u64, IndexError> {
        let mut records = rw_write(&self.records, SOURCE, "delete");
        let before = records.len();
        records.retain(|record| !ids.contains(&record.id));
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn expiry_adds_minutes() {
        let now = datetime!(2026-01-01 10:00:30.5 UTC);
        assert_eq!(expire_at(now, 90), datetime!(2026-01-01 11:30:30 UTC));
        assert_eq!(expire_at(now, 0), datetime!(2026-01-01 10:00:30 UTC));
    }

    #[tokio::test]
    async fn recorder_appends_duplicates() {
        let store = Arc::new(MemoryIndexStore::new());
        let recorder = IndexRecorder::new(store.clone());

        let first = recorder
            .record("/cache/a.html", Some("page"), 10)
            .await
            .expect("first record");
        let second = recorder
            .record("/cache/a.html", Some("page"), 10)
            .await
            .expect("second record");

        assert_ne!(first.id, second.id);
        let records = store.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|record| record.path == "/cache/a.html"));
        assert_eq!(records[0].page_type.as_deref(), Some("page"));
        assert!(first.expire_at > first.created_at);
    }

    #[tokio::test]
    async fn lists_and_deletes_expired_records() {
        let store = MemoryIndexStore::new();
        let now = datetime!(2026-03-01 12:00 UTC);

        for (path, expire_at) in [
            ("/c/late.html", datetime!(2026-03-01 11:00 UTC)),
            ("/c/fresh.html", datetime!(2026-03-01 13:00 UTC)),
            ("/c/early.html", datetime!(2026-03-01 09:00 UTC)),
        ] {
            store
                .create(NewIndexRecord {
                    path: path.to_string(),
                    page_type: None,
                    expire_at,
                })
                .await
                .expect("create");
        }

        let expired = store.list_expired(now, 10).await.expect("list");
        let paths: Vec<&str> = expired.iter().map(|record| record.path.as_str()).collect();
        assert_eq!(paths, ["/c/early.html", "/c/late.html"]);

        let limited = store.list_expired(now, 1).await.expect("list");
        assert_eq!(limited.len(), 1);

        assert!(store.has_live("/c/fresh.html", now).await.expect("has_live"));
        assert!(!store.has_live("/c/late.html", now).await.expect("has_live"));

        let ids: Vec<Uuid> = expired.iter().map(|record| record.id).collect();
        assert_eq!(store.delete(&ids).await.expect("delete"), 2);
        assert_eq!(store.records().len(), 1);
        assert_eq!(store.records()[0].path, "/c/fresh.html");
    }
}
