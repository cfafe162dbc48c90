//! The page cache service.
//!
//! Ties key derivation, artifact writes, index bookkeeping and invalidation
//! together behind one handle that is shared across requests.

use std::{collections::BTreeSet, path::PathBuf, sync::Arc, time::Instant};

use axum::http::{Method, StatusCode, header::CONTENT_TYPE, request, response};
use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::{
    config::{CacheConfig, CacheContext},
    error::CacheError,
    index::{IndexRecord, IndexRecorder, IndexStore},
    invalidate,
    resolver::{self, ArtifactKind, ResolvedPath},
    writer::ArtifactWriter,
};

pub(crate) const METRIC_WRITE_TOTAL: &str = "pagecache_write_total";
pub(crate) const METRIC_WRITE_ERROR_TOTAL: &str = "pagecache_write_error_total";
pub(crate) const METRIC_INDEX_ERROR_TOTAL: &str = "pagecache_index_error_total";
pub(crate) const METRIC_FORGET_TOTAL: &str = "pagecache_forget_total";
pub(crate) const METRIC_CLEAR_TOTAL: &str = "pagecache_clear_total";
pub(crate) const METRIC_PURGED_TOTAL: &str = "pagecache_purged_total";

/// Only `GET` requests answered with exactly `200 OK` are cached.
pub fn should_cache(method: &Method, status: StatusCode) -> bool {
    method == Method::GET && status == StatusCode::OK
}

/// Outcome of a successful artifact write.
#[derive(Debug, Clone)]
pub struct CachedArtifact {
    pub location: ResolvedPath,
    pub file: PathBuf,
    /// `None` when the file was written but the index store failed.
    pub index_record: Option<IndexRecord>,
}

/// Counts reported by [`PageCache::purge_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub scanned: usize,
    pub files_removed: usize,
    /// Paths left on disk because a newer record keeps them valid.
    pub files_kept: usize,
    pub records_deleted: u64,
}

pub struct PageCache {
    config: CacheConfig,
    writer: Arc<ArtifactWriter>,
    recorder: IndexRecorder,
}

impl PageCache {
    pub fn new(config: CacheConfig, index: Arc<dyn IndexStore>) -> Self {
        let writer = Arc::new(ArtifactWriter::new(config.file_mode));
        Self {
            config,
            writer,
            recorder: IndexRecorder::new(index),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// A context seeded with the configured defaults.
    pub fn context(&self) -> CacheContext {
        self.config.context()
    }

    /// The cache root for `ctx`, joined with `parts`.
    pub fn cache_path(&self, ctx: &CacheContext, parts: &[&str]) -> Result<String, CacheError> {
        let root = resolver::cache_root(&self.config, ctx)?;
        let mut all = Vec::with_capacity(parts.len() + 1);
        all.push(root.as_str());
        all.extend_from_slice(parts);
        Ok(resolver::join_paths(&all))
    }

    /// Where the artifact for this request/response pair lives.
    pub fn resolve(
        &self,
        ctx: &CacheContext,
        request: &request::Parts,
        response: &response::Parts,
    ) -> Result<ResolvedPath, CacheError> {
        let root = resolver::cache_root(&self.config, ctx)?;
        let content_type = response
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());

        resolver::resolve(
            &root,
            request.uri.path(),
            request.uri.query(),
            &self.config.whitelist,
            ArtifactKind::from_content_type(content_type),
        )
    }

    /// Cache the response when [`should_cache`] allows it.
    pub async fn cache_if_needed(
        &self,
        ctx: &CacheContext,
        request: &request::Parts,
        response: &response::Parts,
        body: &[u8],
    ) -> Result<Option<CachedArtifact>, CacheError> {
        if !should_cache(&request.method, response.status) {
            debug!(
                op = "cache::cache_if_needed",
                result = "skipped",
                method = %request.method,
                status = response.status.as_u16(),
                "Response not cacheable"
            );
            return Ok(None);
        }

        self.cache(ctx, request, response, body).await.map(Some)
    }

    /// Write the artifact and append an index record.
    ///
    /// The index is a separate resource: when it fails the artifact stays on
    /// disk and the returned `index_record` is `None`.
    pub async fn cache(
        &self,
        ctx: &CacheContext,
        request: &request::Parts,
        response: &response::Parts,
        body: &[u8],
    ) -> Result<CachedArtifact, CacheError> {
        let started_at = Instant::now();
        let location = self.resolve(ctx, request, response)?;

        let writer = Arc::clone(&self.writer);
        let staged_location = location.clone();
        let content = body.to_vec();
        let written =
            tokio::task::spawn_blocking(move || writer.write(&staged_location, &content))
                .await
                .map_err(|err| CacheError::Task(err.to_string()))?;

        let file = match written {
            Ok(file) => file,
            Err(err) => {
                counter!(METRIC_WRITE_ERROR_TOTAL).increment(1);
                return Err(err);
            }
        };
        counter!(METRIC_WRITE_TOTAL).increment(1);

        let full_path = location.full_path();
        let index_record = match self
            .recorder
            .record(&full_path, ctx.page_type(), ctx.ttl_minutes())
            .await
        {
            Ok(record) => Some(record),
            Err(err) => {
                counter!(METRIC_INDEX_ERROR_TOTAL).increment(1);
                warn!(
                    op = "cache::cache",
                    result = "index_error",
                    path = %full_path,
                    error = %err,
                    "Artifact written but index record failed"
                );
                None
            }
        };

        info!(
            op = "cache::cache",
            result = "stored",
            path = %full_path,
            page_type = ctx.page_type().unwrap_or_default(),
            ttl_minutes = ctx.ttl_minutes(),
            bytes = body.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Response cached"
        );

        Ok(CachedArtifact {
            location,
            file,
            index_record,
        })
    }

    /// Remove the html and json artifacts stored under `slug`.
    pub fn forget(&self, ctx: &CacheContext, slug: &str) -> bool {
        let root = match resolver::cache_root(&self.config, ctx) {
            Ok(root) => root,
            Err(err) => {
                warn!(op = "cache::forget", result = "error", error = %err, "Cannot resolve cache root");
                return false;
            }
        };

        let removed = invalidate::forget(&root, slug);
        counter!(METRIC_FORGET_TOTAL, "removed" => if removed { "true" } else { "false" })
            .increment(1);
        info!(op = "cache::forget", slug, removed, "Forget requested");
        removed
    }

    /// Empty the cache root, or one subdirectory of it.
    pub fn clear(&self, ctx: &CacheContext, subpath: Option<&str>) -> bool {
        let root = match resolver::cache_root(&self.config, ctx) {
            Ok(root) => root,
            Err(err) => {
                warn!(op = "cache::clear", result = "error", error = %err, "Cannot resolve cache root");
                return false;
            }
        };

        let cleared = invalidate::clear(&root, subpath);
        counter!(METRIC_CLEAR_TOTAL, "cleared" => if cleared { "true" } else { "false" })
            .increment(1);
        info!(
            op = "cache::clear",
            root = %root,
            subpath = subpath.unwrap_or_default(),
            cleared,
            "Clear requested"
        );
        cleared
    }

    /// Delete artifacts whose index records expired at or before `now`, then
    /// drop those records.
    ///
    /// A path that was cached again and still has a live record keeps its
    /// file; only the stale record goes.
    pub async fn purge_expired(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<PurgeReport, CacheError> {
        let store = self.recorder.store();
        let expired = store.list_expired(now, limit).await?;

        let candidates: BTreeSet<&str> = expired
            .iter()
            .map(|record| record.path.as_str())
            .collect();
        let mut paths = Vec::with_capacity(candidates.len());
        let mut files_kept = 0;
        for path in candidates {
            if store.has_live(path, now).await? {
                debug!(
                    op = "cache::purge_expired",
                    result = "kept",
                    path,
                    "Artifact has a live index record"
                );
                files_kept += 1;
            } else {
                paths.push(PathBuf::from(path));
            }
        }

        let files_removed = tokio::task::spawn_blocking(move || {
            paths
                .iter()
                .filter(|path| match std::fs::remove_file(path) {
                    Ok(()) => true,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
                    Err(err) => {
                        warn!(
                            op = "cache::purge_expired",
                            result = "error",
                            path = %path.display(),
                            error = %err,
                            "Failed to remove expired artifact"
                        );
                        false
                    }
                })
                .count()
        })
        .await
        .map_err(|err| CacheError::Task(err.to_string()))?;

        let ids: Vec<_> = expired.iter().map(|record| record.id).collect();
        let records_deleted = if ids.is_empty() {
            0
        } else {
            store.delete(&ids).await?
        };

        counter!(METRIC_PURGED_TOTAL).increment(files_removed as u64);
        info!(
            op = "cache::purge_expired",
            scanned = expired.len(),
            files_removed,
            files_kept,
            records_deleted,
            "Expired artifacts purged"
        );

        Ok(PurgeReport {
            scanned: expired.len(),
            files_removed,
            files_kept,
            records_deleted,
        })
    }
}
