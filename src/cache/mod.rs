//! Static page cache.
//!
//! Turns successful GET responses into files under a cache root so a front
//! web server can serve them directly:
//!
//! - **Key derivation**: request path + whitelisted query parameters +
//!   content type → `{root}/{locale host?}/{segments}/{file}.{ext}`
//! - **Writes**: staged temp file renamed into place
//! - **Index**: append-only records of path, page type and expiry
//! - **Invalidation**: `forget(slug)` and `clear(subpath)`
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! public_dir = "/srv/www/public"
//! whitelist = ["color", "size"]
//! ttl_minutes = 60
//! # ... see config.rs for all options
//! ```

mod config;
mod error;
mod index;
mod invalidate;
mod lock;
mod middleware;
mod query;
mod resolver;
mod service;
mod writer;

pub use config::{CacheConfig, CacheContext};
pub use error::{CacheError, IndexError};
pub use index::{
    IndexRecord, IndexRecorder, IndexStore, MemoryIndexStore, NewIndexRecord, expire_at,
};
pub use invalidate::{clear, forget};
pub use middleware::{PageCacheState, page_cache_layer};
pub use query::filter_query;
pub use resolver::{ArtifactKind, INDEX_ALIAS, ResolvedPath, cache_root, join_paths, resolve};
pub use service::{CachedArtifact, PageCache, PurgeReport, should_cache};
pub use writer::{ArtifactWriter, is_staging_file};

pub(crate) use service::{
    METRIC_CLEAR_TOTAL, METRIC_FORGET_TOTAL, METRIC_INDEX_ERROR_TOTAL, METRIC_PURGED_TOTAL,
    METRIC_WRITE_ERROR_TOTAL, METRIC_WRITE_TOTAL,
};
