//! Cache configuration.
//!
//! `CacheConfig` holds the deployment-wide settings loaded from
//! `pagecache.toml`; `CacheContext` carries the per-request knobs (locale,
//! page type, TTL, path override) that travel with a single cache call.

use std::collections::BTreeMap;

// Default values for cache configuration
const DEFAULT_TTL_MINUTES: u32 = 60;
const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Deployment-wide cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Explicit cache root. Takes precedence over `public_dir`.
    pub directory: Option<String>,
    /// Public web root; the default cache root is `{public_dir}/static/`.
    pub public_dir: Option<String>,
    /// Query parameter names allowed to influence the cache key.
    pub whitelist: Vec<String>,
    /// Locale to hostname table used to namespace the default root.
    pub sites: BTreeMap<String, String>,
    /// Default time-to-live for index records, in minutes.
    pub ttl_minutes: u32,
    /// Default page type recorded in the index.
    pub page_type: Option<String>,
    /// Unix permission bits applied to written artifacts.
    pub file_mode: u32,
    /// Largest response body the middleware will buffer for caching.
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            public_dir: None,
            whitelist: Vec::new(),
            sites: BTreeMap::new(),
            ttl_minutes: DEFAULT_TTL_MINUTES,
            page_type: None,
            file_mode: DEFAULT_FILE_MODE,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            directory: settings.directory.clone(),
            public_dir: settings.public_dir.clone(),
            whitelist: settings.whitelist.clone(),
            sites: settings
                .sites
                .iter()
                .map(|site| (site.locale.clone(), site.host.clone()))
                .collect(),
            ttl_minutes: settings.ttl_minutes,
            page_type: settings.page_type.clone(),
            file_mode: settings.file_mode,
            max_body_bytes: settings.max_body_bytes,
        }
    }
}

impl CacheConfig {
    /// Hostname of the site registered for `locale`, if any.
    pub fn host_for_locale(&self, locale: &str) -> Option<&str> {
        self.sites.get(locale).map(String::as_str)
    }

    /// A context seeded with this configuration's defaults.
    pub fn context(&self) -> CacheContext {
        CacheContext {
            cache_path: None,
            locale: None,
            page_type: self.page_type.clone(),
            ttl_minutes: self.ttl_minutes,
        }
    }
}

/// Per-call cache settings.
///
/// Values are fixed once built, so one `PageCache` can serve many
/// concurrent requests with different locales or page types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheContext {
    cache_path: Option<String>,
    locale: Option<String>,
    page_type: Option<String>,
    ttl_minutes: u32,
}

impl CacheContext {
    /// Override the cache root for this call. Trailing separators are dropped.
    pub fn with_cache_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        let trimmed = path.trim_end_matches(['/', '\\']);
        // A bare "/" trims to nothing; keep the root itself.
        let value = if trimmed.is_empty() && path.starts_with('/') {
            "/".to_string()
        } else {
            trimmed.to_string()
        };
        self.cache_path = (!value.is_empty()).then_some(value);
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_page_type(mut self, page_type: impl Into<String>) -> Self {
        self.page_type = Some(page_type.into());
        self
    }

    pub fn with_ttl_minutes(mut self, minutes: u32) -> Self {
        self.ttl_minutes = minutes;
        self
    }

    pub fn cache_path(&self) -> Option<&str> {
        self.cache_path.as_deref()
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub fn page_type(&self) -> Option<&str> {
        self.page_type.as_deref()
    }

    pub fn ttl_minutes(&self) -> u32 {
        self.ttl_minutes
    }
}
