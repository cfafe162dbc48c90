//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, str::FromStr};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{
    ClearArgs, CliArgs, Command, ContextArgs, ForgetArgs, GlobalOverrides, PurgeArgs, ResolveArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pagecache";
const ENV_PREFIX: &str = "PAGECACHE";
const DEFAULT_TTL_MINUTES: u32 = 60;
const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_MAX_BODY_BYTES: u64 = 4 * 1024 * 1024;
const DEFAULT_INDEX_MAX_CONNECTIONS: u32 = 4;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub index: IndexSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub directory: Option<String>,
    pub public_dir: Option<String>,
    pub whitelist: Vec<String>,
    pub sites: Vec<SiteSettings>,
    pub ttl_minutes: u32,
    pub page_type: Option<String>,
    pub file_mode: u32,
    pub max_body_bytes: usize,
}

/// A site registered for a locale; only its host is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSettings {
    pub locale: String,
    pub host: String,
}

#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub database_url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("cache.whitelist")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    index: RawIndexSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(directory) = overrides.cache_directory.as_ref() {
            self.cache.directory = Some(directory.clone());
        }
        if let Some(public_dir) = overrides.public_dir.as_ref() {
            self.cache.public_dir = Some(public_dir.clone());
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.index.database_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            index,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            index: build_index_settings(index)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let directory = non_empty(cache.directory);
    let public_dir = non_empty(cache.public_dir);

    let whitelist = cache
        .whitelist
        .unwrap_or_default()
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    let sites = cache
        .sites
        .unwrap_or_default()
        .into_iter()
        .map(build_site_settings)
        .collect::<Result<Vec<_>, _>>()?;

    let ttl_minutes = cache.ttl_minutes.unwrap_or(DEFAULT_TTL_MINUTES);

    let file_mode = match cache.file_mode {
        Some(mode) => parse_file_mode(&mode)?,
        None => DEFAULT_FILE_MODE,
    };

    let max_body_bytes_value = cache.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
    if max_body_bytes_value == 0 {
        return Err(LoadError::invalid(
            "cache.max_body_bytes",
            "must be greater than zero",
        ));
    }
    let max_body_bytes = usize::try_from(max_body_bytes_value).map_err(|_| {
        LoadError::invalid(
            "cache.max_body_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(CacheSettings {
        directory,
        public_dir,
        whitelist,
        sites,
        ttl_minutes,
        page_type: non_empty(cache.page_type),
        file_mode,
        max_body_bytes,
    })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let locale = site.locale.trim().to_string();
    if locale.is_empty() {
        return Err(LoadError::invalid(
            "cache.sites.locale",
            "locale must not be empty",
        ));
    }

    let url = Url::parse(site.url.trim()).map_err(|err| {
        LoadError::invalid("cache.sites.url", format!("`{}`: {err}", site.url))
    })?;
    let host = url
        .host_str()
        .ok_or_else(|| LoadError::invalid("cache.sites.url", format!("`{}` has no host", site.url)))?
        .to_string();

    Ok(SiteSettings { locale, host })
}

fn build_index_settings(index: RawIndexSettings) -> Result<IndexSettings, LoadError> {
    let max_connections_value = index
        .max_connections
        .unwrap_or(DEFAULT_INDEX_MAX_CONNECTIONS);
    let max_connections = NonZeroU32::new(max_connections_value).ok_or_else(|| {
        LoadError::invalid("index.max_connections", "must be greater than zero")
    })?;

    Ok(IndexSettings {
        database_url: non_empty(index.database_url),
        max_connections,
    })
}

fn parse_file_mode(value: &str) -> Result<u32, LoadError> {
    let digits = value.trim().trim_start_matches("0o");
    let mode = u32::from_str_radix(digits, 8)
        .map_err(|err| LoadError::invalid("cache.file_mode", format!("`{value}`: {err}")))?;
    if mode > 0o777 {
        return Err(LoadError::invalid(
            "cache.file_mode",
            format!("`{value}` exceeds 777"),
        ));
    }
    Ok(mode)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    directory: Option<String>,
    public_dir: Option<String>,
    whitelist: Option<Vec<String>>,
    sites: Option<Vec<RawSiteSettings>>,
    ttl_minutes: Option<u32>,
    page_type: Option<String>,
    file_mode: Option<String>,
    max_body_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSiteSettings {
    locale: String,
    url: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIndexSettings {
    database_url: Option<String>,
    max_connections: Option<u32>,
}

#[cfg(test)]
mod tests;
