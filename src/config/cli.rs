use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the pagecache binary.
#[derive(Debug, Parser)]
#[command(name = "pagecache", version, about = "Static page cache maintenance")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PAGECACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the artifact path a request would be cached under.
    Resolve(ResolveArgs),
    /// Remove the html and json artifacts stored for a slug.
    Forget(ForgetArgs),
    /// Empty the cache root or one of its subdirectories.
    Clear(ClearArgs),
    /// Delete artifacts whose index records have expired.
    #[command(name = "purge-expired")]
    PurgeExpired(PurgeArgs),
    /// Apply index database migrations.
    Migrate,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the configured cache directory.
    #[arg(long = "cache-directory", value_name = "PATH", global = true)]
    pub cache_directory: Option<String>,

    /// Override the public web root used for the default cache directory.
    #[arg(long = "public-dir", value_name = "PATH", global = true)]
    pub public_dir: Option<String>,

    /// Override the index database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,
}

/// Per-invocation cache context.
#[derive(Debug, Args, Default, Clone)]
pub struct ContextArgs {
    /// Locale whose site host namespaces the cache root.
    #[arg(long, value_name = "LOCALE")]
    pub locale: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct ResolveArgs {
    /// Request URI, e.g. `/shop/shoes?color=red`.
    #[arg(value_name = "URI")]
    pub uri: String,

    /// Response content type used to pick the extension.
    #[arg(long = "content-type", value_name = "MIME")]
    pub content_type: Option<String>,

    #[command(flatten)]
    pub context: ContextArgs,
}

#[derive(Debug, Args, Clone)]
pub struct ForgetArgs {
    /// Slug relative to the cache root, without extension.
    #[arg(value_name = "SLUG")]
    pub slug: String,

    #[command(flatten)]
    pub context: ContextArgs,
}

#[derive(Debug, Args, Clone)]
pub struct ClearArgs {
    /// Subdirectory to clear; the whole cache root when omitted.
    #[arg(value_name = "SUBPATH")]
    pub subpath: Option<String>,

    #[command(flatten)]
    pub context: ContextArgs,
}

#[derive(Debug, Args, Clone)]
pub struct PurgeArgs {
    /// Maximum number of expired records handled in one run.
    #[arg(long, default_value_t = 500, value_parser = clap::value_parser!(u32).range(1..))]
    pub limit: u32,
}
