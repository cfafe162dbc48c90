use std::{process, sync::Arc};

use axum::http::{Method, Request, Response, StatusCode, header::CONTENT_TYPE};
use pagecache::{
    cache::{CacheConfig, CacheContext, IndexStore, MemoryIndexStore, PageCache},
    config::{self, ContextArgs, IndexSettings, Settings},
    error::AppError,
    infra::{db::PostgresIndexStore, error::InfraError, telemetry},
};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        config::Command::Resolve(args) => run_resolve(&settings, args),
        config::Command::Forget(args) => run_forget(&settings, args),
        config::Command::Clear(args) => run_clear(&settings, args),
        config::Command::PurgeExpired(args) => run_purge_expired(&settings, args).await,
        config::Command::Migrate => run_migrate(&settings).await,
    }
}

/// A cache for commands that never append index records.
fn offline_cache(settings: &Settings) -> PageCache {
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndexStore::new());
    PageCache::new(CacheConfig::from(&settings.cache), store)
}

fn command_context(cache: &PageCache, args: &ContextArgs) -> CacheContext {
    let ctx = cache.context();
    match args.locale.as_ref() {
        Some(locale) => ctx.with_locale(locale.clone()),
        None => ctx,
    }
}

fn run_resolve(settings: &Settings, args: config::ResolveArgs) -> Result<(), AppError> {
    let cache = offline_cache(settings);
    let ctx = command_context(&cache, &args.context);

    let (request, ()) = Request::builder()
        .method(Method::GET)
        .uri(args.uri.as_str())
        .body(())
        .map_err(|err| AppError::validation(format!("invalid uri `{}`: {err}", args.uri)))?
        .into_parts();

    let mut response = Response::builder().status(StatusCode::OK);
    if let Some(content_type) = args.content_type.as_ref() {
        response = response.header(CONTENT_TYPE, content_type.as_str());
    }
    let (response, ()) = response
        .body(())
        .map_err(|err| AppError::validation(format!("invalid content type: {err}")))?
        .into_parts();

    let location = cache.resolve(&ctx, &request, &response)?;
    println!(
        "{}",
        json!({
            "directory": location.directory(),
            "filename": location.filename(),
            "path": location.full_path(),
        })
    );
    Ok(())
}

fn run_forget(settings: &Settings, args: config::ForgetArgs) -> Result<(), AppError> {
    let cache = offline_cache(settings);
    let ctx = command_context(&cache, &args.context);

    let removed = cache.forget(&ctx, &args.slug);
    println!("{}", json!({ "slug": args.slug, "removed": removed }));
    Ok(())
}

fn run_clear(settings: &Settings, args: config::ClearArgs) -> Result<(), AppError> {
    let cache = offline_cache(settings);
    let ctx = command_context(&cache, &args.context);

    let root = cache.cache_path(&ctx, &[])?;
    let cleared = cache.clear(&ctx, args.subpath.as_deref());
    println!(
        "{}",
        json!({ "root": root, "subpath": args.subpath, "cleared": cleared })
    );
    Ok(())
}

async fn run_purge_expired(settings: &Settings, args: config::PurgeArgs) -> Result<(), AppError> {
    let store = connect_index(&settings.index).await?;
    let cache = PageCache::new(CacheConfig::from(&settings.cache), Arc::new(store));

    let report = cache
        .purge_expired(OffsetDateTime::now_utc(), args.limit)
        .await?;
    println!(
        "{}",
        json!({
            "scanned": report.scanned,
            "files_removed": report.files_removed,
            "files_kept": report.files_kept,
            "records_deleted": report.records_deleted,
        })
    );
    Ok(())
}

async fn run_migrate(settings: &Settings) -> Result<(), AppError> {
    let store = connect_index(&settings.index).await?;
    PostgresIndexStore::run_migrations(store.pool())
        .await
        .map_err(InfraError::from)?;
    info!(op = "migrate", result = "applied", "Index migrations applied");
    Ok(())
}

async fn connect_index(index: &IndexSettings) -> Result<PostgresIndexStore, AppError> {
    let database_url = index.database_url.as_deref().ok_or_else(|| {
        AppError::validation(
            "database url is required (provide --database-url or set PAGECACHE__INDEX__DATABASE_URL)",
        )
    })?;

    let pool = PostgresIndexStore::connect(database_url, index.max_connections.get())
        .await
        .map_err(InfraError::from)?;
    let store = PostgresIndexStore::new(pool);
    store.health_check().await.map_err(InfraError::from)?;
    Ok(store)
}
