//! Cache key derivation.
//!
//! Maps a request path, its query string and the response content type onto
//! a stable location below the cache root:
//!
//! ```text
//! {root}/{locale-host?}/{path segments}/{last segment or pc__index__pc}.{ext}
//! {root}/{locale-host?}/{path segments minus last}/_{filtered query}.html
//! ```

use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::warn;

use super::{
    config::{CacheConfig, CacheContext},
    error::CacheError,
    query::filter_query,
};

/// Filename used for a path whose last segment is empty (`/`, `/blog/`).
pub const INDEX_ALIAS: &str = "pc__index__pc";

const MAX_SEGMENT_BYTES: usize = 255;
const DEFAULT_STATIC_DIR: &str = "static";

/// Artifact flavour, derived from the response `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Html,
    Json,
    Xml,
}

impl ArtifactKind {
    /// Classify a `Content-Type` header value by its MIME essence.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let essence = content_type
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_ascii_lowercase());

        match essence.as_deref() {
            Some("application/json") => Self::Json,
            Some("text/xml" | "application/xml") => Self::Xml,
            _ => Self::Html,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }
}

/// Directory and filename of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath {
    directory: String,
    filename: String,
}

impl ResolvedPath {
    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Directory and filename joined; this is the path recorded in the index.
    pub fn full_path(&self) -> String {
        join_paths(&[self.directory.as_str(), self.filename.as_str()])
    }

    pub fn file_path(&self) -> PathBuf {
        PathBuf::from(self.full_path())
    }
}

/// Join path fragments with `/`.
///
/// Each fragment is trimmed of surrounding slashes and empty fragments are
/// dropped. The result is absolute exactly when the first fragment is.
pub fn join_paths<S: AsRef<str>>(parts: &[S]) -> String {
    let joined = parts
        .iter()
        .map(|part| part.as_ref().trim_matches('/'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    let absolute = parts
        .first()
        .is_some_and(|first| first.as_ref().starts_with('/'));

    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Resolve the cache root for a call.
///
/// Precedence: the context override, the configured directory, then
/// `{public_dir}/static/{locale host}`.
pub fn cache_root(config: &CacheConfig, ctx: &CacheContext) -> Result<String, CacheError> {
    if let Some(path) = ctx.cache_path() {
        return Ok(path.to_string());
    }

    if let Some(directory) = config.directory.as_deref() {
        let trimmed = directory.trim_end_matches(['/', '\\']);
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
        if directory.starts_with('/') {
            return Ok("/".to_string());
        }
    }

    let Some(public_dir) = config.public_dir.as_deref().filter(|dir| !dir.is_empty()) else {
        return Err(CacheError::configuration(
            "no cache directory or public directory configured",
        ));
    };

    let host = ctx
        .locale()
        .and_then(|locale| config.host_for_locale(locale))
        .unwrap_or_default();

    Ok(join_paths(&[public_dir, DEFAULT_STATIC_DIR, host]))
}

/// Derive the artifact location for one request.
pub fn resolve(
    root: &str,
    path_info: &str,
    query: Option<&str>,
    whitelist: &[String],
    kind: ArtifactKind,
) -> Result<ResolvedPath, CacheError> {
    let mut segments: Vec<&str> = path_info.trim_start_matches('/').split('/').collect();
    let last = segments.pop().unwrap_or_default();
    let directory_segments: Vec<&str> = segments
        .into_iter()
        .filter(|segment| !segment.is_empty())
        .collect();

    for segment in &directory_segments {
        check_segment(segment)?;
    }

    let filtered = query.and_then(|query| filter_query(query, whitelist));

    let (stem, extension) = match filtered {
        Some(suffix) => {
            reject_separators(&suffix)?;
            (format!("_{suffix}"), ArtifactKind::Html.extension())
        }
        None => {
            let candidate = if last.is_empty() { INDEX_ALIAS } else { last };
            reject_dot_segment(candidate)?;
            (candidate.to_string(), kind.extension())
        }
    };

    let mut parts = Vec::with_capacity(directory_segments.len() + 1);
    parts.push(root);
    parts.extend(directory_segments);

    Ok(ResolvedPath {
        directory: join_paths(&parts),
        filename: bounded_filename(&stem, extension),
    })
}

fn reject_dot_segment(segment: &str) -> Result<(), CacheError> {
    if segment == "." || segment == ".." {
        return Err(CacheError::InvalidSegment {
            segment: segment.to_string(),
        });
    }
    Ok(())
}

/// Query values become part of the filename and must stay one path component.
fn reject_separators(suffix: &str) -> Result<(), CacheError> {
    if suffix.contains(['/', '\\']) {
        return Err(CacheError::InvalidSegment {
            segment: suffix.to_string(),
        });
    }
    Ok(())
}

// Directory segments cannot be shortened without losing the tree layout.
fn check_segment(segment: &str) -> Result<(), CacheError> {
    reject_dot_segment(segment)?;
    if segment.len() > MAX_SEGMENT_BYTES {
        return Err(CacheError::PathTooLong {
            segment: segment.to_string(),
        });
    }
    Ok(())
}

/// `{stem}.{extension}`, replaced by a digest of itself when the name would
/// not fit in a single filesystem path component.
fn bounded_filename(stem: &str, extension: &str) -> String {
    let filename = format!("{stem}.{extension}");
    if filename.len() <= MAX_SEGMENT_BYTES {
        return filename;
    }

    let digest = hex::encode(Sha256::digest(filename.as_bytes()));
    warn!(
        op = "cache::resolve",
        result = "hashed_filename",
        original_bytes = filename.len(),
        hashed = %digest,
        "Artifact filename too long; using digest"
    );
    format!("{digest}.{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whitelist(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn nested_html_path() {
        let resolved = resolve("/cache", "/a/b/c", None, &[], ArtifactKind::Html).unwrap();
        assert_eq!(resolved.directory(), "/cache/a/b");
        assert_eq!(resolved.filename(), "c.html");
        assert_eq!(resolved.full_path(), "/cache/a/b/c.html");
    }

    #[test]
    fn empty_path_uses_index_alias() {
        let resolved = resolve("/cache", "/", None, &[], ArtifactKind::Html).unwrap();
        assert_eq!(resolved.full_path(), "/cache/pc__index__pc.html");

        let trailing = resolve("/cache", "/blog/", None, &[], ArtifactKind::Html).unwrap();
        assert_eq!(trailing.full_path(), "/cache/blog/pc__index__pc.html");
    }

    #[test]
    fn json_response_gets_json_extension() {
        let kind = ArtifactKind::from_content_type(Some("application/json"));
        let resolved = resolve("/cache", "/a/b", None, &[], kind).unwrap();
        assert_eq!(resolved.directory(), "/cache/a");
        assert_eq!(resolved.filename(), "b.json");
    }

    #[test]
    fn content_type_classification() {
        assert_eq!(
            ArtifactKind::from_content_type(Some("application/json; charset=utf-8")),
            ArtifactKind::Json
        );
        assert_eq!(
            ArtifactKind::from_content_type(Some("text/xml")),
            ArtifactKind::Xml
        );
        assert_eq!(
            ArtifactKind::from_content_type(Some("Application/XML")),
            ArtifactKind::Xml
        );
        assert_eq!(
            ArtifactKind::from_content_type(Some("text/html; charset=utf-8")),
            ArtifactKind::Html
        );
        assert_eq!(ArtifactKind::from_content_type(None), ArtifactKind::Html);
    }

    #[test]
    fn whitelisted_query_replaces_last_segment() {
        let resolved = resolve(
            "/cache",
            "/shop/shoes",
            Some("color=red"),
            &whitelist(&["color"]),
            ArtifactKind::Json,
        )
        .unwrap();
        assert_eq!(resolved.directory(), "/cache/shop");
        assert_eq!(resolved.filename(), "_color=red.html");
    }

    #[test]
    fn query_value_with_separators_is_rejected() {
        let list = whitelist(&["color"]);
        for query in ["color=x/../../../escape", "color=a/b", "color=a\\b"] {
            let err = resolve("/cache", "/shop/z", Some(query), &list, ArtifactKind::Html)
                .unwrap_err();
            assert!(
                matches!(err, CacheError::InvalidSegment { .. }),
                "query {query}"
            );
        }
    }

    #[test]
    fn query_value_with_dots_stays_one_component() {
        let list = whitelist(&["color"]);
        let resolved = resolve("/cache", "/shop/z", Some("color=.."), &list, ArtifactKind::Html)
            .unwrap();
        assert_eq!(resolved.directory(), "/cache/shop");
        assert_eq!(resolved.filename(), "_color=...html");
    }

    #[test]
    fn sibling_pages_share_filtered_artifact() {
        let list = whitelist(&["color"]);
        let shoes = resolve("/cache", "/shop/shoes", Some("color=red"), &list, ArtifactKind::Html)
            .unwrap();
        let boots = resolve("/cache", "/shop/boots", Some("color=red"), &list, ArtifactKind::Html)
            .unwrap();
        assert_eq!(shoes, boots);
    }

    #[test]
    fn unlisted_query_collapses_to_plain_path() {
        let list = whitelist(&["color"]);
        let plain = resolve("/cache", "/shop", None, &list, ArtifactKind::Html).unwrap();
        let tracked = resolve(
            "/cache",
            "/shop",
            Some("utm_source=news"),
            &list,
            ArtifactKind::Html,
        )
        .unwrap();
        assert_eq!(plain, tracked);

        let no_list = resolve("/cache", "/shop", Some("color=red"), &[], ArtifactKind::Html)
            .unwrap();
        assert_eq!(plain, no_list);
    }

    #[test]
    fn resolution_is_deterministic() {
        let list = whitelist(&["size"]);
        let first = resolve("cache", "/a/b", Some("x=1&size=2"), &list, ArtifactKind::Html);
        let second = resolve("cache", "/a/b", Some("x=1&size=2"), &list, ArtifactKind::Html);
        assert_eq!(first.unwrap(), second.unwrap());
    }

    #[test]
    fn relative_root_stays_relative() {
        let resolved = resolve("public/static", "/a", None, &[], ArtifactKind::Html).unwrap();
        assert_eq!(resolved.full_path(), "public/static/a.html");
    }

    #[test]
    fn duplicate_slashes_collapse() {
        let resolved = resolve("/cache/", "//a//b", None, &[], ArtifactKind::Html).unwrap();
        assert_eq!(resolved.full_path(), "/cache/a/b.html");
    }

    #[test]
    fn long_filename_falls_back_to_digest() {
        let long = "x".repeat(300);
        let query = format!("color={long}");
        let resolved = resolve(
            "/cache",
            "/a",
            Some(&query),
            &whitelist(&["color"]),
            ArtifactKind::Html,
        )
        .unwrap();
        assert!(resolved.filename().len() <= 255);
        assert!(resolved.filename().ends_with(".html"));
        assert_eq!(resolved.filename().len(), 64 + ".html".len());
    }

    #[test]
    fn long_path_leaf_falls_back_to_digest() {
        let path = format!("/a/{}", "y".repeat(300));
        let resolved = resolve("/cache", &path, None, &[], ArtifactKind::Json).unwrap();
        assert_eq!(resolved.directory(), "/cache/a");
        assert_eq!(resolved.filename().len(), 64 + ".json".len());
    }

    #[test]
    fn dot_leaf_is_rejected() {
        let err = resolve("/cache", "/a/..", None, &[], ArtifactKind::Html).unwrap_err();
        assert!(matches!(err, CacheError::InvalidSegment { .. }));
    }

    #[test]
    fn long_directory_segment_is_rejected() {
        let path = format!("/{}/leaf", "d".repeat(256));
        let err = resolve("/cache", &path, None, &[], ArtifactKind::Html).unwrap_err();
        assert!(matches!(err, CacheError::PathTooLong { .. }));
    }

    #[test]
    fn traversal_segments_are_rejected() {
        let err = resolve("/cache", "/../etc/passwd", None, &[], ArtifactKind::Html).unwrap_err();
        assert!(matches!(err, CacheError::InvalidSegment { .. }));
    }

    #[test]
    fn join_matches_relativity_of_first_part() {
        assert_eq!(join_paths(&["/root/", "/a/", "b"]), "/root/a/b");
        assert_eq!(join_paths(&["root", "", "b/"]), "root/b");
        assert_eq!(join_paths(&["/"]), "/");
    }

    #[test]
    fn root_prefers_context_override() {
        let config = CacheConfig {
            directory: Some("/srv/cache".to_string()),
            ..Default::default()
        };
        let ctx = config.context().with_cache_path("/tmp/override/");
        assert_eq!(cache_root(&config, &ctx).unwrap(), "/tmp/override");
        assert_eq!(cache_root(&config, &config.context()).unwrap(), "/srv/cache");
    }

    #[test]
    fn default_root_is_namespaced_by_locale_host() {
        let mut config = CacheConfig {
            public_dir: Some("/srv/public".to_string()),
            ..Default::default()
        };
        config
            .sites
            .insert("de_DE".to_string(), "example.de".to_string());

        let plain = cache_root(&config, &config.context()).unwrap();
        assert_eq!(plain, "/srv/public/static");

        let german = cache_root(&config, &config.context().with_locale("de_DE")).unwrap();
        assert_eq!(german, "/srv/public/static/example.de");

        let unknown = cache_root(&config, &config.context().with_locale("it_IT")).unwrap();
        assert_eq!(unknown, "/srv/public/static");
    }

    #[test]
    fn missing_root_is_a_configuration_error() {
        let config = CacheConfig::default();
        let err = cache_root(&config, &config.context()).unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));
    }
}
