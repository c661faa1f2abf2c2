//! imgchest proxy: chapter page lists, view counts and the account's post listing.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::{DEFAULT_GROUP, Series, find_by_slug};
use crate::kv::{KvStore, purge_prefix};

use super::fetch::HttpFetch;
use super::{CacheStatus, Cached, ScrapeError, ScrapeResult};

pub const CHAPTER_CACHE_PREFIX: &str = "imgchest_chapter_";
pub const ALL_POSTS_CACHE_KEY: &str = "imgchest_all_pages_combined";
/// Entries per page of the post API; a shorter page is the last one.
pub const API_PAGE_SIZE: usize = 24;

static RE_APP_DATA_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<div id="app" data-page="([^"]+)"></div>"#).expect("app data pattern"));
static RE_VIEWS_META: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta\s+name=["']description["']\s+content=["']Post with\s+([\d,]+)\s+views"#)
        .expect("views meta pattern")
});
static RE_VIEWS_APP_DATA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<div\s+id=["']app["']\s+data-page=["'](.*?)["']>"#).expect("views app data pattern")
});

#[derive(Debug, Clone, PartialEq)]
pub struct ImgChestConfig {
    pub base_url: String,
    /// Account whose posts are listed; also the catalog group holding chapter links.
    pub username: String,
    pub max_pages: u32,
    pub chapter_ttl: Duration,
    pub listing_ttl: Duration,
    pub reader_agent: String,
    pub browser_agent: String,
    pub listing_agent: String,
}

impl Default for ImgChestConfig {
    fn default() -> Self {
        Self {
            base_url: "https://imgchest.com".to_string(),
            username: DEFAULT_GROUP.to_string(),
            max_pages: 8,
            chapter_ttl: Duration::from_secs(24 * 60 * 60),
            listing_ttl: Duration::from_secs(60 * 60),
            reader_agent: "BigSolo-Site-Reader-Worker/1.1 (+https://bigsolo.org)".to_string(),
            browser_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                            (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            listing_agent: "BigSoloSite-PageFetcher/1.2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSummary {
    /// Post slug, or the numeric id when the post has no slug.
    pub id: String,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub nsfw: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostListing {
    pub posts: Vec<PostSummary>,
}

/// Proxy over one image host account, caching into `cache`.
#[derive(Debug, Clone, Copy)]
pub struct ImgChest<'a> {
    config: &'a ImgChestConfig,
    fetch: &'a dyn HttpFetch,
    cache: &'a dyn KvStore,
}

impl<'a> ImgChest<'a> {
    pub fn new(config: &'a ImgChestConfig, fetch: &'a dyn HttpFetch, cache: &'a dyn KvStore) -> Self {
        Self { config, fetch, cache }
    }

    /// File list of a chapter post, served from cache for a day after the first scrape.
    pub fn chapter_pages(&self, id: &str) -> ScrapeResult<Cached<Vec<Value>>> {
        validate_id(id)?;
        let key = chapter_cache_key(id);
        if let Some(raw) = self.cache.get(&key)? {
            match serde_json::from_str::<Vec<Value>>(&raw) {
                Ok(files) => {
                    debug!(target: "scrape::imgchest", id, "chapter pages cache hit");
                    return Ok(Cached { value: files, cache: CacheStatus::Hit });
                }
                Err(err) => warn!(target: "scrape::imgchest", id, error = %err, "discarding corrupt cache entry"),
            }
        }

        let response = self.fetch.get(&self.post_url(id), &self.config.reader_agent, None)?;
        if !response.is_success() {
            return Err(ScrapeError::Upstream { status: response.status });
        }
        let files = extract_files(&response.body)?;
        let raw = serde_json::to_string(&files).map_err(anyhow::Error::from)?;
        self.cache.put(&key, &raw, Some(self.config.chapter_ttl))?;
        info!(target: "scrape::imgchest", id, files = files.len(), "chapter pages scraped");
        Ok(Cached { value: files, cache: CacheStatus::Miss })
    }

    /// View count of a post, read from the page markup. Never cached.
    pub fn views(&self, id: &str) -> ScrapeResult<u64> {
        validate_id(id)?;
        let response = self.fetch.get(&self.post_url(id), &self.config.browser_agent, None)?;
        if !response.is_success() {
            return Err(ScrapeError::Upstream { status: response.status });
        }
        extract_views(&response.body).ok_or(ScrapeError::MissingViews)
    }

    /// One page of the account's posts, newest first.
    pub fn posts_page(&self, page: u32) -> ScrapeResult<PostListing> {
        let url = format!(
            "{}/api/posts?username={}&sort=new&page={page}&status=0",
            self.base(),
            self.config.username
        );
        let response = self.fetch.get(&url, &self.config.listing_agent, Some("application/json"))?;
        if !response.is_success() {
            return Err(ScrapeError::Upstream { status: response.status });
        }
        let json: Value = serde_json::from_str(&response.body)
            .map_err(|err| ScrapeError::MalformedPayload(err.to_string()))?;
        let data = json
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| ScrapeError::MalformedPayload("`data` is not an array".to_string()))?;
        Ok(PostListing { posts: data.iter().map(shape_post).collect() })
    }

    /// Every post of the account, walking pages until a short, empty or failed page.
    ///
    /// Cache read and write failures are logged and otherwise ignored.
    pub fn all_posts(&self) -> ScrapeResult<Cached<PostListing>> {
        match self.cache.get(ALL_POSTS_CACHE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<PostListing>(&raw) {
                Ok(listing) => return Ok(Cached { value: listing, cache: CacheStatus::Hit }),
                Err(err) => warn!(target: "scrape::imgchest", error = %err, "discarding corrupt listing cache"),
            },
            Ok(None) => {}
            Err(err) => warn!(target: "scrape::imgchest", error = %err, "listing cache read failed"),
        }

        let mut listing = PostListing::default();
        for page in 1..=self.config.max_pages {
            let batch = match self.posts_page(page) {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(target: "scrape::imgchest", page, error = %err, "stopping listing walk");
                    break;
                }
            };
            let count = batch.posts.len();
            listing.posts.extend(batch.posts);
            if count < API_PAGE_SIZE {
                break;
            }
        }

        match serde_json::to_string(&listing) {
            Ok(raw) => {
                if let Err(err) = self.cache.put(ALL_POSTS_CACHE_KEY, &raw, Some(self.config.listing_ttl)) {
                    warn!(target: "scrape::imgchest", error = %err, "listing cache write failed");
                }
            }
            Err(err) => warn!(target: "scrape::imgchest", error = %err, "listing not cacheable"),
        }
        info!(target: "scrape::imgchest", posts = listing.posts.len(), "post listing rebuilt");
        Ok(Cached { value: listing, cache: CacheStatus::Miss })
    }

    /// Drop the cached page list of one catalog chapter, returning the deleted cache key.
    pub fn purge_chapter(&self, catalog: &[Series], series_slug: &str, chapter: &str) -> ScrapeResult<String> {
        if series_slug.is_empty() || chapter.is_empty() {
            return Err(ScrapeError::InvalidId(format!("{series_slug}/{chapter}")));
        }
        let series = find_by_slug(catalog, series_slug)
            .ok_or_else(|| ScrapeError::NotFound(format!("series {series_slug}")))?;
        let id = series
            .chapters
            .get(chapter)
            .and_then(|meta| meta.content_id(&self.config.username))
            .ok_or_else(|| ScrapeError::NotFound(format!("chapter {chapter}")))?;

        let key = chapter_cache_key(id);
        self.cache.delete(&key)?;
        info!(target: "scrape::imgchest", series = series_slug, chapter, key = %key, "chapter cache purged");
        Ok(key)
    }

    /// Drop every cached chapter page list and the combined listing.
    pub fn purge_all(&self) -> ScrapeResult<usize> {
        let mut removed = purge_prefix(self.cache, CHAPTER_CACHE_PREFIX)?;
        if self.cache.get(ALL_POSTS_CACHE_KEY)?.is_some() {
            self.cache.delete(ALL_POSTS_CACHE_KEY)?;
            removed += 1;
        }
        info!(target: "scrape::imgchest", removed, "proxy cache purged");
        Ok(removed)
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn post_url(&self, id: &str) -> String {
        format!("{}/p/{id}", self.base())
    }
}

pub fn chapter_cache_key(id: &str) -> String {
    format!("{CHAPTER_CACHE_PREFIX}{id}")
}

fn validate_id(id: &str) -> ScrapeResult<()> {
    let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid { Ok(()) } else { Err(ScrapeError::InvalidId(id.to_string())) }
}

/// `props.post.files` of the JSON embedded in the app container.
pub fn extract_files(html: &str) -> ScrapeResult<Vec<Value>> {
    let blob = RE_APP_DATA_MARKER
        .captures(html)
        .and_then(|caps| caps.get(1))
        .ok_or(ScrapeError::MissingMarker)?
        .as_str()
        .replace("&quot;", "\"");
    let data: Value =
        serde_json::from_str(&blob).map_err(|err| ScrapeError::MalformedPayload(err.to_string()))?;
    data.pointer("/props/post/files").and_then(Value::as_array).cloned().ok_or(ScrapeError::MissingFiles)
}

/// View count from the meta description, falling back to the embedded page data.
pub fn extract_views(html: &str) -> Option<u64> {
    if let Some(views) = RE_VIEWS_META
        .captures(html)
        .and_then(|caps| caps.get(1))
        .and_then(|count| count.as_str().replace(',', "").parse::<u64>().ok())
    {
        return Some(views);
    }

    let blob = RE_VIEWS_APP_DATA.captures(html).and_then(|caps| caps.get(1))?;
    let json = blob
        .as_str()
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    let Ok(data) = serde_json::from_str::<Value>(&json) else {
        debug!(target: "scrape::imgchest", "page data is not json");
        return None;
    };
    data.pointer("/props/post/views").and_then(as_count)
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

fn shape_post(post: &Value) -> PostSummary {
    let id = post
        .get("slug")
        .and_then(Value::as_str)
        .filter(|slug| !slug.is_empty())
        .map(str::to_string)
        .or_else(|| match post.get("id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        })
        .unwrap_or_default();
    let nsfw = match post.get("nsfw") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(flag)) => flag.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    };
    PostSummary {
        id,
        views: post.get("views").and_then(as_count).unwrap_or(0),
        title: post.get("title").and_then(Value::as_str).unwrap_or_default().to_string(),
        nsfw,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::kv::MemoryKv;
    use crate::scrape::fetch::HttpResponse;

    #[derive(Debug, Default)]
    struct StubFetch {
        pages: HashMap<String, HttpResponse>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl StubFetch {
        fn with(mut self, url: &str, status: u16, body: impl Into<String>) -> Self {
            self.pages.insert(url.to_string(), HttpResponse { status, body: body.into() });
            self
        }

        fn calls(&self) -> usize {
            self.calls.lock().len()
        }
    }

    impl HttpFetch for StubFetch {
        fn get(&self, url: &str, user_agent: &str, _accept: Option<&str>) -> crate::Result<HttpResponse> {
            self.calls.lock().push((url.to_string(), user_agent.to_string()));
            self.pages.get(url).cloned().ok_or_else(|| anyhow::anyhow!("connection refused: {url}"))
        }
    }

    fn app_page(data: &Value) -> String {
        let escaped = data.to_string().replace('"', "&quot;");
        format!(r#"<html><body><div id="app" data-page="{escaped}"></div></body></html>"#)
    }

    fn listing_url(page: u32) -> String {
        format!("https://imgchest.com/api/posts?username=Big_herooooo&sort=new&page={page}&status=0")
    }

    fn posts(range: std::ops::Range<u32>) -> String {
        let data: Vec<Value> = range.map(|i| json!({"id": i, "slug": format!("p{i}"), "views": i * 10})).collect();
        json!({ "data": data }).to_string()
    }

    #[test]
    fn chapter_pages_are_scraped_once_then_cached() {
        let page = app_page(&json!({"props": {"post": {"files": [{"link": "a.png"}, {"link": "b.png"}]}}}));
        let fetch = StubFetch::default().with("https://imgchest.com/p/abc", 200, page);
        let cache = MemoryKv::new();
        let config = ImgChestConfig::default();
        let proxy = ImgChest::new(&config, &fetch, &cache);

        let first = proxy.chapter_pages("abc").unwrap();
        assert_eq!(first.cache, CacheStatus::Miss);
        assert_eq!(first.value.len(), 2);
        let second = proxy.chapter_pages("abc").unwrap();
        assert_eq!(second, Cached { value: first.value, cache: CacheStatus::Hit });
        assert_eq!(fetch.calls(), 1);
        assert_eq!(fetch.calls.lock()[0].1, config.reader_agent);
    }

    #[test]
    fn chapter_extraction_failures_are_hard_errors() {
        let no_marker = "<html><div id=\"root\"></div></html>";
        let no_files = app_page(&json!({"props": {"post": {"files": "none"}}}));
        let fetch = StubFetch::default()
            .with("https://imgchest.com/p/nomark", 200, no_marker)
            .with("https://imgchest.com/p/nofiles", 200, no_files)
            .with("https://imgchest.com/p/gone", 404, "");
        let cache = MemoryKv::new();
        let config = ImgChestConfig::default();
        let proxy = ImgChest::new(&config, &fetch, &cache);

        assert!(matches!(proxy.chapter_pages("nomark"), Err(ScrapeError::MissingMarker)));
        assert!(matches!(proxy.chapter_pages("nofiles"), Err(ScrapeError::MissingFiles)));
        assert_eq!(proxy.chapter_pages("gone").unwrap_err().status(), 404);
        assert_eq!(proxy.chapter_pages("../etc").unwrap_err().status(), 400);
        assert!(cache.is_empty());
    }

    #[test]
    fn views_prefer_meta_then_page_data() {
        let meta = r#"<head><META name="description" content="Post with 12,345 views by someone"></head>"#;
        let data = r#"<div id="app" data-page="{&quot;props&quot;:{&quot;post&quot;:{&quot;views&quot;:&quot;77&quot;,&quot;title&quot;:&quot;A &amp; B&quot;}}}">"#;
        let fetch = StubFetch::default()
            .with("https://imgchest.com/p/meta", 200, meta)
            .with("https://imgchest.com/p/data", 200, data)
            .with("https://imgchest.com/p/none", 200, "<p>nothing</p>")
            .with("https://imgchest.com/p/down", 503, "");
        let cache = MemoryKv::new();
        let config = ImgChestConfig::default();
        let proxy = ImgChest::new(&config, &fetch, &cache);

        assert_eq!(proxy.views("meta").unwrap(), 12_345);
        assert_eq!(proxy.views("data").unwrap(), 77);
        assert_eq!(proxy.views("none").unwrap_err().status(), 502);
        assert_eq!(proxy.views("down").unwrap_err().status(), 503);
    }

    #[test]
    fn string_counts_drop_thousands_separators() {
        let data = r#"<div id="app" data-page="{&quot;props&quot;:{&quot;post&quot;:{&quot;views&quot;:&quot;1,234&quot;}}}">"#;
        assert_eq!(extract_views(data), Some(1_234));
        assert_eq!(as_count(&json!(" 2,048 ")), Some(2_048));
        assert_eq!(as_count(&json!("many")), None);
    }

    #[test]
    fn posts_are_shaped_from_slug_or_id() {
        let body = json!({"data": [
            {"id": 5, "slug": "", "views": 3, "title": "T", "nsfw": 1},
            {"id": "x9", "slug": "nice-slug", "views": "4"}
        ]});
        let fetch = StubFetch::default().with(&listing_url(2), 200, body.to_string());
        let cache = MemoryKv::new();
        let config = ImgChestConfig::default();
        let listing = ImgChest::new(&config, &fetch, &cache).posts_page(2).unwrap();
        assert_eq!(
            listing.posts,
            vec![
                PostSummary { id: "5".to_string(), views: 3, title: "T".to_string(), nsfw: true },
                PostSummary { id: "nice-slug".to_string(), views: 4, title: String::new(), nsfw: false },
            ]
        );
    }

    #[test]
    fn posts_page_rejects_non_array_data() {
        let fetch = StubFetch::default().with(&listing_url(1), 200, r#"{"data": {}}"#);
        let cache = MemoryKv::new();
        let config = ImgChestConfig::default();
        let err = ImgChest::new(&config, &fetch, &cache).posts_page(1).unwrap_err();
        assert_eq!(err.status(), 502);
    }

    #[test]
    fn listing_walk_stops_on_short_page_and_caches() {
        let fetch = StubFetch::default()
            .with(&listing_url(1), 200, posts(0..24))
            .with(&listing_url(2), 200, posts(24..30))
            .with(&listing_url(3), 200, posts(30..54));
        let cache = MemoryKv::new();
        let config = ImgChestConfig::default();
        let proxy = ImgChest::new(&config, &fetch, &cache);

        let first = proxy.all_posts().unwrap();
        assert_eq!(first.cache, CacheStatus::Miss);
        assert_eq!(first.value.posts.len(), 30);
        assert_eq!(fetch.calls(), 2);

        let second = proxy.all_posts().unwrap();
        assert_eq!(second.cache, CacheStatus::Hit);
        assert_eq!(second.value, first.value);
        assert_eq!(fetch.calls(), 2);
    }

    #[test]
    fn listing_walk_stops_on_failure_and_page_limit() {
        let fetch = StubFetch::default().with(&listing_url(1), 200, posts(0..24)).with(&listing_url(2), 500, "");
        let cache = MemoryKv::new();
        let config = ImgChestConfig::default();
        let listing = ImgChest::new(&config, &fetch, &cache).all_posts().unwrap();
        assert_eq!(listing.value.posts.len(), 24);

        let mut full = StubFetch::default();
        for page in 1..=9 {
            full = full.with(&listing_url(page), 200, posts(0..24));
        }
        let config = ImgChestConfig { max_pages: 3, ..ImgChestConfig::default() };
        let listing = ImgChest::new(&config, &full, &MemoryKv::new()).all_posts().unwrap();
        assert_eq!(listing.value.posts.len(), 72);
        assert_eq!(full.calls(), 3);
    }

    #[test]
    fn purge_targets_catalog_chapter() -> crate::Result<()> {
        let catalog: Vec<Series> = serde_json::from_value(json!([{
            "title": "Tougen Anki",
            "chapters": {
                "1": {"groups": {"Big_herooooo": "/proxy/api/imgchest/chapter/abc1"}},
                "2": {"groups": {"Big_herooooo": ""}}
            }
        }]))?;
        let cache = MemoryKv::new();
        cache.put("imgchest_chapter_abc1", "[]", None)?;
        cache.put("imgchest_chapter_other", "[]", None)?;
        let fetch = StubFetch::default();
        let config = ImgChestConfig::default();
        let proxy = ImgChest::new(&config, &fetch, &cache);

        assert_eq!(proxy.purge_chapter(&catalog, "tougen_anki", "1").unwrap(), "imgchest_chapter_abc1");
        assert_eq!(cache.get("imgchest_chapter_abc1")?, None);
        assert_eq!(proxy.purge_chapter(&catalog, "tougen_anki", "2").unwrap_err().status(), 404);
        assert_eq!(proxy.purge_chapter(&catalog, "unknown", "1").unwrap_err().status(), 404);
        assert_eq!(proxy.purge_chapter(&catalog, "", "1").unwrap_err().status(), 400);

        cache.put(ALL_POSTS_CACHE_KEY, "{}", None)?;
        assert_eq!(proxy.purge_all().unwrap(), 2);
        assert!(cache.is_empty());
        Ok(())
    }
}
