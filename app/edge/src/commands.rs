//! Edge commands over the log, aggregate and proxy-cache stores.

use std::fmt::Display;
use std::path::Path;

use anyhow::Context;
use manga_core::catalog::{Series, load_catalog};
use manga_core::interactions::{
    self, AdminComment, BatchDeletion, BatchReport, DeleteComment, LogActionResponse, ProcessReport,
    SeriesInteractions,
};
use manga_core::kv::DiskKv;
use manga_core::scrape::{HttpFetch, ImgChest, ImgChestConfig, PostListing, ReqwestFetch};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::EdgeConfig;

/// Stores and collaborators shared by every edge command.
#[derive(Debug)]
pub struct EdgeState {
    logs: DiskKv,
    interactions: DiskKv,
    proxy_cache: DiskKv,
    fetch: Box<dyn HttpFetch>,
    imgchest: ImgChestConfig,
    catalog: Vec<Series>,
}

impl EdgeState {
    pub fn open(config: &EdgeConfig) -> anyhow::Result<Self> {
        let fetch = ReqwestFetch::new(config.http_timeout()).context("creating http client")?;
        let catalog = match &config.site_dir {
            Some(dir) => load_catalog(dir)?,
            None => Vec::new(),
        };
        Self::with_parts(&config.data_dir, Box::new(fetch), config.imgchest(), catalog)
    }

    pub fn with_parts(
        data_dir: &Path,
        fetch: Box<dyn HttpFetch>,
        imgchest: ImgChestConfig,
        catalog: Vec<Series>,
    ) -> anyhow::Result<Self> {
        let state = Self {
            logs: DiskKv::new(data_dir.join("logs"))?,
            interactions: DiskKv::new(data_dir.join("interactions"))?,
            proxy_cache: DiskKv::new(data_dir.join("imgchest"))?,
            fetch,
            imgchest,
            catalog,
        };
        info!(target: "edge", root = %data_dir.display(), series = state.catalog.len(), "edge state ready");
        Ok(state)
    }

    fn proxy(&self) -> ImgChest<'_> {
        ImgChest::new(&self.imgchest, self.fetch.as_ref(), &self.proxy_cache)
    }
}

/// Render a failed request as `HTTP {status}: {message}`.
fn failure(status: u16, err: impl Display) -> String {
    warn!(target: "edge", status, error = %err, "request failed");
    format!("HTTP {status}: {err}")
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, String> {
    serde_json::from_str(body).map_err(|err| failure(400, format!("invalid body: {err}")))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterPages {
    pub files: Vec<Value>,
    /// `X-Cache` value.
    pub cache: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    #[serde(flatten)]
    pub listing: PostListing,
    pub cache: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ViewCount {
    pub views: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurgeRequest {
    #[serde(default)]
    series_slug: String,
    #[serde(default)]
    chapter_number: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub success: bool,
    pub removed: usize,
}

pub fn series_stats(state: &EdgeState, slug: &str) -> Result<SeriesInteractions, String> {
    interactions::series_stats(&state.interactions, slug).map_err(|err| failure(err.status(), err))
}

pub fn log_action(state: &EdgeState, body: &str) -> Result<LogActionResponse, String> {
    interactions::ingest::log_action_body(&state.logs, body).map_err(|err| failure(err.status(), err))
}

pub fn process_logs(state: &EdgeState) -> Result<ProcessReport, String> {
    interactions::process_logs(&state.logs, &state.interactions).map_err(|err| failure(500, format!("{err:#}")))
}

pub fn chapter_pages(state: &EdgeState, id: &str) -> Result<ChapterPages, String> {
    let cached = state.proxy().chapter_pages(id).map_err(|err| failure(err.status(), err))?;
    Ok(ChapterPages { files: cached.value, cache: cached.cache.header_value() })
}

pub fn views(state: &EdgeState, id: &str) -> Result<ViewCount, String> {
    let views = state.proxy().views(id).map_err(|err| failure(err.status(), err))?;
    Ok(ViewCount { views })
}

pub fn posts_page(state: &EdgeState, page: u32) -> Result<PostListing, String> {
    state.proxy().posts_page(page.max(1)).map_err(|err| failure(err.status(), err))
}

pub fn all_posts(state: &EdgeState) -> Result<Listing, String> {
    let cached = state.proxy().all_posts().map_err(|err| failure(err.status(), err))?;
    Ok(Listing { listing: cached.value, cache: cached.cache.header_value() })
}

pub fn admin_comments(state: &EdgeState) -> Result<Vec<AdminComment>, String> {
    interactions::list_comments(&state.interactions).map_err(|err| failure(err.status(), err))
}

pub fn admin_delete_comment(state: &EdgeState, body: &str) -> Result<Ack, String> {
    let request: DeleteComment = parse_body(body)?;
    interactions::delete_comment(&state.interactions, &request).map_err(|err| failure(err.status(), err))?;
    Ok(Ack { success: true, removed: 1 })
}

pub fn admin_batch_delete(state: &EdgeState, body: &str) -> Result<BatchReport, String> {
    let deletions: Vec<BatchDeletion> = parse_body(body)?;
    interactions::batch_delete(&state.interactions, &deletions).map_err(|err| failure(err.status(), err))
}

/// Purge one chapter's cached page list, named by `{seriesSlug, chapterNumber}`.
pub fn purge_cache(state: &EdgeState, body: &str) -> Result<Ack, String> {
    let request: PurgeRequest = parse_body(body)?;
    state
        .proxy()
        .purge_chapter(&state.catalog, &request.series_slug, &request.chapter_number)
        .map_err(|err| failure(err.status(), err))?;
    Ok(Ack { success: true, removed: 1 })
}

pub fn purge_proxy_cache(state: &EdgeState) -> Result<Ack, String> {
    let removed = state.proxy().purge_all().map_err(|err| failure(err.status(), err))?;
    Ok(Ack { success: true, removed })
}
