//! Series catalog records as published in the site's data files.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Result;
use crate::slug::slugify;
use crate::types::ChapterKey;

/// Scanlation group whose hosted chapters are readable in the built-in reader.
pub const DEFAULT_GROUP: &str = "Big_herooooo";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterMeta {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub last_updated: Option<i64>,
    /// Group name → hosting URL or path. An empty value means the group does not host it.
    #[serde(default)]
    pub groups: BTreeMap<String, String>,
    #[serde(default)]
    pub licencied: Vec<String>,
}

impl ChapterMeta {
    pub fn is_hosted_by(&self, group: &str) -> bool {
        self.groups.get(group).is_some_and(|value| !value.is_empty())
    }

    /// Opaque content id of the page list: last path segment of the group entry.
    pub fn content_id(&self, group: &str) -> Option<&str> {
        self.groups
            .get(group)
            .filter(|value| !value.is_empty())
            .and_then(|value| value.trim_end_matches('/').rsplit('/').next())
            .filter(|id| !id.is_empty())
    }

    pub fn is_licensed(&self, group: &str) -> bool {
        !self.licencied.is_empty() && !self.is_hosted_by(group)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub indice_ep: u32,
    #[serde(default)]
    pub saison_ep: Option<u32>,
    #[serde(default)]
    pub title_ep: Option<String>,
}

impl Episode {
    pub fn season(&self) -> u32 {
        self.saison_ep.unwrap_or(1)
    }

    /// Interaction key of the episode, shared by likes and stats.
    pub fn interaction_id(&self) -> String {
        format!("ep-S{}-{}", self.season(), self.indice_ep)
    }
}

/// Episode with its 1-based position across all seasons.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberedEpisode {
    pub absolute_index: u32,
    pub episode: Episode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub chapters: BTreeMap<String, ChapterMeta>,
    #[serde(default)]
    pub episodes: Option<Vec<Episode>>,
}

impl Series {
    pub fn slug(&self) -> String {
        slugify(&self.title)
    }

    pub fn chapter(&self, key: &ChapterKey) -> Option<&ChapterMeta> {
        self.chapters.get(key.as_str())
    }

    /// Chapters readable in the reader, in numeric order.
    pub fn readable_chapter_keys(&self, group: &str) -> Vec<ChapterKey> {
        let mut keys: Vec<ChapterKey> = self
            .chapters
            .iter()
            .filter(|(_, meta)| meta.is_hosted_by(group))
            .map(|(key, _)| ChapterKey::new(key.as_str()))
            .collect();
        ChapterKey::sort(&mut keys);
        keys
    }

    /// Episodes numbered across seasons: seasons ascending, then episode index ascending.
    pub fn numbered_episodes(&self) -> Vec<NumberedEpisode> {
        let mut episodes: Vec<Episode> = self.episodes.clone().unwrap_or_default();
        episodes.sort_by_key(|ep| (ep.season(), ep.indice_ep));
        episodes
            .into_iter()
            .zip(1u32..)
            .map(|(episode, absolute_index)| NumberedEpisode { absolute_index, episode })
            .collect()
    }
}

/// Site configuration listing the series files under `series/`.
#[derive(Debug, Clone, Default, Deserialize)]
struct SiteConfig {
    #[serde(default, rename = "LOCAL_SERIES_FILES")]
    local_series_files: Vec<String>,
}

/// Load every series named by `{data_dir}/config.json`.
///
/// A missing config is an error; a series file that cannot be read or parsed is skipped.
pub fn load_catalog(data_dir: &Path) -> Result<Vec<Series>> {
    let config_path = data_dir.join("config.json");
    let raw = fs::read_to_string(&config_path)
        .with_context(|| format!("reading site config at {}", config_path.display()))?;
    let config: SiteConfig = serde_json::from_str(&raw)
        .with_context(|| format!("parsing site config at {}", config_path.display()))?;

    let mut catalog = Vec::with_capacity(config.local_series_files.len());
    for file in &config.local_series_files {
        let path = data_dir.join("series").join(file);
        let parsed = fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str::<Series>(&raw).map_err(anyhow::Error::from));
        match parsed {
            Ok(series) => catalog.push(series),
            Err(err) => warn!(target: "catalog", path = %path.display(), error = %err, "skipping series file"),
        }
    }
    debug!(target: "catalog", series = catalog.len(), "catalog loaded");
    Ok(catalog)
}

/// Series whose slugified title is `slug`.
pub fn find_by_slug<'a>(catalog: &'a [Series], slug: &str) -> Option<&'a Series> {
    catalog.iter().find(|series| series.slug() == slug)
}
