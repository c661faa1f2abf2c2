//! Edge configuration: defaults, an optional TOML file, then environment overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use manga_core::scrape::ImgChestConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const ENV_PREFIX: &str = "MANGA_EDGE_";

/// Edge settings: defaults, then an optional TOML file, then `MANGA_EDGE_*` variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Root of the three key-value stores.
    pub data_dir: PathBuf,
    /// Site data directory holding `config.json` and `series/`.
    pub site_dir: Option<PathBuf>,
    pub imgchest_base_url: String,
    pub imgchest_username: String,
    pub user_agent: String,
    pub max_listing_pages: u32,
    pub chapter_ttl_secs: u64,
    pub listing_ttl_secs: u64,
    pub http_timeout_secs: u64,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        let imgchest = ImgChestConfig::default();
        Self {
            data_dir: default_data_dir(),
            site_dir: None,
            imgchest_base_url: imgchest.base_url,
            imgchest_username: imgchest.username,
            user_agent: imgchest.reader_agent,
            max_listing_pages: imgchest.max_pages,
            chapter_ttl_secs: imgchest.chapter_ttl.as_secs(),
            listing_ttl_secs: imgchest.listing_ttl.as_secs(),
            http_timeout_secs: 15,
        }
    }
}

impl EdgeConfig {
    /// Layer the file at `path` (when given) and the process environment over the defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let mut config = path.map(load_file).unwrap_or_default();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Override fields from `MANGA_EDGE_*` variables. Unparseable numbers are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty());
        let number = |name: &str| {
            let raw = var(name)?;
            match raw.trim().parse::<u64>() {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(target: "edge::config", variable = name, value = %raw, error = %err, "ignoring override");
                    None
                }
            }
        };

        if let Some(dir) = var("DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("SITE_DIR") {
            self.site_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = var("IMGCHEST_BASE_URL") {
            self.imgchest_base_url = url;
        }
        if let Some(username) = var("IMGCHEST_USERNAME") {
            self.imgchest_username = username;
        }
        if let Some(agent) = var("USER_AGENT") {
            self.user_agent = agent;
        }
        if let Some(pages) = number("MAX_LISTING_PAGES") {
            self.max_listing_pages = u32::try_from(pages).unwrap_or(u32::MAX);
        }
        if let Some(secs) = number("CHAPTER_TTL_SECS") {
            self.chapter_ttl_secs = secs;
        }
        if let Some(secs) = number("LISTING_TTL_SECS") {
            self.listing_ttl_secs = secs;
        }
        if let Some(secs) = number("HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = secs;
        }
    }

    pub fn imgchest(&self) -> ImgChestConfig {
        ImgChestConfig {
            base_url: self.imgchest_base_url.clone(),
            username: self.imgchest_username.clone(),
            max_pages: self.max_listing_pages,
            chapter_ttl: Duration::from_secs(self.chapter_ttl_secs),
            listing_ttl: Duration::from_secs(self.listing_ttl_secs),
            reader_agent: self.user_agent.clone(),
            ..ImgChestConfig::default()
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn load_file(path: &Path) -> EdgeConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) => {
            warn!(target: "edge::config", path = %path.display(), error = %err, "falling back to default config");
            return EdgeConfig::default();
        }
    };
    match toml::from_str::<EdgeConfig>(&contents) {
        Ok(config) => {
            info!(target: "edge::config", path = %path.display(), "config loaded");
            config
        }
        Err(err) => {
            warn!(target: "edge::config", path = %path.display(), error = %err, "invalid config TOML");
            EdgeConfig::default()
        }
    }
}

fn default_data_dir() -> PathBuf {
    match directories::ProjectDirs::from("com", "MangaSite", "manga-site") {
        Some(dirs) => dirs.data_dir().join("edge"),
        None => {
            debug!(target: "edge::config", "no home directory, using temp dir");
            std::env::temp_dir().join("manga-site-edge")
        }
    }
}
