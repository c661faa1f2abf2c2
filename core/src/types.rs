//! Shared data structures exchanged between the reader, the interaction layer, and the shell.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Natural pixel size of a page image once it has loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub fn is_landscape(self) -> bool {
        self.width > self.height
    }
}

/// Loading state of a page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageStatus {
    #[default]
    Pending,
    Loaded(ImageDimensions),
    Failed,
}

/// One image of a chapter, identified by its 0-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub index: usize,
    pub url: String,
    pub status: PageStatus,
}

impl Page {
    pub fn new(index: usize, url: impl Into<String>) -> Self {
        Self { index, url: url.into(), status: PageStatus::Pending }
    }

    /// Build the page list of a chapter from its ordered image URLs.
    pub fn from_urls<I, S>(urls: I) -> Vec<Page>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        urls.into_iter().enumerate().map(|(index, url)| Page::new(index, url)).collect()
    }

    pub fn mark_loaded(&mut self, dimensions: ImageDimensions) {
        self.status = PageStatus::Loaded(dimensions);
    }

    pub fn mark_failed(&mut self) {
        self.status = PageStatus::Failed;
    }

    /// Dimensions are only known for successfully loaded pages with a non-zero width.
    pub fn dimensions(&self) -> Option<ImageDimensions> {
        match self.status {
            PageStatus::Loaded(dims) if dims.width > 0 => Some(dims),
            _ => None,
        }
    }

    /// Unknown dimensions count as non-landscape.
    pub fn is_landscape(&self) -> bool {
        self.dimensions().map(ImageDimensions::is_landscape).unwrap_or(false)
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self.status, PageStatus::Pending)
    }
}

/// String identifier of a chapter, ordered by its numeric value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterKey(String);

impl ChapterKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the key, `None` when it does not parse as a float.
    pub fn numeric(&self) -> Option<f64> {
        self.0.trim().parse::<f64>().ok().filter(|value| !value.is_nan())
    }

    /// Total order used for next/previous chapter resolution. Unparseable keys sort last.
    pub fn numeric_cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    /// Sort keys by numeric value. The sort is stable, so equal keys keep their input order.
    pub fn sort(keys: &mut [ChapterKey]) {
        keys.sort_by(|a, b| a.numeric_cmp(b));
    }
}

impl fmt::Display for ChapterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChapterKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingMode {
    Single,
    Double,
    /// Continuous vertical scrolling, persisted under its historical name.
    #[default]
    #[serde(rename = "webtoon", alias = "continuous")]
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    #[default]
    Width,
    Height,
    Both,
    Original,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Ltr,
    Rtl,
}

impl Direction {
    /// Map a physical "rightward" step (arrow right, right click zone) onto a spread delta.
    pub fn rightward_delta(self) -> i64 {
        match self {
            Direction::Ltr => 1,
            Direction::Rtl => -1,
        }
    }
}

/// Reader preferences, global to a reader session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderSettings {
    pub mode: ReadingMode,
    pub fit: FitMode,
    pub direction: Direction,
    pub double_page_offset: bool,
    pub stretch_small_pages: bool,
    pub limit_width: bool,
    pub limit_height: bool,
    pub custom_max_width: u32,
    pub custom_max_height: u32,
    pub info_sidebar_open: bool,
    pub settings_sidebar_open: bool,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            mode: ReadingMode::Continuous,
            fit: FitMode::Width,
            direction: Direction::Ltr,
            double_page_offset: false,
            stretch_small_pages: false,
            limit_width: true,
            limit_height: false,
            custom_max_width: 1200,
            custom_max_height: 1080,
            info_sidebar_open: true,
            settings_sidebar_open: false,
        }
    }
}
