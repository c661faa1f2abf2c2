//! Scraping proxy in front of the image host: chapter page lists, view counts, and post listings,
//! cached in a key-value store.

pub mod fetch;
pub mod imgchest;

use std::fmt;

pub use fetch::{HttpFetch, HttpResponse, ReqwestFetch};
pub use imgchest::{ImgChest, ImgChestConfig, PostListing, PostSummary};

pub type Result<T> = crate::Result<T>;

/// Failure of a proxy lookup. Extraction mismatches are final; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("invalid id: {0:?}")]
    InvalidId(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("upstream responded with HTTP {status}")]
    Upstream { status: u16 },
    #[error("embedded page data not found")]
    MissingMarker,
    #[error("malformed upstream payload: {0}")]
    MalformedPayload(String),
    #[error("no file list in page data")]
    MissingFiles,
    #[error("view count not found in page")]
    MissingViews,
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl ScrapeError {
    /// HTTP status the edge answers with.
    pub fn status(&self) -> u16 {
        match self {
            ScrapeError::InvalidId(_) => 400,
            ScrapeError::NotFound(_) => 404,
            ScrapeError::Upstream { status } if *status >= 400 => *status,
            ScrapeError::Upstream { .. }
            | ScrapeError::MissingMarker
            | ScrapeError::MalformedPayload(_)
            | ScrapeError::MissingFiles
            | ScrapeError::MissingViews => 502,
            ScrapeError::Transport(_) => 500,
        }
    }
}

pub type ScrapeResult<T> = std::result::Result<T, ScrapeError>;

/// Whether a response was served from the proxy cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    /// Value of the `X-Cache` response header.
    pub fn header_value(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_value())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub cache: CacheStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_failure_kind() {
        assert_eq!(ScrapeError::Upstream { status: 404 }.status(), 404);
        assert_eq!(ScrapeError::Upstream { status: 302 }.status(), 502);
        assert_eq!(ScrapeError::MissingViews.status(), 502);
        assert_eq!(ScrapeError::InvalidId(String::new()).status(), 400);
        assert_eq!(ScrapeError::Transport(anyhow::anyhow!("reset")).status(), 500);
    }

    #[test]
    fn cache_status_renders_header() {
        assert_eq!(CacheStatus::Hit.to_string(), "HIT");
        assert_eq!(CacheStatus::Miss.header_value(), "MISS");
    }
}
