//! Core library for the manga/anime reading site: reader pagination, interactions, and the
//! edge-side aggregation and scraping logic.

#![deny(missing_debug_implementations)]

pub mod catalog;
pub mod codec;
pub mod interactions;
pub mod kv;
pub mod log;
pub mod reader;
pub mod scrape;
pub mod slug;
pub mod store;
pub mod types;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

pub use types::{
    ChapterKey, Direction, FitMode, ImageDimensions, Page, PageStatus, ReaderSettings,
    ReadingMode,
};

/// Returns the version of the core crate for telemetry and debugging.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
