//! Image probing helpers feeding page load events.

pub mod image;

pub use image::{probe_dimensions, probe_page};

pub type Result<T> = crate::Result<T>;
