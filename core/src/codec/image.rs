//! Header-only image probing.
//!
//! The reader only needs the natural size of each page to decide how pages pair into spreads, so
//! the probe reads the image header and EXIF orientation without decoding pixels.

use std::io::Cursor;

use anyhow::{Context, anyhow};
use image::metadata::Orientation;
use image::{ImageDecoder as _, ImageFormat, ImageReader};
use tracing::warn;

use crate::types::{ImageDimensions, Page};

use super::Result;

/// Probe the displayed dimensions of an encoded image.
///
/// `name` is used for format inference from its extension and for error messages; the format is
/// sniffed from the bytes when the extension is missing or unknown. Quarter-turn EXIF
/// orientations swap width and height, matching how browsers lay the image out.
pub fn probe_dimensions(name: &str, data: &[u8]) -> Result<ImageDimensions> {
    if data.is_empty() {
        return Err(anyhow!("empty image data for {name}"));
    }

    let reader = match infer_format(name) {
        Some(format) => ImageReader::with_format(Cursor::new(data), format),
        None => ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .context("guessing image format")?,
    };

    let mut decoder =
        reader.into_decoder().with_context(|| format!("constructing decoder for image {name}"))?;
    let (width, height) = decoder.dimensions();
    let orientation = decoder.orientation().unwrap_or_else(|err| {
        warn!(target: "codec::image", "failed to read orientation for {name}: {err}");
        Orientation::NoTransforms
    });

    if swaps_axes(orientation) {
        Ok(ImageDimensions { width: height, height: width })
    } else {
        Ok(ImageDimensions { width, height })
    }
}

/// Probe a page's bytes and record the outcome on the page: loaded with its size, or failed.
pub fn probe_page(page: &mut Page, data: &[u8]) -> Option<ImageDimensions> {
    match probe_dimensions(&page.url, data) {
        Ok(dims) => {
            page.mark_loaded(dims);
            Some(dims)
        }
        Err(err) => {
            warn!(target: "codec::image", page = page.index, "page failed to load: {err:#}");
            page.mark_failed();
            None
        }
    }
}

fn swaps_axes(orientation: Orientation) -> bool {
    matches!(
        orientation,
        Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH
    )
}

fn infer_format(name: &str) -> Option<ImageFormat> {
    let path = name.split(['?', '#']).next().unwrap_or(name);
    let (_, ext) = path.rsplit_once('.')?;
    if ext.contains('/') {
        return None;
    }
    ImageFormat::from_extension(ext.to_ascii_lowercase())
}
