//! Render instructions for the presentation layer.

use serde::Serialize;

use crate::types::{Direction, FitMode, Page, PageStatus, ReaderSettings, ReadingMode};

use super::spread::Spread;

/// Fraction of the viewport height, from the top, used to pick the current page while scrolling.
pub const SCROLL_TRIGGER_RATIO: f64 = 0.25;

/// Upper bound applied to one axis of a page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "px")]
pub enum Limit {
    /// Unbounded: the image keeps its natural size on this axis.
    None,
    /// Bounded by the viewer's size on this axis.
    Viewport,
    Pixels(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sizing {
    pub max_width: Limit,
    pub max_height: Limit,
    /// Whether images smaller than their limits are scaled up to fill them.
    pub stretch: bool,
}

impl Sizing {
    pub fn for_settings(settings: &ReaderSettings) -> Self {
        let (max_width, max_height) = match settings.fit {
            FitMode::Width => (Limit::Viewport, Limit::None),
            FitMode::Height => (Limit::None, Limit::Viewport),
            FitMode::Both => (Limit::Viewport, Limit::Viewport),
            FitMode::Original => (Limit::None, Limit::None),
            FitMode::Custom => (
                if settings.limit_width {
                    Limit::Pixels(settings.custom_max_width)
                } else {
                    Limit::None
                },
                if settings.limit_height {
                    Limit::Pixels(settings.custom_max_height)
                } else {
                    Limit::None
                },
            ),
        };
        let stretch = settings.stretch_small_pages && settings.fit != FitMode::Original;
        Self { max_width, max_height, stretch }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePlacement {
    pub page: usize,
    pub url: String,
    pub loaded: bool,
    pub failed: bool,
    /// A lone portrait page in double mode, centred instead of occupying half the spread.
    pub single_page_spread: bool,
}

/// Everything the presentation layer needs to draw the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderInstruction {
    pub mode: ReadingMode,
    pub fit: FitMode,
    pub direction: Direction,
    pub sizing: Sizing,
    /// Images in on-screen order (right-to-left spreads are already reversed).
    pub images: Vec<ImagePlacement>,
    /// A landscape page shown alone in double mode.
    pub single_landscape_spread: bool,
}

/// Build the render instruction for the current spread.
///
/// Continuous mode places every page in reading order regardless of `spread`, since position is
/// driven by scrolling there.
pub fn render(pages: &[Page], spread: Option<&Spread>, settings: &ReaderSettings) -> RenderInstruction {
    let sizing = Sizing::for_settings(settings);

    let mut images: Vec<ImagePlacement> = match settings.mode {
        ReadingMode::Continuous => pages.iter().map(placement).collect(),
        ReadingMode::Single | ReadingMode::Double => spread
            .map(|spread| spread.pages().iter().filter_map(|&p| pages.get(p)).map(placement).collect())
            .unwrap_or_default(),
    };

    let mut single_landscape_spread = false;
    if settings.mode == ReadingMode::Double && images.len() == 1 {
        let landscape = pages.get(images[0].page).map(Page::is_landscape).unwrap_or(false);
        single_landscape_spread = landscape;
        images[0].single_page_spread = !landscape;
    }

    if settings.mode != ReadingMode::Continuous && settings.direction == Direction::Rtl {
        images.reverse();
    }

    RenderInstruction {
        mode: settings.mode,
        fit: settings.fit,
        direction: settings.direction,
        sizing,
        images,
        single_landscape_spread,
    }
}

fn placement(page: &Page) -> ImagePlacement {
    ImagePlacement {
        page: page.index,
        url: page.url.clone(),
        loaded: matches!(page.status, PageStatus::Loaded(_)),
        failed: matches!(page.status, PageStatus::Failed),
        single_page_spread: false,
    }
}

/// Pick the page under the scroll trigger line in continuous mode.
///
/// `page_tops` holds each rendered page's top offset within the scroll container, indexed by
/// page. Among pages whose top is at or above the trigger line, the one closest to the line
/// wins; equal offsets resolve to the smallest page index.
pub fn page_at_scroll(page_tops: &[f64], scroll_top: f64, viewport_height: f64) -> Option<usize> {
    let trigger = scroll_top + viewport_height * SCROLL_TRIGGER_RATIO;
    let mut best: Option<(usize, f64)> = None;
    for (page, &top) in page_tops.iter().enumerate() {
        if !top.is_finite() || top > trigger {
            continue;
        }
        match best {
            Some((_, best_top)) if top <= best_top => {}
            _ => best = Some((page, top)),
        }
    }
    best.map(|(page, _)| page)
}
