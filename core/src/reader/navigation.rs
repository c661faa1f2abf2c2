//! Chapter ordering, reader locations, and the effects emitted by navigation.

use serde::Serialize;

use crate::types::{ChapterKey, Direction};

use super::viewer::RenderInstruction;

/// Chapters of a series in numeric order, with the one currently open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterList {
    keys: Vec<ChapterKey>,
    current: ChapterKey,
}

impl ChapterList {
    /// `keys` are sorted numerically; `current` does not need to be part of them.
    pub fn new(mut keys: Vec<ChapterKey>, current: ChapterKey) -> Self {
        ChapterKey::sort(&mut keys);
        Self { keys, current }
    }

    pub fn keys(&self) -> &[ChapterKey] {
        &self.keys
    }

    pub fn current(&self) -> &ChapterKey {
        &self.current
    }

    /// Chapter `delta` steps away from the current one, if it exists.
    pub fn neighbour(&self, delta: i64) -> Option<&ChapterKey> {
        let position = self.keys.iter().position(|key| key == &self.current)? as i64;
        let target = position.checked_add(delta)?;
        if target < 0 {
            return None;
        }
        self.keys.get(target as usize)
    }
}

/// Where the reader should land when a chapter opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialPosition {
    /// 0-based page index.
    Page(usize),
    LastSpread,
}

impl Default for InitialPosition {
    fn default() -> Self {
        Self::Page(0)
    }
}

impl InitialPosition {
    /// Resolve the landing position from a reader URL.
    ///
    /// `#last` jumps to the final spread; `/{series}/{chapter}/{page}` with a 1-based page opens
    /// that page. Anything else opens the first page.
    pub fn from_url(path: &str, fragment: Option<&str>) -> Self {
        if fragment.map(|f| f.trim_start_matches('#')) == Some("last") {
            return Self::LastSpread;
        }
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if let [_, _, page] = segments.as_slice() {
            if let Ok(number) = page.parse::<usize>() {
                if number > 0 {
                    return Self::Page(number - 1);
                }
            }
        }
        Self::default()
    }
}

/// Reader URL path for a page: `/{series}/{chapter}/{page + 1}`.
pub fn page_path(series_slug: &str, chapter: &ChapterKey, page: usize) -> String {
    format!("/{series_slug}/{chapter}/{}", page + 1)
}

/// Reader URL for opening a chapter, optionally at its last spread.
pub fn chapter_path(series_slug: &str, chapter: &ChapterKey, jump_to_end: bool) -> String {
    let mut path = format!("/{series_slug}/{chapter}");
    if jump_to_end {
        path.push_str("#last");
    }
    path
}

/// How a continuous-mode scroll should move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollBehavior {
    /// Jump without animation, used while the chapter initialises.
    Instant,
    Smooth,
}

/// Whether a navigation originates from chapter initialisation or from the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Init,
    User,
}

impl Trigger {
    pub fn scroll_behavior(self) -> ScrollBehavior {
        match self {
            Trigger::Init => ScrollBehavior::Instant,
            Trigger::User => ScrollBehavior::Smooth,
        }
    }
}

/// User-visible notices. None of them change the reader state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Notice {
    LastChapter,
    FirstChapter,
    /// The chapter was opened with an empty page list.
    EmptyChapter,
}

impl Notice {
    pub fn message(self) -> &'static str {
        match self {
            Notice::LastChapter => "You are on the last available chapter.",
            Notice::FirstChapter => "This is the first chapter.",
            Notice::EmptyChapter => "This chapter has no pages.",
        }
    }
}

/// Browser location and counter to display for the current position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub path: String,
    pub page_counter: String,
}

/// Request to leave the current chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterRequest {
    pub chapter: ChapterKey,
    pub jump_to_end: bool,
    pub path: String,
}

/// Side effect the presentation layer applies after a reader operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "effect")]
pub enum Effect {
    Render { instruction: RenderInstruction },
    ScrollToPage { page: usize, behavior: ScrollBehavior },
    /// Scroll the paged viewer back to its top.
    ResetScroll,
    UpdateLocation { location: Location },
    LoadChapter { request: ChapterRequest },
    Notice { notice: Notice, message: String },
}

impl Effect {
    pub fn notice(notice: Notice) -> Self {
        Effect::Notice { notice, message: notice.message().to_string() }
    }
}

/// Raw user input that may turn into a spread change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input {
    ArrowLeft,
    ArrowRight,
    /// Click on the viewer at a horizontal fraction of its width (0.0 = left edge).
    Click { x_fraction: f64 },
}

impl Input {
    /// Spread delta for this input under the reading direction, `None` when it is a no-op.
    ///
    /// The central 10% of the viewer is a dead zone for clicks.
    pub fn spread_delta(self, direction: Direction) -> Option<i64> {
        let rightward = direction.rightward_delta();
        match self {
            Input::ArrowRight => Some(rightward),
            Input::ArrowLeft => Some(-rightward),
            Input::Click { x_fraction } if x_fraction < 0.45 => Some(-rightward),
            Input::Click { x_fraction } if x_fraction > 0.55 => Some(rightward),
            Input::Click { .. } => None,
        }
    }
}
