//! Reader session: the explicit context object every reader operation runs against.

use tracing::{debug, warn};

use crate::types::{ChapterKey, ImageDimensions, Page, ReaderSettings, ReadingMode};

use super::navigation::{
    ChapterList, ChapterRequest, Effect, InitialPosition, Input, Location, Notice, Trigger,
    chapter_path, page_path,
};
use super::spread::{SpreadLayout, calculate};
use super::viewer::{RenderInstruction, page_at_scroll, render};

/// State of one open chapter in the reader.
///
/// The reading position is anchored on a page index. Spread indices are derived from it after
/// every recalculation, so late image loads never move the reader away from the page it shows.
#[derive(Debug, Clone)]
pub struct ReaderSession {
    series_slug: String,
    chapters: ChapterList,
    pages: Vec<Page>,
    settings: ReaderSettings,
    layout: SpreadLayout,
    current_spread: usize,
    anchor_page: usize,
    pending_initial: Option<InitialPosition>,
}

impl ReaderSession {
    /// Open a chapter. Until every page has settled the session waits to apply `initial`; call
    /// [`start`](Self::start) once afterwards.
    pub fn new(
        series_slug: impl Into<String>,
        chapters: ChapterList,
        pages: Vec<Page>,
        settings: ReaderSettings,
        initial: InitialPosition,
    ) -> Self {
        let layout = calculate(&pages, settings.mode, settings.double_page_offset);
        Self {
            series_slug: series_slug.into(),
            chapters,
            pages,
            settings,
            layout,
            current_spread: 0,
            anchor_page: 0,
            pending_initial: Some(initial),
        }
    }

    /// Effects due right after opening.
    ///
    /// An empty chapter is ready at once and reports [`Notice::EmptyChapter`]. Pages that were
    /// already settled when the session was built get their initial position applied here.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.pages.is_empty() {
            self.pending_initial = None;
            warn!(target: "reader::session", chapter = %self.chapter(), "chapter has no pages");
            return vec![Effect::notice(Notice::EmptyChapter)];
        }
        match self.pending_initial {
            Some(initial) if self.pages.iter().all(Page::is_settled) => {
                self.pending_initial = None;
                self.apply_initial(initial)
            }
            _ => Vec::new(),
        }
    }

    pub fn series_slug(&self) -> &str {
        &self.series_slug
    }

    pub fn chapter(&self) -> &ChapterKey {
        self.chapters.current()
    }

    pub fn chapters(&self) -> &ChapterList {
        &self.chapters
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    pub fn layout(&self) -> &SpreadLayout {
        &self.layout
    }

    pub fn current_spread(&self) -> usize {
        self.current_spread
    }

    /// Page the reader is positioned on.
    pub fn anchor_page(&self) -> usize {
        self.anchor_page
    }

    pub fn is_ready(&self) -> bool {
        self.pending_initial.is_none()
    }

    /// Record a page's natural size once its image has loaded.
    pub fn page_loaded(&mut self, page: usize, dimensions: ImageDimensions) -> Vec<Effect> {
        match self.pages.get_mut(page) {
            Some(entry) => entry.mark_loaded(dimensions),
            None => return Vec::new(),
        }
        self.after_page_settled()
    }

    /// Record a page whose image failed to load. Its dimensions stay unknown.
    pub fn page_failed(&mut self, page: usize) -> Vec<Effect> {
        match self.pages.get_mut(page) {
            Some(entry) => entry.mark_failed(),
            None => return Vec::new(),
        }
        self.after_page_settled()
    }

    fn after_page_settled(&mut self) -> Vec<Effect> {
        self.recalculate();
        match self.pending_initial {
            Some(initial) if self.pages.iter().all(Page::is_settled) => {
                self.pending_initial = None;
                self.apply_initial(initial)
            }
            Some(_) => Vec::new(),
            None if self.settings.mode == ReadingMode::Continuous => Vec::new(),
            None => vec![Effect::Render { instruction: self.render() }],
        }
    }

    fn apply_initial(&mut self, initial: InitialPosition) -> Vec<Effect> {
        let target = match initial {
            InitialPosition::LastSpread => self.layout.last_index().unwrap_or(0),
            InitialPosition::Page(page) => self.layout.spread_of_page(page).unwrap_or(0),
        };
        debug!(
            target: "reader::session",
            chapter = %self.chapter(),
            spread = target,
            "chapter ready"
        );
        let mut effects = Vec::new();
        if self.settings.mode == ReadingMode::Continuous {
            // Every page is drawn once; later position changes only scroll.
            effects.push(Effect::Render { instruction: self.render() });
        }
        effects.extend(self.go_to_spread(target as i64, Trigger::Init));
        effects
    }

    /// Recompute spreads from the current pages and settings, keeping the anchored page in view.
    pub fn recalculate(&mut self) {
        self.layout =
            calculate(&self.pages, self.settings.mode, self.settings.double_page_offset);
        self.current_spread = self.layout.spread_of_page(self.anchor_page).unwrap_or(0);
    }

    /// Jump to a spread; any index is clamped into range.
    pub fn go_to_spread(&mut self, index: i64, trigger: Trigger) -> Vec<Effect> {
        let Some(target) = self.layout.clamp(index) else {
            return Vec::new();
        };
        self.current_spread = target;
        if let Some(spread) = self.layout.spread(target) {
            self.anchor_page = spread.first_page();
        }

        let mut effects = Vec::with_capacity(3);
        if self.settings.mode == ReadingMode::Continuous {
            effects.push(Effect::ScrollToPage {
                page: self.anchor_page,
                behavior: trigger.scroll_behavior(),
            });
        } else {
            effects.push(Effect::Render { instruction: self.render() });
            if trigger == Trigger::User {
                effects.push(Effect::ResetScroll);
            }
        }
        effects.push(Effect::UpdateLocation { location: self.location() });
        effects
    }

    /// Step one spread forward or backward, crossing into neighbouring chapters at the edges.
    pub fn change_spread(&mut self, delta: i64) -> Vec<Effect> {
        let at_last = self.layout.last_index().is_none_or(|last| self.current_spread >= last);
        if delta > 0 && at_last {
            self.navigate_to_chapter(1, false)
        } else if delta < 0 && self.current_spread == 0 {
            self.navigate_to_chapter(-1, true)
        } else {
            self.go_to_spread((self.current_spread as i64).saturating_add(delta), Trigger::User)
        }
    }

    /// Jump to a 0-based page through the page → spread lookup.
    pub fn go_to_page(&mut self, page: usize, trigger: Trigger) -> Vec<Effect> {
        match self.layout.spread_of_page(page) {
            Some(spread) => self.go_to_spread(spread as i64, trigger),
            None => Vec::new(),
        }
    }

    /// Request the chapter `delta` steps away. At either end of the list a notice is emitted and
    /// nothing changes.
    pub fn navigate_to_chapter(&mut self, delta: i64, jump_to_end: bool) -> Vec<Effect> {
        match self.chapters.neighbour(delta) {
            Some(chapter) => {
                let request = ChapterRequest {
                    chapter: chapter.clone(),
                    jump_to_end,
                    path: chapter_path(&self.series_slug, chapter, jump_to_end),
                };
                vec![Effect::LoadChapter { request }]
            }
            None => {
                let notice = if delta > 0 { Notice::LastChapter } else { Notice::FirstChapter };
                debug!(target: "reader::session", chapter = %self.chapter(), ?notice, "edge of chapter list");
                vec![Effect::notice(notice)]
            }
        }
    }

    /// Keyboard and click navigation for the paged modes.
    pub fn handle_input(&mut self, input: Input) -> Vec<Effect> {
        if self.settings.mode == ReadingMode::Continuous {
            return Vec::new();
        }
        match input.spread_delta(self.settings.direction) {
            Some(delta) => self.change_spread(delta),
            None => Vec::new(),
        }
    }

    /// Track the position while scrolling in continuous mode.
    ///
    /// Only the location is updated; nothing is re-rendered or scrolled.
    pub fn sync_scroll(
        &mut self,
        page_tops: &[f64],
        scroll_top: f64,
        viewport_height: f64,
    ) -> Vec<Effect> {
        if self.settings.mode != ReadingMode::Continuous {
            return Vec::new();
        }
        let Some(page) = page_at_scroll(page_tops, scroll_top, viewport_height) else {
            return Vec::new();
        };
        match self.layout.spread_of_page(page) {
            Some(spread) if spread != self.current_spread => {
                self.current_spread = spread;
                self.anchor_page = page;
                vec![Effect::UpdateLocation { location: self.location() }]
            }
            _ => Vec::new(),
        }
    }

    /// Replace the settings, re-derive spreads, and redraw at the same page.
    pub fn apply_settings(&mut self, settings: ReaderSettings) -> Vec<Effect> {
        let mode_changed = settings.mode != self.settings.mode;
        self.settings = settings;
        self.recalculate();
        if !self.is_ready() {
            return Vec::new();
        }

        let mut effects = vec![Effect::Render { instruction: self.render() }];
        if mode_changed && self.settings.mode == ReadingMode::Continuous {
            effects.push(Effect::ScrollToPage {
                page: self.anchor_page,
                behavior: Trigger::Init.scroll_behavior(),
            });
        }
        effects.push(Effect::UpdateLocation { location: self.location() });
        effects
    }

    pub fn render(&self) -> RenderInstruction {
        render(&self.pages, self.layout.spread(self.current_spread), &self.settings)
    }

    /// URL path and page counter for the first page of the current spread.
    pub fn location(&self) -> Location {
        let first = self.layout.spread(self.current_spread).map(|s| s.first_page());
        let path = page_path(&self.series_slug, self.chapter(), first.unwrap_or(0));
        let shown = first.map(|p| p + 1).unwrap_or(0);
        Location { path, page_counter: format!("Page {shown} / {}", self.pages.len()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FitMode;

    const PORTRAIT: ImageDimensions = ImageDimensions { width: 800, height: 1200 };
    const LANDSCAPE: ImageDimensions = ImageDimensions { width: 1600, height: 1200 };

    fn chapters(current: &str) -> ChapterList {
        ChapterList::new(
            ["1", "2", "3"].into_iter().map(ChapterKey::from).collect(),
            ChapterKey::from(current),
        )
    }

    fn session(mode: ReadingMode, pages: usize, initial: InitialPosition) -> ReaderSession {
        let settings = ReaderSettings { mode, ..ReaderSettings::default() };
        let pages = Page::from_urls((0..pages).map(|i| format!("https://cdn.example/{i}.jpg")));
        ReaderSession::new("solo_leveling", chapters("2"), pages, settings, initial)
    }

    fn load_all(session: &mut ReaderSession, dims: &[ImageDimensions]) -> Vec<Effect> {
        let mut last = Vec::new();
        for (page, dims) in dims.iter().enumerate() {
            last = session.page_loaded(page, *dims);
        }
        last
    }

    fn has_location(effects: &[Effect], expected: &str) -> bool {
        effects.iter().any(|e| matches!(e, Effect::UpdateLocation { location } if location.path == expected))
    }

    #[test]
    fn empty_chapter_is_ready_with_a_notice() {
        let mut session = session(ReadingMode::Double, 0, InitialPosition::Page(4));
        assert!(!session.is_ready());
        let effects = session.start();
        assert!(session.is_ready());
        assert!(matches!(
            &effects[..],
            [Effect::Notice { notice: Notice::EmptyChapter, message }] if !message.is_empty()
        ));
        assert!(session.render().images.is_empty());
        assert_eq!(session.location().page_counter, "Page 0 / 0");
    }

    #[test]
    fn start_positions_pages_that_already_settled() {
        let settings = ReaderSettings { mode: ReadingMode::Single, ..ReaderSettings::default() };
        let mut pages = Page::from_urls(["a.jpg", "b.jpg"]);
        pages.iter_mut().for_each(|page| page.mark_loaded(PORTRAIT));
        let mut settled =
            ReaderSession::new("solo_leveling", chapters("2"), pages, settings, InitialPosition::Page(1));
        let effects = settled.start();
        assert!(settled.is_ready());
        assert!(has_location(&effects, "/solo_leveling/2/2"));

        let mut waiting = session(ReadingMode::Single, 2, InitialPosition::Page(1));
        assert!(waiting.start().is_empty());
        assert!(!waiting.is_ready());
    }

    #[test]
    fn huge_deltas_clamp_instead_of_overflowing() {
        let mut session = session(ReadingMode::Single, 3, InitialPosition::Page(1));
        load_all(&mut session, &[PORTRAIT, PORTRAIT, PORTRAIT]);
        session.change_spread(i64::MAX);
        assert_eq!(session.current_spread(), 2);

        session.go_to_spread(1, Trigger::User);
        session.change_spread(i64::MIN);
        assert_eq!(session.current_spread(), 0);
    }

    #[test]
    fn waits_for_all_pages_before_positioning() {
        let mut session = session(ReadingMode::Single, 3, InitialPosition::Page(2));
        assert!(session.page_loaded(0, PORTRAIT).is_empty());
        assert!(session.page_failed(1).is_empty());
        let effects = session.page_loaded(2, PORTRAIT);
        assert!(session.is_ready());
        assert_eq!(session.current_spread(), 2);
        assert!(has_location(&effects, "/solo_leveling/2/3"));
        assert!(!effects.contains(&Effect::ResetScroll));
    }

    #[test]
    fn last_spread_initial_position() {
        let mut session = session(ReadingMode::Double, 4, InitialPosition::LastSpread);
        load_all(&mut session, &[PORTRAIT, PORTRAIT, PORTRAIT, PORTRAIT]);
        assert_eq!(session.current_spread(), 1);
        assert_eq!(session.location().page_counter, "Page 3 / 4");
    }

    #[test]
    fn go_to_spread_always_lands_in_range() {
        let mut session = session(ReadingMode::Single, 5, InitialPosition::default());
        load_all(&mut session, &[PORTRAIT; 5]);
        for index in [-100, -1, 0, 3, 4, 5, 1_000, i64::MIN, i64::MAX] {
            session.go_to_spread(index, Trigger::User);
            assert!(session.current_spread() < session.layout().len());
        }
        session.go_to_spread(-7, Trigger::User);
        assert_eq!(session.current_spread(), 0);
        session.go_to_spread(99, Trigger::User);
        assert_eq!(session.current_spread(), 4);
    }

    #[test]
    fn change_spread_crosses_chapters_at_edges() {
        let mut session = session(ReadingMode::Single, 2, InitialPosition::default());
        load_all(&mut session, &[PORTRAIT, PORTRAIT]);

        let back = session.change_spread(-1);
        assert_eq!(
            back,
            vec![Effect::LoadChapter {
                request: ChapterRequest {
                    chapter: ChapterKey::from("1"),
                    jump_to_end: true,
                    path: "/solo_leveling/1#last".to_string(),
                }
            }]
        );
        assert_eq!(session.current_spread(), 0);

        session.change_spread(1);
        assert_eq!(session.current_spread(), 1);
        let forward = session.change_spread(1);
        assert!(matches!(
            &forward[..],
            [Effect::LoadChapter { request }] if request.chapter.as_str() == "3" && !request.jump_to_end
        ));
    }

    #[test]
    fn chapter_list_edges_emit_notices_without_state_change() {
        let settings = ReaderSettings { mode: ReadingMode::Single, ..ReaderSettings::default() };
        let pages = Page::from_urls(["a.jpg"]);
        let mut session =
            ReaderSession::new("s", chapters("3"), pages, settings, InitialPosition::default());
        session.page_loaded(0, PORTRAIT);

        let effects = session.change_spread(1);
        assert!(matches!(&effects[..], [Effect::Notice { notice: Notice::LastChapter, .. }]));
        assert_eq!(session.current_spread(), 0);
        assert_eq!(session.chapter().as_str(), "3");
    }

    #[test]
    fn late_loads_keep_the_reader_on_its_page() {
        let mut session = session(ReadingMode::Double, 6, InitialPosition::Page(4));
        // Page 1 turns out landscape only after the others settled as portraits.
        for page in [0, 2, 3, 4, 5] {
            session.page_loaded(page, PORTRAIT);
        }
        session.page_loaded(1, PORTRAIT);
        assert_eq!(session.current_spread(), 2);
        assert!(session.layout().spread(2).unwrap().contains(4));

        session.page_loaded(1, LANDSCAPE);
        let spread = session.layout().spread(session.current_spread()).unwrap();
        assert!(spread.contains(4), "reader moved away from page 4: {spread:?}");
    }

    #[test]
    fn continuous_mode_scrolls_instead_of_rendering() {
        let mut session = session(ReadingMode::Continuous, 3, InitialPosition::Page(1));
        let effects = load_all(&mut session, &[PORTRAIT; 3]);
        assert!(matches!(effects[0], Effect::Render { .. }));
        assert!(effects.contains(&Effect::ScrollToPage {
            page: 1,
            behavior: crate::reader::navigation::ScrollBehavior::Instant,
        }));

        let user = session.go_to_page(2, Trigger::User);
        assert!(matches!(user[0], Effect::ScrollToPage { page: 2, .. }));
        assert!(!user.iter().any(|e| matches!(e, Effect::Render { .. })));
    }

    #[test]
    fn scroll_sync_updates_location_only_on_change() {
        let mut session = session(ReadingMode::Continuous, 3, InitialPosition::default());
        load_all(&mut session, &[PORTRAIT; 3]);
        let tops = [0.0, 1200.0, 2400.0];

        let effects = session.sync_scroll(&tops, 1100.0, 800.0);
        assert!(has_location(&effects, "/solo_leveling/2/2"));
        assert_eq!(session.anchor_page(), 1);
        assert!(session.sync_scroll(&tops, 1150.0, 800.0).is_empty());
    }

    #[test]
    fn inputs_are_ignored_in_continuous_mode() {
        let mut session = session(ReadingMode::Continuous, 3, InitialPosition::default());
        load_all(&mut session, &[PORTRAIT; 3]);
        assert!(session.handle_input(Input::ArrowRight).is_empty());
    }

    #[test]
    fn switching_modes_keeps_the_page() {
        let mut session = session(ReadingMode::Single, 4, InitialPosition::Page(3));
        load_all(&mut session, &[PORTRAIT; 4]);
        assert_eq!(session.current_spread(), 3);

        let double = ReaderSettings {
            mode: ReadingMode::Double,
            fit: FitMode::Height,
            ..session.settings().clone()
        };
        session.apply_settings(double);
        assert_eq!(session.current_spread(), 1);
        assert!(session.layout().spread(1).unwrap().contains(3));
    }
}
