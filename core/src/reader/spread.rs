//! Partitioning of a chapter's pages into spreads.

use serde::Serialize;

use crate::types::{Page, ReadingMode};

/// One or two page indices displayed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Spread(Vec<usize>);

impl Spread {
    fn solo(page: usize) -> Self {
        Self(vec![page])
    }

    fn pair(first: usize, second: usize) -> Self {
        Self(vec![first, second])
    }

    pub fn pages(&self) -> &[usize] {
        &self.0
    }

    pub fn first_page(&self) -> usize {
        self.0[0]
    }

    pub fn contains(&self, page: usize) -> bool {
        self.0.contains(&page)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_solo(&self) -> bool {
        self.0.len() == 1
    }
}

/// Spreads of a chapter plus the reverse page → spread lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpreadLayout {
    spreads: Vec<Spread>,
    page_to_spread: Vec<usize>,
}

impl SpreadLayout {
    pub fn spreads(&self) -> &[Spread] {
        &self.spreads
    }

    pub fn page_to_spread(&self) -> &[usize] {
        &self.page_to_spread
    }

    pub fn len(&self) -> usize {
        self.spreads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spreads.is_empty()
    }

    pub fn spread(&self, index: usize) -> Option<&Spread> {
        self.spreads.get(index)
    }

    /// Index of the spread that holds `page`.
    pub fn spread_of_page(&self, page: usize) -> Option<usize> {
        self.page_to_spread.get(page).copied()
    }

    pub fn last_index(&self) -> Option<usize> {
        self.spreads.len().checked_sub(1)
    }

    /// Clamp any signed index into `[0, len - 1]`. `None` only when there are no spreads.
    pub fn clamp(&self, index: i64) -> Option<usize> {
        let last = self.last_index()?;
        Some(index.clamp(0, last as i64) as usize)
    }

    fn push(&mut self, spread: Spread) {
        let index = self.spreads.len();
        for _ in spread.pages() {
            self.page_to_spread.push(index);
        }
        self.spreads.push(spread);
    }
}

/// Compute the spreads for `pages` under the given mode.
///
/// Single and continuous modes map pages 1:1. Double mode walks left to right: an optional
/// cover page is emitted alone, landscape pages stand alone, and a non-landscape page is paired
/// with its successor only when the successor is known to be portrait or square. A successor
/// that is still pending or failed to load is never pulled into a pair.
pub fn calculate(pages: &[Page], mode: ReadingMode, double_page_offset: bool) -> SpreadLayout {
    let mut layout = SpreadLayout {
        spreads: Vec::with_capacity(pages.len()),
        page_to_spread: Vec::with_capacity(pages.len()),
    };

    match mode {
        ReadingMode::Single | ReadingMode::Continuous => {
            for index in 0..pages.len() {
                layout.push(Spread::solo(index));
            }
        }
        ReadingMode::Double => {
            let mut i = 0;
            if double_page_offset && !pages.is_empty() {
                layout.push(Spread::solo(0));
                i = 1;
            }
            while i < pages.len() {
                if pages[i].is_landscape() {
                    layout.push(Spread::solo(i));
                    i += 1;
                    continue;
                }
                match pages.get(i + 1) {
                    Some(next) if next.dimensions().is_some_and(|dims| !dims.is_landscape()) => {
                        layout.push(Spread::pair(i, i + 1));
                        i += 2;
                    }
                    _ => {
                        layout.push(Spread::solo(i));
                        i += 1;
                    }
                }
            }
        }
    }

    layout
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageDimensions;

    const PORTRAIT: (u32, u32) = (800, 1200);
    const LANDSCAPE: (u32, u32) = (1600, 1200);

    fn pages(dims: &[Option<(u32, u32)>]) -> Vec<Page> {
        dims.iter()
            .enumerate()
            .map(|(index, dims)| {
                let mut page = Page::new(index, format!("p{index}.png"));
                if let Some((width, height)) = dims {
                    page.mark_loaded(ImageDimensions { width: *width, height: *height });
                }
                page
            })
            .collect()
    }

    fn as_vecs(layout: &SpreadLayout) -> Vec<Vec<usize>> {
        layout.spreads().iter().map(|s| s.pages().to_vec()).collect()
    }

    fn assert_partition(layout: &SpreadLayout, total: usize) {
        let flat: Vec<usize> = layout.spreads().iter().flat_map(|s| s.pages().to_vec()).collect();
        assert_eq!(flat, (0..total).collect::<Vec<_>>());
        for page in 0..total {
            let spread = layout.spread_of_page(page).expect("mapped page");
            assert!(layout.spread(spread).unwrap().contains(page));
        }
        assert!(layout.spreads().iter().all(|s| (1..=2).contains(&s.len())));
    }

    #[test]
    fn double_pairs_portraits_and_isolates_landscape() {
        let pages = pages(&[Some(PORTRAIT), Some(PORTRAIT), Some(LANDSCAPE)]);
        let layout = calculate(&pages, ReadingMode::Double, false);
        assert_eq!(as_vecs(&layout), vec![vec![0, 1], vec![2]]);
        assert_eq!(layout.page_to_spread(), &[0, 0, 1]);
    }

    #[test]
    fn offset_with_landscape_follower_keeps_pages_alone() {
        let pages = pages(&[Some(PORTRAIT), Some(PORTRAIT), Some(LANDSCAPE)]);
        let layout = calculate(&pages, ReadingMode::Double, true);
        assert_eq!(as_vecs(&layout), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn offset_with_portrait_follower_pairs_after_cover() {
        let pages = pages(&[Some(PORTRAIT), Some(PORTRAIT), Some(PORTRAIT)]);
        let layout = calculate(&pages, ReadingMode::Double, true);
        assert_eq!(as_vecs(&layout), vec![vec![0], vec![1, 2]]);
    }

    #[test]
    fn unknown_followers_are_not_paired() {
        let pages = pages(&[None, None, None]);
        let layout = calculate(&pages, ReadingMode::Double, false);
        assert_eq!(as_vecs(&layout), vec![vec![0], vec![1], vec![2]]);

        // A broken image between two portraits: the first portrait stays alone.
        let mut pages = self::pages(&[Some(PORTRAIT), None, Some(PORTRAIT)]);
        pages[1].mark_failed();
        let layout = calculate(&pages, ReadingMode::Double, false);
        assert_eq!(as_vecs(&layout), vec![vec![0], vec![1, 2]]);
    }

    #[test]
    fn square_pages_pair() {
        let pages = pages(&[Some((1000, 1000)), Some((1000, 1000))]);
        let layout = calculate(&pages, ReadingMode::Double, false);
        assert_eq!(as_vecs(&layout), vec![vec![0, 1]]);
    }

    #[test]
    fn single_and_continuous_are_one_to_one() {
        let pages = pages(&[Some(LANDSCAPE), Some(PORTRAIT), None]);
        for mode in [ReadingMode::Single, ReadingMode::Continuous] {
            let layout = calculate(&pages, mode, true);
            assert_eq!(as_vecs(&layout), vec![vec![0], vec![1], vec![2]]);
        }
    }

    #[test]
    fn every_page_is_in_exactly_one_spread() {
        let shapes = [Some(PORTRAIT), Some(LANDSCAPE), None];
        // Exhaustive over all 3^5 shape combinations, with and without the cover offset.
        for code in 0..3usize.pow(5) {
            let dims: Vec<_> = (0..5).map(|i| shapes[(code / 3usize.pow(i)) % 3]).collect();
            let pages = pages(&dims);
            for offset in [false, true] {
                assert_partition(&calculate(&pages, ReadingMode::Double, offset), pages.len());
            }
        }
    }

    #[test]
    fn empty_chapter_has_no_spreads() {
        let layout = calculate(&[], ReadingMode::Double, true);
        assert!(layout.is_empty());
        assert_eq!(layout.clamp(5), None);
    }

    #[test]
    fn clamp_handles_out_of_range_indices() {
        let pages = pages(&[None, None, None, None]);
        let layout = calculate(&pages, ReadingMode::Single, false);
        assert_eq!(layout.clamp(-3), Some(0));
        assert_eq!(layout.clamp(2), Some(2));
        assert_eq!(layout.clamp(i64::MAX), Some(3));
    }
}
