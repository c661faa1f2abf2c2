//! Last chapter read per series and the reading shortcuts derived from it.

use std::sync::Arc;

use serde::Serialize;

use crate::types::ChapterKey;

use super::{ClientStorage, Result};

fn progress_key(series_slug: &str) -> String {
    format!("reading-progress-{series_slug}")
}

/// Reading progress of one client across series.
#[derive(Debug, Clone)]
pub struct ReadingProgress {
    storage: Arc<dyn ClientStorage>,
}

impl ReadingProgress {
    pub fn new(storage: Arc<dyn ClientStorage>) -> Self {
        Self { storage }
    }

    pub fn last_chapter(&self, series_slug: &str) -> Result<Option<ChapterKey>> {
        Ok(self
            .storage
            .get(&progress_key(series_slug))?
            .filter(|value| !value.is_empty())
            .map(ChapterKey::new))
    }

    /// Record `chapter` as the latest chapter opened in the series.
    pub fn record(&self, series_slug: &str, chapter: &ChapterKey) -> Result<()> {
        self.storage.set(&progress_key(series_slug), chapter.as_str())
    }

    pub fn clear(&self, series_slug: &str) -> Result<()> {
        self.storage.remove(&progress_key(series_slug))
    }

    /// Shortcuts to show on a series page, given the chapters it offers.
    pub fn actions(&self, series_slug: &str, chapters: &[ChapterKey]) -> Result<ReadingActions> {
        let saved = self.last_chapter(series_slug)?;
        Ok(ReadingActions::resolve(series_slug, chapters, saved))
    }
}

/// Entry points on a series page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum ReadingActions {
    /// No chapters to offer.
    Empty,
    NeverRead { latest: ChapterKey, latest_path: String },
    UpToDate { latest: ChapterKey },
    Behind { latest: ChapterKey, latest_path: String, resume: ChapterKey, resume_path: String },
}

impl ReadingActions {
    pub fn resolve(series_slug: &str, chapters: &[ChapterKey], saved: Option<ChapterKey>) -> Self {
        let Some(latest) = chapters.iter().max_by(|a, b| a.numeric_cmp(b)).cloned() else {
            return ReadingActions::Empty;
        };
        let latest_path = format!("/{series_slug}/{latest}");
        match saved {
            None => ReadingActions::NeverRead { latest, latest_path },
            Some(resume) if resume == latest => ReadingActions::UpToDate { latest },
            Some(resume) => ReadingActions::Behind {
                latest,
                latest_path,
                resume_path: format!("/{series_slug}/{resume}"),
                resume,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStorage;

    fn keys(values: &[&str]) -> Vec<ChapterKey> {
        values.iter().copied().map(ChapterKey::from).collect()
    }

    #[test]
    fn records_and_reads_last_chapter() -> Result<()> {
        let progress = ReadingProgress::new(Arc::new(MemoryStorage::new()));
        assert_eq!(progress.last_chapter("solo")?, None);
        progress.record("solo", &ChapterKey::from("12.5"))?;
        assert_eq!(progress.last_chapter("solo")?, Some(ChapterKey::from("12.5")));
        assert_eq!(progress.last_chapter("other")?, None);
        progress.clear("solo")?;
        assert_eq!(progress.last_chapter("solo")?, None);
        Ok(())
    }

    #[test]
    fn actions_follow_saved_progress() -> Result<()> {
        let progress = ReadingProgress::new(Arc::new(MemoryStorage::new()));
        let chapters = keys(&["1", "10", "2"]);

        assert_eq!(
            progress.actions("solo", &chapters)?,
            ReadingActions::NeverRead {
                latest: ChapterKey::from("10"),
                latest_path: "/solo/10".to_string()
            }
        );

        progress.record("solo", &ChapterKey::from("2"))?;
        assert!(matches!(
            progress.actions("solo", &chapters)?,
            ReadingActions::Behind { resume_path, .. } if resume_path == "/solo/2"
        ));

        progress.record("solo", &ChapterKey::from("10"))?;
        assert!(matches!(progress.actions("solo", &chapters)?, ReadingActions::UpToDate { .. }));
        assert_eq!(progress.actions("solo", &[])?, ReadingActions::Empty);
        Ok(())
    }
}
