//! Wire and storage shapes of interactions.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Prefix of interaction keys that belong to anime episodes. Episodes only hold likes.
pub const EPISODE_PREFIX: &str = "ep-";

pub fn is_episode_key(key: &str) -> bool {
    key.starts_with(EPISODE_PREFIX)
}

/// One queued user action, as sent to the log endpoint and replayed by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Like {
        #[serde(deserialize_with = "interaction_key")]
        chapter: String,
    },
    Unlike {
        #[serde(deserialize_with = "interaction_key")]
        chapter: String,
    },
    AddComment {
        #[serde(deserialize_with = "interaction_key")]
        chapter: String,
        payload: Comment,
    },
    LikeComment {
        #[serde(deserialize_with = "interaction_key")]
        chapter: String,
        payload: CommentRef,
    },
    UnlikeComment {
        #[serde(deserialize_with = "interaction_key")]
        chapter: String,
        payload: CommentRef,
    },
    /// Series-wide rating, not tied to a chapter.
    Rate { value: f64 },
}

impl Action {
    /// Chapter number or episode id the action targets.
    pub fn target(&self) -> Option<&str> {
        match self {
            Action::Like { chapter }
            | Action::Unlike { chapter }
            | Action::AddComment { chapter, .. }
            | Action::LikeComment { chapter, .. }
            | Action::UnlikeComment { chapter, .. } => Some(chapter),
            Action::Rate { .. } => None,
        }
    }

    pub fn is_rate(&self) -> bool {
        matches!(self, Action::Rate { .. })
    }
}

/// Chapter keys are strings, but older clients sent bare numbers.
fn interaction_key<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(key) => Ok(key),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid chapter key {other}"))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRef {
    pub comment_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub comment: String,
    /// Unix milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub likes: u64,
}

/// Aggregated state of one chapter or episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterInteractions {
    #[serde(default)]
    pub likes: u64,
    /// Absent for episodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
}

impl ChapterInteractions {
    pub fn for_key(key: &str) -> Self {
        if is_episode_key(key) {
            Self { likes: 0, comments: None }
        } else {
            Self { likes: 0, comments: Some(Vec::new()) }
        }
    }

    pub fn comments(&self) -> &[Comment] {
        self.comments.as_deref().unwrap_or_default()
    }

    pub fn comment_mut(&mut self, id: &str) -> Option<&mut Comment> {
        self.comments.as_mut()?.iter_mut().find(|comment| comment.id == id)
    }

    /// Keep only the comments `keep` accepts, returning how many were dropped.
    pub fn retain_comments(&mut self, mut keep: impl FnMut(&Comment) -> bool) -> usize {
        let Some(comments) = self.comments.as_mut() else {
            return 0;
        };
        let before = comments.len();
        comments.retain(|comment| keep(comment));
        before - comments.len()
    }
}

/// Rating aggregate of a series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    #[serde(default)]
    pub average: f64,
    #[serde(default)]
    pub count: u64,
    /// Every vote received so far; `average` and `count` are derived from it.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<f64>,
}

impl RatingSummary {
    pub fn push(&mut self, value: f64) {
        self.values.push(value);
    }

    /// Recompute `count` and `average` (rounded to two decimals) from the raw votes.
    pub fn collapse(&mut self) {
        self.count = self.values.len() as u64;
        self.average = if self.values.is_empty() {
            0.0
        } else {
            let mean = self.values.iter().sum::<f64>() / self.values.len() as f64;
            (mean * 100.0).round() / 100.0
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    #[serde(default)]
    pub ratings: RatingSummary,
}

/// Aggregate document of a series, stored under `interactions:{slug}`.
///
/// Chapter numbers and episode ids are top-level keys next to the optional `stats` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesInteractions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<SeriesStats>,
    #[serde(flatten)]
    pub entries: BTreeMap<String, ChapterInteractions>,
}

impl SeriesInteractions {
    pub fn is_empty(&self) -> bool {
        self.stats.is_none() && self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ChapterInteractions> {
        self.entries.get(key)
    }

    pub fn entry(&mut self, key: &str) -> &mut ChapterInteractions {
        self.entries.entry(key.to_string()).or_insert_with(|| ChapterInteractions::for_key(key))
    }

    pub fn ratings(&self) -> Option<&RatingSummary> {
        self.stats.as_ref().map(|stats| &stats.ratings)
    }

    pub fn ratings_mut(&mut self) -> &mut RatingSummary {
        &mut self.stats.get_or_insert_with(SeriesStats::default).ratings
    }
}

pub const AGGREGATE_PREFIX: &str = "interactions:";
pub const LOG_PREFIX: &str = "log:";

/// Storage key of a series aggregate.
pub fn aggregate_key(series_slug: &str) -> String {
    format!("{AGGREGATE_PREFIX}{series_slug}")
}
