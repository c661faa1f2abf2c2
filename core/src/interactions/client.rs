//! Interactions as seen from one reader's browser: local state, identity, ratings, and the queue.

use std::sync::Arc;

use hashlink::LruCache;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::{ClientStorage, read_json, write_json};

use super::model::{Action, Comment, CommentRef, SeriesInteractions, is_episode_key};
use super::overlay::{ChapterView, RatingView, chapter_view, rating_view};
use super::queue::{ActionQueue, ActionSink, FlushReport, PageExit};
use super::{Result, random_base36};

pub const RATING_KEY_PREFIX: &str = "series_rating_";
pub const ANONYMOUS_USERNAME: &str = "Visiteur Anonyme";
pub const ANONYMOUS_AVATAR: &str = "/img/profil.png";
pub const AVATAR_DIR: &str = "/img/profilpicture";
pub const MIN_RATING: f64 = 1.0;
pub const MAX_RATING: f64 = 10.0;

const STATS_CACHE_CAPACITY: usize = 32;

/// Local storage key of a chapter's or episode's optimistic state.
pub fn interaction_key(series_slug: &str, target: &str) -> String {
    format!("interactions_{series_slug}_{target}")
}

fn identity_key(interaction_key: &str) -> String {
    format!("identity_{interaction_key}")
}

fn rating_key(series_slug: &str) -> String {
    format!("{RATING_KEY_PREFIX}{series_slug}")
}

/// What this client did on one chapter or episode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalInteractionState {
    pub liked: bool,
    pub liked_comments: Vec<String>,
    pub pending_comments: Vec<Comment>,
    pub has_commented: bool,
}

/// Commenter identity, fixed per chapter once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub username: String,
    pub avatar_url: String,
}

impl Identity {
    /// `Cool_Cat.png` becomes "Cool Cat" with the matching avatar URL.
    pub fn from_avatar(file_name: &str) -> Self {
        let username = file_name.replacen(".jpg", "", 1).replacen(".png", "", 1).replace('_', " ");
        Self { username, avatar_url: format!("{AVATAR_DIR}/{file_name}") }
    }

    pub fn anonymous() -> Self {
        Self { username: ANONYMOUS_USERNAME.to_string(), avatar_url: ANONYMOUS_AVATAR.to_string() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InteractionError {
    #[error("comment is empty")]
    EmptyComment,
    #[error("only one comment per chapter is allowed")]
    CommentPending,
    #[error("comments are disabled for {0}")]
    CommentsDisabled(String),
    #[error("rating {0} is outside 1-10")]
    InvalidRating(f64),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Client-side interaction layer over a browser-like storage.
#[derive(Debug)]
pub struct InteractionClient {
    storage: Arc<dyn ClientStorage>,
    queue: ActionQueue,
    avatars: Vec<String>,
    stats_cache: Mutex<LruCache<String, SeriesInteractions>>,
}

impl InteractionClient {
    /// `avatars` lists avatar file names; an empty list means every commenter is anonymous.
    pub fn new(storage: Arc<dyn ClientStorage>, avatars: Vec<String>) -> Self {
        Self {
            queue: ActionQueue::new(storage.clone()),
            storage,
            avatars,
            stats_cache: Mutex::new(LruCache::new(STATS_CACHE_CAPACITY)),
        }
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    pub fn local_state(&self, series_slug: &str, target: &str) -> LocalInteractionState {
        read_json(self.storage.as_ref(), &interaction_key(series_slug, target)).unwrap_or_default()
    }

    fn save_local_state(&self, series_slug: &str, target: &str, state: &LocalInteractionState) -> Result<()> {
        write_json(self.storage.as_ref(), &interaction_key(series_slug, target), state)
    }

    /// Toggle the like of a chapter or episode. Returns the new liked state.
    pub fn toggle_like(&self, series_slug: &str, target: &str) -> Result<bool> {
        let mut state = self.local_state(series_slug, target);
        state.liked = !state.liked;
        self.save_local_state(series_slug, target, &state)?;

        let chapter = target.to_string();
        let action = if state.liked { Action::Like { chapter } } else { Action::Unlike { chapter } };
        self.queue.push(series_slug, action)?;
        Ok(state.liked)
    }

    /// Toggle the like of a comment. Returns the new liked state.
    pub fn toggle_comment_like(&self, series_slug: &str, chapter: &str, comment_id: &str) -> Result<bool> {
        let mut state = self.local_state(series_slug, chapter);
        let was_liked = state.liked_comments.iter().any(|id| id == comment_id);
        if was_liked {
            state.liked_comments.retain(|id| id != comment_id);
        } else {
            state.liked_comments.push(comment_id.to_string());
        }
        self.save_local_state(series_slug, chapter, &state)?;

        let payload = CommentRef { comment_id: comment_id.to_string() };
        let chapter = chapter.to_string();
        let action = if was_liked {
            Action::UnlikeComment { chapter, payload }
        } else {
            Action::LikeComment { chapter, payload }
        };
        self.queue.push(series_slug, action)?;
        Ok(!was_liked)
    }

    /// Identity used for comments on this chapter, assigned on first use.
    ///
    /// The anonymous fallback is not persisted, so a later call can still pick an avatar.
    pub fn identity(&self, series_slug: &str, chapter: &str) -> Result<Identity> {
        let key = identity_key(&interaction_key(series_slug, chapter));
        if let Some(existing) = read_json::<Identity>(self.storage.as_ref(), &key) {
            return Ok(existing);
        }
        let Some(avatar) = self.avatars.choose(&mut rand::thread_rng()) else {
            return Ok(Identity::anonymous());
        };
        let identity = Identity::from_avatar(avatar);
        write_json(self.storage.as_ref(), &key, &identity)?;
        Ok(identity)
    }

    /// Add a comment optimistically and queue it for the server.
    pub fn submit_comment(
        &self,
        series_slug: &str,
        chapter: &str,
        text: &str,
        now_ms: i64,
    ) -> std::result::Result<Comment, InteractionError> {
        if is_episode_key(chapter) {
            return Err(InteractionError::CommentsDisabled(chapter.to_string()));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(InteractionError::EmptyComment);
        }
        let mut state = self.local_state(series_slug, chapter);
        if !state.pending_comments.is_empty() {
            return Err(InteractionError::CommentPending);
        }

        let identity = self.identity(series_slug, chapter)?;
        let comment = Comment {
            id: format!("{now_ms}_{}", random_base36(6)),
            username: identity.username,
            avatar_url: identity.avatar_url,
            comment: text.to_string(),
            timestamp: now_ms,
            likes: 0,
        };
        state.pending_comments.push(comment.clone());
        state.has_commented = true;
        self.save_local_state(series_slug, chapter, &state)?;
        self.queue.push(
            series_slug,
            Action::AddComment { chapter: chapter.to_string(), payload: comment.clone() },
        )?;
        debug!(target: "interactions::client", series = %series_slug, chapter, id = %comment.id, "comment queued");
        Ok(comment)
    }

    pub fn local_rating(&self, series_slug: &str) -> Option<f64> {
        match self.storage.get(&rating_key(series_slug)) {
            Ok(value) => value.and_then(|raw| raw.trim().parse::<f64>().ok()).filter(|v| v.is_finite()),
            Err(err) => {
                debug!(target: "interactions::client", error = %err, "rating unreadable");
                None
            }
        }
    }

    /// Store the local rating and make it the only queued rating of the series.
    pub fn set_rating(&self, series_slug: &str, value: f64) -> std::result::Result<(), InteractionError> {
        if !(MIN_RATING..=MAX_RATING).contains(&value) {
            return Err(InteractionError::InvalidRating(value));
        }
        self.storage.set(&rating_key(series_slug), &value.to_string())?;
        self.queue.replace_rating(series_slug, Some(value))?;
        Ok(())
    }

    pub fn remove_rating(&self, series_slug: &str) -> Result<()> {
        self.storage.remove(&rating_key(series_slug))?;
        self.queue.replace_rating(series_slug, None)
    }

    pub fn chapter_view(&self, series_slug: &str, target: &str, stats: &SeriesInteractions) -> ChapterView {
        chapter_view(stats.get(target), &self.local_state(series_slug, target))
    }

    pub fn rating_view(&self, series_slug: &str, stats: &SeriesInteractions) -> RatingView {
        rating_view(stats.ratings(), self.local_rating(series_slug))
    }

    /// Series stats, fetched once per slug and kept in a small LRU.
    ///
    /// A failed fetch yields empty stats and is not cached.
    pub fn series_stats<F>(&self, series_slug: &str, fetch: F) -> SeriesInteractions
    where
        F: FnOnce(&str) -> Result<SeriesInteractions>,
    {
        if let Some(cached) = self.stats_cache.lock().get(series_slug) {
            return cached.clone();
        }
        match fetch(series_slug) {
            Ok(stats) => {
                self.stats_cache.lock().insert(series_slug.to_string(), stats.clone());
                stats
            }
            Err(err) => {
                warn!(target: "interactions::client", series = %series_slug, error = %err, "stats fetch failed");
                SeriesInteractions::default()
            }
        }
    }

    pub fn forget_stats(&self, series_slug: &str) {
        self.stats_cache.lock().remove(series_slug);
    }

    pub fn flush(&self, exit: PageExit, sink: &dyn ActionSink) -> Result<FlushReport> {
        self.queue.flush(exit, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interactions::model::ChapterInteractions;
    use crate::store::MemoryStorage;

    fn client(avatars: &[&str]) -> InteractionClient {
        InteractionClient::new(
            Arc::new(MemoryStorage::new()),
            avatars.iter().map(|a| a.to_string()).collect(),
        )
    }

    #[test]
    fn like_toggle_queues_like_then_unlike() -> Result<()> {
        let client = client(&[]);
        assert!(client.toggle_like("solo", "12")?);
        assert!(!client.toggle_like("solo", "12")?);
        assert_eq!(
            client.queue().pending_for("solo"),
            vec![
                Action::Like { chapter: "12".to_string() },
                Action::Unlike { chapter: "12".to_string() },
            ]
        );
        assert!(!client.local_state("solo", "12").liked);
        Ok(())
    }

    #[test]
    fn identity_is_assigned_once_per_chapter() -> Result<()> {
        let client = client(&["Cool_Cat.png", "Night_Owl.jpg"]);
        let first = client.identity("solo", "1")?;
        for _ in 0..10 {
            assert_eq!(client.identity("solo", "1")?, first);
        }
        assert!(first.avatar_url.starts_with("/img/profilpicture/"));
        assert!(!first.username.contains('_'));
        assert_eq!(Identity::from_avatar("Cool_Cat.png").username, "Cool Cat");
        Ok(())
    }

    #[test]
    fn without_avatars_commenters_are_anonymous() -> Result<()> {
        assert_eq!(client(&[]).identity("solo", "1")?, Identity::anonymous());
        Ok(())
    }

    #[test]
    fn only_one_pending_comment_per_chapter() {
        let client = client(&["Rin.png"]);
        let comment = client.submit_comment("solo", "3", "  great chapter ", 1_700_000_000_000).unwrap();
        assert_eq!(comment.comment, "great chapter");
        assert!(comment.id.starts_with("1700000000000_"));
        assert_eq!(comment.id.len(), "1700000000000_".len() + 6);
        assert_eq!(comment.username, "Rin");

        assert!(matches!(
            client.submit_comment("solo", "3", "again", 1_700_000_000_500),
            Err(InteractionError::CommentPending)
        ));
        assert!(matches!(client.submit_comment("solo", "4", "   ", 0), Err(InteractionError::EmptyComment)));
        assert!(matches!(
            client.submit_comment("solo", "ep-S1-1", "hi", 0),
            Err(InteractionError::CommentsDisabled(_))
        ));

        let state = client.local_state("solo", "3");
        assert!(state.has_commented);
        assert_eq!(state.pending_comments, vec![comment]);
    }

    #[test]
    fn ratings_are_validated_and_replace_each_other() -> Result<()> {
        let client = client(&[]);
        assert!(matches!(client.set_rating("solo", 11.0), Err(InteractionError::InvalidRating(_))));
        client.set_rating("solo", 7.0).unwrap();
        client.set_rating("solo", 9.0).unwrap();
        assert_eq!(client.local_rating("solo"), Some(9.0));
        assert_eq!(client.queue().pending_for("solo"), vec![Action::Rate { value: 9.0 }]);

        client.remove_rating("solo")?;
        assert_eq!(client.local_rating("solo"), None);
        assert!(client.queue().pending_for("solo").is_empty());
        Ok(())
    }

    #[test]
    fn chapter_view_overlays_local_like() -> Result<()> {
        let client = client(&[]);
        let mut stats = SeriesInteractions::default();
        stats.entries.insert("5".to_string(), ChapterInteractions { likes: 2, comments: Some(Vec::new()) });
        client.toggle_like("solo", "5")?;
        assert_eq!(client.chapter_view("solo", "5", &stats).likes, 3);
        Ok(())
    }

    #[test]
    fn stats_are_fetched_once_and_failures_are_not_cached() {
        let client = client(&[]);
        let empty = client.series_stats("solo", |_| Err(anyhow::anyhow!("503")));
        assert!(empty.is_empty());

        let mut calls = 0;
        for _ in 0..3 {
            client.series_stats("solo", |_| {
                calls += 1;
                let mut stats = SeriesInteractions::default();
                stats.entry("1").likes = 1;
                Ok(stats)
            });
        }
        assert_eq!(calls, 1);
        client.forget_stats("solo");
        assert_eq!(client.series_stats("solo", |_| Ok(SeriesInteractions::default())).entries.len(), 0);
    }
}
