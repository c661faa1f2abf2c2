//! Optimistic display state: server aggregates plus what this client has not seen confirmed yet.

use std::collections::HashSet;

use serde::Serialize;

use super::client::LocalInteractionState;
use super::model::{ChapterInteractions, Comment, RatingSummary};

/// `server + delta`, never below zero.
pub fn effective(server: u64, delta: i64) -> u64 {
    if delta >= 0 {
        server.saturating_add(delta as u64)
    } else {
        server.saturating_sub(delta.unsigned_abs())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub display_likes: u64,
    pub liked: bool,
    /// Written by this client and not yet part of the server aggregate.
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterView {
    pub likes: u64,
    pub liked: bool,
    /// Newest first.
    pub comments: Vec<CommentView>,
    pub comment_count: usize,
    /// One pending comment per chapter at most.
    pub can_comment: bool,
}

/// Merge a chapter's server state with the local optimistic state.
///
/// Pending comments already present on the server are shown once, from the server copy.
pub fn chapter_view(server: Option<&ChapterInteractions>, local: &LocalInteractionState) -> ChapterView {
    let server_comments = server.map(ChapterInteractions::comments).unwrap_or_default();
    let server_ids: HashSet<&str> = server_comments.iter().map(|c| c.id.as_str()).collect();
    let liked_comments: HashSet<&str> = local.liked_comments.iter().map(String::as_str).collect();

    let pending = local
        .pending_comments
        .iter()
        .filter(|comment| !server_ids.contains(comment.id.as_str()))
        .map(|comment| (comment, true));
    let confirmed = server_comments.iter().map(|comment| (comment, false));

    let mut comments: Vec<CommentView> = pending
        .chain(confirmed)
        .map(|(comment, pending)| {
            let liked = liked_comments.contains(comment.id.as_str());
            let base = if pending { 0 } else { comment.likes };
            CommentView {
                comment: comment.clone(),
                display_likes: effective(base, liked as i64),
                liked,
                pending,
            }
        })
        .collect();
    comments.sort_by(|a, b| b.comment.timestamp.cmp(&a.comment.timestamp));

    let server_likes = server.map(|s| s.likes).unwrap_or(0);
    ChapterView {
        likes: effective(server_likes, local.liked as i64),
        liked: local.liked,
        comment_count: comments.len(),
        comments,
        can_comment: local.pending_comments.is_empty(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingView {
    /// Rounded to one decimal.
    pub average: f64,
    pub votes: u64,
    pub user_rating: Option<f64>,
}

/// Combine the server rating with this client's own vote.
pub fn rating_view(server: Option<&RatingSummary>, user_rating: Option<f64>) -> RatingView {
    let (server_average, server_count) = server.map(|r| (r.average, r.count)).unwrap_or((0.0, 0));
    let votes = effective(server_count, user_rating.is_some() as i64);
    let total = server_average * server_count as f64 + user_rating.unwrap_or(0.0);
    let average = if votes > 0 { total / votes as f64 } else { 0.0 };
    RatingView { average: (average * 10.0).round() / 10.0, votes, user_rating }
}
