//! Likes, comments, and ratings: the client queue, the log ingestion endpoint, the aggregator,
//! and moderation.

pub mod admin;
pub mod aggregator;
pub mod client;
pub mod ingest;
pub mod model;
pub mod overlay;
pub mod queue;

use rand::Rng;

pub use admin::{AdminComment, BatchDeletion, BatchReport, DeleteComment, batch_delete, delete_comment, list_comments};
pub use aggregator::{ProcessReport, process_logs};
pub use client::{Identity, InteractionClient, InteractionError, LocalInteractionState};
pub use ingest::{KvLogSink, LogActionRequest, LogActionResponse, RequestError, log_action, series_stats};
pub use model::{Action, ChapterInteractions, Comment, RatingSummary, SeriesInteractions};
pub use overlay::{ChapterView, CommentView, RatingView};
pub use queue::{ActionQueue, ActionSink, FlushReport, PageExit};

pub(crate) use crate::kv::now_ms;

pub type Result<T> = crate::Result<T>;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Random lowercase base-36 string used to make client and log ids unique.
pub(crate) fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char).collect()
}
