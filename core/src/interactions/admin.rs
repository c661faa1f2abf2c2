//! Comment moderation over the series aggregates.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::kv::{KvStore, get_json, put_json};

use super::ingest::RequestError;
use super::model::{AGGREGATE_PREFIX, Comment, SeriesInteractions, aggregate_key};

type RequestResult<T> = std::result::Result<T, RequestError>;

/// A comment with the series and chapter it was posted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminComment {
    pub series_slug: String,
    pub chapter_number: String,
    #[serde(flatten)]
    pub comment: Comment,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteComment {
    #[serde(default)]
    pub series_slug: String,
    #[serde(default)]
    pub chapter_number: String,
    #[serde(default)]
    pub comment_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDeletion {
    pub series_slug: String,
    pub comment_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub series: usize,
    pub deleted: usize,
    /// Series named in the batch that have no aggregate.
    pub missing: Vec<String>,
}

/// Every comment across all series, newest first.
pub fn list_comments(aggregates: &dyn KvStore) -> RequestResult<Vec<AdminComment>> {
    let mut all = Vec::new();
    for key in aggregates.list(AGGREGATE_PREFIX)? {
        let Some(doc) = get_json::<SeriesInteractions>(aggregates, &key)? else {
            continue;
        };
        let series_slug = key.trim_start_matches(AGGREGATE_PREFIX).to_string();
        for (chapter, state) in &doc.entries {
            all.extend(state.comments().iter().map(|comment| AdminComment {
                series_slug: series_slug.clone(),
                chapter_number: chapter.clone(),
                comment: comment.clone(),
            }));
        }
    }
    all.sort_by(|a, b| b.comment.timestamp.cmp(&a.comment.timestamp));
    Ok(all)
}

/// Remove one comment from one chapter.
pub fn delete_comment(aggregates: &dyn KvStore, request: &DeleteComment) -> RequestResult<()> {
    if request.series_slug.is_empty() || request.chapter_number.is_empty() || request.comment_id.is_empty() {
        return Err(RequestError::Invalid("missing fields"));
    }
    let key = aggregate_key(&request.series_slug);
    let mut doc: SeriesInteractions = get_json(aggregates, &key)?
        .ok_or_else(|| RequestError::NotFound(format!("series {}", request.series_slug)))?;
    let chapter = doc
        .entries
        .get_mut(&request.chapter_number)
        .filter(|state| state.comments.is_some())
        .ok_or_else(|| RequestError::NotFound(format!("chapter {}", request.chapter_number)))?;

    if chapter.retain_comments(|comment| comment.id != request.comment_id) == 0 {
        return Err(RequestError::NotFound(format!("comment {}", request.comment_id)));
    }
    put_json(aggregates, &key, &doc, None)?;
    info!(
        target: "interactions::admin",
        series = %request.series_slug,
        chapter = %request.chapter_number,
        id = %request.comment_id,
        "comment deleted"
    );
    Ok(())
}

/// Remove comments by id from every chapter of their series.
pub fn batch_delete(aggregates: &dyn KvStore, deletions: &[BatchDeletion]) -> RequestResult<BatchReport> {
    let mut by_series: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
    for deletion in deletions {
        by_series.entry(deletion.series_slug.as_str()).or_default().insert(deletion.comment_id.as_str());
    }

    let mut report = BatchReport::default();
    for (slug, ids) in by_series {
        let key = aggregate_key(slug);
        let Some(mut doc) = get_json::<SeriesInteractions>(aggregates, &key)? else {
            warn!(target: "interactions::admin", series = %slug, "no aggregate for batch deletion");
            report.missing.push(slug.to_string());
            continue;
        };
        let deleted: usize = doc
            .entries
            .values_mut()
            .map(|state| state.retain_comments(|comment| !ids.contains(comment.id.as_str())))
            .sum();
        put_json(aggregates, &key, &doc, None)?;
        info!(target: "interactions::admin", series = %slug, deleted, "batch deletion applied");
        report.series += 1;
        report.deleted += deleted;
    }
    Ok(report)
}
