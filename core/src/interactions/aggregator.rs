//! Batch job folding action logs into per-series aggregates.

use std::collections::BTreeMap;

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::kv::{KvStore, get_json, put_json};

use super::Result;
use super::client::{MAX_RATING, MIN_RATING};
use super::model::{Action, LOG_PREFIX, SeriesInteractions, aggregate_key, is_episode_key};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReport {
    pub series: usize,
    pub logs: usize,
    pub actions: usize,
    /// Entries that were not valid actions and were dropped.
    pub skipped: usize,
}

/// Replay every pending log into its series aggregate, then delete the consumed logs.
///
/// Logs are replayed in listing order, not by timestamp. Each series document is overwritten as
/// a whole; an error aborts the run but leaves already written series in place.
pub fn process_logs(logs: &dyn KvStore, aggregates: &dyn KvStore) -> Result<ProcessReport> {
    let keys = logs.list(LOG_PREFIX)?;
    let mut report = ProcessReport::default();
    if keys.is_empty() {
        debug!(target: "interactions::aggregator", "no logs to process");
        return Ok(report);
    }

    let mut by_series: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for key in keys {
        if let Some(slug) = key.split(':').nth(1) {
            by_series.entry(slug.to_string()).or_default().push(key);
        }
    }

    for (slug, log_keys) in by_series {
        let aggregate = aggregate_key(&slug);
        let mut doc: SeriesInteractions = get_json(aggregates, &aggregate)?.unwrap_or_default();
        let mut rated = false;

        for log_key in &log_keys {
            let Some(raw) = logs.get(log_key)? else {
                continue;
            };
            let entries: Vec<Value> =
                serde_json::from_str(&raw).with_context(|| format!("parsing log {log_key}"))?;
            for entry in entries {
                match serde_json::from_value::<Action>(entry) {
                    Ok(action) => {
                        rated |= action.is_rate();
                        apply(&mut doc, &action);
                        report.actions += 1;
                    }
                    Err(err) => {
                        warn!(target: "interactions::aggregator", log = %log_key, error = %err, "skipping malformed action");
                        report.skipped += 1;
                    }
                }
            }
        }

        if rated {
            doc.ratings_mut().collapse();
        }
        put_json(aggregates, &aggregate, &doc, None)?;
        for log_key in &log_keys {
            logs.delete(log_key)?;
        }

        info!(target: "interactions::aggregator", series = %slug, logs = log_keys.len(), "aggregate updated");
        report.series += 1;
        report.logs += log_keys.len();
    }

    info!(
        target: "interactions::aggregator",
        series = report.series,
        actions = report.actions,
        skipped = report.skipped,
        "log processing finished"
    );
    Ok(report)
}

/// Fold one action into a series document.
///
/// Likes saturate at zero. Comment actions on episodes and on unknown comment ids are no-ops, and
/// ratings are only collected here; [`RatingSummary::collapse`](super::model::RatingSummary::collapse)
/// turns them into the published average.
pub fn apply(doc: &mut SeriesInteractions, action: &Action) {
    match action {
        Action::Rate { value } => {
            if value.is_finite() && (MIN_RATING..=MAX_RATING).contains(value) {
                doc.ratings_mut().push(*value);
            }
        }
        Action::Like { chapter } => {
            let entry = doc.entry(chapter);
            entry.likes = entry.likes.saturating_add(1);
        }
        Action::Unlike { chapter } => {
            let entry = doc.entry(chapter);
            entry.likes = entry.likes.saturating_sub(1);
        }
        Action::AddComment { chapter, payload } => {
            let entry = doc.entry(chapter);
            if is_episode_key(chapter) {
                return;
            }
            let comments = entry.comments.get_or_insert_with(Vec::new);
            if !comments.iter().any(|existing| existing.id == payload.id) {
                comments.push(payload.clone());
            }
        }
        Action::LikeComment { chapter, payload } => {
            let entry = doc.entry(chapter);
            if is_episode_key(chapter) {
                return;
            }
            if let Some(comment) = entry.comment_mut(&payload.comment_id) {
                comment.likes = comment.likes.saturating_add(1);
            }
        }
        Action::UnlikeComment { chapter, payload } => {
            let entry = doc.entry(chapter);
            if is_episode_key(chapter) {
                return;
            }
            if let Some(comment) = entry.comment_mut(&payload.comment_id) {
                comment.likes = comment.likes.saturating_sub(1);
            }
        }
    }
}
