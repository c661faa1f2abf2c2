//! Edge endpoints writing action logs and reading series aggregates.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::kv::{KvStore, get_json};

use super::model::{Action, LOG_PREFIX, SeriesInteractions, aggregate_key};
use super::queue::ActionSink;
use super::{Result, now_ms};

/// Failure of an edge request, mapped to an HTTP status by the caller.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("invalid request: {0}")]
    Invalid(&'static str),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl RequestError {
    pub fn status(&self) -> u16 {
        match self {
            RequestError::Invalid(_) => 400,
            RequestError::NotFound(_) => 404,
            RequestError::Storage(_) => 500,
        }
    }
}

/// Body of a log request. Action entries are stored as received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogActionRequest {
    #[serde(default)]
    pub series_slug: String,
    #[serde(default)]
    pub actions: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogActionResponse {
    pub success: bool,
    pub logged: usize,
}

/// Parse a raw request body and log it.
pub fn log_action_body(logs: &dyn KvStore, body: &str) -> std::result::Result<LogActionResponse, RequestError> {
    let request: LogActionRequest =
        serde_json::from_str(body).map_err(|_| RequestError::Invalid("malformed body"))?;
    log_action(logs, &request)
}

/// Write the actions under a fresh `log:{slug}:{millis}-{random}` key, without reading first.
pub fn log_action(
    logs: &dyn KvStore,
    request: &LogActionRequest,
) -> std::result::Result<LogActionResponse, RequestError> {
    if request.series_slug.trim().is_empty() {
        return Err(RequestError::Invalid("missing seriesSlug"));
    }
    // The slug is one `:`-separated segment of the log key.
    if request.series_slug.contains(':') {
        return Err(RequestError::Invalid("seriesSlug must not contain ':'"));
    }
    if request.actions.is_empty() {
        return Err(RequestError::Invalid("no actions"));
    }

    let key = log_key(&request.series_slug, now_ms());
    let raw = serde_json::to_string(&request.actions).map_err(anyhow::Error::from)?;
    logs.put(&key, &raw, None)?;
    debug!(target: "interactions::ingest", key = %key, count = request.actions.len(), "actions logged");
    Ok(LogActionResponse { success: true, logged: request.actions.len() })
}

pub fn log_key(series_slug: &str, millis: u64) -> String {
    format!("{LOG_PREFIX}{series_slug}:{millis}-{}", super::random_base36(9))
}

/// Aggregate of a series, or an empty document when nothing was aggregated yet.
pub fn series_stats(
    aggregates: &dyn KvStore,
    series_slug: &str,
) -> std::result::Result<SeriesInteractions, RequestError> {
    if series_slug.trim().is_empty() {
        return Err(RequestError::Invalid("missing slug"));
    }
    Ok(get_json(aggregates, &aggregate_key(series_slug))?.unwrap_or_default())
}

/// Sink that logs flushed actions straight into a log store.
#[derive(Debug, Clone, Copy)]
pub struct KvLogSink<'a> {
    logs: &'a dyn KvStore,
}

impl<'a> KvLogSink<'a> {
    pub fn new(logs: &'a dyn KvStore) -> Self {
        Self { logs }
    }
}

impl ActionSink for KvLogSink<'_> {
    fn send(&self, series_slug: &str, actions: &[Action]) -> Result<()> {
        let actions =
            actions.iter().map(serde_json::to_value).collect::<std::result::Result<Vec<_>, _>>()?;
        let request = LogActionRequest { series_slug: series_slug.to_string(), actions };
        log_action(self.logs, &request)?;
        Ok(())
    }
}
