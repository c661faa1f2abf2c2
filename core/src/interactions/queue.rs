//! Client-side queue of actions waiting to be sent to the log endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::store::{ClientStorage, read_json, write_json};

use super::Result;
use super::model::Action;

/// Storage key of the queue blob: series slug → actions in the order they happened.
pub const ACTION_QUEUE_KEY: &str = "bigsolo_action_queue";

pub type QueuedActions = BTreeMap<String, Vec<Action>>;

/// How the page is being left when a flush is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageExit {
    /// Navigation to another page of the same site. The queue is kept for later.
    Internal,
    /// The page is hidden or unloaded.
    Leaving,
}

/// Destination of flushed actions.
pub trait ActionSink {
    fn send(&self, series_slug: &str, actions: &[Action]) -> Result<()>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    pub skipped: bool,
    pub sent: Vec<String>,
    /// Series whose send failed; their actions stay queued.
    pub failed: Vec<String>,
}

/// Persisted action queue. Every operation reads and writes the whole blob.
#[derive(Debug, Clone)]
pub struct ActionQueue {
    storage: Arc<dyn ClientStorage>,
}

impl ActionQueue {
    pub fn new(storage: Arc<dyn ClientStorage>) -> Self {
        Self { storage }
    }

    /// Current queue. A corrupt blob reads as empty.
    pub fn pending(&self) -> QueuedActions {
        read_json(self.storage.as_ref(), ACTION_QUEUE_KEY).unwrap_or_default()
    }

    pub fn pending_for(&self, series_slug: &str) -> Vec<Action> {
        self.pending().remove(series_slug).unwrap_or_default()
    }

    fn save(&self, queue: &QueuedActions) -> Result<()> {
        write_json(self.storage.as_ref(), ACTION_QUEUE_KEY, queue)
    }

    pub fn push(&self, series_slug: &str, action: Action) -> Result<()> {
        let mut queue = self.pending();
        queue.entry(series_slug.to_string()).or_default().push(action);
        self.save(&queue)
    }

    /// Drop queued ratings of the series and queue `value` instead, when given.
    pub fn replace_rating(&self, series_slug: &str, value: Option<f64>) -> Result<()> {
        let mut queue = self.pending();
        let actions = queue.entry(series_slug.to_string()).or_default();
        actions.retain(|action| !action.is_rate());
        if let Some(value) = value {
            actions.push(Action::Rate { value });
        }
        self.save(&queue)
    }

    /// Send every series' actions through `sink`, best effort.
    ///
    /// Sent series leave the queue; failed ones stay for the next session.
    pub fn flush(&self, exit: PageExit, sink: &dyn ActionSink) -> Result<FlushReport> {
        let mut report = FlushReport::default();
        if exit == PageExit::Internal {
            debug!(target: "interactions::queue", "internal navigation, keeping queue");
            report.skipped = true;
            return Ok(report);
        }

        let mut queue = self.pending();
        if queue.is_empty() {
            return Ok(report);
        }

        let slugs: Vec<String> = queue.keys().cloned().collect();
        for slug in slugs {
            let actions = queue.get(&slug).cloned().unwrap_or_default();
            if actions.is_empty() {
                queue.remove(&slug);
                continue;
            }
            match sink.send(&slug, &actions) {
                Ok(()) => {
                    debug!(target: "interactions::queue", series = %slug, count = actions.len(), "queue flushed");
                    queue.remove(&slug);
                    report.sent.push(slug);
                }
                Err(err) => {
                    warn!(target: "interactions::queue", series = %slug, error = %err, "flush failed, keeping actions");
                    report.failed.push(slug);
                }
            }
        }

        self.save(&queue)?;
        Ok(report)
    }
}
