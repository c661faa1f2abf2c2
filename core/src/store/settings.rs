//! Persisted reader settings.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::types::ReaderSettings;

use super::{ClientStorage, Result, write_json};

/// Storage key of the settings blob.
pub const SETTINGS_KEY: &str = "bigsolo_reader_settings_v6";

/// Reader settings bound to their storage. Every mutation is written through.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    storage: Arc<dyn ClientStorage>,
    settings: ReaderSettings,
}

impl SettingsStore {
    /// Load settings, falling back to defaults for anything missing or invalid.
    pub fn load(storage: Arc<dyn ClientStorage>) -> Self {
        let settings = match storage.get(SETTINGS_KEY) {
            Ok(Some(raw)) => merge_onto_defaults(&raw),
            Ok(None) => ReaderSettings::default(),
            Err(err) => {
                debug!(target: "store::settings", error = %err, "settings unreadable, using defaults");
                ReaderSettings::default()
            }
        };
        Self { storage, settings }
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    pub fn save(&self) -> Result<()> {
        write_json(self.storage.as_ref(), SETTINGS_KEY, &self.settings)
    }

    /// Apply a change and persist the whole object.
    pub fn update(&mut self, change: impl FnOnce(&mut ReaderSettings)) -> Result<&ReaderSettings> {
        change(&mut self.settings);
        self.save()?;
        Ok(&self.settings)
    }

    pub fn replace(&mut self, settings: ReaderSettings) -> Result<()> {
        self.settings = settings;
        self.save()
    }
}

/// Shallow field-by-field merge of a persisted blob onto the defaults.
///
/// Fields the defaults do not know are dropped, and a field whose value does not fit keeps its
/// default. A blob that is not a JSON object yields the defaults.
fn merge_onto_defaults(raw: &str) -> ReaderSettings {
    let defaults = ReaderSettings::default();
    let persisted = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            debug!(target: "store::settings", "discarding malformed settings blob");
            return defaults;
        }
    };
    let Ok(Value::Object(mut merged)) = serde_json::to_value(&defaults) else {
        return defaults;
    };

    for (field, value) in persisted {
        if !merged.contains_key(&field) {
            continue;
        }
        let mut candidate: Map<String, Value> = merged.clone();
        candidate.insert(field.clone(), value);
        if serde_json::from_value::<ReaderSettings>(Value::Object(candidate.clone())).is_ok() {
            merged = candidate;
        } else {
            debug!(target: "store::settings", field = %field, "ignoring invalid setting");
        }
    }

    serde_json::from_value(Value::Object(merged)).unwrap_or(defaults)
}
