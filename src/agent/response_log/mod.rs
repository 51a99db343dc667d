use crate::utils::atomic_write;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

/// Write-only log of raw model responses, kept as one JSON array on disk.
///
/// Failures are logged and swallowed: losing a log entry never fails a turn.
pub struct ResponseLog {
    path: Option<PathBuf>,
    entries: Mutex<Vec<Value>>,
}

impl ResponseLog {
    /// Open the log at `path`, keeping whatever entries are already there.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if !content.trim().is_empty() => {
                serde_json::from_str::<Vec<Value>>(&content).unwrap_or_else(|e| {
                    warn!(
                        "response log {} is not a JSON array ({}), starting a new one",
                        path.display(),
                        e
                    );
                    Vec::new()
                })
            }
            _ => Vec::new(),
        };
        Self {
            path: Some(path),
            entries: Mutex::new(entries),
        }
    }

    /// A log that keeps nothing on disk.
    pub fn disabled() -> Self {
        Self {
            path: None,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, response: &Value) {
        let Ok(mut entries) = self.entries.lock() else {
            warn!("response log lock poisoned, dropping entry");
            return;
        };
        entries.push(response.clone());
        let Some(path) = &self.path else {
            return;
        };
        let json = match serde_json::to_string_pretty(&*entries) {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to serialize response log: {}", e);
                return;
            }
        };
        if let Err(e) = atomic_write(path, &json) {
            warn!("failed to write response log {}: {:#}", path.display(), e);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |e| e.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
