//! Persisted session identifiers.
//!
//! The only state that survives a reload: three opaque identifiers. Message
//! bodies are deliberately never persisted — local storage resumes an
//! identity, it is not a source of truth for the transcript.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use switchboard_protocol::HandoffStatus;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff_id: Option<String>,
    /// Mirror of the last known server status, not authoritative
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<HandoffStatus>,
}

impl SessionRecord {
    pub fn is_empty(&self) -> bool {
        self.conversation_id.is_none() && self.handoff_id.is_none()
    }
}

/// Where the session record lives between reloads
pub trait SessionStore {
    fn load(&self) -> Option<SessionRecord>;
    fn save(&mut self, record: &SessionRecord);
    fn clear(&mut self);
}

/// In-memory store, for tests and embedded use
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Option<SessionRecord>,
}

impl SessionStore for MemoryStore {
    fn load(&self) -> Option<SessionRecord> {
        self.record.clone()
    }

    fn save(&mut self, record: &SessionRecord) {
        self.record = Some(record.clone());
    }

    fn clear(&mut self) {
        self.record = None;
    }
}

/// JSON file-backed store — the localStorage analog for native embedders.
/// IO failures are logged and swallowed; losing the record only costs the
/// customer a fresh conversation, never a crash.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default location under the user's home directory
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| "/tmp".into())
            .join(".switchboard")
            .join("widget-session.json")
    }
}

impl SessionStore for FileStore {
    fn load(&self) -> Option<SessionRecord> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    component = "widget",
                    event = "session.load_failed",
                    error = %e,
                    "Discarding unreadable session record"
                );
                None
            }
        }
    }

    fn save(&mut self, record: &SessionRecord) {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string(record).unwrap_or_default();
            std::fs::write(&self.path, json)
        };
        if let Err(e) = write() {
            warn!(
                component = "widget",
                event = "session.save_failed",
                error = %e,
                "Failed to persist session record"
            );
        }
    }

    fn clear(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(
                    component = "widget",
                    event = "session.clear_failed",
                    error = %e,
                    "Failed to remove session record"
                );
            }
        }
    }
}
