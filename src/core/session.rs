use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::message::Message;

/// One persisted conversation thread.
///
/// A session is created in memory and saved immediately; from then on every
/// mutation goes through [`crate::core::manager::ChatManager`], which persists
/// before reporting success. `messages` is append-only — the only in-place
/// mutation is the trailing assistant message growing while a reply streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub title: String,
    pub messages: Vec<Message>,
    pub model: String,
    /// Backing file, resolved at first save and stable thereafter. Never
    /// serialized; `load_all` re-derives it from the file a session came from.
    #[serde(skip)]
    pub storage_location: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(title: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            messages: Vec::new(),
            model: model.into(),
            storage_location: None,
            created_at: Utc::now(),
        }
    }
}
