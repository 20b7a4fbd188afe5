//! Wire payloads for the inference server's HTTP API.
//!
//! The chat endpoint streams newline-delimited JSON; each line decodes into
//! a [`StreamFragment`]. Decoding is strict on shape — a line that is not
//! valid JSON for this schema is a protocol error for the whole exchange,
//! not something to paper over by poking at an untyped map.

use serde::{Deserialize, Serialize};

/// One `(role, content)` pair as sent to the chat endpoint.
#[derive(Serialize, Clone, Debug)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Request body for `POST /api/chat`.
#[derive(Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

/// The message part of a streamed fragment.
#[derive(Deserialize, Debug)]
pub struct FragmentMessage {
    pub role: String,
    pub content: String,
}

/// One line of the streamed chat response.
///
/// Every record carries `done`; the final record sets it and may omit the
/// message. Intermediate records carry the next slice of assistant text.
#[derive(Deserialize, Debug)]
pub struct StreamFragment {
    #[serde(default)]
    pub message: Option<FragmentMessage>,
    pub done: bool,
}

/// One locally available model as reported by `GET /api/tags`.
#[derive(Deserialize, Clone, Debug)]
pub struct ModelEntry {
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Response body for `GET /api/tags`.
#[derive(Deserialize, Debug)]
pub struct ModelsResponse {
    pub models: Vec<ModelEntry>,
}

pub mod models;
