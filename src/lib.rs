//! Confab is a full-screen terminal chat client for local LLM inference
//! servers, with one persisted conversation thread per chat and streamed
//! assistant replies.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns chat sessions, their one-file-per-chat persistence, the
//!   locked in-memory index, and streaming orchestration.
//! - [`ui`] renders the terminal interface and runs the interactive event
//!   loop that drives user input and display updates.
//! - [`api`] defines the wire payloads and the model-listing client used
//!   against the inference server.
//! - [`cli`] parses arguments and configuration and dispatches into
//!   [`ui::chat_loop`] for interactive sessions.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod ui;
pub mod utils;
