//! Terminal UI layer for interactive chat sessions.
//!
//! - [`chat_loop`]: the interaction loop that dispatches user intents to
//!   [`crate::core`] and coordinates streaming via
//!   [`crate::core::chat_stream`].
//! - [`renderer`]: view composition for the sidebar, transcript, input, and
//!   overlays.
//!
//! Ownership boundary: this layer presents and captures interaction state,
//! while [`crate::core`] owns chat content and backend coordination.

pub mod chat_loop;
pub mod renderer;
