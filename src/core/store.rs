//! One-file-per-chat persistence under a caller-supplied storage root.
//!
//! This layer owns no concurrency control; [`crate::core::manager::ChatManager`]
//! serializes all calls. Saves go through a temp file in the same directory
//! followed by an atomic rename, so a concurrent reader never observes a
//! partially written chat file.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::core::session::ChatSession;

/// Errors from reading or writing chat files.
#[derive(Debug)]
pub enum StoreError {
    /// A directory or file operation failed.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A session could not be encoded for its backing file.
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Delete was called on a session that has never been saved.
    NotPersisted,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io { path, source } => {
                write!(f, "chat storage I/O failed at {}: {}", path.display(), source)
            }
            StoreError::Serialize { path, source } => {
                write!(f, "failed to encode chat for {}: {}", path.display(), source)
            }
            StoreError::NotPersisted => {
                write!(f, "chat has no backing file yet")
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            StoreError::Serialize { source, .. } => Some(source),
            StoreError::NotPersisted => None,
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Create the storage root (and parents) if absent. Idempotent.
pub fn ensure_storage_ready(root: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(root).map_err(io_error(root))
}

fn backing_file(root: &Path, session: &ChatSession) -> PathBuf {
    root.join(format!("chat_{}.json", session.id))
}

/// Serialize the session's full current state to its backing file.
///
/// The storage location is computed and cached on first save; later saves
/// reuse it unchanged. The write replaces any previous file atomically.
pub fn save(root: &Path, session: &mut ChatSession) -> Result<(), StoreError> {
    ensure_storage_ready(root)?;

    if session.storage_location.is_none() {
        session.storage_location = Some(backing_file(root, session));
    }
    let path = session
        .storage_location
        .clone()
        .ok_or(StoreError::NotPersisted)?;

    let contents = serde_json::to_vec_pretty(session).map_err(|source| StoreError::Serialize {
        path: path.clone(),
        source,
    })?;

    let dir = path.parent().unwrap_or(root);
    let mut temp_file = NamedTempFile::new_in(dir).map_err(io_error(&path))?;
    temp_file.write_all(&contents).map_err(io_error(&path))?;
    temp_file.as_file_mut().sync_all().map_err(io_error(&path))?;
    temp_file.persist(&path).map_err(|err| StoreError::Io {
        path: path.clone(),
        source: err.error,
    })?;

    Ok(())
}

/// Load every decodable chat file directly under the root.
///
/// Files that cannot be read or decoded are skipped with a warning; a stale
/// or truncated file should not take the whole chat list down with it. The
/// only hard failure is the directory listing itself.
pub fn load_all(root: &Path) -> Result<HashMap<String, ChatSession>, StoreError> {
    ensure_storage_ready(root)?;

    let entries = fs::read_dir(root).map_err(io_error(root))?;
    let mut chats = HashMap::new();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(root = %root.display(), error = %err, "skipping unreadable dir entry");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "skipping unreadable chat file");
                continue;
            }
        };

        match serde_json::from_slice::<ChatSession>(&data) {
            Ok(mut session) => {
                session.storage_location = Some(path);
                chats.insert(session.id.to_string(), session);
            }
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "skipping undecodable chat file");
            }
        }
    }

    Ok(chats)
}

/// Remove the session's backing file.
pub fn delete(session: &ChatSession) -> Result<(), StoreError> {
    let path = session
        .storage_location
        .as_ref()
        .ok_or(StoreError::NotPersisted)?;

    fs::remove_file(path).map_err(io_error(path))
}
