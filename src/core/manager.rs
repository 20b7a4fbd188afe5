//! The chat index: sole owner and mutator of in-memory sessions.
//!
//! All reads and writes go through one `RwLock`; concurrent snapshot reads
//! are cheap, and any mutation holds the writer lock across both the
//! in-memory change and the persist, so a redraw never observes a chat
//! that is half-updated. Writer exclusion is index-wide rather than
//! per-chat; a finer lock would allow two chats to save concurrently but
//! has not been worth the complexity.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::message::{Message, Role};
use crate::core::session::ChatSession;
use crate::core::store::{self, StoreError};

/// Errors from chat index operations.
#[derive(Debug)]
pub enum ManagerError {
    /// No chat with the given id is in the index.
    NotFound(String),

    /// A trailing-message update was requested on a chat with no messages.
    EmptyHistory(String),

    /// The in-memory mutation succeeded but persistence failed. The index is
    /// not rolled back; the caller decides whether to surface or retry.
    Store(StoreError),
}

impl std::fmt::Display for ManagerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagerError::NotFound(id) => write!(f, "chat {id} not found"),
            ManagerError::EmptyHistory(id) => {
                write!(f, "chat {id} has no messages to update")
            }
            ManagerError::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ManagerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ManagerError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ManagerError {
    fn from(err: StoreError) -> Self {
        ManagerError::Store(err)
    }
}

/// In-memory chat index backed by one JSON file per chat.
///
/// Accessors return owned snapshots, never references into the index, so
/// callers on any thread can hold results across later mutations.
pub struct ChatManager {
    chats: RwLock<HashMap<String, ChatSession>>,
    chats_dir: PathBuf,
}

impl ChatManager {
    /// Load all persisted chats from `chats_dir` into the index.
    ///
    /// A load failure degrades to an empty index: for an interactive tool a
    /// fresh chat list is more useful than refusing to start.
    pub fn new(chats_dir: PathBuf) -> Self {
        let chats = match store::load_all(&chats_dir) {
            Ok(chats) => chats,
            Err(err) => {
                tracing::warn!(dir = %chats_dir.display(), error = %err, "starting with empty chat list");
                HashMap::new()
            }
        };

        Self {
            chats: RwLock::new(chats),
            chats_dir,
        }
    }

    fn read_index(&self) -> RwLockReadGuard<'_, HashMap<String, ChatSession>> {
        self.chats.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, HashMap<String, ChatSession>> {
        self.chats.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create, index, and persist a new chat.
    ///
    /// The created session is returned even when the save fails — it exists
    /// in memory either way — with the persistence result alongside so the
    /// caller can surface the error.
    pub fn create_chat(&self, title: &str, model: &str) -> (ChatSession, Result<(), StoreError>) {
        let session = ChatSession::new(title, model);
        let id = session.id.to_string();

        let mut chats = self.write_index();
        let entry = chats.entry(id).or_insert(session);
        let saved = store::save(&self.chats_dir, entry);
        if let Err(err) = &saved {
            tracing::warn!(chat = %entry.id, error = %err, "new chat not persisted");
        }

        (entry.clone(), saved)
    }

    /// Snapshot of one chat, or `None` if the id is unknown.
    pub fn get_by_id(&self, id: &str) -> Option<ChatSession> {
        self.read_index().get(id).cloned()
    }

    /// Snapshots of every chat, ordered by creation time ascending with ties
    /// broken by id so the listing is deterministic.
    pub fn list_all(&self) -> Vec<ChatSession> {
        let mut chats: Vec<ChatSession> = self.read_index().values().cloned().collect();
        chats.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        chats
    }

    /// Number of chats in the index.
    pub fn len(&self) -> usize {
        self.read_index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_index().is_empty()
    }

    /// Append a message to a chat and persist.
    pub fn append_message(
        &self,
        id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), ManagerError> {
        let mut chats = self.write_index();
        let chat = chats
            .get_mut(id)
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;

        chat.messages.push(Message::new(role, content));
        store::save(&self.chats_dir, chat)?;
        Ok(())
    }

    /// Concatenate a fragment onto the trailing message's content and persist.
    ///
    /// This is the hot path while a reply streams in: it runs once per
    /// received fragment, holding the writer lock for the duration of the
    /// append and save so concurrent snapshot reads never see torn content.
    pub fn update_trailing_message(&self, id: &str, delta: &str) -> Result<(), ManagerError> {
        let mut chats = self.write_index();
        let chat = chats
            .get_mut(id)
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;
        let last = chat
            .messages
            .last_mut()
            .ok_or_else(|| ManagerError::EmptyHistory(id.to_string()))?;

        last.content.push_str(delta);
        store::save(&self.chats_dir, chat)?;
        Ok(())
    }

    /// Delete a chat's backing file, then drop it from the index.
    ///
    /// Removal order matters: if the file removal fails the chat stays in
    /// the index, since a chat the index has forgotten but disk still holds
    /// would resurrect on the next start.
    pub fn delete_chat(&self, id: &str) -> Result<(), ManagerError> {
        let mut chats = self.write_index();
        let chat = chats
            .get(id)
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;

        store::delete(chat)?;
        chats.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn manager() -> (TempDir, ChatManager) {
        let dir = TempDir::new().unwrap();
        let manager = ChatManager::new(dir.path().to_path_buf());
        (dir, manager)
    }

    #[test]
    fn created_chats_have_pairwise_distinct_ids() {
        let (_dir, manager) = manager();
        let mut ids = Vec::new();
        for i in 0..8 {
            let (chat, saved) = manager.create_chat(&format!("Chat {}", i + 1), "llama3");
            saved.unwrap();
            ids.push(chat.id);
        }
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn list_all_orders_by_creation_time_deterministically() {
        let (_dir, manager) = manager();
        for i in 0..5 {
            manager.create_chat(&format!("Chat {}", i + 1), "llama3").1.unwrap();
        }

        let listed = manager.list_all();
        assert_eq!(listed.len(), 5);
        for pair in listed.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
            if pair[0].created_at == pair[1].created_at {
                assert!(pair[0].id < pair[1].id);
            }
        }

        // Stable across calls.
        let again: Vec<_> = manager.list_all().iter().map(|c| c.id).collect();
        let first: Vec<_> = listed.iter().map(|c| c.id).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn append_message_adds_at_the_end_without_touching_prior_messages() {
        let (_dir, manager) = manager();
        let (chat, _) = manager.create_chat("Chat 1", "llama3");
        let id = chat.id.to_string();

        manager.append_message(&id, Role::User, "first").unwrap();
        manager.append_message(&id, Role::Assistant, "second").unwrap();

        let chat = manager.get_by_id(&id).unwrap();
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].content, "first");
        assert_eq!(chat.messages[1].content, "second");
    }

    #[test]
    fn append_message_to_unknown_chat_is_not_found() {
        let (_dir, manager) = manager();
        let err = manager
            .append_message("no-such-id", Role::User, "hi")
            .unwrap_err();
        assert!(matches!(err, ManagerError::NotFound(_)));
    }

    #[test]
    fn trailing_updates_apply_in_call_order() {
        let (_dir, manager) = manager();
        let (chat, _) = manager.create_chat("Chat 1", "llama3");
        let id = chat.id.to_string();
        manager.append_message(&id, Role::Assistant, "").unwrap();

        manager.update_trailing_message(&id, "a").unwrap();
        manager.update_trailing_message(&id, "b").unwrap();

        let chat = manager.get_by_id(&id).unwrap();
        assert!(chat.messages[0].content.ends_with("ab"));
    }

    #[test]
    fn trailing_update_on_empty_history_fails_and_leaves_disk_untouched() {
        let (_dir, manager) = manager();
        let (chat, saved) = manager.create_chat("Chat 1", "llama3");
        saved.unwrap();
        let id = chat.id.to_string();
        let path = manager.get_by_id(&id).unwrap().storage_location.unwrap();
        let on_disk_before = fs::read(&path).unwrap();

        let err = manager.update_trailing_message(&id, "x").unwrap_err();
        assert!(matches!(err, ManagerError::EmptyHistory(_)));
        assert_eq!(fs::read(&path).unwrap(), on_disk_before);
    }

    #[test]
    fn streaming_scenario_builds_the_trailing_reply() {
        let (_dir, manager) = manager();
        let (chat, saved) = manager.create_chat("Chat 1", "m1");
        saved.unwrap();
        let id = chat.id.to_string();

        manager.append_message(&id, Role::User, "Hi").unwrap();
        manager.append_message(&id, Role::Assistant, "").unwrap();
        manager.update_trailing_message(&id, "He").unwrap();
        manager.update_trailing_message(&id, "llo").unwrap();

        let chat = manager.get_by_id(&id).unwrap();
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[1].content, "Hello");
        assert_eq!(chat.model, "m1");
    }

    #[test]
    fn trailing_updates_are_ordered_under_concurrent_reads() {
        let (_dir, manager) = manager();
        let manager = Arc::new(manager);
        let (chat, saved) = manager.create_chat("Chat 1", "llama3");
        saved.unwrap();
        let id = chat.id.to_string();
        manager.append_message(&id, Role::Assistant, "").unwrap();

        let reader = {
            let manager = Arc::clone(&manager);
            let id = id.clone();
            std::thread::spawn(move || {
                // Snapshot reads racing the writer must only ever observe
                // prefixes of the final content.
                for _ in 0..200 {
                    let snapshot = manager.get_by_id(&id).unwrap();
                    let content = &snapshot.messages[0].content;
                    assert!("abababababababababab".starts_with(content.as_str()));
                }
            })
        };

        for _ in 0..10 {
            manager.update_trailing_message(&id, "a").unwrap();
            manager.update_trailing_message(&id, "b").unwrap();
        }
        reader.join().unwrap();

        let chat = manager.get_by_id(&id).unwrap();
        assert_eq!(chat.messages[0].content, "abababababababababab");
    }

    #[test]
    fn delete_chat_removes_index_entry_and_file() {
        let (_dir, manager) = manager();
        let (chat, saved) = manager.create_chat("Chat 1", "llama3");
        saved.unwrap();
        let id = chat.id.to_string();
        let path = manager.get_by_id(&id).unwrap().storage_location.unwrap();

        manager.delete_chat(&id).unwrap();
        assert!(manager.get_by_id(&id).is_none());
        assert!(!path.exists());
    }

    #[test]
    fn failed_delete_keeps_the_chat_in_the_index() {
        let (_dir, manager) = manager();
        let (chat, saved) = manager.create_chat("Chat 1", "llama3");
        saved.unwrap();
        let id = chat.id.to_string();

        // Make the file removal fail without the index knowing.
        let path = manager.get_by_id(&id).unwrap().storage_location.unwrap();
        fs::remove_file(&path).unwrap();

        let err = manager.delete_chat(&id).unwrap_err();
        assert!(matches!(err, ManagerError::Store(StoreError::Io { .. })));
        assert!(manager.get_by_id(&id).is_some());
    }

    #[test]
    fn new_manager_picks_up_previously_persisted_chats() {
        let dir = TempDir::new().unwrap();
        let id = {
            let manager = ChatManager::new(dir.path().to_path_buf());
            let (chat, saved) = manager.create_chat("Chat 1", "llama3");
            saved.unwrap();
            let id = chat.id.to_string();
            manager.append_message(&id, Role::User, "remember me").unwrap();
            id
        };

        let manager = ChatManager::new(dir.path().to_path_buf());
        let chat = manager.get_by_id(&id).unwrap();
        assert_eq!(chat.messages[0].content, "remember me");
    }
}
