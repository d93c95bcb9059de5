//! Local chat cache: durable store for the conversation index.
//!
//! The whole index is persisted as one JSON blob. Every mutation is a
//! read-modify-write under a single write lock held across the persist, so
//! overlapping appends for the same conversation cannot interleave. A
//! missing or unreadable blob is an empty cache, never an error.

use crate::images::{self, ImageError, ImageTransfer};
use crate::message::{Conversation, ConversationIndex, Message, Role};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// File-backed conversation store shared by the bootstrap and the UI layer.
pub struct ChatCache {
    path: std::path::PathBuf,
    index: RwLock<ConversationIndex>,
    images: Arc<ImageTransfer>,
}

impl ChatCache {
    /// Load the cache from `path`; a missing or invalid file starts empty.
    pub async fn load(path: impl AsRef<Path>, images: Arc<ImageTransfer>) -> Self {
        let path = path.as_ref().to_path_buf();
        let index = match tokio::fs::read_to_string(&path).await {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                log::warn!("chat cache at {} is invalid, starting empty: {}", path.display(), e);
                ConversationIndex::new()
            }),
            Err(_) => ConversationIndex::new(),
        };
        Self {
            path,
            index: RwLock::new(index),
            images,
        }
    }

    /// The full index, or `None` when nothing has been cached yet.
    pub async fn load_all(&self) -> Option<ConversationIndex> {
        let index = self.index.read().await;
        if index.is_empty() {
            None
        } else {
            Some(index.clone())
        }
    }

    pub async fn load_conversation(&self, id: &str) -> Option<Conversation> {
        self.index.read().await.get(id).cloned()
    }

    /// Replace the whole index (bootstrap seeding) and persist.
    pub async fn replace_all(&self, new_index: ConversationIndex) {
        let mut index = self.index.write().await;
        *index = new_index;
        self.persist(&index).await;
    }

    /// Upsert the conversation, append the message, update
    /// `last_message_text`, and persist — then sync the attached image with
    /// the backend: a local image is uploaded (the one failure returned to
    /// the caller), a remote reference is downloaded and rewritten to the
    /// cached local URI when the download succeeds. Returns the
    /// possibly-rewritten message so optimistic UI state can reconcile.
    pub async fn append_message(
        &self,
        conversation_id: &str,
        message: Message,
        role: Role,
    ) -> Result<Message, ImageError> {
        let mut message = message;
        {
            let mut index = self.index.write().await;
            let conv = index
                .entry(conversation_id.to_string())
                .or_insert_with(|| Conversation::new(conversation_id));
            conv.push(message.clone());
            self.persist(&index).await;
        }

        // Image sync happens after the index write so a slow backend never
        // holds the cache lock.
        if let Some(image) = message.image.clone() {
            if images::is_local_uri(&image) {
                self.images
                    .upload_if_present(&message, conversation_id, role)
                    .await?;
            } else if let Some(name) = images::remote_file_name(&image) {
                if let Some(local) = self
                    .images
                    .download_to_local(conversation_id, &message.id, &name)
                    .await
                {
                    self.update_message_image_uri(conversation_id, &message.id, &local)
                        .await;
                    message.image = Some(local);
                }
            }
        }
        Ok(message)
    }

    /// Rewrite a message's image reference to the cached local URI once an
    /// async download resolves, and persist.
    pub async fn update_message_image_uri(
        &self,
        conversation_id: &str,
        message_id: &str,
        new_local_uri: &str,
    ) {
        let mut index = self.index.write().await;
        let Some(conv) = index.get_mut(conversation_id) else {
            log::debug!("image uri update for unknown conversation {}", conversation_id);
            return;
        };
        let Some(msg) = conv.messages.iter_mut().find(|m| m.id == message_id) else {
            log::debug!("image uri update for unknown message {}", message_id);
            return;
        };
        msg.image = Some(new_local_uri.to_string());
        self.persist(&index).await;
    }

    /// Write the whole index to disk. Failures are logged; callers never see
    /// cache I/O errors.
    async fn persist(&self, index: &ConversationIndex) {
        let json = match serde_json::to_string(index) {
            Ok(j) => j,
            Err(e) => {
                log::warn!("serializing chat cache failed: {}", e);
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                log::warn!("creating cache directory failed: {}", e);
                return;
            }
        }
        if let Err(e) = tokio::fs::write(&self.path, json).await {
            log::warn!("writing chat cache to {} failed: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("farmlink-cache-test-{}.json", uuid::Uuid::new_v4()))
    }

    fn test_images() -> Arc<ImageTransfer> {
        // Points at nothing; text-only messages never touch the network.
        Arc::new(ImageTransfer::new(
            "http://127.0.0.1:9",
            None,
            std::env::temp_dir().join("farmlink-cache-test-images"),
        ))
    }

    #[tokio::test]
    async fn append_two_messages_tracks_last_text() {
        let cache = ChatCache::load(temp_cache_path(), test_images()).await;
        cache
            .append_message("c1", Message::new("first", "c1", "Amina"), Role::Agent)
            .await
            .expect("append");
        cache
            .append_message("c1", Message::new("second", "a1", "Agent"), Role::Agent)
            .await
            .expect("append");
        let conv = cache.load_conversation("c1").await.expect("conversation");
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.last_message_text, "second");
    }

    #[tokio::test]
    async fn append_persists_across_reload() {
        let path = temp_cache_path();
        {
            let cache = ChatCache::load(&path, test_images()).await;
            cache
                .append_message("c1", Message::new("hello", "c1", "Amina"), Role::User)
                .await
                .expect("append");
        }
        let reloaded = ChatCache::load(&path, test_images()).await;
        let conv = reloaded.load_conversation("c1").await.expect("conversation");
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.last_message_text, "hello");
    }

    #[tokio::test]
    async fn empty_cache_loads_as_none() {
        let cache = ChatCache::load(temp_cache_path(), test_images()).await;
        assert!(cache.load_all().await.is_none());
        assert!(cache.load_conversation("missing").await.is_none());
    }

    #[tokio::test]
    async fn update_image_uri_rewrites_in_place() {
        let cache = ChatCache::load(temp_cache_path(), test_images()).await;
        let mut message = Message::new("photo", "c1", "Amina");
        let id = message.id.clone();
        // A remote reference pointing at an unreachable backend stays remote.
        message.image = Some("unreachable.jpg".to_string());
        let appended = cache
            .append_message("c1", message, Role::Agent)
            .await
            .expect("append");
        assert_eq!(appended.image.as_deref(), Some("unreachable.jpg"));

        cache
            .update_message_image_uri("c1", &id, "file:///tmp/unreachable.jpg")
            .await;
        let conv = cache.load_conversation("c1").await.expect("conversation");
        assert_eq!(
            conv.messages[0].image.as_deref(),
            Some("file:///tmp/unreachable.jpg")
        );
    }
}
