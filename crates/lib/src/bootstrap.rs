//! Session bootstrap: fetch the full chat history after login and seed the
//! local cache, so screens render history without waiting on the network.
//!
//! Agents get an array of conversations; users get the single conversation
//! they hold with support. Backend image references are resolved to local
//! files before the index is persisted — cached history never needs network
//! access to render previously-seen images.

use crate::cache::ChatCache;
use crate::images::{self, ImageTransfer};
use crate::message::{Conversation, ConversationIndex, Role};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("history api error: {0}")]
    Api(String),
}

/// History fetcher + cache seeder. Runs once per login/role-detection.
pub struct Bootstrap {
    api_base: String,
    token: Option<String>,
    client: reqwest::Client,
    cache: Arc<ChatCache>,
    images: Arc<ImageTransfer>,
}

impl Bootstrap {
    pub fn new(
        api_base: impl Into<String>,
        token: Option<String>,
        cache: Arc<ChatCache>,
        images: Arc<ImageTransfer>,
    ) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self {
            api_base,
            token,
            client: reqwest::Client::new(),
            cache,
            images,
        }
    }

    /// Fetch history for `role` and seed the cache. Returns true when the
    /// cache was updated. When `force_refresh` is false and a cached history
    /// already exists, the fetch is skipped. Network or parse failures are
    /// logged and leave the previously cached data valid.
    pub async fn fetch_all_chats_and_cache(&self, role: Role, force_refresh: bool) -> bool {
        if !force_refresh && self.cache.load_all().await.is_some() {
            log::debug!("chat history already cached, skipping fetch");
            return false;
        }
        let mut index = match self.fetch_history(role).await {
            Ok(index) => index,
            Err(e) => {
                log::warn!("chat history fetch failed: {}", e);
                return false;
            }
        };
        self.resolve_images(&mut index).await;
        self.cache.replace_all(index).await;
        true
    }

    async fn fetch_history(&self, role: Role) -> Result<ConversationIndex, HistoryError> {
        let url = format!("{}/chat/{}/history", self.api_base, role.as_str());
        let mut req = self
            .client
            .get(&url)
            .header("X-Token-Source", role.token_source());
        if let Some(ref t) = self.token {
            req = req.bearer_auth(t);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(HistoryError::Api(format!("{} {}", status, body)));
        }
        match role {
            Role::Agent => {
                let conversations: Vec<Conversation> = res.json().await?;
                Ok(conversations
                    .into_iter()
                    .map(|c| (c.id.clone(), c))
                    .collect())
            }
            Role::User => {
                let conversation: Conversation = res.json().await?;
                let mut index = ConversationIndex::new();
                index.insert(conversation.id.clone(), conversation);
                Ok(index)
            }
        }
    }

    /// Download every backend image reference and rewrite it to the local
    /// `file://` URI. A failed download leaves the remote reference in place
    /// so the UI can still render from the network.
    async fn resolve_images(&self, index: &mut ConversationIndex) {
        for conv in index.values_mut() {
            for message in conv.messages.iter_mut() {
                let Some(ref image) = message.image else {
                    continue;
                };
                if images::is_local_uri(image) {
                    continue;
                }
                let Some(name) = images::remote_file_name(image) else {
                    continue;
                };
                if let Some(local) = self
                    .images
                    .download_to_local(&conv.id, &message.id, &name)
                    .await
                {
                    message.image = Some(local);
                }
            }
        }
    }
}
