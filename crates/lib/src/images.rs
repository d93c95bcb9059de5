//! Image transfer helper: moves chat images between the device and the backend.
//!
//! Uploads are the one loud failure path in the chat core (the caller decides
//! whether to retry or warn); downloads degrade to `None` so the UI can fall
//! back to rendering from the remote URL.

use crate::message::{Message, Role};
use std::path::{Path, PathBuf};

/// Error from the image endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("image api error: {0}")]
    Api(String),
    #[error("reading image file: {0}")]
    Io(#[from] std::io::Error),
}

/// Client for the backend chat-image endpoints.
pub struct ImageTransfer {
    api_base: String,
    token: Option<String>,
    image_dir: PathBuf,
    client: reqwest::Client,
}

impl ImageTransfer {
    pub fn new(
        api_base: impl Into<String>,
        token: Option<String>,
        image_dir: impl Into<PathBuf>,
    ) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self {
            api_base,
            token,
            image_dir: image_dir.into(),
            client: reqwest::Client::new(),
        }
    }

    /// POST the message's attached image to the per-conversation, per-message
    /// endpoint, if the message carries a local (`file://`) image. Multipart
    /// form data keyed by filename, mime type inferred from the extension.
    /// The message is already rendered locally; a non-2xx response is returned
    /// to the caller instead of blocking anything.
    pub async fn upload_if_present(
        &self,
        message: &Message,
        conversation_id: &str,
        role: Role,
    ) -> Result<(), ImageError> {
        let Some(ref image) = message.image else {
            return Ok(());
        };
        if !is_local_uri(image) {
            return Ok(());
        }
        let path = local_uri_to_path(image);
        let bytes = tokio::fs::read(&path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        let mime = mime_for_path(&path);
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = format!(
            "{}/chat/image/{}/{}",
            self.api_base, conversation_id, message.id
        );
        let mut req = self
            .client
            .post(&url)
            .multipart(form)
            .header("X-Token-Source", role.token_source());
        if let Some(ref t) = self.token {
            req = req.bearer_auth(t);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ImageError::Api(format!("{} {}", status, body)));
        }
        Ok(())
    }

    /// Download a backend-stored image into the per-conversation local
    /// directory and return its `file://` URI. Returns `None` on any failure;
    /// the caller falls back to the remote URL.
    pub async fn download_to_local(
        &self,
        conversation_id: &str,
        message_id: &str,
        remote_file_name: &str,
    ) -> Option<String> {
        let dir = self.image_dir.join("chat").join(conversation_id);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            log::warn!("creating image directory {} failed: {}", dir.display(), e);
            return None;
        }
        let url = format!(
            "{}/chat/image/{}/{}/{}",
            self.api_base, conversation_id, message_id, remote_file_name
        );
        let mut req = self.client.get(&url);
        if let Some(ref t) = self.token {
            req = req.bearer_auth(t);
        }
        let res = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("image download failed: {}", e);
                return None;
            }
        };
        if !res.status().is_success() {
            log::warn!("image download failed: {} {}", res.status(), url);
            return None;
        }
        let bytes = match res.bytes().await {
            Ok(b) => b,
            Err(e) => {
                log::warn!("reading image body failed: {}", e);
                return None;
            }
        };
        let path = dir.join(remote_file_name);
        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            log::warn!("writing image to {} failed: {}", path.display(), e);
            return None;
        }
        Some(format!("file://{}", path.display()))
    }
}

/// True for `file://` URIs, i.e. images already on the device.
pub fn is_local_uri(uri: &str) -> bool {
    uri.starts_with("file://")
}

/// Strip the `file://` scheme to get a filesystem path.
pub fn local_uri_to_path(uri: &str) -> PathBuf {
    PathBuf::from(uri.trim_start_matches("file://"))
}

/// File name of a backend image reference: the last path segment of an URL,
/// or the bare filename itself. `None` for local URIs and empty references.
pub fn remote_file_name(reference: &str) -> Option<String> {
    if is_local_uri(reference) {
        return None;
    }
    let trimmed = reference.trim_end_matches('/');
    let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Content type inferred from the file extension.
fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_uri_detection() {
        assert!(is_local_uri("file:///tmp/x.jpg"));
        assert!(!is_local_uri("https://host/chat/image/c1/m1/y.jpg"));
        assert!(!is_local_uri("y.jpg"));
    }

    #[test]
    fn remote_file_name_from_url_and_bare_name() {
        assert_eq!(
            remote_file_name("https://host/chat/image/c1/m1/y.jpg"),
            Some("y.jpg".to_string())
        );
        assert_eq!(remote_file_name("harvest.png"), Some("harvest.png".to_string()));
        assert_eq!(remote_file_name("file:///tmp/x.jpg"), None);
        assert_eq!(remote_file_name(""), None);
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for_path(Path::new("a/b/photo.JPG")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("leaf.webp")), "image/webp");
        assert_eq!(mime_for_path(Path::new("noext")), "application/octet-stream");
    }
}
