//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.farmlink/config.json`) and
//! environment. Backend base URLs are externally configured constants; the
//! chat core only consumes them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Backend endpoints (REST base and WebSocket base).
    #[serde(default)]
    pub backend: BackendConfig,

    /// Chat liveness and storage settings.
    #[serde(default)]
    pub chat: ChatConfig,

    /// API auth settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Backend endpoints consumed by the chat core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// REST base URL (history fetch, image upload/download).
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// WebSocket base URL (live chat sockets).
    #[serde(default = "default_ws_base_url")]
    pub ws_base_url: String,
}

fn default_api_base_url() -> String {
    "https://api.farmlink.app".to_string()
}

fn default_ws_base_url() -> String {
    "wss://api.farmlink.app".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            ws_base_url: default_ws_base_url(),
        }
    }
}

/// Chat liveness and storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// Agent sockets with no inbound or outbound message for this long are
    /// closed and removed (default 120). The user socket is exempt.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Keep-alive ping interval for the user socket (default 30). Agent
    /// sockets are never pinged; their liveness is the idle timer.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// Cache blob path (default ~/.farmlink/chats.json).
    pub cache_file: Option<PathBuf>,

    /// Root directory for downloaded chat images (default ~/.farmlink/images).
    pub image_dir: Option<PathBuf>,
}

fn default_idle_timeout_secs() -> u64 {
    120
}

fn default_ping_interval_secs() -> u64 {
    30
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            cache_file: None,
            image_dir: None,
        }
    }
}

impl ChatConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

/// API auth: bearer token for history fetch and image transfer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Bearer token for backend requests. Overridden by FARMLINK_API_TOKEN env.
    pub token: Option<String>,
}

/// Resolve the API token: env FARMLINK_API_TOKEN overrides config.
pub fn resolve_api_token(config: &Config) -> Option<String> {
    std::env::var("FARMLINK_API_TOKEN")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .auth
                .token
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("FARMLINK_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".farmlink").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Resolve the cache blob path (default ~/.farmlink/chats.json).
pub fn resolve_cache_file(config: &Config) -> PathBuf {
    config
        .chat
        .cache_file
        .clone()
        .or_else(|| dirs::home_dir().map(|h| h.join(".farmlink").join("chats.json")))
        .unwrap_or_else(|| PathBuf::from("chats.json"))
}

/// Resolve the image directory root (default ~/.farmlink/images).
pub fn resolve_image_dir(config: &Config) -> PathBuf {
    config
        .chat
        .image_dir
        .clone()
        .or_else(|| dirs::home_dir().map(|h| h.join(".farmlink").join("images")))
        .unwrap_or_else(|| PathBuf::from("images"))
}

/// Load config from the default path (or FARMLINK_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_liveness_settings() {
        let c = ChatConfig::default();
        assert_eq!(c.idle_timeout(), Duration::from_secs(120));
        assert_eq!(c.ping_interval(), Duration::from_secs(30));
    }

    #[test]
    fn empty_config_parses_with_defaults() {
        let config: Config = serde_json::from_str("{}").expect("parse");
        assert_eq!(config.backend.ws_base_url, "wss://api.farmlink.app");
        assert!(config.auth.token.is_none());
    }

    #[test]
    fn cache_file_override() {
        let mut config = Config::default();
        config.chat.cache_file = Some(PathBuf::from("/data/chats.json"));
        assert_eq!(
            resolve_cache_file(&config),
            PathBuf::from("/data/chats.json")
        );
    }
}
