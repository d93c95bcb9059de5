//! Initialize the configuration directory: create ~/.farmlink, a default
//! config file, and the cache/image directories.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config;

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of the config file path).
/// - Writes `config.json` with `{}` if missing.
/// - Creates the images directory used by the chat image cache.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let default_config = b"{}";
        std::fs::write(config_path, default_config)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let (loaded, _) = config::load_config(Some(config_path.to_path_buf()))?;
    let image_dir = config::resolve_image_dir(&loaded);
    if !image_dir.exists() {
        std::fs::create_dir_all(&image_dir)
            .with_context(|| format!("creating image directory {}", image_dir.display()))?;
        log::info!("created image directory at {}", image_dir.display());
    }

    Ok(config_dir.to_path_buf())
}
