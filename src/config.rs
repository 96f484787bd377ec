use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the reader app is served from, e.g. "https://reader.example.com"
  pub base_url: String,
  /// Version suffix for cache partition names. Bump when the static
  /// manifest changes; stale partitions are purged on the next activate.
  #[serde(default = "default_cache_version")]
  pub cache_version: String,
  /// Root-relative paths fetched eagerly at install time.
  #[serde(default = "default_static_manifest")]
  pub static_manifest: Vec<String>,
  /// A request whose path contains any of these segments is backend
  /// traffic and gets the network-first strategy.
  #[serde(default = "default_api_segments")]
  pub api_path_segments: Vec<String>,
  /// Root-relative endpoint that ingests activity records.
  #[serde(default = "default_activities_endpoint")]
  pub activities_endpoint: String,
  /// Deferred-sync registration tag.
  #[serde(default = "default_sync_tag")]
  pub sync_tag: String,
  /// Override for the cache database location.
  pub store_path: Option<PathBuf>,
}

fn default_cache_version() -> String {
  "v1".to_string()
}

fn default_static_manifest() -> Vec<String> {
  vec!["/".into(), "/index.html".into(), "/manifest.json".into()]
}

fn default_api_segments() -> Vec<String> {
  vec!["/functions/v1/".into(), "/api/".into()]
}

fn default_activities_endpoint() -> String {
  "/api/activities".to_string()
}

fn default_sync_tag() -> String {
  "sync-activities".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./readsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/readsync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/readsync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("readsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("readsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the backend API token from environment variables.
  ///
  /// Checks READSYNC_API_TOKEN first, then READER_API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("READSYNC_API_TOKEN")
      .or_else(|_| std::env::var("READER_API_TOKEN"))
      .map_err(|_| {
        eyre!("API token not found. Set READSYNC_API_TOKEN or READER_API_TOKEN environment variable.")
      })
  }

  /// Absolute URL for a root-relative path.
  pub fn absolute_url(&self, path: &str) -> String {
    format!("{}{}", self.base_url.trim_end_matches('/'), path)
  }
}
