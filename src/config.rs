use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub server: ServerConfig,
  #[serde(default)]
  pub store: StoreConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub assets: AssetsConfig,
  /// Custom title for header (defaults to the server host if not set)
  pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_base_url")]
  pub base_url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

impl ServerConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

/// How an empty local collection is treated on read.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmptyCollectionPolicy {
  /// Empty means "not cached yet": always ask the server
  #[default]
  Miss,
  /// Empty is a valid answer once the collection has been fetched before
  Trust,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
  /// Store file (default: $XDG_DATA_HOME/fressen/store.db)
  pub path: Option<PathBuf>,
  #[serde(default)]
  pub empty_collection: EmptyCollectionPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Defer review delivery to the sync task instead of posting right away
  #[serde(default = "default_true")]
  pub background: bool,
  #[serde(default = "default_probe_interval_secs")]
  pub probe_interval_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      background: true,
      probe_interval_secs: default_probe_interval_secs(),
    }
  }
}

impl SyncConfig {
  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.probe_interval_secs.max(1))
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetsConfig {
  /// Origin the static site is served from
  #[serde(default = "default_origin")]
  pub origin: String,
  /// Static cache version; bumping it evicts older static caches on activate
  #[serde(default = "default_asset_version")]
  pub version: u32,
  /// Cache directory (default: $XDG_CACHE_HOME/fressen/assets)
  pub dir: Option<PathBuf>,
  /// Assets fetched on install, relative to `origin` or absolute
  #[serde(default = "default_prefetch")]
  pub prefetch: Vec<String>,
}

impl Default for AssetsConfig {
  fn default() -> Self {
    Self {
      origin: default_origin(),
      version: default_asset_version(),
      dir: None,
      prefetch: default_prefetch(),
    }
  }
}

fn default_base_url() -> String {
  "http://localhost:1337".to_string()
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_true() -> bool {
  true
}

fn default_probe_interval_secs() -> u64 {
  15
}

fn default_origin() -> String {
  "http://localhost:8000".to_string()
}

fn default_asset_version() -> u32 {
  5
}

fn default_prefetch() -> Vec<String> {
  [
    ".",
    "index.html",
    "restaurant.html",
    "css/app.bundle.css",
    "app.bundle.js",
  ]
  .into_iter()
  .map(String::from)
  .collect()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./fressen.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/fressen/config.yaml
  ///
  /// Without a file the built-in defaults are used. `FRESSEN_BASE_URL`
  /// overrides `server.base_url` either way.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Ok(base_url) = std::env::var("FRESSEN_BASE_URL") {
      config.server.base_url = base_url;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("fressen.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("fressen").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Directory for the log file.
  pub fn log_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("fressen").join("logs"))
  }
}
