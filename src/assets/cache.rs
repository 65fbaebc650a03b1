//! Named on-disk caches of fetched assets.
//!
//! Layout: `<root>/<cache name>/<sha256 of key>`. Keys are full URLs.

use color_eyre::{eyre::eyre, Result};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::PathBuf;

pub struct AssetStore {
  root: PathBuf,
}

impl AssetStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Get the default cache directory.
  pub fn default_dir() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".cache")))
      .ok_or_else(|| eyre!("Could not determine cache directory"))?;

    Ok(cache_dir.join("fressen").join("assets"))
  }

  fn entry_path(&self, cache: &str, key: &str) -> PathBuf {
    // SHA256 hash for stable, fixed-length file names
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    self.root.join(cache).join(hex::encode(hasher.finalize()))
  }

  pub fn put(&self, cache: &str, key: &str, body: &[u8]) -> Result<()> {
    let path = self.entry_path(cache, key);
    let dir = self.root.join(cache);
    std::fs::create_dir_all(&dir)
      .map_err(|e| eyre!("Failed to create cache {}: {}", dir.display(), e))?;

    // Write then rename so readers never see a partial entry
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, body).map_err(|e| eyre!("Failed to write {}: {}", tmp.display(), e))?;
    std::fs::rename(&tmp, &path)
      .map_err(|e| eyre!("Failed to store {} in {}: {}", key, cache, e))?;
    Ok(())
  }

  pub fn get(&self, cache: &str, key: &str) -> Result<Option<Vec<u8>>> {
    match std::fs::read(self.entry_path(cache, key)) {
      Ok(body) => Ok(Some(body)),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
      Err(e) => Err(eyre!("Failed to read {} from {}: {}", key, cache, e)),
    }
  }

  /// Names of all caches present on disk, sorted.
  pub fn cache_names(&self) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(&self.root) {
      Ok(entries) => entries,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(eyre!("Failed to list {}: {}", self.root.display(), e)),
    };

    let mut names: Vec<String> = entries
      .filter_map(|entry| entry.ok())
      .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
      .filter_map(|entry| entry.file_name().into_string().ok())
      .collect();
    names.sort();
    Ok(names)
  }

  pub fn delete_cache(&self, cache: &str) -> Result<()> {
    let dir = self.root.join(cache);
    match std::fs::remove_dir_all(&dir) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
      Err(e) => Err(eyre!("Failed to delete cache {}: {}", dir.display(), e)),
    }
  }
}
