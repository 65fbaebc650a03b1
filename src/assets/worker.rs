use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::cache::AssetStore;
use crate::config::AssetsConfig;
use crate::gateway::Gateway;
use crate::store::LocalStore;
use crate::sync::{FlushReport, SyncCache};

/// Prefix shared by every version of the static cache.
pub const STATIC_CACHE_PREFIX: &str = "fressen-static-v";

/// Cache holding restaurant photos, shared across versions.
pub const IMAGE_CACHE: &str = "fressen-content-imgs";

/// Where assets come from when they are not cached.
#[async_trait]
pub trait AssetSource: Send + Sync {
  async fn fetch(&self, url: &Url) -> Result<Vec<u8>>;
}

#[derive(Clone)]
pub struct HttpAssetSource {
  client: reqwest::Client,
}

impl HttpAssetSource {
  pub fn new(client: reqwest::Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl AssetSource for HttpAssetSource {
  async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
    let response = self
      .client
      .get(url.clone())
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| eyre!("Failed to fetch {}: {}", url, e))?;
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read {}: {}", url, e))?;
    Ok(body.to_vec())
  }
}

/// Receiver of named background-sync triggers.
#[async_trait]
pub trait SyncHandler: Send + Sync {
  async fn on_sync(&self, tag: &str) -> crate::error::Result<Option<FlushReport>>;
}

#[async_trait]
impl<S: LocalStore, G: Gateway> SyncHandler for SyncCache<S, G> {
  async fn on_sync(&self, tag: &str) -> crate::error::Result<Option<FlushReport>> {
    self.on_sync_signal(tag).await
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Installing,
  /// Installed while an older version is still around
  Waiting,
  Active,
}

/// Control messages from the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
  SkipWaiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
  Cache,
  Network,
}

#[derive(Debug, Clone)]
pub struct Asset {
  pub body: Vec<u8>,
  pub origin: Origin,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
  pub cached: usize,
  pub failed: usize,
}

/// In-process counterpart of the site's service worker: prefetches static assets
/// into a versioned cache, serves them back with a network fallback, and keeps
/// restaurant photos in a shared image cache.
pub struct AssetWorker<A: AssetSource> {
  store: AssetStore,
  source: A,
  origin: Url,
  version: u32,
  prefetch: Vec<String>,
  state: WorkerState,
  sync: Option<Arc<dyn SyncHandler>>,
}

impl<A: AssetSource> AssetWorker<A> {
  pub fn new(config: &AssetsConfig, store: AssetStore, source: A) -> Result<Self> {
    let origin = Url::parse(&config.origin)
      .map_err(|e| eyre!("Invalid assets origin '{}': {}", config.origin, e))?;
    if origin.cannot_be_a_base() {
      return Err(eyre!("Assets origin '{}' cannot carry a path", config.origin));
    }

    Ok(Self {
      store,
      source,
      origin,
      version: config.version,
      prefetch: config.prefetch.clone(),
      state: WorkerState::Installing,
      sync: None,
    })
  }

  /// Forward `sync` triggers to `handler`.
  pub fn with_sync_handler(mut self, handler: Arc<dyn SyncHandler>) -> Self {
    self.sync = Some(handler);
    self
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  pub fn static_cache(&self) -> String {
    format!("{}{}", STATIC_CACHE_PREFIX, self.version)
  }

  fn current_caches(&self) -> [String; 2] {
    [self.static_cache(), IMAGE_CACHE.to_string()]
  }

  /// Absolute URL for `reference`, resolved against the origin.
  fn resolve(&self, reference: &str) -> Result<Url> {
    let mut url = self
      .origin
      .join(reference)
      .map_err(|e| eyre!("Invalid asset reference '{}': {}", reference, e))?;
    url.set_fragment(None);
    Ok(url)
  }

  fn same_origin(&self, url: &Url) -> bool {
    url.origin() == self.origin.origin()
  }

  /// Prefetch the static assets into the current static cache.
  ///
  /// Assets that fail to download are logged and skipped. The worker becomes
  /// active right away unless an older static cache is still present.
  pub async fn install(&mut self) -> Result<InstallReport> {
    self.state = WorkerState::Installing;
    let cache = self.static_cache();
    let mut report = InstallReport::default();

    for reference in self.prefetch.clone() {
      let url = match self.resolve(&reference) {
        Ok(url) => url,
        Err(e) => {
          warn!(error = %e, "skipping prefetch entry");
          report.failed += 1;
          continue;
        }
      };
      let stored = match self.source.fetch(&url).await {
        Ok(body) => self.store.put(&cache, url.as_str(), &body),
        Err(e) => Err(e),
      };
      match stored {
        Ok(()) => report.cached += 1,
        Err(e) => {
          warn!(%url, error = %e, "prefetch failed");
          report.failed += 1;
        }
      }
    }
    info!(cache = %cache, cached = report.cached, failed = report.failed, "asset worker installed");

    if self.superseded_caches()?.is_empty() {
      self.activate()?;
    } else {
      self.state = WorkerState::Waiting;
      debug!("older asset cache present, waiting");
    }
    Ok(report)
  }

  fn superseded_caches(&self) -> Result<Vec<String>> {
    let current = self.current_caches();
    Ok(
      self
        .store
        .cache_names()?
        .into_iter()
        .filter(|name| name.starts_with(STATIC_CACHE_PREFIX) && !current.contains(name))
        .collect(),
    )
  }

  /// Take over: drop static caches of other versions. Returns what was deleted.
  pub fn activate(&mut self) -> Result<Vec<String>> {
    let stale = self.superseded_caches()?;
    for name in &stale {
      self.store.delete_cache(name)?;
      info!(cache = %name, "evicted old asset cache");
    }
    self.state = WorkerState::Active;
    Ok(stale)
  }

  pub fn message(&mut self, message: Message) -> Result<()> {
    match message {
      Message::SkipWaiting if self.state == WorkerState::Waiting => {
        self.activate()?;
      }
      Message::SkipWaiting => debug!(state = ?self.state, "skip-waiting ignored"),
    }
    Ok(())
  }

  /// Answer an asset request.
  ///
  /// Same-origin detail pages all map to the cached `restaurant.html`; photos go
  /// through the image cache; everything else is cache first, then network.
  pub async fn fetch(&self, reference: &str) -> Result<Asset> {
    let url = self.resolve(reference)?;

    if self.same_origin(&url) {
      if url.path().contains("restaurant.html") {
        let page = self.resolve("restaurant.html")?;
        return self.cache_then_network(&page).await;
      }
      if url.path().contains("/img") {
        return self.serve_photo(&url).await;
      }
    }

    self.cache_then_network(&url).await
  }

  async fn cache_then_network(&self, url: &Url) -> Result<Asset> {
    for cache in self.current_caches() {
      if let Some(body) = self.store.get(&cache, url.as_str())? {
        debug!(%url, cache = %cache, "asset served from cache");
        return Ok(Asset {
          body,
          origin: Origin::Cache,
        });
      }
    }

    let body = self.source.fetch(url).await?;
    Ok(Asset {
      body,
      origin: Origin::Network,
    })
  }

  /// All sizes of a photo share one cache entry.
  async fn serve_photo(&self, url: &Url) -> Result<Asset> {
    let key = photo_key(url.as_str());
    if let Some(body) = self.store.get(IMAGE_CACHE, key)? {
      return Ok(Asset {
        body,
        origin: Origin::Cache,
      });
    }

    let body = self.source.fetch(url).await?;
    if let Err(e) = self.store.put(IMAGE_CACHE, key, &body) {
      warn!(%url, error = %e, "failed to cache photo");
    }
    Ok(Asset {
      body,
      origin: Origin::Network,
    })
  }

  /// Forward a named sync trigger to the registered handler.
  pub async fn sync(&self, tag: &str) -> Result<Option<FlushReport>> {
    match &self.sync {
      Some(handler) => Ok(handler.on_sync(tag).await?),
      None => {
        debug!(tag, "no sync handler registered");
        Ok(None)
      }
    }
  }
}

/// Storage key for a photo URL: trailing `-small` and `@2x` size markers and the
/// `.jpg` extension are dropped.
fn photo_key(url: &str) -> &str {
  let Some(mut stem) = url.strip_suffix(".jpg") else {
    return url;
  };
  while let Some(s) = stem.strip_suffix("@2x") {
    stem = s;
  }
  while let Some(s) = stem.strip_suffix("-small") {
    stem = s;
  }
  stem
}
