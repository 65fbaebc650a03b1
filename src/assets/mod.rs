//! Install-time asset cache for the static site and restaurant photos.

mod cache;
mod worker;

pub use cache::AssetStore;
pub use worker::{
  Asset, AssetSource, AssetWorker, HttpAssetSource, InstallReport, Message, Origin, SyncHandler,
  WorkerState, IMAGE_CACHE, STATIC_CACHE_PREFIX,
};
