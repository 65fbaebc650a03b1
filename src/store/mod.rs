//! Persistent local store for offline support.
//!
//! Records are kept per collection, keyed by entity id, and survive restarts.
//! The store is only ever a cache: losing it costs a network round trip, never data
//! the server does not also have (queued reviews excepted, see `sync::queue`).

mod record;
mod schema;
mod sqlite;

pub use record::{Collection, Record};
pub use schema::{migrate, Upgrade, SCHEMA_VERSION};
pub use sqlite::{LocalStore, SqliteStore, UnavailableStore};

use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::warn;

use crate::error::Result;

/// The store the application runs with: SQLite when it opens, otherwise a store
/// that reports itself unavailable so every read falls through to the network.
pub enum AppStore {
  Sqlite(SqliteStore),
  Unavailable(UnavailableStore),
}

impl AppStore {
  /// Open the configured store, degrading to network-only mode on failure.
  pub fn open(path: Option<&Path>) -> Self {
    match SqliteStore::open_default(path) {
      Ok(store) => AppStore::Sqlite(store),
      Err(e) => {
        warn!(error = %e, "local store unavailable, running network-only");
        AppStore::Unavailable(UnavailableStore::new(e.to_string()))
      }
    }
  }

  pub fn is_available(&self) -> bool {
    matches!(self, AppStore::Sqlite(_))
  }
}

impl LocalStore for AppStore {
  fn put<T: Record>(&self, records: &[T]) -> Result<Vec<T>> {
    match self {
      AppStore::Sqlite(s) => s.put(records),
      AppStore::Unavailable(s) => s.put(records),
    }
  }

  fn get<T: Record>(&self, key: &str) -> Result<T> {
    match self {
      AppStore::Sqlite(s) => s.get(key),
      AppStore::Unavailable(s) => s.get(key),
    }
  }

  fn get_all<T: Record>(&self) -> Result<Vec<T>> {
    match self {
      AppStore::Sqlite(s) => s.get_all(),
      AppStore::Unavailable(s) => s.get_all(),
    }
  }

  fn replace<T: Record>(&self, old_key: &str, record: &T) -> Result<T> {
    match self {
      AppStore::Sqlite(s) => s.replace(old_key, record),
      AppStore::Unavailable(s) => s.replace(old_key, record),
    }
  }

  fn mark_fetched(&self, collection: Collection) -> Result<()> {
    match self {
      AppStore::Sqlite(s) => s.mark_fetched(collection),
      AppStore::Unavailable(s) => s.mark_fetched(collection),
    }
  }

  fn fetched_at(&self, collection: Collection) -> Result<Option<DateTime<Utc>>> {
    match self {
      AppStore::Sqlite(s) => s.fetched_at(collection),
      AppStore::Unavailable(s) => s.fetched_at(collection),
    }
  }

  fn register_task(&self, tag: &str) -> Result<()> {
    match self {
      AppStore::Sqlite(s) => s.register_task(tag),
      AppStore::Unavailable(s) => s.register_task(tag),
    }
  }

  fn unregister_task(&self, tag: &str) -> Result<()> {
    match self {
      AppStore::Sqlite(s) => s.unregister_task(tag),
      AppStore::Unavailable(s) => s.unregister_task(tag),
    }
  }

  fn registered_tasks(&self) -> Result<Vec<String>> {
    match self {
      AppStore::Sqlite(s) => s.registered_tasks(),
      AppStore::Unavailable(s) => s.registered_tasks(),
    }
  }
}
