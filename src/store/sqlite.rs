//! Local store trait and its SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use super::record::{Collection, Record};
use super::schema::{self, Upgrade, SCHEMA_VERSION};
use crate::error::{Error, Result};

/// Trait for local store backends.
///
/// Every call is one scoped transaction; nothing is held open between calls.
pub trait LocalStore: Send + Sync {
  /// Upsert records by key. Returns the written records.
  fn put<T: Record>(&self, records: &[T]) -> Result<Vec<T>>;

  /// Get a single record, or `Error::NotFound`.
  fn get<T: Record>(&self, key: &str) -> Result<T>;

  /// All records of the collection, in no particular order.
  fn get_all<T: Record>(&self) -> Result<Vec<T>>;

  /// Remove the record stored under `old_key` and upsert `record`, atomically.
  fn replace<T: Record>(&self, old_key: &str, record: &T) -> Result<T>;

  /// Remember that `collection` was just filled from the gateway.
  fn mark_fetched(&self, collection: Collection) -> Result<()>;

  /// When `collection` was last filled from the gateway.
  fn fetched_at(&self, collection: Collection) -> Result<Option<DateTime<Utc>>>;

  fn register_task(&self, tag: &str) -> Result<()>;

  fn unregister_task(&self, tag: &str) -> Result<()>;

  fn registered_tasks(&self) -> Result<Vec<String>>;

  /// Upsert a single record.
  fn put_one<T: Record>(&self, record: &T) -> Result<T> {
    self
      .put(std::slice::from_ref(record))?
      .pop()
      .ok_or_else(|| Error::StoreUnavailable("write returned no record".to_string()))
  }
}

/// Store used when no persistence backend could be opened.
/// Every operation fails with `StoreUnavailable`, which callers treat as a miss.
pub struct UnavailableStore {
  reason: String,
}

impl UnavailableStore {
  pub fn new(reason: impl Into<String>) -> Self {
    Self {
      reason: reason.into(),
    }
  }

  fn err<T>(&self) -> Result<T> {
    Err(Error::StoreUnavailable(self.reason.clone()))
  }
}

impl LocalStore for UnavailableStore {
  fn put<T: Record>(&self, _records: &[T]) -> Result<Vec<T>> {
    self.err()
  }

  fn get<T: Record>(&self, _key: &str) -> Result<T> {
    self.err()
  }

  fn get_all<T: Record>(&self) -> Result<Vec<T>> {
    self.err()
  }

  fn replace<T: Record>(&self, _old_key: &str, _record: &T) -> Result<T> {
    self.err()
  }

  fn mark_fetched(&self, _collection: Collection) -> Result<()> {
    self.err()
  }

  fn fetched_at(&self, _collection: Collection) -> Result<Option<DateTime<Utc>>> {
    self.err()
  }

  fn register_task(&self, _tag: &str) -> Result<()> {
    self.err()
  }

  fn unregister_task(&self, _tag: &str) -> Result<()> {
    self.err()
  }

  fn registered_tasks(&self) -> Result<Vec<String>> {
    self.err()
  }
}

/// SQLite-based local store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at `path`, migrating it up to `version`.
  ///
  /// `migrate` runs only when the on-disk version is lower than `version`.
  pub fn open<F>(path: &Path, version: u32, migrate: F) -> Result<Self>
  where
    F: FnOnce(&Upgrade<'_>) -> Result<()>,
  {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        Error::StoreUnavailable(format!(
          "failed to create store directory {}: {}",
          parent.display(),
          e
        ))
      })?;
    }

    let conn = Connection::open(path)?;
    Self::initialize(conn, version, migrate)
  }

  /// Open the store at `path` (or the default location) with the current schema.
  pub fn open_default(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };
    Self::open(&path, SCHEMA_VERSION, schema::migrate)
  }

  /// A private, non-durable store with the current schema.
  pub fn in_memory() -> Result<Self> {
    Self::initialize(Connection::open_in_memory()?, SCHEMA_VERSION, schema::migrate)
  }

  /// Get the default store path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::StoreUnavailable("could not determine data directory".to_string()))?;

    Ok(data_dir.join("fressen").join("store.db"))
  }

  fn initialize<F>(mut conn: Connection, version: u32, migrate: F) -> Result<Self>
  where
    F: FnOnce(&Upgrade<'_>) -> Result<()>,
  {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current > version {
      return Err(Error::StoreUnavailable(format!(
        "store schema v{} is newer than supported v{}",
        current, version
      )));
    }

    if current < version {
      let tx = conn.transaction()?;
      migrate(&Upgrade::new(&tx, current, version))?;
      tx.pragma_update(None, "user_version", version)?;
      tx.commit()?;
      info!(from = current, to = version, "migrated local store");
    }

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::StoreUnavailable(format!("lock poisoned: {}", e)))
  }
}

fn encode<T: Record>(record: &T) -> Result<Vec<u8>> {
  serde_json::to_vec(record).map_err(|e| {
    Error::StoreUnavailable(format!(
      "failed to serialize {} record: {}",
      T::COLLECTION,
      e
    ))
  })
}

impl LocalStore for SqliteStore {
  fn put<T: Record>(&self, records: &[T]) -> Result<Vec<T>> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;

    {
      let mut stmt = tx.prepare(&format!(
        "INSERT OR REPLACE INTO {} (record_key, data, cached_at) VALUES (?, ?, datetime('now'))",
        T::COLLECTION.name()
      ))?;
      for record in records {
        stmt.execute(params![record.record_key(), encode(record)?])?;
      }
    }

    tx.commit()?;
    Ok(records.to_vec())
  }

  fn get<T: Record>(&self, key: &str) -> Result<T> {
    let conn = self.lock()?;

    let data: Option<Vec<u8>> = conn
      .query_row(
        &format!(
          "SELECT data FROM {} WHERE record_key = ?",
          T::COLLECTION.name()
        ),
        params![key],
        |row| row.get(0),
      )
      .optional()?;

    match data {
      Some(data) => serde_json::from_slice(&data).map_err(|e| {
        Error::StoreUnavailable(format!(
          "failed to deserialize {} {}: {}",
          T::COLLECTION,
          key,
          e
        ))
      }),
      None => Err(Error::not_found(T::COLLECTION, key)),
    }
  }

  fn get_all<T: Record>(&self) -> Result<Vec<T>> {
    let conn = self.lock()?;

    let mut stmt = conn.prepare(&format!(
      "SELECT record_key, data FROM {}",
      T::COLLECTION.name()
    ))?;

    let rows: Vec<(String, Vec<u8>)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
      .collect::<rusqlite::Result<_>>()?;

    let records = rows
      .into_iter()
      .filter_map(|(key, data)| match serde_json::from_slice(&data) {
        Ok(record) => Some(record),
        Err(e) => {
          warn!(collection = %T::COLLECTION, key, error = %e, "skipping undecodable record");
          None
        }
      })
      .collect();

    Ok(records)
  }

  fn replace<T: Record>(&self, old_key: &str, record: &T) -> Result<T> {
    let mut conn = self.lock()?;
    let table = T::COLLECTION.name();
    let tx = conn.transaction()?;

    tx.execute(
      &format!("DELETE FROM {} WHERE record_key = ?", table),
      params![old_key],
    )?;
    tx.execute(
      &format!(
        "INSERT OR REPLACE INTO {} (record_key, data, cached_at) VALUES (?, ?, datetime('now'))",
        table
      ),
      params![record.record_key(), encode(record)?],
    )?;

    tx.commit()?;
    Ok(record.clone())
  }

  fn mark_fetched(&self, collection: Collection) -> Result<()> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO collection_state (collection, fetched_at) VALUES (?, datetime('now'))",
      params![collection.name()],
    )?;
    Ok(())
  }

  fn fetched_at(&self, collection: Collection) -> Result<Option<DateTime<Utc>>> {
    let conn = self.lock()?;
    let fetched_at: Option<String> = conn
      .query_row(
        "SELECT fetched_at FROM collection_state WHERE collection = ?",
        params![collection.name()],
        |row| row.get(0),
      )
      .optional()?;

    fetched_at.as_deref().map(parse_datetime).transpose()
  }

  fn register_task(&self, tag: &str) -> Result<()> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR IGNORE INTO sync_tasks (tag) VALUES (?)",
      params![tag],
    )?;
    Ok(())
  }

  fn unregister_task(&self, tag: &str) -> Result<()> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM sync_tasks WHERE tag = ?", params![tag])?;
    Ok(())
  }

  fn registered_tasks(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT tag FROM sync_tasks ORDER BY registered_at, tag")?;
    let tags = stmt
      .query_map([], |row| row.get(0))?
      .collect::<rusqlite::Result<_>>()?;
    Ok(tags)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| Error::StoreUnavailable(format!("failed to parse datetime '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::data::{Cuisine, LatLng, Restaurant, Review, ReviewId};

  fn restaurant(id: i64, name: &str) -> Restaurant {
    Restaurant {
      id,
      name: name.to_string(),
      address: String::new(),
      latlng: LatLng { lat: 0.0, lng: 0.0 },
      neighborhood_type_id: 1,
      cuisine_type_id: 1,
      operating_hours: None,
      is_favorite: false,
      photograph: None,
      created_at: None,
      updated_at: None,
    }
  }

  #[test]
  fn test_put_and_get() {
    let store = SqliteStore::in_memory().unwrap();
    let written = store
      .put(&[restaurant(1, "Mission Chinese Food"), restaurant(2, "Emily")])
      .unwrap();
    assert_eq!(written.len(), 2);

    let found: Restaurant = store.get("2").unwrap();
    assert_eq!(found.name, "Emily");

    let mut all: Vec<Restaurant> = store.get_all().unwrap();
    all.sort_by_key(|r| r.id);
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].name, "Mission Chinese Food");
  }

  #[test]
  fn test_get_missing_is_not_found() {
    let store = SqliteStore::in_memory().unwrap();
    let err = store.get::<Cuisine>("9").unwrap_err();
    assert!(matches!(
      err,
      Error::NotFound {
        collection: Collection::Cuisines,
        ..
      }
    ));
  }

  #[test]
  fn test_put_overwrites_same_key() {
    let store = SqliteStore::in_memory().unwrap();
    store.put_one(&restaurant(1, "Old name")).unwrap();
    store.put_one(&restaurant(1, "New name")).unwrap();

    let all: Vec<Restaurant> = store.get_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "New name");
  }

  #[test]
  fn test_replace_swaps_placeholder() {
    let store = SqliteStore::in_memory().unwrap();
    let pending = Review {
      id: ReviewId::Pending("pending-1-0".to_string()),
      restaurant_id: 1,
      name: "Bob".to_string(),
      rating: 5,
      comments: "Great".to_string(),
      created_at: None,
      updated_at: None,
      dirty: false,
    };
    store.put_one(&pending).unwrap();

    let confirmed = Review {
      id: ReviewId::Confirmed(31),
      ..pending.clone()
    };
    store.replace("pending-1-0", &confirmed).unwrap();

    let all: Vec<Review> = store.get_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, ReviewId::Confirmed(31));
  }

  #[test]
  fn test_fetch_markers_and_tasks() {
    let store = SqliteStore::in_memory().unwrap();
    assert!(store.fetched_at(Collection::Reviews).unwrap().is_none());
    store.mark_fetched(Collection::Reviews).unwrap();
    assert!(store.fetched_at(Collection::Reviews).unwrap().is_some());

    store.register_task("sync-reviews").unwrap();
    store.register_task("sync-reviews").unwrap();
    assert_eq!(store.registered_tasks().unwrap(), vec!["sync-reviews"]);
    store.unregister_task("sync-reviews").unwrap();
    assert!(store.registered_tasks().unwrap().is_empty());
  }

  #[test]
  fn test_migration_is_additive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    // First generation of the app only knew about version 1.
    {
      let store = SqliteStore::open(&path, 1, schema::migrate).unwrap();
      store.put_one(&restaurant(4, "Katz's Delicatessen")).unwrap();
      assert!(store.get_all::<Review>().is_err());
    }

    let store = SqliteStore::open(&path, SCHEMA_VERSION, schema::migrate).unwrap();
    let kept: Restaurant = store.get("4").unwrap();
    assert_eq!(kept.name, "Katz's Delicatessen");
    assert!(store.get_all::<Review>().unwrap().is_empty());
    assert!(store.registered_tasks().unwrap().is_empty());
  }

  #[test]
  fn test_migration_runs_only_on_upgrade() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    SqliteStore::open(&path, SCHEMA_VERSION, schema::migrate).unwrap();

    let mut called = false;
    SqliteStore::open(&path, SCHEMA_VERSION, |_| {
      called = true;
      Ok(())
    })
    .unwrap();
    assert!(!called);
  }

  #[test]
  fn test_newer_schema_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    SqliteStore::open(&path, SCHEMA_VERSION + 1, schema::migrate).unwrap();
    let err = SqliteStore::open(&path, SCHEMA_VERSION, schema::migrate)
      .err()
      .unwrap();
    assert!(matches!(err, Error::StoreUnavailable(_)));
  }

  #[test]
  fn test_unavailable_store_fails_every_call() {
    let store = UnavailableStore::new("no persistence backend");
    assert!(matches!(
      store.get_all::<Restaurant>(),
      Err(Error::StoreUnavailable(_))
    ));
    assert!(store.put_one(&restaurant(1, "A")).is_err());
    assert!(store.register_task("sync-reviews").is_err());
  }
}
