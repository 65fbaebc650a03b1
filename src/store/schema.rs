//! Versioned, additive schema for the local store.
//!
//! The schema version lives in SQLite's `user_version` header field. Opening the
//! store with a higher version runs the migration callback once, inside a
//! transaction, with the version found on disk.

use rusqlite::Transaction;

use super::record::Collection;
use crate::error::Result;

/// Current schema version.
///
/// 1: restaurants, neighborhoods, cuisines
/// 2: reviews
/// 3: sync task registry and collection fetch markers
pub const SCHEMA_VERSION: u32 = 3;

const SYNC_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sync_tasks (
    tag TEXT PRIMARY KEY,
    registered_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS collection_state (
    collection TEXT PRIMARY KEY,
    fetched_at TEXT NOT NULL
);
"#;

/// Handle passed to migration callbacks.
pub struct Upgrade<'a> {
  tx: &'a Transaction<'a>,
  old_version: u32,
  new_version: u32,
}

impl<'a> Upgrade<'a> {
  pub(super) fn new(tx: &'a Transaction<'a>, old_version: u32, new_version: u32) -> Self {
    Self {
      tx,
      old_version,
      new_version,
    }
  }

  /// Whether the step introduced in `version` has to run.
  pub fn crosses(&self, version: u32) -> bool {
    self.old_version < version && self.new_version >= version
  }

  pub fn has_collection(&self, collection: Collection) -> Result<bool> {
    let count: i64 = self.tx.query_row(
      "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
      [collection.name()],
      |row| row.get(0),
    )?;
    Ok(count > 0)
  }

  /// Create the table backing `collection` if it does not exist yet.
  pub fn create_collection(&self, collection: Collection) -> Result<()> {
    self.tx.execute_batch(&format!(
      "CREATE TABLE IF NOT EXISTS {} (
          record_key TEXT PRIMARY KEY,
          data BLOB NOT NULL,
          cached_at TEXT NOT NULL DEFAULT (datetime('now'))
      );",
      collection.name()
    ))?;
    Ok(())
  }

  pub fn execute_batch(&self, sql: &str) -> Result<()> {
    self.tx.execute_batch(sql)?;
    Ok(())
  }
}

/// Default migration: each step only creates what is missing, so replaying it
/// from any older version never drops data.
pub fn migrate(upgrade: &Upgrade<'_>) -> Result<()> {
  if upgrade.crosses(1) {
    for collection in [
      Collection::Neighborhoods,
      Collection::Cuisines,
      Collection::Restaurants,
    ] {
      if !upgrade.has_collection(collection)? {
        upgrade.create_collection(collection)?;
      }
    }
  }
  if upgrade.crosses(2) && !upgrade.has_collection(Collection::Reviews)? {
    upgrade.create_collection(Collection::Reviews)?;
  }
  if upgrade.crosses(3) {
    upgrade.execute_batch(SYNC_SCHEMA)?;
  }
  Ok(())
}
