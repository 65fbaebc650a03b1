//! Collections and the trait binding each record type to one of them.

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

/// The closed set of collections kept in the local store and served by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
  Restaurants,
  Neighborhoods,
  Cuisines,
  Reviews,
}

impl Collection {
  pub const ALL: [Collection; 4] = [
    Collection::Restaurants,
    Collection::Neighborhoods,
    Collection::Cuisines,
    Collection::Reviews,
  ];

  /// Name used for the store table and the API path segment.
  pub fn name(self) -> &'static str {
    match self {
      Collection::Restaurants => "restaurants",
      Collection::Neighborhoods => "neighborhoods",
      Collection::Cuisines => "cuisines",
      Collection::Reviews => "reviews",
    }
  }
}

impl fmt::Display for Collection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Trait for entities that live in a collection.
///
/// Implementors provide the key they are stored under. Records are persisted as
/// JSON, so anything the gateway decodes can be written back unchanged.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Collection this record type belongs to
  const COLLECTION: Collection;

  /// Unique key within the collection (the entity id, rendered as text)
  fn record_key(&self) -> String;
}
