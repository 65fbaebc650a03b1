//! Store bindings for the data types.

use crate::store::{Collection, Record};

use super::types::{Cuisine, Neighborhood, Restaurant, Review};

impl Record for Restaurant {
  const COLLECTION: Collection = Collection::Restaurants;

  fn record_key(&self) -> String {
    self.id.to_string()
  }
}

impl Record for Neighborhood {
  const COLLECTION: Collection = Collection::Neighborhoods;

  fn record_key(&self) -> String {
    self.id.to_string()
  }
}

impl Record for Cuisine {
  const COLLECTION: Collection = Collection::Cuisines;

  fn record_key(&self) -> String {
    self.id.to_string()
  }
}

impl Record for Review {
  const COLLECTION: Collection = Collection::Reviews;

  // Placeholder and server ids never collide: placeholders are not numeric.
  fn record_key(&self) -> String {
    self.id.to_string()
  }
}
