//! Remote data gateway: the REST API the local store mirrors.

mod client;

pub use client::HttpGateway;

use async_trait::async_trait;

use crate::data::{NewReview, Restaurant, Review, ReviewUpdate};
use crate::error::Result;
use crate::store::Record;

/// Stateless access to the remote API.
///
/// Every call is one request. Failures are `Transport`, `Status` or `Payload`
/// errors, all of which are retryable.
#[async_trait]
pub trait Gateway: Send + Sync {
  /// GET `/{collection}`
  async fn fetch_collection<T: Record>(&self) -> Result<Vec<T>>;

  /// GET `/reviews/{id}`; `None` when the server no longer has it
  async fn fetch_review(&self, id: i64) -> Result<Option<Review>>;

  /// POST `/reviews`
  async fn create_review(&self, review: &NewReview) -> Result<Review>;

  /// PUT `/reviews/{id}`
  async fn update_review(&self, id: i64, fields: &ReviewUpdate) -> Result<Review>;

  /// PUT `/restaurants/{id}?is_favorite={flag}`
  async fn set_favorite(&self, restaurant_id: i64, flag: bool) -> Result<Restaurant>;
}
