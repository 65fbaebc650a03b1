//! Offline write queue.
//!
//! Queued reviews live in the reviews collection next to confirmed ones. A
//! review is queued while its id is a placeholder (never reached the server) or
//! while it is marked dirty (edited locally since the server last saw it).

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::data::{Restaurant, Review, ReviewId};
use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::store::{Collection, LocalStore, Record};

/// A queued review the server has now accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
  /// Key the review was queued under
  pub previous: ReviewId,
  pub review: Review,
}

/// Outcome of one flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
  pub confirmed: Vec<Confirmation>,
  pub still_pending: usize,
}

impl FlushReport {
  pub fn is_empty(&self) -> bool {
    self.confirmed.is_empty() && self.still_pending == 0
  }
}

/// Serializes deliveries so overlapping triggers never submit a review twice.
#[derive(Debug, Default)]
pub struct ReviewQueue {
  delivery: Mutex<()>,
}

impl ReviewQueue {
  pub fn new() -> Self {
    Self::default()
  }

  /// Hold off flushes while delivering a review outside the queue.
  pub async fn exclusive(&self) -> MutexGuard<'_, ()> {
    self.delivery.lock().await
  }

  /// Reviews waiting for the server, oldest first.
  pub fn pending<S: LocalStore>(store: &S) -> Result<Vec<Review>> {
    let mut queued: Vec<Review> = store
      .get_all::<Review>()?
      .into_iter()
      .filter(Review::is_queued)
      .collect();
    queued.sort_by(|a, b| {
      a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.record_key().cmp(&b.record_key()))
    });
    Ok(queued)
  }

  /// Replay every queued review against the gateway.
  ///
  /// Delivered reviews replace their queued record in the store. Failures leave
  /// the record queued for the next trigger; a transport failure ends the run
  /// since the remaining deliveries would fail the same way.
  pub async fn flush<S: LocalStore, G: Gateway>(
    &self,
    store: &S,
    gateway: &G,
  ) -> Result<FlushReport> {
    let _guard = self.delivery.lock().await;

    let queued = Self::pending(store)?;
    if queued.is_empty() {
      debug!("review queue empty, nothing to flush");
      return Ok(FlushReport::default());
    }

    let total = queued.len();
    let mut report = FlushReport::default();
    for (index, review) in queued.into_iter().enumerate() {
      match deliver(store, gateway, &review).await {
        Ok(Some(confirmed)) => {
          if let Err(e) = store.replace(&review.record_key(), &confirmed) {
            warn!(review = %review.id, error = %e, "failed to store confirmed review");
          }
          report.confirmed.push(Confirmation {
            previous: review.id,
            review: confirmed,
          });
        }
        Ok(None) => report.still_pending += 1,
        Err(Error::Transport(reason)) => {
          warn!(review = %review.id, %reason, "server unreachable, stopping flush");
          report.still_pending += total - index;
          break;
        }
        Err(e) => {
          warn!(review = %review.id, error = %e, "review delivery failed, keeping it queued");
          report.still_pending += 1;
        }
      }
    }

    info!(
      confirmed = report.confirmed.len(),
      still_pending = report.still_pending,
      "flushed review queue"
    );
    Ok(report)
  }
}

/// Send one queued review. `Ok(None)` means it must stay queued without an error
/// worth retrying sooner.
async fn deliver<S: LocalStore, G: Gateway>(
  store: &S,
  gateway: &G,
  review: &Review,
) -> Result<Option<Review>> {
  if restaurant_known_absent(store, review.restaurant_id) {
    warn!(
      review = %review.id,
      restaurant_id = review.restaurant_id,
      "restaurant for queued review does not exist, keeping it queued"
    );
    return Ok(None);
  }

  let confirmed = match &review.id {
    ReviewId::Pending(_) => gateway.create_review(&review.to_new()).await?,
    ReviewId::Confirmed(id) => match gateway.fetch_review(*id).await? {
      Some(_) => gateway.update_review(*id, &review.to_update()).await?,
      None => {
        debug!(review = *id, "edited review gone from server, re-creating it");
        gateway.create_review(&review.to_new()).await?
      }
    },
  };
  Ok(Some(confirmed))
}

/// True only when the restaurants collection was fetched and lacks this id.
fn restaurant_known_absent<S: LocalStore>(store: &S, restaurant_id: i64) -> bool {
  match store.get::<Restaurant>(&restaurant_id.to_string()) {
    Err(Error::NotFound { .. }) => matches!(store.fetched_at(Collection::Restaurants), Ok(Some(_))),
    _ => false,
  }
}
