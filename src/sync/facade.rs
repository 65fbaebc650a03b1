//! Sync cache façade: local store first, gateway on a miss, writes queued while offline.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::connectivity::ConnectivityGate;
use super::queue::{FlushReport, ReviewQueue};
use crate::config::EmptyCollectionPolicy;
use crate::data::{Cuisine, Filter, Neighborhood, NewReview, Restaurant, Review, ReviewId, ReviewUpdate};
use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::store::{Collection, LocalStore, Record};

/// The sync task tag the façade acts on.
pub const SYNC_REVIEWS: &str = "sync-reviews";

/// Published whenever the server confirms something the views may be showing.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
  /// A queued review reached the server and got its real id.
  ReviewConfirmed { previous: ReviewId, review: Review },
  ReviewUpdated(Review),
  FavoriteConfirmed(Restaurant),
  /// A background sync task was registered and is waiting to fire.
  TaskRegistered(String),
}

/// Result of a favorite change. The restaurant always carries the local value;
/// `warning` is set when the server could not be told.
#[derive(Debug)]
pub struct FavoriteUpdate {
  pub restaurant: Restaurant,
  pub warning: Option<Error>,
}

/// What happened to a submitted review.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
  /// Stored locally; the sync task will deliver it.
  Deferred(Review),
  /// The server accepted it right away.
  Confirmed(Review),
  /// Delivery failed; it stays queued for the next flush.
  Queued(Review),
}

impl Submission {
  pub fn review(&self) -> &Review {
    match self {
      Submission::Deferred(r) | Submission::Confirmed(r) | Submission::Queued(r) => r,
    }
  }
}

/// Single access point for reads and writes, mediating between the local store
/// and the gateway.
pub struct SyncCache<S: LocalStore, G: Gateway> {
  store: Arc<S>,
  gateway: Arc<G>,
  empty_collection: EmptyCollectionPolicy,
  background_sync: bool,
  connectivity: Arc<ConnectivityGate>,
  queue: Arc<ReviewQueue>,
  events: broadcast::Sender<SyncEvent>,
}

impl<S: LocalStore, G: Gateway> Clone for SyncCache<S, G> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      gateway: Arc::clone(&self.gateway),
      empty_collection: self.empty_collection,
      background_sync: self.background_sync,
      connectivity: Arc::clone(&self.connectivity),
      queue: Arc::clone(&self.queue),
      events: self.events.clone(),
    }
  }
}

impl<S: LocalStore, G: Gateway> SyncCache<S, G> {
  pub fn new(store: Arc<S>, gateway: Arc<G>) -> Self {
    let (events, _) = broadcast::channel(64);
    Self {
      store,
      gateway,
      empty_collection: EmptyCollectionPolicy::default(),
      background_sync: false,
      connectivity: Arc::new(ConnectivityGate::new(true)),
      queue: Arc::new(ReviewQueue::new()),
      events,
    }
  }

  pub fn with_empty_collection(mut self, policy: EmptyCollectionPolicy) -> Self {
    self.empty_collection = policy;
    self
  }

  /// Defer review delivery to the `sync-reviews` task instead of posting at once.
  pub fn with_background_sync(mut self, enabled: bool) -> Self {
    self.background_sync = enabled;
    self
  }

  /// Whether the process was online at startup, see `on_connectivity_restored`.
  pub fn started_online(mut self, online: bool) -> Self {
    self.connectivity = Arc::new(ConnectivityGate::new(online));
    self
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
    self.events.subscribe()
  }

  fn publish(&self, event: SyncEvent) {
    // Nobody listening is fine
    let _ = self.events.send(event);
  }

  // --- Reads ---

  /// Read a whole collection: local store first, gateway on a miss.
  ///
  /// Gateway results are written back before being returned. When the gateway
  /// fails the caller gets `DataUnavailable`, never stale or partial data.
  pub async fn fetch<T: Record>(&self) -> Result<Vec<T>> {
    let collection = T::COLLECTION;

    match self.store.get_all::<T>() {
      Ok(records) if !records.is_empty() => {
        debug!(%collection, count = records.len(), "served from local store");
        return Ok(records);
      }
      Ok(_) if self.trusts_empty(collection) => {
        debug!(%collection, "empty collection already fetched, trusting it");
        return Ok(Vec::new());
      }
      Ok(_) => debug!(%collection, "local collection empty, asking server"),
      Err(e) => warn!(%collection, error = %e, "local store read failed, asking server"),
    }

    let fresh = self
      .gateway
      .fetch_collection::<T>()
      .await
      .map_err(|e| Error::unavailable(collection, e))?;
    debug!(%collection, count = fresh.len(), "fetched from server");

    self.write_back(&fresh);
    Ok(fresh)
  }

  fn trusts_empty(&self, collection: Collection) -> bool {
    self.empty_collection == EmptyCollectionPolicy::Trust
      && matches!(self.store.fetched_at(collection), Ok(Some(_)))
  }

  fn write_back<T: Record>(&self, records: &[T]) {
    let result = self
      .store
      .put(records)
      .and_then(|_| self.store.mark_fetched(T::COLLECTION));
    if let Err(e) = result {
      warn!(collection = %T::COLLECTION, error = %e, "failed to mirror server data locally");
    }
  }

  pub async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>> {
    self.fetch().await
  }

  pub async fn fetch_neighborhoods(&self) -> Result<Vec<Neighborhood>> {
    self.fetch().await
  }

  pub async fn fetch_cuisines(&self) -> Result<Vec<Cuisine>> {
    self.fetch().await
  }

  pub async fn fetch_reviews(&self) -> Result<Vec<Review>> {
    self.fetch().await
  }

  pub async fn fetch_restaurant(&self, id: i64) -> Result<Restaurant> {
    self
      .fetch_restaurants()
      .await?
      .into_iter()
      .find(|r| r.id == id)
      .ok_or_else(|| Error::not_found(Collection::Restaurants, id))
  }

  pub async fn fetch_neighborhood(&self, id: i64) -> Result<Neighborhood> {
    self
      .fetch_neighborhoods()
      .await?
      .into_iter()
      .find(|n| n.id == id)
      .ok_or_else(|| Error::not_found(Collection::Neighborhoods, id))
  }

  pub async fn fetch_cuisine(&self, id: i64) -> Result<Cuisine> {
    self
      .fetch_cuisines()
      .await?
      .into_iter()
      .find(|c| c.id == id)
      .ok_or_else(|| Error::not_found(Collection::Cuisines, id))
  }

  /// Reviews of one restaurant, queued ones included, oldest first.
  pub async fn fetch_reviews_for(&self, restaurant_id: i64) -> Result<Vec<Review>> {
    let mut reviews: Vec<Review> = self
      .fetch_reviews()
      .await?
      .into_iter()
      .filter(|r| r.restaurant_id == restaurant_id)
      .collect();
    reviews.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(reviews)
  }

  /// Restaurants matching both filters, ordered by id.
  pub async fn filter_by_cuisine_and_neighborhood(
    &self,
    cuisine: Filter,
    neighborhood: Filter,
  ) -> Result<Vec<Restaurant>> {
    let mut restaurants: Vec<Restaurant> = self
      .fetch_restaurants()
      .await?
      .into_iter()
      .filter(|r| cuisine.matches(r.cuisine_type_id) && neighborhood.matches(r.neighborhood_type_id))
      .collect();
    restaurants.sort_by_key(|r| r.id);
    Ok(restaurants)
  }

  // --- Favorites ---

  async fn current_restaurant(&self, id: i64) -> Result<Restaurant> {
    match self.store.get::<Restaurant>(&id.to_string()) {
      Ok(restaurant) => Ok(restaurant),
      Err(_) => self.fetch_restaurant(id).await,
    }
  }

  /// Flip the favorite flag of a restaurant.
  pub async fn toggle_favorite(&self, restaurant_id: i64) -> Result<FavoriteUpdate> {
    let restaurant = self.current_restaurant(restaurant_id).await?;
    let flag = !restaurant.is_favorite;
    self.apply_favorite(restaurant, flag).await
  }

  pub async fn set_favorite(&self, restaurant_id: i64, flag: bool) -> Result<FavoriteUpdate> {
    let restaurant = self.current_restaurant(restaurant_id).await?;
    self.apply_favorite(restaurant, flag).await
  }

  /// Store the flag locally, then tell the server. A server failure keeps the
  /// local value and comes back as a warning.
  async fn apply_favorite(&self, mut restaurant: Restaurant, flag: bool) -> Result<FavoriteUpdate> {
    restaurant.is_favorite = flag;
    if let Err(e) = self.store.put_one(&restaurant) {
      warn!(restaurant = restaurant.id, error = %e, "failed to store favorite locally");
    }

    match self.gateway.set_favorite(restaurant.id, flag).await {
      Ok(confirmed) => {
        if confirmed.is_favorite != flag {
          info!(
            restaurant = confirmed.id,
            is_favorite = confirmed.is_favorite,
            "server disagrees on favorite, taking its value"
          );
        }
        if let Err(e) = self.store.put_one(&confirmed) {
          warn!(restaurant = confirmed.id, error = %e, "failed to store confirmed favorite");
        }
        self.publish(SyncEvent::FavoriteConfirmed(confirmed.clone()));
        Ok(FavoriteUpdate {
          restaurant: confirmed,
          warning: None,
        })
      }
      Err(e) => {
        warn!(restaurant = restaurant.id, error = %e, "favorite not confirmed, keeping local value");
        Ok(FavoriteUpdate {
          restaurant,
          warning: Some(e),
        })
      }
    }
  }

  // --- Reviews ---

  /// Store a review locally and get it to the server, now or later.
  ///
  /// Only validation fails the call; delivery problems leave the review queued.
  pub async fn submit_review(&self, review: NewReview) -> Result<Submission> {
    review.validate()?;

    let pending = Review::pending(&review);
    if let Err(e) = self.store.put_one(&pending) {
      warn!(error = %e, "failed to store review locally");
    }

    let _delivery = self.queue.exclusive().await;
    if self.background_sync {
      match self.register_sync() {
        Ok(()) => {
          debug!(review = %pending.id, "review deferred to background sync");
          return Ok(Submission::Deferred(pending));
        }
        Err(e) => warn!(error = %e, "cannot register background sync, delivering now"),
      }
    }

    match self.gateway.create_review(&review).await {
      Ok(confirmed) => {
        self.confirm(pending.id, confirmed.clone());
        Ok(Submission::Confirmed(confirmed))
      }
      Err(e) => {
        warn!(review = %pending.id, error = %e, "review delivery failed, queued for later");
        Ok(Submission::Queued(pending))
      }
    }
  }

  fn confirm(&self, previous: ReviewId, review: Review) {
    if let Err(e) = self.store.replace(&previous.to_string(), &review) {
      warn!(review = %previous, error = %e, "failed to store confirmed review");
    }
    self.publish(SyncEvent::ReviewConfirmed { previous, review });
  }

  /// Register `sync-reviews` and announce it. Callers hold the delivery lock.
  fn register_sync(&self) -> Result<()> {
    self.store.register_task(SYNC_REVIEWS)?;
    self.publish(SyncEvent::TaskRegistered(SYNC_REVIEWS.to_string()));
    Ok(())
  }

  async fn current_review(&self, id: &ReviewId) -> Result<Review> {
    match self.store.get::<Review>(&id.to_string()) {
      Ok(review) => Ok(review),
      Err(_) => self
        .fetch_reviews()
        .await?
        .into_iter()
        .find(|r| &r.id == id)
        .ok_or_else(|| Error::not_found(Collection::Reviews, id)),
    }
  }

  /// Change a review's fields.
  ///
  /// A queued review is edited in place and stays queued. A confirmed one is
  /// stored dirty, sent to the server, and cleaned once it is accepted; if the
  /// server cannot be reached it stays dirty for the next flush.
  pub async fn edit_review(&self, id: &ReviewId, fields: ReviewUpdate) -> Result<Review> {
    fields.validate()?;

    let mut review = self.current_review(id).await?;
    review.apply(&fields);

    let server_id = match review.id {
      ReviewId::Pending(_) => {
        if let Err(e) = self.store.put_one(&review) {
          warn!(review = %review.id, error = %e, "failed to store edited review");
        }
        return Ok(review);
      }
      ReviewId::Confirmed(server_id) => server_id,
    };

    review.dirty = true;
    if let Err(e) = self.store.put_one(&review) {
      warn!(review = server_id, error = %e, "failed to store edited review");
    }

    let _delivery = self.queue.exclusive().await;
    match self.gateway.update_review(server_id, &fields).await {
      Ok(updated) => {
        if let Err(e) = self.store.put_one(&updated) {
          warn!(review = server_id, error = %e, "failed to store updated review");
        }
        self.publish(SyncEvent::ReviewUpdated(updated.clone()));
        Ok(updated)
      }
      Err(e) => {
        warn!(review = server_id, error = %e, "review update failed, queued for later");
        if self.background_sync {
          if let Err(e) = self.register_sync() {
            warn!(error = %e, "cannot register background sync");
          }
        }
        Ok(review)
      }
    }
  }

  /// Reviews still waiting for the server.
  pub fn queued_reviews(&self) -> Result<Vec<Review>> {
    ReviewQueue::pending(&*self.store)
  }

  // --- Signals ---

  /// Deliver every queued review. An empty queue costs nothing.
  pub async fn flush_queued_reviews(&self) -> Result<FlushReport> {
    let report = self.queue.flush(&*self.store, &*self.gateway).await?;
    for confirmation in &report.confirmed {
      self.publish(SyncEvent::ReviewConfirmed {
        previous: confirmation.previous.clone(),
        review: confirmation.review.clone(),
      });
    }
    Ok(report)
  }

  /// The network came back. Flushes, except for the initial online signal of a
  /// process that started online.
  pub async fn on_connectivity_restored(&self) -> Result<Option<FlushReport>> {
    if !self.connectivity.admit() {
      debug!("ignoring initial online signal");
      return Ok(None);
    }
    info!("connectivity restored, flushing review queue");
    self.flush_queued_reviews().await.map(Some)
  }

  /// A named background task fired. Only `sync-reviews` is acted on; its
  /// registration is dropped once nothing is left queued.
  pub async fn on_sync_signal(&self, tag: &str) -> Result<Option<FlushReport>> {
    if tag != SYNC_REVIEWS {
      debug!(tag, "ignoring unknown sync tag");
      return Ok(None);
    }

    let report = self.flush_queued_reviews().await?;
    if report.still_pending == 0 {
      // Registrations take the same lock, so a review deferred after the
      // flush's snapshot shows up here and keeps the task
      let _delivery = self.queue.exclusive().await;
      if self.queued_reviews()?.is_empty() {
        if let Err(e) = self.store.unregister_task(SYNC_REVIEWS) {
          warn!(error = %e, "failed to unregister sync task");
        }
      } else {
        debug!("reviews deferred during the flush, keeping sync task");
      }
    }
    Ok(Some(report))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::{SqliteStore, UnavailableStore};
  use crate::sync::testing::{restaurant_json, ScriptedGateway};
  use std::time::Duration;

  type TestCache = SyncCache<SqliteStore, ScriptedGateway>;

  fn setup(gateway: ScriptedGateway) -> (TestCache, Arc<SqliteStore>, Arc<ScriptedGateway>) {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let gateway = Arc::new(gateway);
    let cache = SyncCache::new(Arc::clone(&store), Arc::clone(&gateway));
    (cache, store, gateway)
  }

  fn bob() -> NewReview {
    NewReview {
      restaurant_id: 1,
      name: "Bob".to_string(),
      rating: 5,
      comments: "Great".to_string(),
    }
  }

  #[tokio::test]
  async fn test_gateway_result_written_back() {
    let gateway = ScriptedGateway::new().with(
      Collection::Restaurants,
      vec![serde_json::json!({
        "id": 1,
        "name": "A",
        "latlng": { "lat": 0.0, "lng": 0.0 }
      })],
    );
    let (cache, store, _) = setup(gateway);

    let fetched = cache.fetch_restaurants().await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].name, "A");

    let stored: Vec<Restaurant> = store.get_all().unwrap();
    assert_eq!(stored, fetched);
  }

  #[tokio::test]
  async fn test_local_hit_skips_gateway() {
    let (cache, _, gateway) = setup(ScriptedGateway::fixture());

    cache.fetch_restaurants().await.unwrap();
    cache.fetch_cuisines().await.unwrap();
    assert_eq!(gateway.calls().len(), 2);

    let again = cache.fetch_restaurants().await.unwrap();
    cache.fetch_cuisines().await.unwrap();
    assert_eq!(again.len(), 3);
    assert_eq!(gateway.calls().len(), 2);
  }

  #[tokio::test]
  async fn test_cached_data_survives_going_offline() {
    let (cache, _, gateway) = setup(ScriptedGateway::fixture());
    cache.fetch_neighborhoods().await.unwrap();

    gateway.set_online(false);
    let neighborhoods = cache.fetch_neighborhoods().await.unwrap();
    assert_eq!(neighborhoods.len(), 2);
  }

  #[tokio::test]
  async fn test_offline_miss_is_data_unavailable() {
    let (cache, store, gateway) = setup(ScriptedGateway::fixture());
    gateway.set_online(false);

    let err = cache.fetch_cuisines().await.unwrap_err();
    match err {
      Error::DataUnavailable { collection, source } => {
        assert_eq!(collection, Collection::Cuisines);
        assert!(matches!(*source, Error::Transport(_)));
      }
      other => panic!("unexpected error: {:?}", other),
    }
    assert!(store.get_all::<Cuisine>().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_empty_collection_is_a_miss_by_default() {
    let gateway = ScriptedGateway::new().with(Collection::Cuisines, vec![]);
    let (cache, _, gateway) = setup(gateway);

    assert!(cache.fetch_cuisines().await.unwrap().is_empty());
    assert!(cache.fetch_cuisines().await.unwrap().is_empty());
    assert_eq!(gateway.count("GET /cuisines"), 2);
  }

  #[tokio::test]
  async fn test_trusted_empty_collection_is_a_hit() {
    let gateway = ScriptedGateway::new().with(Collection::Cuisines, vec![]);
    let (cache, _, gateway) = setup(gateway);
    let cache = cache.with_empty_collection(EmptyCollectionPolicy::Trust);

    assert!(cache.fetch_cuisines().await.unwrap().is_empty());
    assert!(cache.fetch_cuisines().await.unwrap().is_empty());
    assert_eq!(gateway.count("GET /cuisines"), 1);
  }

  #[tokio::test]
  async fn test_unavailable_store_degrades_to_network() {
    let gateway = Arc::new(ScriptedGateway::fixture());
    let cache = SyncCache::new(
      Arc::new(UnavailableStore::new("no backend")),
      Arc::clone(&gateway),
    );

    assert_eq!(cache.fetch_restaurants().await.unwrap().len(), 3);
    assert_eq!(cache.fetch_restaurants().await.unwrap().len(), 3);
    assert_eq!(gateway.count("GET /restaurants"), 2);

    let submission = cache.submit_review(bob()).await.unwrap();
    assert!(matches!(submission, Submission::Confirmed(_)));
  }

  #[tokio::test]
  async fn test_lookup_by_id() {
    let (cache, _, _) = setup(ScriptedGateway::fixture());

    assert_eq!(cache.fetch_restaurant(2).await.unwrap().name, "Emily");
    assert_eq!(cache.fetch_neighborhood(2).await.unwrap().name, "Brooklyn");
    assert_eq!(cache.fetch_cuisine(1).await.unwrap().name, "Asian");
    assert!(matches!(
      cache.fetch_restaurant(42).await,
      Err(Error::NotFound {
        collection: Collection::Restaurants,
        ..
      })
    ));
  }

  #[tokio::test]
  async fn test_filter_combination() {
    let (cache, _, _) = setup(ScriptedGateway::fixture());
    let ids = |rs: Vec<Restaurant>| rs.into_iter().map(|r| r.id).collect::<Vec<_>>();

    let all = cache
      .filter_by_cuisine_and_neighborhood(Filter::Any, Filter::Any)
      .await
      .unwrap();
    assert_eq!(ids(all), vec![1, 2, 3]);

    let pizza = cache
      .filter_by_cuisine_and_neighborhood(Filter::Only(2), Filter::Any)
      .await
      .unwrap();
    assert_eq!(ids(pizza), vec![2, 3]);

    let manhattan = cache
      .filter_by_cuisine_and_neighborhood(Filter::Any, Filter::Only(1))
      .await
      .unwrap();
    assert_eq!(ids(manhattan), vec![1, 3]);

    let both = cache
      .filter_by_cuisine_and_neighborhood(Filter::from(2), Filter::from(1))
      .await
      .unwrap();
    assert_eq!(ids(both), vec![3]);
  }

  #[tokio::test]
  async fn test_favorite_kept_when_server_unreachable() {
    let (cache, store, gateway) = setup(ScriptedGateway::fixture());
    cache.fetch_restaurants().await.unwrap();
    gateway.set_online(false);

    let update = cache.toggle_favorite(1).await.unwrap();
    assert!(update.restaurant.is_favorite);
    assert!(matches!(update.warning, Some(Error::Transport(_))));

    let stored: Restaurant = store.get("1").unwrap();
    assert!(stored.is_favorite);
    let read = cache.fetch_restaurant(1).await.unwrap();
    assert!(read.is_favorite);
  }

  #[tokio::test]
  async fn test_favorite_confirmed_by_server() {
    let (cache, store, gateway) = setup(ScriptedGateway::fixture());
    let mut events = cache.subscribe();

    let update = cache.set_favorite(2, true).await.unwrap();
    assert!(update.warning.is_none());
    assert!(update.restaurant.is_favorite);
    assert_eq!(gateway.count("PUT /restaurants/2?is_favorite=true"), 1);
    assert!(store.get::<Restaurant>("2").unwrap().is_favorite);
    assert!(matches!(
      events.recv().await.unwrap(),
      SyncEvent::FavoriteConfirmed(r) if r.id == 2
    ));
  }

  #[tokio::test]
  async fn test_server_favorite_value_wins() {
    let (cache, store, _) = setup(ScriptedGateway::fixture().with_favorite_override(false));

    let update = cache.toggle_favorite(3).await.unwrap();
    assert!(!update.restaurant.is_favorite);
    assert!(!store.get::<Restaurant>("3").unwrap().is_favorite);
  }

  #[tokio::test]
  async fn test_invalid_review_rejected_without_io() {
    let (cache, store, gateway) = setup(ScriptedGateway::fixture());

    let review = NewReview {
      comments: String::new(),
      ..bob()
    };
    assert!(matches!(
      cache.submit_review(review).await,
      Err(Error::Validation(_))
    ));
    assert!(gateway.calls().is_empty());
    assert!(store.get_all::<Review>().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_review_confirmed_immediately_when_online() {
    let (cache, store, gateway) = setup(ScriptedGateway::fixture());
    let mut events = cache.subscribe();

    let submission = cache.submit_review(bob()).await.unwrap();
    let Submission::Confirmed(review) = submission else {
      panic!("expected confirmation, got {:?}", submission);
    };
    assert_eq!(review.id, ReviewId::Confirmed(100));

    let stored: Vec<Review> = store.get_all().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, ReviewId::Confirmed(100));
    assert_eq!(gateway.count("POST /reviews"), 1);
    assert!(matches!(
      events.recv().await.unwrap(),
      SyncEvent::ReviewConfirmed { previous, .. } if previous.is_pending()
    ));
  }

  #[tokio::test]
  async fn test_offline_review_flushed_later_without_duplicate() {
    let (cache, store, gateway) = setup(ScriptedGateway::fixture());
    cache.fetch_restaurants().await.unwrap();
    gateway.set_online(false);

    let submission = cache.submit_review(bob()).await.unwrap();
    let Submission::Queued(pending) = submission else {
      panic!("expected queued review, got {:?}", submission);
    };
    assert!(pending.id.is_pending());
    assert_eq!(gateway.count("POST /reviews"), 1);

    let visible = cache.fetch_reviews_for(1).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, pending.id);

    gateway.set_online(true);
    let report = cache.flush_queued_reviews().await.unwrap();
    assert_eq!(report.confirmed.len(), 1);
    assert_eq!(report.still_pending, 0);
    assert_eq!(report.confirmed[0].previous, pending.id);

    let stored: Vec<Review> = store.get_all().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, ReviewId::Confirmed(100));
    assert_eq!(stored[0].comments, "Great");
    assert_eq!(gateway.server_reviews().len(), 2);

    // Nothing left to send
    let calls = gateway.calls().len();
    let report = cache.flush_queued_reviews().await.unwrap();
    assert!(report.is_empty());
    assert_eq!(gateway.calls().len(), calls);
  }

  #[tokio::test]
  async fn test_empty_flush_is_a_noop() {
    let (cache, _, gateway) = setup(ScriptedGateway::fixture());
    let report = cache.flush_queued_reviews().await.unwrap();
    assert!(report.is_empty());
    assert!(gateway.calls().is_empty());
  }

  #[tokio::test]
  async fn test_failed_flush_keeps_review_queued() {
    let (cache, _, gateway) = setup(ScriptedGateway::fixture());
    gateway.set_online(false);
    cache.submit_review(bob()).await.unwrap();
    cache
      .submit_review(NewReview {
        name: "Alice".to_string(),
        ..bob()
      })
      .await
      .unwrap();

    let report = cache.flush_queued_reviews().await.unwrap();
    assert!(report.confirmed.is_empty());
    assert_eq!(report.still_pending, 2);
    assert_eq!(cache.queued_reviews().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn test_concurrent_flushes_submit_once() {
    let gateway = ScriptedGateway::fixture().with_latency(Duration::from_millis(20));
    let (cache, store, gateway) = setup(gateway);
    gateway.set_online(false);
    cache.submit_review(bob()).await.unwrap();
    gateway.set_online(true);

    let (a, b) = tokio::join!(cache.flush_queued_reviews(), cache.flush_queued_reviews());
    let confirmed = a.unwrap().confirmed.len() + b.unwrap().confirmed.len();
    assert_eq!(confirmed, 1);
    assert_eq!(gateway.count("POST /reviews"), 2);
    assert_eq!(store.get_all::<Review>().unwrap().len(), 1);
    assert_eq!(gateway.server_reviews().len(), 2);
  }

  #[tokio::test]
  async fn test_review_for_missing_restaurant_stays_queued() {
    let (cache, _, gateway) = setup(ScriptedGateway::fixture());
    cache.fetch_restaurants().await.unwrap();
    gateway.set_online(false);
    cache
      .submit_review(NewReview {
        restaurant_id: 99,
        ..bob()
      })
      .await
      .unwrap();
    gateway.set_online(true);

    let report = cache.flush_queued_reviews().await.unwrap();
    assert!(report.confirmed.is_empty());
    assert_eq!(report.still_pending, 1);
    assert_eq!(gateway.count("POST /reviews"), 1);
  }

  #[tokio::test]
  async fn test_background_sync_defers_delivery() {
    let (cache, store, gateway) = setup(ScriptedGateway::fixture());
    let cache = cache.with_background_sync(true);

    let submission = cache.submit_review(bob()).await.unwrap();
    assert!(matches!(submission, Submission::Deferred(_)));
    assert!(gateway.calls().is_empty());
    assert_eq!(store.registered_tasks().unwrap(), vec![SYNC_REVIEWS]);

    assert!(cache.on_sync_signal("sync-images").await.unwrap().is_none());
    assert!(gateway.calls().is_empty());

    let report = cache.on_sync_signal(SYNC_REVIEWS).await.unwrap().unwrap();
    assert_eq!(report.confirmed.len(), 1);
    assert!(store.registered_tasks().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_deferred_review_announces_registration() {
    let (cache, _, _) = setup(ScriptedGateway::fixture());
    let cache = cache.with_background_sync(true);
    let mut events = cache.subscribe();

    cache.submit_review(bob()).await.unwrap();
    assert_eq!(
      events.recv().await.unwrap(),
      SyncEvent::TaskRegistered(SYNC_REVIEWS.to_string())
    );
  }

  #[tokio::test]
  async fn test_review_deferred_during_sync_keeps_task() {
    let gateway = ScriptedGateway::fixture().with_latency(Duration::from_millis(40));
    let (cache, store, gateway) = setup(gateway);
    let cache = cache.with_background_sync(true);
    cache.submit_review(bob()).await.unwrap();

    let late = async {
      tokio::time::sleep(Duration::from_millis(10)).await;
      cache
        .submit_review(NewReview {
          name: "Alice".to_string(),
          ..bob()
        })
        .await
    };
    let (report, late) = tokio::join!(cache.on_sync_signal(SYNC_REVIEWS), late);

    assert_eq!(report.unwrap().unwrap().confirmed.len(), 1);
    assert!(matches!(late.unwrap(), Submission::Deferred(_)));
    assert_eq!(gateway.count("POST /reviews"), 1);
    assert_eq!(cache.queued_reviews().unwrap().len(), 1);
    assert_eq!(store.registered_tasks().unwrap(), vec![SYNC_REVIEWS]);
  }

  #[tokio::test]
  async fn test_sync_task_kept_while_reviews_pending() {
    let (cache, store, gateway) = setup(ScriptedGateway::fixture());
    let cache = cache.with_background_sync(true);
    cache.submit_review(bob()).await.unwrap();

    gateway.set_online(false);
    let report = cache.on_sync_signal(SYNC_REVIEWS).await.unwrap().unwrap();
    assert_eq!(report.still_pending, 1);
    assert_eq!(store.registered_tasks().unwrap(), vec![SYNC_REVIEWS]);
  }

  #[tokio::test]
  async fn test_initial_online_signal_ignored() {
    let (cache, _, gateway) = setup(ScriptedGateway::fixture());
    let cache = cache.started_online(true);
    gateway.set_online(false);
    cache.submit_review(bob()).await.unwrap();
    gateway.set_online(true);
    let posts = gateway.count("POST /reviews");

    assert!(cache.on_connectivity_restored().await.unwrap().is_none());
    assert_eq!(gateway.count("POST /reviews"), posts);

    let report = cache.on_connectivity_restored().await.unwrap().unwrap();
    assert_eq!(report.confirmed.len(), 1);
  }

  #[tokio::test]
  async fn test_started_offline_flushes_on_first_signal() {
    let (cache, _, gateway) = setup(ScriptedGateway::fixture());
    let cache = cache.started_online(false);
    gateway.set_online(false);
    cache.submit_review(bob()).await.unwrap();
    gateway.set_online(true);

    let report = cache.on_connectivity_restored().await.unwrap().unwrap();
    assert_eq!(report.confirmed.len(), 1);
  }

  #[tokio::test]
  async fn test_edit_confirmed_review_online() {
    let (cache, store, gateway) = setup(ScriptedGateway::fixture());
    cache.fetch_reviews().await.unwrap();

    let fields = ReviewUpdate {
      name: "Steve".to_string(),
      rating: 2,
      comments: "Went downhill.".to_string(),
    };
    let updated = cache
      .edit_review(&ReviewId::Confirmed(1), fields)
      .await
      .unwrap();
    assert_eq!(updated.rating, 2);
    assert!(!updated.dirty);
    assert_eq!(gateway.count("PUT /reviews/1"), 1);
    assert!(!store.get::<Review>("1").unwrap().dirty);
  }

  #[tokio::test]
  async fn test_offline_edit_replayed_on_flush() {
    let (cache, store, gateway) = setup(ScriptedGateway::fixture());
    cache.fetch_restaurants().await.unwrap();
    cache.fetch_reviews().await.unwrap();
    gateway.set_online(false);

    let fields = ReviewUpdate {
      name: "Steve".to_string(),
      rating: 3,
      comments: "Fine.".to_string(),
    };
    let edited = cache
      .edit_review(&ReviewId::Confirmed(1), fields)
      .await
      .unwrap();
    assert!(edited.dirty);
    assert_eq!(cache.queued_reviews().unwrap().len(), 1);

    gateway.set_online(true);
    let report = cache.flush_queued_reviews().await.unwrap();
    assert_eq!(report.confirmed.len(), 1);
    assert_eq!(gateway.count("GET /reviews/1"), 1);
    assert_eq!(gateway.count("PUT /reviews/1"), 2);

    let stored: Review = store.get("1").unwrap();
    assert!(!stored.dirty);
    assert_eq!(stored.comments, "Fine.");
    assert_eq!(gateway.server_reviews()[0].rating, 3);
  }

  #[tokio::test]
  async fn test_edited_review_recreated_when_gone_from_server() {
    let (cache, store, gateway) = setup(ScriptedGateway::fixture());
    cache.fetch_restaurants().await.unwrap();
    cache.fetch_reviews().await.unwrap();
    gateway.set_online(false);
    cache
      .edit_review(
        &ReviewId::Confirmed(1),
        ReviewUpdate {
          name: "Steve".to_string(),
          rating: 1,
          comments: "Closed?".to_string(),
        },
      )
      .await
      .unwrap();

    gateway.set_online(true);
    gateway.remove(Collection::Reviews, 1);
    let report = cache.flush_queued_reviews().await.unwrap();
    assert_eq!(report.confirmed.len(), 1);
    assert_eq!(report.confirmed[0].review.id, ReviewId::Confirmed(100));

    let stored: Vec<Review> = store.get_all().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, ReviewId::Confirmed(100));
  }

  #[tokio::test]
  async fn test_edit_queued_review_stays_queued() {
    let (cache, _, gateway) = setup(ScriptedGateway::fixture());
    gateway.set_online(false);
    let pending = cache.submit_review(bob()).await.unwrap().review().clone();

    let edited = cache
      .edit_review(
        &pending.id,
        ReviewUpdate {
          name: "Bob".to_string(),
          rating: 4,
          comments: "Good, actually".to_string(),
        },
      )
      .await
      .unwrap();
    assert_eq!(edited.id, pending.id);

    let queued = cache.queued_reviews().unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].rating, 4);
    assert_eq!(gateway.count("PUT /reviews"), 0);
  }

  #[tokio::test]
  async fn test_restaurant_fetched_for_favorite_when_not_cached() {
    let gateway = ScriptedGateway::new().with(
      Collection::Restaurants,
      vec![restaurant_json(7, "Casa Enrique", 3, 3)],
    );
    let (cache, store, gateway) = setup(gateway);

    let update = cache.toggle_favorite(7).await.unwrap();
    assert!(update.restaurant.is_favorite);
    assert_eq!(gateway.count("GET /restaurants"), 1);
    assert!(store.get::<Restaurant>("7").unwrap().is_favorite);
  }
}
