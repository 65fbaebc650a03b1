//! In-process gateway double for façade tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::data::{NewReview, Restaurant, Review, ReviewUpdate};
use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::store::{Collection, Record};

#[derive(Default)]
struct State {
  offline: bool,
  collections: HashMap<Collection, Vec<Value>>,
  next_review_id: i64,
  calls: Vec<String>,
  favorite_override: Option<bool>,
}

/// Gateway answering from in-memory JSON, with an offline switch and a call log.
#[derive(Default)]
pub struct ScriptedGateway {
  state: Mutex<State>,
  latency: Option<Duration>,
}

impl ScriptedGateway {
  pub fn new() -> Self {
    let gateway = Self::default();
    gateway.state.lock().unwrap().next_review_id = 100;
    gateway
  }

  /// Three restaurants, two neighborhoods, two cuisines, one review.
  pub fn fixture() -> Self {
    Self::new()
      .with(
        Collection::Restaurants,
        vec![
          restaurant_json(1, "Mission Chinese Food", 1, 1),
          restaurant_json(2, "Emily", 2, 2),
          restaurant_json(3, "Kang Ho Dong Baekjeong", 1, 2),
        ],
      )
      .with(
        Collection::Neighborhoods,
        vec![
          json!({ "id": 1, "name": "Manhattan" }),
          json!({ "id": 2, "name": "Brooklyn" }),
        ],
      )
      .with(
        Collection::Cuisines,
        vec![
          json!({ "id": 1, "name": "Asian" }),
          json!({ "id": 2, "name": "Pizza" }),
        ],
      )
      .with(
        Collection::Reviews,
        vec![json!({
          "id": 1,
          "restaurant_id": 1,
          "name": "Steve",
          "rating": 4,
          "comments": "Mission Chinese Food has grown up.",
          "createdAt": 1504095567183i64,
          "updatedAt": 1504095567183i64
        })],
      )
  }

  pub fn with(self, collection: Collection, values: Vec<Value>) -> Self {
    self.state.lock().unwrap().collections.insert(collection, values);
    self
  }

  /// Delay every call, so concurrent callers actually overlap.
  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = Some(latency);
    self
  }

  /// Answer favorite updates with this flag whatever was asked.
  pub fn with_favorite_override(self, flag: bool) -> Self {
    self.state.lock().unwrap().favorite_override = Some(flag);
    self
  }

  pub fn set_online(&self, online: bool) {
    self.state.lock().unwrap().offline = !online;
  }

  pub fn remove(&self, collection: Collection, id: i64) {
    let mut state = self.state.lock().unwrap();
    if let Some(values) = state.collections.get_mut(&collection) {
      values.retain(|v| v["id"] != json!(id));
    }
  }

  pub fn calls(&self) -> Vec<String> {
    self.state.lock().unwrap().calls.clone()
  }

  pub fn count(&self, prefix: &str) -> usize {
    self
      .state
      .lock()
      .unwrap()
      .calls
      .iter()
      .filter(|c| c.starts_with(prefix))
      .count()
  }

  pub fn server_reviews(&self) -> Vec<Review> {
    let state = self.state.lock().unwrap();
    state
      .collections
      .get(&Collection::Reviews)
      .cloned()
      .unwrap_or_default()
      .into_iter()
      .map(|v| serde_json::from_value(v).unwrap())
      .collect()
  }

  /// Log the call, wait out the latency, then fail if offline.
  async fn enter(&self, call: String) -> Result<()> {
    self.state.lock().unwrap().calls.push(call.clone());
    if let Some(latency) = self.latency {
      tokio::time::sleep(latency).await;
    }
    if self.state.lock().unwrap().offline {
      return Err(Error::Transport(format!("{}: connection refused", call)));
    }
    Ok(())
  }
}

pub fn restaurant_json(id: i64, name: &str, neighborhood: i64, cuisine: i64) -> Value {
  json!({
    "id": id,
    "name": name,
    "neighborhood_type_id": neighborhood,
    "cuisine_type_id": cuisine,
    "photograph": id.to_string(),
    "address": format!("{} Main St", id),
    "latlng": { "lat": 40.7, "lng": -73.9 },
    "operating_hours": { "Monday": "5:30 pm - 11:00 pm" },
    "is_favorite": "false"
  })
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
  serde_json::from_value(value).map_err(|e| Error::Payload {
    url: "scripted".to_string(),
    reason: e.to_string(),
  })
}

fn not_found(path: String) -> Error {
  Error::Status {
    status: 404,
    url: path,
  }
}

#[async_trait]
impl Gateway for ScriptedGateway {
  async fn fetch_collection<T: Record>(&self) -> Result<Vec<T>> {
    self.enter(format!("GET /{}", T::COLLECTION)).await?;
    let values = self
      .state
      .lock()
      .unwrap()
      .collections
      .get(&T::COLLECTION)
      .cloned()
      .unwrap_or_default();
    values.into_iter().map(decode::<T>).collect()
  }

  async fn fetch_review(&self, id: i64) -> Result<Option<Review>> {
    self.enter(format!("GET /reviews/{}", id)).await?;
    let found = self
      .state
      .lock()
      .unwrap()
      .collections
      .get(&Collection::Reviews)
      .and_then(|values| values.iter().find(|v| v["id"] == json!(id)).cloned());
    found.map(decode::<Review>).transpose()
  }

  async fn create_review(&self, review: &NewReview) -> Result<Review> {
    self.enter("POST /reviews".to_string()).await?;
    let mut state = self.state.lock().unwrap();
    let id = state.next_review_id;
    state.next_review_id += 1;
    let now = chrono::Utc::now().timestamp_millis();
    let value = json!({
      "id": id,
      "restaurant_id": review.restaurant_id,
      "name": review.name,
      "rating": review.rating,
      "comments": review.comments,
      "createdAt": now,
      "updatedAt": now
    });
    state
      .collections
      .entry(Collection::Reviews)
      .or_default()
      .push(value.clone());
    decode(value)
  }

  async fn update_review(&self, id: i64, fields: &ReviewUpdate) -> Result<Review> {
    let path = format!("PUT /reviews/{}", id);
    self.enter(path.clone()).await?;
    let mut state = self.state.lock().unwrap();
    let value = state
      .collections
      .get_mut(&Collection::Reviews)
      .and_then(|values| values.iter_mut().find(|v| v["id"] == json!(id)))
      .ok_or_else(|| not_found(path))?;
    value["name"] = json!(fields.name);
    value["rating"] = json!(fields.rating);
    value["comments"] = json!(fields.comments);
    value["updatedAt"] = json!(chrono::Utc::now().timestamp_millis());
    decode(value.clone())
  }

  async fn set_favorite(&self, restaurant_id: i64, flag: bool) -> Result<Restaurant> {
    let path = format!("PUT /restaurants/{}?is_favorite={}", restaurant_id, flag);
    self.enter(path.clone()).await?;
    let mut state = self.state.lock().unwrap();
    let flag = state.favorite_override.unwrap_or(flag);
    let value = state
      .collections
      .get_mut(&Collection::Restaurants)
      .and_then(|values| values.iter_mut().find(|v| v["id"] == json!(restaurant_id)))
      .ok_or_else(|| not_found(path))?;
    // The server stores the flag as text
    value["is_favorite"] = json!(flag.to_string());
    decode(value.clone())
  }
}
