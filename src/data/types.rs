use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::wire;
use crate::error::{Error, Result};

/// Sentinel the views use for "no filter on this axis".
pub const ANY: i64 = -1;

const PLACEHOLDER_PREFIX: &str = "pending-";

static PLACEHOLDER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Geographic position handed to the map widget
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
  pub lat: f64,
  pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
  #[serde(deserialize_with = "wire::integer")]
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub address: String,
  pub latlng: LatLng,
  #[serde(default, deserialize_with = "wire::integer")]
  pub neighborhood_type_id: i64,
  #[serde(default, deserialize_with = "wire::integer")]
  pub cuisine_type_id: i64,
  /// Weekday name ("Monday") to opening hours
  #[serde(default)]
  pub operating_hours: Option<BTreeMap<String, String>>,
  #[serde(default, deserialize_with = "wire::flag")]
  pub is_favorite: bool,
  #[serde(default, deserialize_with = "wire::opt_text")]
  pub photograph: Option<String>,
  #[serde(
    default,
    rename = "createdAt",
    alias = "created_at",
    deserialize_with = "wire::timestamp"
  )]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(
    default,
    rename = "updatedAt",
    alias = "updated_at",
    deserialize_with = "wire::timestamp"
  )]
  pub updated_at: Option<DateTime<Utc>>,
}

impl Restaurant {
  /// Opening hours for `day`, with "," rendered as " &"; "N.A." when unknown.
  pub fn hours_on(&self, day: Weekday) -> String {
    self
      .operating_hours
      .as_ref()
      .and_then(|hours| hours.get(weekday_name(day)))
      .map(|h| h.replace(',', " &"))
      .unwrap_or_else(|| "N.A.".to_string())
  }

  /// Opening hours Monday through Sunday, skipping days without an entry.
  pub fn weekly_hours(&self) -> Vec<(&'static str, &str)> {
    let Some(hours) = &self.operating_hours else {
      return Vec::new();
    };
    [
      Weekday::Mon,
      Weekday::Tue,
      Weekday::Wed,
      Weekday::Thu,
      Weekday::Fri,
      Weekday::Sat,
      Weekday::Sun,
    ]
    .into_iter()
    .filter_map(|day| {
      let name = weekday_name(day);
      hours.get(name).map(|h| (name, h.as_str()))
    })
    .collect()
  }

  /// Relative page reference for this restaurant.
  pub fn page_url(&self) -> String {
    format!("restaurant.html?id={}", self.id)
  }

  /// Relative image reference, if the restaurant has a photograph.
  pub fn image_path(&self) -> Option<String> {
    self.photograph.as_ref().map(|p| {
      let stem = p.strip_suffix(".jpg").unwrap_or(p);
      format!("img/{}.jpg", stem)
    })
  }
}

fn weekday_name(day: Weekday) -> &'static str {
  match day {
    Weekday::Mon => "Monday",
    Weekday::Tue => "Tuesday",
    Weekday::Wed => "Wednesday",
    Weekday::Thu => "Thursday",
    Weekday::Fri => "Friday",
    Weekday::Sat => "Saturday",
    Weekday::Sun => "Sunday",
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighborhood {
  #[serde(deserialize_with = "wire::integer")]
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub icon: Option<String>,
  #[serde(default)]
  pub alt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cuisine {
  #[serde(deserialize_with = "wire::integer")]
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub icon: Option<String>,
  #[serde(default)]
  pub alt: Option<String>,
}

/// Review identity: server-assigned, or a local placeholder while queued.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReviewId {
  Confirmed(i64),
  Pending(String),
}

impl ReviewId {
  /// A fresh placeholder, unique within this process and across restarts.
  pub fn placeholder() -> Self {
    let seq = PLACEHOLDER_SEQ.fetch_add(1, Ordering::SeqCst);
    ReviewId::Pending(format!(
      "{}{}-{}",
      PLACEHOLDER_PREFIX,
      Utc::now().timestamp_millis(),
      seq
    ))
  }

  pub fn is_pending(&self) -> bool {
    matches!(self, ReviewId::Pending(_))
  }
}

impl fmt::Display for ReviewId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ReviewId::Confirmed(id) => write!(f, "{}", id),
      ReviewId::Pending(key) => f.write_str(key),
    }
  }
}

impl std::str::FromStr for ReviewId {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    Ok(match s.trim().parse() {
      Ok(id) => ReviewId::Confirmed(id),
      Err(_) => ReviewId::Pending(s.to_string()),
    })
  }
}

impl Serialize for ReviewId {
  fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match self {
      ReviewId::Confirmed(id) => serializer.serialize_i64(*id),
      ReviewId::Pending(key) => serializer.serialize_str(key),
    }
  }
}

impl<'de> Deserialize<'de> for ReviewId {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
      Int(i64),
      Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
      Raw::Int(id) => ReviewId::Confirmed(id),
      Raw::Text(text) => match text.trim().parse() {
        Ok(id) => ReviewId::Confirmed(id),
        Err(_) => ReviewId::Pending(text),
      },
    })
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
  pub id: ReviewId,
  #[serde(deserialize_with = "wire::integer")]
  pub restaurant_id: i64,
  pub name: String,
  #[serde(deserialize_with = "wire::rating")]
  pub rating: u8,
  #[serde(default)]
  pub comments: String,
  #[serde(
    default,
    rename = "createdAt",
    alias = "created_at",
    deserialize_with = "wire::timestamp"
  )]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(
    default,
    rename = "updatedAt",
    alias = "updated_at",
    deserialize_with = "wire::timestamp"
  )]
  pub updated_at: Option<DateTime<Utc>>,
  /// Edited locally, not yet replayed to the server
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub dirty: bool,
}

impl Review {
  /// Build the queued form of a submission, with a placeholder id.
  pub fn pending(new: &NewReview) -> Self {
    let now = Utc::now();
    Self {
      id: ReviewId::placeholder(),
      restaurant_id: new.restaurant_id,
      name: new.name.clone(),
      rating: new.rating,
      comments: new.comments.clone(),
      created_at: Some(now),
      updated_at: Some(now),
      dirty: false,
    }
  }

  /// Waiting for the server: never confirmed, or edited since.
  pub fn is_queued(&self) -> bool {
    self.id.is_pending() || self.dirty
  }

  pub fn apply(&mut self, update: &ReviewUpdate) {
    self.name = update.name.clone();
    self.rating = update.rating;
    self.comments = update.comments.clone();
    self.updated_at = Some(Utc::now());
  }

  pub fn to_new(&self) -> NewReview {
    NewReview {
      restaurant_id: self.restaurant_id,
      name: self.name.clone(),
      rating: self.rating,
      comments: self.comments.clone(),
    }
  }

  pub fn to_update(&self) -> ReviewUpdate {
    ReviewUpdate {
      name: self.name.clone(),
      rating: self.rating,
      comments: self.comments.clone(),
    }
  }
}

/// Body of `POST /reviews`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReview {
  pub restaurant_id: i64,
  pub name: String,
  pub rating: u8,
  pub comments: String,
}

impl NewReview {
  pub fn validate(&self) -> Result<()> {
    if self.restaurant_id <= 0 {
      return Err(Error::Validation("restaurant_id is required".to_string()));
    }
    validate_fields(&self.name, self.rating, &self.comments)
  }
}

/// Body of `PUT /reviews/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewUpdate {
  pub name: String,
  pub rating: u8,
  pub comments: String,
}

impl ReviewUpdate {
  pub fn validate(&self) -> Result<()> {
    validate_fields(&self.name, self.rating, &self.comments)
  }
}

fn validate_fields(name: &str, rating: u8, comments: &str) -> Result<()> {
  if name.trim().is_empty() {
    return Err(Error::Validation("name is required".to_string()));
  }
  if !(1..=5).contains(&rating) {
    return Err(Error::Validation(format!(
      "rating must be between 1 and 5, got {}",
      rating
    )));
  }
  if comments.trim().is_empty() {
    return Err(Error::Validation("comments are required".to_string()));
  }
  Ok(())
}

/// Mean rating of `reviews`, or `None` when there are none.
pub fn average_rating(reviews: &[Review]) -> Option<f64> {
  if reviews.is_empty() {
    return None;
  }
  let total: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
  Some(f64::from(total) / reviews.len() as f64)
}

/// Rating as shown to users: one decimal, or "-" without reviews.
pub fn format_rating(rating: Option<f64>) -> String {
  match rating {
    Some(r) => format!("{:.1}", r),
    None => "-".to_string(),
  }
}

/// One axis of the restaurant filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
  #[default]
  Any,
  Only(i64),
}

impl Filter {
  pub fn matches(self, id: i64) -> bool {
    match self {
      Filter::Any => true,
      Filter::Only(wanted) => wanted == id,
    }
  }
}

impl From<i64> for Filter {
  /// `ANY` (-1) means no filter.
  fn from(id: i64) -> Self {
    if id == ANY {
      Filter::Any
    } else {
      Filter::Only(id)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn review(rating: u8) -> Review {
    Review::pending(&NewReview {
      restaurant_id: 1,
      name: "Steve".to_string(),
      rating,
      comments: "Fine".to_string(),
    })
  }

  #[test]
  fn test_restaurant_from_server_payload() {
    let r: Restaurant = serde_json::from_value(json!({
      "id": 1,
      "name": "Mission Chinese Food",
      "neighborhood_type_id": 1,
      "cuisine_type_id": 2,
      "photograph": 1,
      "address": "171 E Broadway, New York, NY 10002",
      "latlng": { "lat": 40.713829, "lng": -73.989667 },
      "operating_hours": {
        "Monday": "5:30 pm - 11:00 pm",
        "Saturday": "12:00 pm - 4:00 pm, 5:30 pm - 12:00 am"
      },
      "is_favorite": "true",
      "createdAt": 1504095567183i64,
      "updatedAt": "2018-05-17T19:12:34.000Z"
    }))
    .unwrap();

    assert!(r.is_favorite);
    assert_eq!(r.photograph.as_deref(), Some("1"));
    assert_eq!(r.image_path().as_deref(), Some("img/1.jpg"));
    assert_eq!(r.hours_on(Weekday::Mon), "5:30 pm - 11:00 pm");
    assert_eq!(
      r.hours_on(Weekday::Sat),
      "12:00 pm - 4:00 pm & 5:30 pm - 12:00 am"
    );
    assert_eq!(r.hours_on(Weekday::Tue), "N.A.");
    assert_eq!(
      r.weekly_hours().iter().map(|(d, _)| *d).collect::<Vec<_>>(),
      vec!["Monday", "Saturday"]
    );
  }

  #[test]
  fn test_restaurant_survives_store_round_trip() {
    let r: Restaurant = serde_json::from_value(json!({
      "id": "3",
      "name": "Kang Ho Dong Baekjeong",
      "latlng": { "lat": 40.747143, "lng": -73.985414 },
      "is_favorite": false,
      "updatedAt": 1504095567183i64
    }))
    .unwrap();

    let stored = serde_json::to_vec(&r).unwrap();
    let back: Restaurant = serde_json::from_slice(&stored).unwrap();
    assert_eq!(back, r);
  }

  #[test]
  fn test_review_id_forms() {
    let r: Review = serde_json::from_value(json!({
      "id": "12",
      "restaurant_id": "2",
      "name": "Steve",
      "rating": "4",
      "comments": "Good"
    }))
    .unwrap();
    assert_eq!(r.id, ReviewId::Confirmed(12));
    assert_eq!(r.restaurant_id, 2);
    assert_eq!(r.rating, 4);

    let pending = review(3);
    assert!(pending.id.is_pending());
    assert!(pending.id.to_string().starts_with("pending-"));
    let back: Review = serde_json::from_str(&serde_json::to_string(&pending).unwrap()).unwrap();
    assert_eq!(back.id, pending.id);
  }

  #[test]
  fn test_placeholders_are_unique() {
    assert_ne!(ReviewId::placeholder(), ReviewId::placeholder());
  }

  #[test]
  fn test_dirty_flag_not_serialized_when_clean() {
    let value = serde_json::to_value(review(5)).unwrap();
    assert!(value.get("dirty").is_none());
  }

  #[test]
  fn test_validation() {
    let valid = NewReview {
      restaurant_id: 1,
      name: "Bob".to_string(),
      rating: 5,
      comments: "Great".to_string(),
    };
    assert!(valid.validate().is_ok());

    let missing_name = NewReview {
      name: "  ".to_string(),
      ..valid.clone()
    };
    assert!(matches!(
      missing_name.validate(),
      Err(Error::Validation(_))
    ));

    let bad_rating = NewReview {
      rating: 0,
      ..valid.clone()
    };
    assert!(bad_rating.validate().is_err());

    let no_restaurant = NewReview {
      restaurant_id: 0,
      ..valid
    };
    assert!(no_restaurant.validate().is_err());
  }

  #[test]
  fn test_average_rating() {
    assert_eq!(format_rating(average_rating(&[])), "-");
    let reviews = vec![review(4), review(5), review(4)];
    assert_eq!(format_rating(average_rating(&reviews)), "4.3");
  }

  #[test]
  fn test_filter_sentinel() {
    assert_eq!(Filter::from(ANY), Filter::Any);
    assert_eq!(Filter::from(3), Filter::Only(3));
    assert!(Filter::Any.matches(9));
    assert!(!Filter::Only(3).matches(9));
  }
}
