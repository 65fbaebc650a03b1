//! Lenient field decoders for server payloads.
//!
//! The API is not strict about scalar types: favorites arrive as `true` or
//! `"true"`, ids and ratings as numbers or numeric strings, and timestamps as
//! epoch milliseconds or RFC 3339 text. Records written back to the local store
//! use the canonical forms, which these decoders also accept.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
  Bool(bool),
  Int(i64),
  Float(f64),
  Text(String),
}

pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
  D: Deserializer<'de>,
{
  match Scalar::deserialize(deserializer)? {
    Scalar::Bool(b) => Ok(b),
    Scalar::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
      "true" => Ok(true),
      "false" | "" => Ok(false),
      other => Err(de::Error::custom(format!("invalid flag '{}'", other))),
    },
    Scalar::Int(n) => Ok(n != 0),
    Scalar::Float(_) => Err(de::Error::custom("invalid flag")),
  }
}

pub fn integer<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
  D: Deserializer<'de>,
{
  match Scalar::deserialize(deserializer)? {
    Scalar::Int(n) => Ok(n),
    Scalar::Text(s) => s
      .trim()
      .parse()
      .map_err(|_| de::Error::custom(format!("invalid integer '{}'", s))),
    Scalar::Float(f) if f.fract() == 0.0 => Ok(f as i64),
    _ => Err(de::Error::custom("expected an integer")),
  }
}

pub fn rating<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
  D: Deserializer<'de>,
{
  let n = integer(deserializer)?;
  u8::try_from(n).map_err(|_| de::Error::custom(format!("rating {} out of range", n)))
}

pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
  D: Deserializer<'de>,
{
  match Option::<Scalar>::deserialize(deserializer)? {
    None => Ok(None),
    Some(Scalar::Int(ms)) => Ok(Utc.timestamp_millis_opt(ms).single()),
    Some(Scalar::Text(s)) => {
      if let Ok(ms) = s.parse::<i64>() {
        return Ok(Utc.timestamp_millis_opt(ms).single());
      }
      DateTime::parse_from_rfc3339(&s)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|e| de::Error::custom(format!("invalid timestamp '{}': {}", s, e)))
    }
    Some(_) => Err(de::Error::custom("expected a timestamp")),
  }
}

pub fn opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(match Option::<Scalar>::deserialize(deserializer)? {
    Some(Scalar::Text(s)) => Some(s),
    Some(Scalar::Int(n)) => Some(n.to_string()),
    _ => None,
  })
}
