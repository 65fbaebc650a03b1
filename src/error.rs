//! Error taxonomy for the store, gateway and sync layers.
//!
//! The binary edges (CLI, TUI loop, startup) keep using `color_eyre::Result`;
//! everything below them returns this `Error` so callers can branch on the kind.

use thiserror::Error;

use crate::store::Collection;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
  /// Network unreachable, connection refused, timeout.
  #[error("network unreachable: {0}")]
  Transport(String),

  /// The server answered with a non-success status.
  #[error("server responded {status} for {url}")]
  Status { status: u16, url: String },

  /// The server answered 2xx but the body could not be decoded.
  #[error("malformed payload from {url}: {reason}")]
  Payload { url: String, reason: String },

  /// Requested id is absent from a fetched collection.
  #[error("{collection} {id} does not exist")]
  NotFound { collection: Collection, id: String },

  /// Write payload rejected before any I/O.
  #[error("invalid review: {0}")]
  Validation(String),

  /// Local persistence backend missing, denied or broken.
  #[error("local store unavailable: {0}")]
  StoreUnavailable(String),

  /// Neither the local store nor the gateway could serve a read.
  #[error("{collection} unavailable: {source}")]
  DataUnavailable {
    collection: Collection,
    #[source]
    source: Box<Error>,
  },
}

impl Error {
  /// Transport, status and payload failures may succeed on a later attempt.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      Error::Transport(_) | Error::Status { .. } | Error::Payload { .. }
    )
  }

  pub fn not_found(collection: Collection, id: impl ToString) -> Self {
    Error::NotFound {
      collection,
      id: id.to_string(),
    }
  }

  pub fn unavailable(collection: Collection, source: Error) -> Self {
    Error::DataUnavailable {
      collection,
      source: Box::new(source),
    }
  }
}

impl From<rusqlite::Error> for Error {
  fn from(err: rusqlite::Error) -> Self {
    Error::StoreUnavailable(err.to_string())
  }
}

impl From<reqwest::Error> for Error {
  fn from(err: reqwest::Error) -> Self {
    let url = err.url().map(|u| u.to_string()).unwrap_or_default();
    if let Some(status) = err.status() {
      Error::Status {
        status: status.as_u16(),
        url,
      }
    } else if err.is_decode() {
      Error::Payload {
        url,
        reason: err.to_string(),
      }
    } else {
      Error::Transport(err.to_string())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_retryable_kinds() {
    assert!(Error::Transport("refused".into()).is_retryable());
    assert!(Error::Status {
      status: 503,
      url: "http://localhost:1337/reviews".into()
    }
    .is_retryable());
    assert!(!Error::Validation("name is required".into()).is_retryable());
    assert!(!Error::not_found(Collection::Restaurants, 7).is_retryable());
  }

  #[test]
  fn test_data_unavailable_keeps_cause() {
    let err = Error::unavailable(Collection::Cuisines, Error::Transport("offline".into()));
    assert_eq!(
      err.to_string(),
      "cuisines unavailable: network unreachable: offline"
    );
    assert!(std::error::Error::source(&err).is_some());
  }
}
