use async_trait::async_trait;
use color_eyre::eyre::eyre;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::Gateway;
use crate::config::ServerConfig;
use crate::data::{NewReview, Restaurant, Review, ReviewUpdate};
use crate::error::{Error, Result};
use crate::store::{Collection, Record};

/// Gateway speaking JSON over HTTP to the configured base URL
#[derive(Clone)]
pub struct HttpGateway {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpGateway {
  pub fn new(config: &ServerConfig) -> color_eyre::Result<Self> {
    let base_url = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid server base_url '{}': {}", config.base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!(
        "Server base_url '{}' cannot carry a path",
        config.base_url
      ));
    }

    let client = reqwest::Client::builder()
      .timeout(config.timeout())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base_url })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Base URL with `segments` appended to its path.
  fn endpoint(&self, segments: &[&str]) -> Url {
    let mut url = self.base_url.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    url
  }

  /// Send the request and fail on anything but a 2xx answer.
  async fn send(&self, request: RequestBuilder) -> Result<Response> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(Error::Status {
        status: status.as_u16(),
        url: response.url().to_string(),
      });
    }
    Ok(response)
  }

  async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let url = response.url().to_string();
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| Error::Payload {
      url,
      reason: e.to_string(),
    })
  }
}

#[async_trait]
impl Gateway for HttpGateway {
  async fn fetch_collection<T: Record>(&self) -> Result<Vec<T>> {
    let url = self.endpoint(&[T::COLLECTION.name()]);
    debug!(%url, "GET collection");
    let response = self.send(self.client.get(url)).await?;
    Self::decode(response).await
  }

  async fn fetch_review(&self, id: i64) -> Result<Option<Review>> {
    let url = self.endpoint(&[Collection::Reviews.name(), &id.to_string()]);
    debug!(%url, "GET review");
    let response = self.client.get(url).send().await?;
    if response.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !response.status().is_success() {
      return Err(Error::Status {
        status: response.status().as_u16(),
        url: response.url().to_string(),
      });
    }
    Self::decode(response).await.map(Some)
  }

  async fn create_review(&self, review: &NewReview) -> Result<Review> {
    let url = self.endpoint(&[Collection::Reviews.name()]);
    debug!(%url, restaurant_id = review.restaurant_id, "POST review");
    let response = self.send(self.client.post(url).json(review)).await?;
    Self::decode(response).await
  }

  async fn update_review(&self, id: i64, fields: &ReviewUpdate) -> Result<Review> {
    let url = self.endpoint(&[Collection::Reviews.name(), &id.to_string()]);
    debug!(%url, "PUT review");
    let response = self.send(self.client.put(url).json(fields)).await?;
    Self::decode(response).await
  }

  async fn set_favorite(&self, restaurant_id: i64, flag: bool) -> Result<Restaurant> {
    let mut url = self.endpoint(&[Collection::Restaurants.name(), &restaurant_id.to_string()]);
    url
      .query_pairs_mut()
      .append_pair("is_favorite", if flag { "true" } else { "false" });
    debug!(%url, "PUT favorite");
    let response = self.send(self.client.put(url)).await?;
    Self::decode(response).await
  }
}
