//! Restaurants, neighborhoods, cuisines and reviews as the API and the store see them.

mod records;
mod types;
mod wire;

pub use types::{
  average_rating, format_rating, Cuisine, Filter, LatLng, Neighborhood, NewReview, Restaurant,
  Review, ReviewId, ReviewUpdate, ANY,
};
