use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;

use crate::assets::{AssetStore, AssetWorker, HttpAssetSource, Message, Origin};
use crate::config::Config;
use crate::data::{average_rating, format_rating, Filter, NewReview, Restaurant, ANY};
use crate::gateway::Gateway;
use crate::store::LocalStore;
use crate::sync::{FlushReport, Submission, SyncCache};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// List restaurants, optionally filtered
  Restaurants {
    /// Cuisine id, -1 for all
    #[arg(long, default_value_t = ANY, allow_hyphen_values = true)]
    cuisine: i64,
    /// Neighborhood id, -1 for all
    #[arg(long, default_value_t = ANY, allow_hyphen_values = true)]
    neighborhood: i64,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Show one restaurant with its hours and reviews
  Show {
    id: i64,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Toggle a restaurant's favorite flag
  Favorite { id: i64 },
  /// Submit a review; it is queued when the server cannot be reached
  Review {
    #[arg(long)]
    restaurant: i64,
    #[arg(long)]
    name: String,
    /// 1 to 5
    #[arg(long)]
    rating: u8,
    #[arg(long)]
    comments: String,
  },
  /// Send every queued review now
  Flush,
  /// Fire a named background sync task (e.g. sync-reviews)
  Sync { tag: String },
  /// Manage the offline asset cache
  #[command(subcommand)]
  Assets(AssetsCommand),
}

#[derive(Subcommand, Debug)]
pub enum AssetsCommand {
  /// Prefetch the static assets into the current cache
  Install,
  /// Drop static caches of older versions
  Activate,
  /// Fetch one asset through the cache
  Fetch { url: String },
}

pub async fn run<S, G>(command: Command, cache: SyncCache<S, G>, config: &Config) -> Result<()>
where
  S: LocalStore + 'static,
  G: Gateway + 'static,
{
  match command {
    Command::Restaurants {
      cuisine,
      neighborhood,
      json,
    } => cmd_restaurants(&cache, cuisine, neighborhood, json).await,
    Command::Show { id, json } => cmd_show(&cache, id, json).await,
    Command::Favorite { id } => cmd_favorite(&cache, id).await,
    Command::Review {
      restaurant,
      name,
      rating,
      comments,
    } => {
      let review = NewReview {
        restaurant_id: restaurant,
        name,
        rating,
        comments,
      };
      cmd_review(&cache, review).await
    }
    Command::Flush => {
      let report = cache.flush_queued_reviews().await?;
      println!("{}", describe_flush(&report));
      Ok(())
    }
    Command::Sync { tag } => {
      let worker = asset_worker(config)?.with_sync_handler(Arc::new(cache));
      match worker.sync(&tag).await? {
        Some(report) => println!("{}", describe_flush(&report)),
        None => println!("Nothing registered for '{}'", tag),
      }
      Ok(())
    }
    Command::Assets(command) => cmd_assets(command, config).await,
  }
}

async fn cmd_restaurants<S: LocalStore, G: Gateway>(
  cache: &SyncCache<S, G>,
  cuisine: i64,
  neighborhood: i64,
  json: bool,
) -> Result<()> {
  let restaurants = cache
    .filter_by_cuisine_and_neighborhood(Filter::from(cuisine), Filter::from(neighborhood))
    .await?;

  if json {
    println!("{}", serde_json::to_string_pretty(&restaurants)?);
    return Ok(());
  }

  if restaurants.is_empty() {
    println!("No restaurants match.");
    return Ok(());
  }
  for restaurant in &restaurants {
    println!("{}", restaurant_row(restaurant));
  }
  Ok(())
}

fn restaurant_row(restaurant: &Restaurant) -> String {
  format!(
    "{:>4}  {} {:<30} {}",
    restaurant.id,
    if restaurant.is_favorite { "♥" } else { " " },
    restaurant.name,
    restaurant.address
  )
}

async fn cmd_show<S: LocalStore, G: Gateway>(
  cache: &SyncCache<S, G>,
  id: i64,
  json: bool,
) -> Result<()> {
  let restaurant = cache.fetch_restaurant(id).await?;
  let reviews = cache.fetch_reviews_for(id).await?;

  if json {
    let value = serde_json::json!({ "restaurant": restaurant, "reviews": reviews });
    println!("{}", serde_json::to_string_pretty(&value)?);
    return Ok(());
  }

  println!("{}", restaurant.name);
  println!("  {}", restaurant.address);
  println!(
    "  Rating {} from {} review(s){}",
    format_rating(average_rating(&reviews)),
    reviews.len(),
    if restaurant.is_favorite { ", favorite" } else { "" }
  );
  let hours = restaurant.weekly_hours();
  if !hours.is_empty() {
    println!();
    for (day, spec) in hours {
      println!("  {:<10} {}", day, spec.replace(',', " &"));
    }
  }
  for review in &reviews {
    println!();
    let pending = if review.is_queued() { " (pending sync)" } else { "" };
    println!("  {} {}/5{}", review.name, review.rating, pending);
    println!("    {}", review.comments);
  }
  Ok(())
}

async fn cmd_favorite<S: LocalStore, G: Gateway>(cache: &SyncCache<S, G>, id: i64) -> Result<()> {
  let update = cache.toggle_favorite(id).await?;
  let state = if update.restaurant.is_favorite {
    "now a favorite"
  } else {
    "no longer a favorite"
  };
  println!("{} is {}", update.restaurant.name, state);
  if let Some(warning) = update.warning {
    println!("Saved locally only, the server was not reached: {}", warning);
  }
  Ok(())
}

async fn cmd_review<S: LocalStore, G: Gateway>(
  cache: &SyncCache<S, G>,
  review: NewReview,
) -> Result<()> {
  let submission = cache.submit_review(review).await?;
  println!("{}", describe_submission(&submission));
  Ok(())
}

fn describe_submission(submission: &Submission) -> String {
  match submission {
    Submission::Confirmed(review) => format!("Review {} posted", review.id),
    Submission::Deferred(review) => format!(
      "Review {} saved, run `fressen sync sync-reviews` or open the app to send it",
      review.id
    ),
    Submission::Queued(review) => format!(
      "Server unreachable, review {} queued. Run `fressen flush` later",
      review.id
    ),
  }
}

fn describe_flush(report: &FlushReport) -> String {
  format!(
    "Delivered {} review(s), {} still queued",
    report.confirmed.len(),
    report.still_pending
  )
}

pub fn asset_worker(config: &Config) -> Result<AssetWorker<HttpAssetSource>> {
  let dir = match &config.assets.dir {
    Some(dir) => dir.clone(),
    None => AssetStore::default_dir()?,
  };
  let client = reqwest::Client::builder()
    .timeout(config.server.timeout())
    .build()
    .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;
  AssetWorker::new(&config.assets, AssetStore::new(dir), HttpAssetSource::new(client))
}

async fn cmd_assets(command: AssetsCommand, config: &Config) -> Result<()> {
  let mut worker = asset_worker(config)?;
  match command {
    AssetsCommand::Install => {
      let report = worker.install().await?;
      // The CLI always takes over right away
      worker.message(Message::SkipWaiting)?;
      println!(
        "Cached {} asset(s) in {}, {} failed",
        report.cached,
        worker.static_cache(),
        report.failed
      );
    }
    AssetsCommand::Activate => {
      let evicted = worker.activate()?;
      if evicted.is_empty() {
        println!("No old caches to evict");
      }
      for name in evicted {
        println!("Evicted {}", name);
      }
    }
    AssetsCommand::Fetch { url } => {
      let asset = worker.fetch(&url).await?;
      let origin = match asset.origin {
        Origin::Cache => "cache",
        Origin::Network => "network",
      };
      println!("{} bytes from {}", asset.body.len(), origin);
    }
  }
  Ok(())
}
