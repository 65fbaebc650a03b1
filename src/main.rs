mod app;
mod assets;
mod cli;
mod config;
mod data;
mod error;
mod event;
mod gateway;
mod query;
mod store;
mod sync;
mod ui;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::app::{App, AppCache};
use crate::assets::Message;
use crate::config::Config;
use crate::gateway::HttpGateway;
use crate::store::{AppStore, SqliteStore};
use crate::sync::ConnectivityProbe;

#[derive(Parser, Debug)]
#[command(name = "fressen")]
#[command(about = "An offline-first terminal browser for restaurants and their reviews")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/fressen/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Keep nothing between runs (in-memory store)
  #[arg(long)]
  no_store: bool,

  #[command(subcommand)]
  command: Option<cli::Command>,
}

/// Log to a daily file; the TUI owns the terminal.
fn init_tracing() -> Result<WorkerGuard> {
  let log_dir = Config::log_dir()?;
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let (writer, guard) =
    tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "fressen.log"));
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fressen=info"));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .init();
  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing()?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let store = if args.no_store {
    AppStore::Sqlite(SqliteStore::in_memory()?)
  } else {
    AppStore::open(config.store.path.as_deref())
  };
  let gateway = HttpGateway::new(&config.server)?;

  let online = match ConnectivityProbe::for_url(gateway.base_url(), config.sync.probe_interval()) {
    Some(probe) => probe.check().await,
    None => true,
  };
  info!(
    server = %gateway.base_url(),
    online,
    store = store.is_available(),
    "starting"
  );

  let cache: AppCache = AppCache::new(Arc::new(store), Arc::new(gateway))
    .with_empty_collection(config.store.empty_collection)
    .with_background_sync(config.sync.background)
    .started_online(online);

  match args.command {
    Some(command) => cli::run(command, cache, &config).await,
    None => {
      spawn_asset_install(&config);
      let mut app = App::new(cache, &config, online);
      app.run().await
    }
  }
}

/// Refresh the offline asset cache without holding up the UI
fn spawn_asset_install(config: &Config) {
  let mut worker = match cli::asset_worker(config) {
    Ok(worker) => worker,
    Err(e) => {
      warn!(error = %e, "asset cache disabled");
      return;
    }
  };
  tokio::spawn(async move {
    if let Err(e) = worker.install().await {
      warn!(error = %e, "asset install failed");
      return;
    }
    // The running app takes the new version right away
    if let Err(e) = worker.message(Message::SkipWaiting) {
      warn!(error = %e, "asset activation failed");
    }
  });
}
