use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::gateway::{Gateway, HttpGateway};
use crate::store::{AppStore, LocalStore};
use crate::sync::{ConnectivityProbe, FlushReport, SyncCache, SyncEvent};
use crate::ui;
use crate::ui::renderfns::HeaderInfo;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::RestaurantListView;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use url::Url;

/// The cache the application runs with
pub type AppCache = SyncCache<AppStore, HttpGateway>;

/// Ticks between re-reads of the queued review count
const QUEUE_REFRESH_TICKS: u32 = 4;

/// What started a background delivery
#[derive(Debug, Clone, Copy, PartialEq)]
enum FlushTrigger {
  /// The user asked for it
  Manual,
  /// The API host became reachable
  Reconnect,
  /// A sync task was registered while online
  Registered,
}

/// Main application state
pub struct App<S: LocalStore = AppStore, G: Gateway = HttpGateway> {
  cache: SyncCache<S, G>,

  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  server_url: String,
  title: Option<String>,
  probe: Option<ConnectivityProbe>,

  /// Last known reachability of the API host
  online: bool,
  /// Reviews waiting for the server
  queued: usize,
  /// Latest app-level message for the footer
  status: Option<String>,
  flushing: bool,
  /// A task was registered while a flush was running
  tasks_waiting: bool,
  ticks: u32,

  /// Event sender for async tasks
  event_tx: mpsc::UnboundedSender<Event>,

  /// Whether to quit
  should_quit: bool,
}

impl<S: LocalStore + 'static, G: Gateway + 'static> App<S, G> {
  pub fn new(cache: SyncCache<S, G>, config: &Config, online: bool) -> Self {
    let (tx, _rx) = mpsc::unbounded_channel();

    let probe = Url::parse(&config.server.base_url)
      .ok()
      .and_then(|url| ConnectivityProbe::for_url(&url, config.sync.probe_interval()));

    let mut app = Self {
      view_stack: vec![Box::new(RestaurantListView::new(cache.clone()))],
      cache,
      server_url: config.server.base_url.clone(),
      title: config.title.clone(),
      probe,
      online,
      queued: 0,
      status: None,
      flushing: false,
      tasks_waiting: false,
      ticks: 0,
      event_tx: tx,
      should_quit: false,
    };
    app.refresh_queued();
    app
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Create event handler
    let mut events = EventHandler::new(Duration::from_millis(250));
    self.event_tx = events.sender();
    self.spawn_listeners();

    // Main loop
    let result = async {
      while !self.should_quit {
        terminal.draw(|frame| ui::draw(frame, self))?;

        if let Some(event) = events.next().await {
          self.handle_event(event);
        }
      }
      Ok::<_, color_eyre::Report>(())
    }
    .await;

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  /// Forward sync events and connectivity changes into the event loop
  fn spawn_listeners(&mut self) {
    let mut sync_rx = self.cache.subscribe();
    let tx = self.event_tx.clone();
    tokio::spawn(async move {
      loop {
        match sync_rx.recv().await {
          Ok(event) => {
            if tx.send(Event::Sync(event)).is_err() {
              break;
            }
          }
          Err(broadcast::error::RecvError::Lagged(missed)) => {
            warn!(missed, "sync events dropped");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    });

    if let Some(probe) = self.probe.take() {
      let (probe_tx, mut probe_rx) = mpsc::unbounded_channel();
      probe.spawn(probe_tx);
      let tx = self.event_tx.clone();
      tokio::spawn(async move {
        while let Some(online) = probe_rx.recv().await {
          if tx.send(Event::Connectivity(online)).is_err() {
            break;
          }
        }
      });
    }
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => {
        if let Some(view) = self.view_stack.last_mut() {
          view.tick();
        }
        self.ticks = self.ticks.wrapping_add(1);
        if self.ticks % QUEUE_REFRESH_TICKS == 0 {
          self.refresh_queued();
        }
      }
      Event::Connectivity(online) => self.set_online(online),
      Event::Sync(event) => self.handle_sync_event(event),
      Event::Flushed(result) => {
        self.flushing = false;
        match result {
          Ok(report) if !report.is_empty() => {
            self.status = Some(format!(
              "Delivered {} queued review(s), {} still pending",
              report.confirmed.len(),
              report.still_pending
            ));
          }
          Ok(_) => {}
          Err(e) => self.status = Some(format!("Sync failed: {}", e)),
        }
        self.refresh_queued();
        if std::mem::take(&mut self.tasks_waiting) && self.online {
          self.start_flush(FlushTrigger::Registered);
        }
      }
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
      self.should_quit = true;
      return;
    }

    let editing = self.view_stack.last().map(|v| v.is_editing()).unwrap_or(false);
    if !editing && key.code == KeyCode::Char('s') {
      self.start_flush(FlushTrigger::Manual);
      return;
    }

    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::None,
    };
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  fn set_online(&mut self, online: bool) {
    let was_online = std::mem::replace(&mut self.online, online);
    if online {
      info!("API host reachable");
      self.start_flush(FlushTrigger::Reconnect);
    } else if was_online {
      info!("API host unreachable");
      self.status = Some("Offline: changes are kept locally".to_string());
    }
  }

  fn handle_sync_event(&mut self, event: SyncEvent) {
    match &event {
      SyncEvent::ReviewConfirmed { review, .. } => {
        debug!(review = %review.id, "queued review confirmed");
      }
      // Offline registrations wait for the reconnect
      SyncEvent::TaskRegistered(tag) if self.online => {
        debug!(tag = %tag, "sync task registered while online");
        self.start_flush(FlushTrigger::Registered);
      }
      _ => {}
    }
    for view in self.view_stack.iter_mut() {
      view.on_sync_event(&event);
    }
    self.refresh_queued();
  }

  /// Deliver queued reviews in the background.
  ///
  /// A manual flush always runs. A reconnect goes through the connectivity
  /// gate and then fires every registered sync task. A registration only
  /// fires the tasks.
  fn start_flush(&mut self, trigger: FlushTrigger) {
    if self.flushing {
      if trigger == FlushTrigger::Registered {
        self.tasks_waiting = true;
      }
      return;
    }
    self.flushing = true;
    if trigger == FlushTrigger::Manual {
      self.status = Some("Sending queued reviews...".to_string());
    }

    let cache = self.cache.clone();
    let tx = self.event_tx.clone();
    tokio::spawn(async move {
      let result = async {
        let mut report = match trigger {
          FlushTrigger::Manual => return cache.flush_queued_reviews().await,
          FlushTrigger::Reconnect => cache.on_connectivity_restored().await?.unwrap_or_default(),
          FlushTrigger::Registered => FlushReport::default(),
        };
        for tag in cache.store().registered_tasks()? {
          if let Some(signalled) = cache.on_sync_signal(&tag).await? {
            report = merge(report, signalled);
          }
        }
        Ok(report)
      }
      .await;

      let _ = tx.send(Event::Flushed(result.map_err(|e| e.to_string())));
    });
  }

  fn refresh_queued(&mut self) {
    match self.cache.queued_reviews() {
      Ok(queued) => self.queued = queued.len(),
      Err(e) => debug!(error = %e, "queued review count unavailable"),
    }
  }

  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.view_stack.last_mut()
  }

  pub fn header_info(&self) -> HeaderInfo<'_> {
    HeaderInfo {
      title: self.title.as_deref(),
      server_url: &self.server_url,
      online: self.online,
      queued: self.queued,
    }
  }

  pub fn shortcuts(&self) -> Vec<ShortcutInfo> {
    let mut shortcuts = self
      .view_stack
      .last()
      .map(|v| v.shortcuts())
      .unwrap_or_default();
    let editing = self.view_stack.last().map(|v| v.is_editing()).unwrap_or(false);
    if self.queued > 0 && !editing {
      shortcuts.push(ShortcutInfo::new("s", "sync now").with_priority(70));
    }
    shortcuts
  }

  pub fn breadcrumb(&self) -> Vec<String> {
    self
      .view_stack
      .iter()
      .map(|v| v.breadcrumb_label())
      .collect()
  }

  pub fn status(&self) -> Option<&str> {
    self.status.as_deref()
  }
}

/// Combine a reconnect flush with the sync-task flush that followed it
fn merge(mut first: FlushReport, second: FlushReport) -> FlushReport {
  first.confirmed.extend(second.confirmed);
  first.still_pending = second.still_pending;
  first
}
