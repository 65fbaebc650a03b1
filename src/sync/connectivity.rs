//! Online/offline signals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

/// Decides whether a "connectivity restored" signal should trigger a flush.
///
/// When the process started online, the first online signal only reports the
/// state we already knew about and is dropped.
#[derive(Debug)]
pub struct ConnectivityGate {
  started_online: bool,
  first_seen: AtomicBool,
}

impl ConnectivityGate {
  pub fn new(started_online: bool) -> Self {
    Self {
      started_online,
      first_seen: AtomicBool::new(false),
    }
  }

  pub fn admit(&self) -> bool {
    let first = !self.first_seen.swap(true, Ordering::SeqCst);
    !(first && self.started_online)
  }
}

/// Periodic TCP reachability check of the API host.
///
/// Only reports transitions; what to do about them is up to the receiver.
#[derive(Debug, Clone)]
pub struct ConnectivityProbe {
  addr: String,
  interval: Duration,
  timeout: Duration,
}

impl ConnectivityProbe {
  pub fn new(addr: impl Into<String>, interval: Duration) -> Self {
    Self {
      addr: addr.into(),
      interval,
      timeout: Duration::from_secs(3).min(interval),
    }
  }

  /// Probe for the host serving `url`, or `None` if it has no host.
  pub fn for_url(url: &Url, interval: Duration) -> Option<Self> {
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    Some(Self::new(format!("{}:{}", host, port), interval))
  }

  pub async fn check(&self) -> bool {
    matches!(
      tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await,
      Ok(Ok(_))
    )
  }

  /// Run the probe until the receiver goes away. The first check is always
  /// reported, then only changes.
  pub fn spawn(self, tx: mpsc::UnboundedSender<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(self.interval);
      let mut last = None;
      loop {
        ticker.tick().await;
        let online = self.check().await;
        if last == Some(online) {
          continue;
        }
        if last.is_some() {
          info!(addr = %self.addr, online, "connectivity changed");
        } else {
          debug!(addr = %self.addr, online, "initial connectivity");
        }
        last = Some(online);
        if tx.send(online).is_err() {
          break;
        }
      }
    })
  }
}
