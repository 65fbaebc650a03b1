//! Offline-first synchronization between the local store and the gateway.

mod connectivity;
mod facade;
mod queue;

#[cfg(test)]
pub mod testing;

pub use connectivity::{ConnectivityGate, ConnectivityProbe};
pub use facade::{FavoriteUpdate, Submission, SyncCache, SyncEvent, SYNC_REVIEWS};
pub use queue::{Confirmation, FlushReport, ReviewQueue};
