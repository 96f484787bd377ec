//! Page-side sync coordination.
//!
//! The coordinator owns the page's view of connectivity and drives the
//! activity write path: immediate delivery while online, queueing on
//! failure or while offline, and a queue drain on every transition back
//! to online. Registration wires the worker over the shared store once
//! at startup.

mod queue;

pub use queue::PendingQueue;

use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::activity::{ActivityRecord, WriteOutcome};
use crate::config::Config;
use crate::net::Network;
use crate::session::Session;
use crate::store::{CacheStore, PartitionNames};
use crate::worker::{ServiceWorker, WorkerEvent};

/// Page connectivity as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
  Online,
  Offline,
}

/// Drives queuing and replay of user activity against the backend.
pub struct SyncCoordinator<S: CacheStore, N: Network> {
  net: Arc<N>,
  queue: Arc<PendingQueue<S>>,
  session: Session,
  activities_url: String,
  online: AtomicBool,
}

impl<S: CacheStore, N: Network> SyncCoordinator<S, N> {
  pub fn new(
    net: Arc<N>,
    queue: Arc<PendingQueue<S>>,
    config: &Config,
    session: Session,
    initial: Connectivity,
  ) -> Self {
    Self {
      net,
      queue,
      session,
      activities_url: config.absolute_url(&config.activities_endpoint),
      online: AtomicBool::new(initial == Connectivity::Online),
    }
  }

  pub fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }

  /// React to a connectivity transition.
  ///
  /// Going online drains the pending queue; a failed drain is logged
  /// and retried wholesale on the next transition. Going offline only
  /// flips the flag, the write path below does the queueing.
  pub async fn set_connectivity(&self, connectivity: Connectivity) {
    match connectivity {
      Connectivity::Online => {
        self.online.store(true, Ordering::SeqCst);
        info!("back online, syncing pending activities");
        match self.drain().await {
          Ok(0) => {}
          Ok(delivered) => info!(delivered, "pending activities delivered"),
          Err(e) => warn!("sync of pending activities failed: {:#}", e),
        }
      }
      Connectivity::Offline => {
        self.online.store(false, Ordering::SeqCst);
        info!("offline mode, activities will be queued");
      }
    }
  }

  /// Deliver everything in the pending queue. Shared by the online
  /// transition above and the deferred-sync trigger in the worker.
  pub async fn drain(&self) -> Result<usize> {
    self
      .queue
      .drain(self.net.as_ref(), &self.activities_url, &self.session)
      .await
  }

  /// Record one user activity.
  ///
  /// Online: POST immediately; on failure the record is queued and the
  /// error is re-raised so the caller can tell the user the write is
  /// pending. Offline: queue directly and report `Queued`. A queued
  /// record is only delivered later by a successful drain.
  pub async fn record_activity(&self, activity: ActivityRecord) -> Result<WriteOutcome> {
    if !self.is_online() {
      self.queue.append(activity).await?;
      return Ok(WriteOutcome::Queued);
    }

    let body =
      serde_json::to_value(&activity).map_err(|e| eyre!("Failed to serialize activity: {}", e))?;

    match self
      .net
      .post_json(&self.activities_url, &body, self.session.bearer())
      .await
    {
      Ok(response) if response.is_success() => {
        let payload = response.json().unwrap_or(serde_json::Value::Null);
        Ok(WriteOutcome::Delivered(payload))
      }
      Ok(response) => {
        self.queue.append(activity).await?;
        Err(eyre!(
          "activity ingestion returned status {}; record queued for retry",
          response.status
        ))
      }
      Err(e) => {
        self.queue.append(activity).await?;
        Err(e.wrap_err("record queued for retry"))
      }
    }
  }
}

/// The fully wired offline layer: worker plus coordinator over one
/// shared store and pending queue.
pub struct OfflineClient<S: CacheStore, N: Network> {
  pub worker: ServiceWorker<S, N>,
  pub coordinator: SyncCoordinator<S, N>,
}

impl<S: CacheStore, N: Network> OfflineClient<S, N> {
  /// One-time registration at page load: build the worker, cache the
  /// static shell, purge stale partitions, and hand back the
  /// coordinator. Running it again with an unchanged version just
  /// overwrites the same entries.
  pub async fn register(
    store: Arc<S>,
    net: Arc<N>,
    config: &Config,
    session: Session,
    connectivity: Connectivity,
  ) -> Result<Self> {
    let names = PartitionNames::new(&config.cache_version);
    let queue = Arc::new(PendingQueue::new(store.clone(), &names.offline));

    let worker = ServiceWorker::new(
      store,
      net.clone(),
      queue.clone(),
      config,
      session.clone(),
    );
    worker.handle(WorkerEvent::Install).await?;
    worker.handle(WorkerEvent::Activate).await?;

    let coordinator = SyncCoordinator::new(net, queue, config, session, connectivity);

    Ok(Self {
      worker,
      coordinator,
    })
  }
}
