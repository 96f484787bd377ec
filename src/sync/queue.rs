//! The pending-activity queue.
//!
//! One entry in the offline partition holds the whole ordered list of
//! undelivered activity records as JSON. The original client appended
//! with an unguarded read-modify-write, which could drop a record when
//! two appends raced; here every mutation goes through one async lock,
//! so back-to-back appends both land. Delivery stays at-least-once: a
//! drain clears the entry only after every POST in the batch succeeds.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::activity::ActivityRecord;
use crate::net::Network;
use crate::session::Session;
use crate::store::{pending_queue_key, CacheStore, CachedBody};

pub struct PendingQueue<S> {
  store: Arc<S>,
  partition: String,
  /// Serializes append and drain; load alone is read-only.
  write_lock: Mutex<()>,
}

impl<S: CacheStore> PendingQueue<S> {
  pub fn new(store: Arc<S>, offline_partition: &str) -> Self {
    Self {
      store,
      partition: offline_partition.to_string(),
      write_lock: Mutex::new(()),
    }
  }

  /// Read the queued records; an absent entry is an empty queue.
  pub fn load(&self) -> Result<Vec<ActivityRecord>> {
    match self.store.get(&self.partition, &pending_queue_key())? {
      Some(stored) => serde_json::from_slice(&stored.body.body)
        .map_err(|e| eyre!("Corrupt pending-activity queue: {}", e)),
      None => Ok(Vec::new()),
    }
  }

  pub fn len(&self) -> Result<usize> {
    Ok(self.load()?.len())
  }

  /// Append one record, creating the queue entry lazily. Returns the
  /// queue depth after the append.
  pub async fn append(&self, activity: ActivityRecord) -> Result<usize> {
    let _guard = self.write_lock.lock().await;

    let mut pending = self.load()?;
    pending.push(activity);
    self.write(&pending)?;

    Ok(pending.len())
  }

  /// Deliver every queued record to the ingestion endpoint, then clear
  /// the queue. All-or-nothing: any failed POST leaves the queue
  /// untouched so the whole batch is retried on the next trigger.
  /// POSTs go out concurrently, so delivery order is not append order.
  ///
  /// Both the deferred-sync trigger and the manual fallback call this
  /// one function.
  pub async fn drain<N: Network>(
    &self,
    net: &N,
    endpoint_url: &str,
    session: &Session,
  ) -> Result<usize> {
    let _guard = self.write_lock.lock().await;

    let pending = self.load()?;
    if pending.is_empty() {
      return Ok(0);
    }

    let posts = pending.iter().map(|activity| async move {
      let body =
        serde_json::to_value(activity).map_err(|e| eyre!("Failed to serialize activity: {}", e))?;
      let response = net.post_json(endpoint_url, &body, session.bearer()).await?;
      if !response.is_success() {
        return Err(eyre!("activity ingestion returned status {}", response.status));
      }
      Ok(())
    });

    let results = futures::future::join_all(posts).await;
    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
      return Err(eyre!(
        "{} of {} activity posts failed; queue kept for retry",
        failed,
        pending.len()
      ));
    }

    self.store.delete(&self.partition, &pending_queue_key())?;
    info!(delivered = pending.len(), "pending activities synced");
    Ok(pending.len())
  }

  fn write(&self, pending: &[ActivityRecord]) -> Result<()> {
    let value =
      serde_json::to_value(pending).map_err(|e| eyre!("Failed to serialize queue: {}", e))?;
    self
      .store
      .put(&self.partition, &pending_queue_key(), &CachedBody::json(&value)?)
  }
}
