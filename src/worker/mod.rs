//! Interception layer.
//!
//! The worker mediates every outgoing GET, answering from the durable
//! cache or the network depending on request shape, and reacts to page
//! commands and the deferred-sync trigger. All events arrive through
//! [`ServiceWorker::handle`], the single dispatch point.

mod event;
mod fetch;
mod message;

pub use event::{EventReply, FetchRequest, WorkerEvent};
pub use fetch::{FetchOutcome, ServeSource, ServedResponse};
pub use message::ClientMessage;

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::net::Network;
use crate::session::Session;
use crate::store::{chapter_key, CacheStore, CachedBody, PartitionNames};
use crate::sync::PendingQueue;

/// The interception layer: cache partitions, fetch routing, message
/// handling and the sync-triggered queue drain.
pub struct ServiceWorker<S: CacheStore, N: Network> {
  store: Arc<S>,
  net: Arc<N>,
  queue: Arc<PendingQueue<S>>,
  names: PartitionNames,
  base_url: String,
  static_manifest: Vec<String>,
  api_path_segments: Vec<String>,
  sync_tag: String,
  activities_url: String,
  session: Session,
}

impl<S: CacheStore, N: Network> ServiceWorker<S, N> {
  pub fn new(
    store: Arc<S>,
    net: Arc<N>,
    queue: Arc<PendingQueue<S>>,
    config: &Config,
    session: Session,
  ) -> Self {
    Self {
      store,
      net,
      queue,
      names: PartitionNames::new(&config.cache_version),
      base_url: config.base_url.trim_end_matches('/').to_string(),
      static_manifest: config.static_manifest.clone(),
      api_path_segments: config.api_path_segments.clone(),
      sync_tag: config.sync_tag.clone(),
      activities_url: config.absolute_url(&config.activities_endpoint),
      session,
    }
  }

  /// Dispatch one event to its handler.
  pub async fn handle(&self, event: WorkerEvent) -> Result<EventReply> {
    debug!(kind = event.kind(), "worker event");

    match event {
      WorkerEvent::Install => Ok(EventReply::Installed {
        cached: self.install().await?,
      }),
      WorkerEvent::Activate => Ok(EventReply::Activated {
        purged: self.activate()?,
      }),
      WorkerEvent::Fetch(request) => Ok(EventReply::Fetched(self.handle_fetch(&request).await?)),
      WorkerEvent::Message(message) => {
        self.handle_message(message).await?;
        Ok(EventReply::MessageHandled)
      }
      WorkerEvent::Sync { tag } => self.handle_sync(&tag).await,
    }
  }

  /// Eagerly fetch and store the static shell manifest.
  ///
  /// Fail-fast: a single failed manifest fetch fails the whole install,
  /// leaving no partially-installed shell to activate.
  async fn install(&self) -> Result<usize> {
    // Fetch everything before storing anything, so a failed install
    // leaves no partial shell behind.
    let mut fetched = Vec::with_capacity(self.static_manifest.len());
    for path in &self.static_manifest {
      let url = format!("{}{}", self.base_url, path);
      let response = self
        .net
        .get(&url)
        .await
        .map_err(|e| e.wrap_err(eyre!("install aborted at {}", path)))?;

      if !response.is_success() {
        return Err(eyre!(
          "install aborted: {} returned status {}",
          path,
          response.status
        ));
      }

      fetched.push((url, response));
    }

    for (url, response) in fetched {
      let key = crate::store::RequestKey::from_url(&url)?;
      self.store.put(
        &self.names.static_assets,
        &key,
        &CachedBody {
          body: response.body,
          content_type: response.content_type,
          status: response.status,
        },
      )?;
    }

    info!(
      partition = %self.names.static_assets,
      assets = self.static_manifest.len(),
      "static shell cached"
    );
    Ok(self.static_manifest.len())
  }

  /// Delete every partition that is not one of the two current names.
  fn activate(&self) -> Result<Vec<String>> {
    let mut purged = Vec::new();

    for name in self.store.partitions()? {
      if !self.names.is_current(&name) {
        self.store.drop_partition(&name)?;
        purged.push(name);
      }
    }

    if !purged.is_empty() {
      info!(purged = ?purged, "stale cache partitions removed");
    }
    Ok(purged)
  }

  async fn handle_message(&self, message: ClientMessage) -> Result<()> {
    match message {
      ClientMessage::CacheChapter {
        chapter_id,
        content,
      } => {
        let key = chapter_key(&chapter_id);
        self
          .store
          .put(&self.names.offline, &key, &CachedBody::json(&content)?)?;
        debug!(chapter = %chapter_id, "chapter cached for offline reading");
        Ok(())
      }
      ClientMessage::SyncActivity { activity } => {
        let depth = self.queue.append(activity).await?;
        debug!(depth, "activity queued");
        Ok(())
      }
    }
  }

  async fn handle_sync(&self, tag: &str) -> Result<EventReply> {
    if tag != self.sync_tag {
      debug!(tag, "unknown sync tag ignored");
      return Ok(EventReply::Ignored);
    }

    let delivered = self
      .queue
      .drain(self.net.as_ref(), &self.activities_url, &self.session)
      .await?;
    Ok(EventReply::Synced { delivered })
  }
}


#[cfg(test)]
mod tests {
  use super::testutil::harness;
  use super::*;
  use crate::activity::{ActivityKind, ActivityRecord};
  use crate::store::{pending_queue_key, PartitionNames, RequestKey};

  fn respond_manifest(h: &testutil::Harness) {
    h.net
      .respond_ok("https://reader.example.com/", b"root", "text/html");
    h.net.respond_ok(
      "https://reader.example.com/index.html",
      b"<html></html>",
      "text/html",
    );
    h.net.respond_ok(
      "https://reader.example.com/manifest.json",
      b"{}",
      "application/json",
    );
  }

  #[tokio::test]
  async fn test_install_caches_whole_manifest() {
    let h = harness();
    respond_manifest(&h);

    let reply = h.worker.handle(WorkerEvent::Install).await.unwrap();
    match reply {
      EventReply::Installed { cached } => assert_eq!(cached, 3),
      other => panic!("expected install reply, got {:?}", other),
    }

    let names = PartitionNames::new("v1");
    assert_eq!(h.store.entry_count(&names.static_assets).unwrap(), 3);

    let key = RequestKey::from_url("https://reader.example.com/index.html").unwrap();
    let stored = h.store.get(&names.static_assets, &key).unwrap().unwrap();
    assert_eq!(stored.body.body, b"<html></html>");
  }

  #[tokio::test]
  async fn test_install_fails_fast_on_any_manifest_miss() {
    let h = harness();
    // Only two of the three manifest paths resolve.
    h.net
      .respond_ok("https://reader.example.com/", b"root", "text/html");
    h.net.respond_ok(
      "https://reader.example.com/index.html",
      b"<html></html>",
      "text/html",
    );

    assert!(h.worker.handle(WorkerEvent::Install).await.is_err());

    // No partial shell.
    let names = PartitionNames::new("v1");
    assert_eq!(h.store.entry_count(&names.static_assets).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_install_rejects_error_statuses() {
    let h = harness();
    respond_manifest(&h);
    h.net.respond(
      "https://reader.example.com/manifest.json",
      crate::net::NetResponse {
        status: 500,
        content_type: None,
        body: Vec::new(),
      },
    );

    assert!(h.worker.handle(WorkerEvent::Install).await.is_err());

    let names = PartitionNames::new("v1");
    assert_eq!(h.store.entry_count(&names.static_assets).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_activate_purges_only_stale_partitions() {
    let h = harness();
    let names = PartitionNames::new("v1");
    let key = RequestKey::from_path("/x");
    let body = crate::store::CachedBody {
      body: b"x".to_vec(),
      content_type: None,
      status: 200,
    };

    // Current partitions plus leftovers from an older version.
    h.store.put(&names.static_assets, &key, &body).unwrap();
    h.store.put(&names.offline, &key, &body).unwrap();
    h.store.put("readsync-static-v0", &key, &body).unwrap();
    h.store.put("readsync-offline-v0", &key, &body).unwrap();

    let reply = h.worker.handle(WorkerEvent::Activate).await.unwrap();
    match reply {
      EventReply::Activated { mut purged } => {
        purged.sort();
        assert_eq!(purged, vec!["readsync-offline-v0", "readsync-static-v0"]);
      }
      other => panic!("expected activate reply, got {:?}", other),
    }

    assert_eq!(
      h.store.partitions().unwrap(),
      vec![names.offline.clone(), names.static_assets.clone()]
    );
  }

  #[tokio::test]
  async fn test_cache_chapter_message_is_idempotent() {
    let h = harness();
    let names = PartitionNames::new("v1");

    for body in ["first draft", "final text"] {
      let message = ClientMessage::CacheChapter {
        chapter_id: "ch-12".to_string(),
        content: serde_json::json!({ "text": body }),
      };
      h.worker.handle(WorkerEvent::Message(message)).await.unwrap();
    }

    let stored = h
      .store
      .get(&names.offline, &crate::store::chapter_key("ch-12"))
      .unwrap()
      .unwrap();
    let content: serde_json::Value = serde_json::from_slice(&stored.body.body).unwrap();
    assert_eq!(content["text"], "final text");
    assert_eq!(
      stored.body.content_type.as_deref(),
      Some("application/json")
    );
  }

  #[tokio::test]
  async fn test_sync_activity_message_appends_to_queue() {
    let h = harness();

    let message = ClientMessage::SyncActivity {
      activity: ActivityRecord::new(ActivityKind::ChapterRead, "story-1", "One", None),
    };
    h.worker.handle(WorkerEvent::Message(message)).await.unwrap();

    assert_eq!(h.queue.len().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_sync_event_with_registered_tag_drains_queue() {
    let h = harness();
    h.queue
      .append(ActivityRecord::new(
        ActivityKind::Bookmark,
        "story-2",
        "Two",
        None,
      ))
      .await
      .unwrap();

    let reply = h
      .worker
      .handle(WorkerEvent::Sync {
        tag: "sync-activities".to_string(),
      })
      .await
      .unwrap();
    match reply {
      EventReply::Synced { delivered } => assert_eq!(delivered, 1),
      other => panic!("expected sync reply, got {:?}", other),
    }

    let names = PartitionNames::new("v1");
    assert!(h
      .store
      .get(&names.offline, &pending_queue_key())
      .unwrap()
      .is_none());
    assert_eq!(h.net.posts().len(), 1);
  }

  #[tokio::test]
  async fn test_sync_event_with_unknown_tag_is_ignored() {
    let h = harness();
    let reply = h
      .worker
      .handle(WorkerEvent::Sync {
        tag: "sync-something-else".to_string(),
      })
      .await
      .unwrap();
    assert!(matches!(reply, EventReply::Ignored));
  }
}
