//! Worker event types.
//!
//! The original platform delivered install/activate/fetch/message/sync
//! through registered callbacks. Here the events are a tagged enum fed
//! to one dispatcher, so the routing table is plain data that tests can
//! drive without a browser-like host.

use super::fetch::FetchOutcome;
use super::message::ClientMessage;

/// An intercepted outgoing request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
  /// HTTP method, uppercase by convention. Anything but GET passes
  /// through untouched.
  pub method: String,
  /// Absolute request URL.
  pub url: String,
}

impl FetchRequest {
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      method: "GET".to_string(),
      url: url.into(),
    }
  }

  pub fn is_get(&self) -> bool {
    self.method.eq_ignore_ascii_case("GET")
  }
}

/// Everything the interception layer reacts to.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
  /// Eagerly cache the static shell manifest.
  Install,
  /// Purge stale cache partitions and take control.
  Activate,
  /// Route one outgoing request.
  Fetch(FetchRequest),
  /// Command sent from the page context.
  Message(ClientMessage),
  /// Deferred-sync trigger with its registration tag.
  Sync { tag: String },
}

impl WorkerEvent {
  /// Event kind for logging.
  pub fn kind(&self) -> &'static str {
    match self {
      WorkerEvent::Install => "install",
      WorkerEvent::Activate => "activate",
      WorkerEvent::Fetch(_) => "fetch",
      WorkerEvent::Message(_) => "message",
      WorkerEvent::Sync { .. } => "sync",
    }
  }
}

/// What handling an event produced.
#[derive(Debug)]
pub enum EventReply {
  /// Static manifest fully cached.
  Installed { cached: usize },
  /// Stale partitions removed.
  Activated { purged: Vec<String> },
  /// Outcome of request routing.
  Fetched(FetchOutcome),
  /// A page command was applied.
  MessageHandled,
  /// Queue drain delivered this many records.
  Synced { delivered: usize },
  /// Event carried a tag the worker is not registered for.
  Ignored,
}
