//! Durable cache store backing the offline layer.
//!
//! Two named partitions exist at a time: one for long-lived static
//! shell assets, one for dynamic offline data (cached API responses,
//! chapter bodies, the pending-activity queue). Partition names carry
//! a version suffix; on activation every partition with a different
//! name is purged, which bounds storage growth across upgrades.

mod keys;
mod storage;

pub use keys::{chapter_key, pending_queue_key, RequestKey, PENDING_ACTIVITIES_PATH};
pub use storage::{CacheStore, CachedBody, MemoryStore, SqliteStore, StoredEntry};

/// The two live partition names for a given cache version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNames {
  /// Shell assets cached at install time.
  pub static_assets: String,
  /// Dynamic data: API responses, chapter bodies, pending queue.
  pub offline: String,
}

impl PartitionNames {
  pub fn new(version: &str) -> Self {
    Self {
      static_assets: format!("readsync-static-{}", version),
      offline: format!("readsync-offline-{}", version),
    }
  }

  /// Whether `name` is one of the two current partitions.
  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_assets || name == self.offline
  }
}
