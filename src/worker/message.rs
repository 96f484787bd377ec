//! Commands the page context sends to the interception layer.
//!
//! The wire shapes match the original postMessage envelopes, so a
//! captured message log from the old client deserializes unchanged.

use serde::{Deserialize, Serialize};

use crate::activity::ActivityRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
  /// Store a chapter body for offline reading. Idempotent; repeated
  /// sends overwrite.
  #[serde(rename = "CACHE_CHAPTER")]
  CacheChapter {
    #[serde(rename = "chapterId")]
    chapter_id: String,
    content: serde_json::Value,
  },
  /// Append one activity to the pending queue.
  #[serde(rename = "SYNC_ACTIVITY")]
  SyncActivity { activity: ActivityRecord },
}
