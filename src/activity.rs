//! Reading-activity records destined for the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the user did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
  ChapterRead,
  Bookmark,
  Rating,
  Comment,
}

/// One user action headed for the activity-ingestion endpoint.
///
/// Field names match the backend wire format. The record is owned by
/// the pending queue from enqueue until successful delivery; delivery
/// is at-least-once, so the backend must tolerate duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
  #[serde(rename = "type")]
  pub kind: ActivityKind,
  pub story_id: String,
  pub story_title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
  pub timestamp: DateTime<Utc>,
}

impl ActivityRecord {
  pub fn new(
    kind: ActivityKind,
    story_id: impl Into<String>,
    story_title: impl Into<String>,
    details: Option<String>,
  ) -> Self {
    Self {
      kind,
      story_id: story_id.into(),
      story_title: story_title.into(),
      details,
      timestamp: Utc::now(),
    }
  }
}

/// Terminal state of a single activity write.
///
/// `Queued` is terminal for the caller; the record only becomes
/// delivered later through a successful queue drain.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
  /// The backend accepted the record immediately.
  Delivered(serde_json::Value),
  /// The record sits in the pending queue until the next drain.
  Queued,
}
