//! Request-key normalization and hashing.

use color_eyre::{eyre::eyre, Result};
use sha2::{Digest, Sha256};
use url::Url;

/// Fixed path the serialized pending-activity list is stored under.
pub const PENDING_ACTIVITIES_PATH: &str = "/pending-activities";

/// A normalized cache key for one request.
///
/// The readable path is kept for inspection; the storage key is a
/// SHA256 of it so keys stay a stable, fixed length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
  path: String,
  hash: String,
}

impl RequestKey {
  /// Key for an absolute request URL. Normalizes to origin plus path
  /// and query, dropping any fragment: the same resource always maps
  /// to one entry, while the same path on two hosts stays two entries.
  pub fn from_url(raw: &str) -> Result<Self> {
    let url = Url::parse(raw).map_err(|e| eyre!("Invalid request URL {}: {}", raw, e))?;
    let origin = url.origin().ascii_serialization();
    let normalized = match url.query() {
      Some(q) => format!("{}{}?{}", origin, url.path(), q),
      None => format!("{}{}", origin, url.path()),
    };
    Ok(Self::from_path(&normalized))
  }

  /// Key for a synthetic root-relative path that is never issued as a
  /// real network request (chapter bodies, the pending queue).
  pub fn from_path(path: &str) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Self {
      path: path.to_string(),
      hash,
    }
  }

  pub fn path(&self) -> &str {
    &self.path
  }

  pub fn hash(&self) -> &str {
    &self.hash
  }
}

/// Synthetic key a cached chapter body is stored under.
pub fn chapter_key(chapter_id: &str) -> RequestKey {
  RequestKey::from_path(&format!("/chapter/{}", chapter_id))
}

/// Key of the single pending-activity queue entry.
pub fn pending_queue_key() -> RequestKey {
  RequestKey::from_path(PENDING_ACTIVITIES_PATH)
}
