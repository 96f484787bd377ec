//! Request routing: network-first for backend traffic, cache-first for
//! everything else.

use color_eyre::{eyre::eyre, Result};
use tracing::{debug, warn};

use crate::net::Network;
use crate::store::{CacheStore, CachedBody, RequestKey};

use super::event::FetchRequest;
use super::ServiceWorker;

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeSource {
  Network,
  Cache,
}

/// A response handed back to the requesting caller.
#[derive(Debug, Clone)]
pub struct ServedResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  pub source: ServeSource,
}

/// Outcome of routing one request.
#[derive(Debug)]
pub enum FetchOutcome {
  /// Non-GET requests are never intercepted.
  PassThrough,
  Served(ServedResponse),
}

/// Backend traffic is recognized purely by path substring.
pub fn is_api_path(path: &str, segments: &[String]) -> bool {
  segments.iter().any(|segment| path.contains(segment.as_str()))
}

impl<S: CacheStore, N: Network> ServiceWorker<S, N> {
  /// Route one intercepted request.
  pub(super) async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchOutcome> {
    if !request.is_get() {
      return Ok(FetchOutcome::PassThrough);
    }

    let key = RequestKey::from_url(&request.url)?;

    let response = if is_api_path(key.path(), &self.api_path_segments) {
      self.network_first(&request.url, &key).await?
    } else {
      self.cache_first(&request.url, &key).await?
    };

    Ok(FetchOutcome::Served(response))
  }

  /// Try the network; cache the response as a side effect; fall back
  /// to the cached entry for this exact key when the network fails.
  ///
  /// The cache write is best-effort: a storage failure is logged and
  /// the live response still reaches the caller.
  async fn network_first(&self, url: &str, key: &RequestKey) -> Result<ServedResponse> {
    match self.net.get(url).await {
      Ok(response) => {
        let body = CachedBody {
          body: response.body.clone(),
          content_type: response.content_type.clone(),
          status: response.status,
        };
        match self.store.put(&self.names.offline, key, &body) {
          Ok(()) => debug!(path = key.path(), "api response cached"),
          Err(e) => warn!(path = key.path(), "failed to cache api response: {:#}", e),
        }

        Ok(ServedResponse {
          status: response.status,
          content_type: response.content_type,
          body: response.body,
          source: ServeSource::Network,
        })
      }
      Err(network_err) => match self.store.get(&self.names.offline, key)? {
        Some(stored) => {
          debug!(path = key.path(), "network down, serving cached api response");
          Ok(served_from_cache(stored.body))
        }
        None => Err(network_err.wrap_err(eyre!("no cached entry for {}", key.path()))),
      },
    }
  }

  /// Serve the cached entry if present; otherwise fetch, storing only
  /// plain 200 responses before returning the network response.
  async fn cache_first(&self, url: &str, key: &RequestKey) -> Result<ServedResponse> {
    if let Some(stored) = self.store.get(&self.names.static_assets, key)? {
      debug!(path = key.path(), cached_at = %stored.cached_at, "cache hit");
      return Ok(served_from_cache(stored.body));
    }

    let response = self.net.get(url).await?;

    if response.status == 200 {
      let body = CachedBody {
        body: response.body.clone(),
        content_type: response.content_type.clone(),
        status: response.status,
      };
      if let Err(e) = self.store.put(&self.names.static_assets, key, &body) {
        warn!(path = key.path(), "failed to cache response: {:#}", e);
      }
    }

    Ok(ServedResponse {
      status: response.status,
      content_type: response.content_type,
      body: response.body,
      source: ServeSource::Network,
    })
  }
}

fn served_from_cache(body: CachedBody) -> ServedResponse {
  ServedResponse {
    status: body.status,
    content_type: body.content_type,
    body: body.body,
    source: ServeSource::Cache,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::mock::MockNetwork;
  use crate::worker::testutil::test_worker;

  #[test]
  fn test_api_path_recognition() {
    let segments = vec!["/functions/v1/".to_string(), "/api/".to_string()];
    assert!(is_api_path("/api/stories", &segments));
    assert!(is_api_path("/functions/v1/make-server/progress", &segments));
    assert!(!is_api_path("/chapter/12", &segments));
    assert!(!is_api_path("/index.html", &segments));
  }

  #[tokio::test]
  async fn test_cache_first_serves_stored_copy_when_offline() {
    let (worker, net) = test_worker();
    net.respond_ok(
      "https://reader.example.com/assets/logo.svg",
      b"<svg>logo</svg>",
      "image/svg+xml",
    );

    let request = FetchRequest::get("https://reader.example.com/assets/logo.svg");
    let first = worker.handle_fetch(&request).await.unwrap();
    match first {
      FetchOutcome::Served(response) => {
        assert_eq!(response.source, ServeSource::Network);
        assert_eq!(response.body, b"<svg>logo</svg>");
      }
      other => panic!("expected served response, got {:?}", other),
    }

    // Network goes away; the stored copy must come back byte-for-byte.
    net.set_down(true);
    let second = worker.handle_fetch(&request).await.unwrap();
    match second {
      FetchOutcome::Served(response) => {
        assert_eq!(response.source, ServeSource::Cache);
        assert_eq!(response.body, b"<svg>logo</svg>");
        assert_eq!(response.content_type.as_deref(), Some("image/svg+xml"));
      }
      other => panic!("expected cached response, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_cache_first_does_not_store_non_200() {
    let (worker, net) = test_worker();
    net.respond(
      "https://reader.example.com/missing.css",
      crate::net::NetResponse {
        status: 404,
        content_type: None,
        body: b"not found".to_vec(),
      },
    );

    let request = FetchRequest::get("https://reader.example.com/missing.css");
    let outcome = worker.handle_fetch(&request).await.unwrap();
    match outcome {
      FetchOutcome::Served(response) => assert_eq!(response.status, 404),
      other => panic!("expected served response, got {:?}", other),
    }

    // Nothing was cached, so the same request fails once offline.
    net.set_down(true);
    assert!(worker.handle_fetch(&request).await.is_err());
  }

  #[tokio::test]
  async fn test_network_first_returns_live_response_and_caches() {
    let (worker, net) = test_worker();
    net.respond_ok(
      "https://reader.example.com/api/stories",
      b"[{\"id\":\"s1\"}]",
      "application/json",
    );

    let request = FetchRequest::get("https://reader.example.com/api/stories");
    let outcome = worker.handle_fetch(&request).await.unwrap();
    match outcome {
      FetchOutcome::Served(response) => {
        assert_eq!(response.source, ServeSource::Network);
        assert_eq!(response.body, b"[{\"id\":\"s1\"}]");
      }
      other => panic!("expected live response, got {:?}", other),
    }

    // Fallback path serves the cached copy.
    net.set_down(true);
    let offline = worker.handle_fetch(&request).await.unwrap();
    match offline {
      FetchOutcome::Served(response) => {
        assert_eq!(response.source, ServeSource::Cache);
        assert_eq!(response.body, b"[{\"id\":\"s1\"}]");
      }
      other => panic!("expected cached response, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_cache_write_failure_does_not_hide_live_response() {
    use crate::worker::testutil::broken_write_worker;

    let (worker, net) = broken_write_worker();
    net.respond_ok(
      "https://reader.example.com/api/stories",
      b"[{\"id\":\"s1\"}]",
      "application/json",
    );
    net.respond_ok(
      "https://reader.example.com/assets/app.css",
      b"body{}",
      "text/css",
    );

    // Storage is full; both routing strategies must still hand the
    // live 200 back instead of surfacing the write failure.
    for url in [
      "https://reader.example.com/api/stories",
      "https://reader.example.com/assets/app.css",
    ] {
      match worker.handle_fetch(&FetchRequest::get(url)).await.unwrap() {
        FetchOutcome::Served(response) => {
          assert_eq!(response.status, 200);
          assert_eq!(response.source, ServeSource::Network);
        }
        other => panic!("expected live response for {}, got {:?}", url, other),
      }
    }
  }

  #[tokio::test]
  async fn test_network_first_miss_without_cache_is_an_error() {
    let (worker, net) = test_worker();
    net.set_down(true);

    let request = FetchRequest::get("https://reader.example.com/api/bookmarks");
    assert!(worker.handle_fetch(&request).await.is_err());
  }

  #[tokio::test]
  async fn test_post_is_never_intercepted() {
    let (worker, net) = test_worker();
    net.set_down(true);

    let request = FetchRequest {
      method: "POST".to_string(),
      url: "https://reader.example.com/api/activities".to_string(),
    };

    // Even with the network down a POST passes through untouched.
    match worker.handle_fetch(&request).await.unwrap() {
      FetchOutcome::PassThrough => {}
      other => panic!("expected pass-through, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_query_string_distinguishes_entries() {
    let (worker, net) = test_worker();
    net.respond_ok(
      "https://reader.example.com/api/stories?page=1",
      b"page-1",
      "application/json",
    );
    net.respond_ok(
      "https://reader.example.com/api/stories?page=2",
      b"page-2",
      "application/json",
    );

    for page in 1..=2 {
      let url = format!("https://reader.example.com/api/stories?page={}", page);
      worker.handle_fetch(&FetchRequest::get(url)).await.unwrap();
    }

    net.set_down(true);
    let request = FetchRequest::get("https://reader.example.com/api/stories?page=2");
    match worker.handle_fetch(&request).await.unwrap() {
      FetchOutcome::Served(response) => assert_eq!(response.body, b"page-2"),
      other => panic!("expected cached response, got {:?}", other),
    }
  }
}
