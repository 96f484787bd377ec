//! Network access behind a trait so the cache and sync logic can be
//! exercised without a live backend.

use color_eyre::{eyre::eyre, Result};

/// A settled HTTP response.
///
/// Transport failures (connection refused, DNS, offline) are `Err` at
/// the `Network` level; an HTTP error status is still an `Ok` response
/// and the caller decides what to do with it.
#[derive(Debug, Clone)]
pub struct NetResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

impl NetResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Parse the body as JSON.
  pub fn json(&self) -> Result<serde_json::Value> {
    serde_json::from_slice(&self.body).map_err(|e| eyre!("Failed to parse response body: {}", e))
  }
}

/// Outbound HTTP operations the engine needs.
pub trait Network: Send + Sync {
  /// Issue a GET. `Err` means the network itself failed.
  fn get(&self, url: &str) -> impl std::future::Future<Output = Result<NetResponse>> + Send;

  /// POST a JSON body, attaching a bearer token when one is given.
  fn post_json(
    &self,
    url: &str,
    body: &serde_json::Value,
    bearer: Option<&str>,
  ) -> impl std::future::Future<Output = Result<NetResponse>> + Send;
}

/// reqwest-backed implementation used outside of tests.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;
    Ok(Self { client })
  }
}

impl Network for HttpNetwork {
  async fn get(&self, url: &str) -> Result<NetResponse> {
    let response = self
      .client
      .get(url)
      .send()
      .await
      .map_err(|e| eyre!("GET {} failed: {}", url, e))?;

    into_net_response(response).await
  }

  async fn post_json(
    &self,
    url: &str,
    body: &serde_json::Value,
    bearer: Option<&str>,
  ) -> Result<NetResponse> {
    let mut request = self.client.post(url).json(body);
    if let Some(token) = bearer {
      request = request.bearer_auth(token);
    }

    let response = request
      .send()
      .await
      .map_err(|e| eyre!("POST {} failed: {}", url, e))?;

    into_net_response(response).await
  }
}

async fn into_net_response(response: reqwest::Response) -> Result<NetResponse> {
  let status = response.status().as_u16();
  let content_type = response
    .headers()
    .get(reqwest::header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .map(String::from);

  let body = response
    .bytes()
    .await
    .map_err(|e| eyre!("Failed to read response body: {}", e))?
    .to_vec();

  Ok(NetResponse {
    status,
    content_type,
    body,
  })
}
