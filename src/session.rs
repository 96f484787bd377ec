//! Authenticated session state for backend requests.
//!
//! The original client kept the access token in module-level mutable
//! state set as a side effect of sign-in. Here the token lives in an
//! explicit `Session` value constructed up front and passed to the
//! places that issue authenticated requests.

/// Holds the bearer token for the activity-ingestion backend.
#[derive(Debug, Clone, Default)]
pub struct Session {
  access_token: Option<String>,
}

impl Session {
  /// An unauthenticated session. Requests go out without an
  /// Authorization header.
  pub fn anonymous() -> Self {
    Self { access_token: None }
  }

  pub fn with_token(token: impl Into<String>) -> Self {
    Self {
      access_token: Some(token.into()),
    }
  }

  pub fn bearer(&self) -> Option<&str> {
    self.access_token.as_deref()
  }
}
