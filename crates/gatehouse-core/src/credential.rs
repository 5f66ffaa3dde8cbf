//! Credential records — OAuth/token material for a source.
//!
//! Two shapes exist on purpose. [`CredentialRecord`] is the decrypted,
//! in-memory form handed to connectors; its `Debug` impl redacts token
//! fields so it can never leak through logs or error messages.
//! [`StoredCredential`] is the at-rest form whose token columns are opaque
//! ciphertext produced by the vault; the store persists it without ever
//! seeing plaintext.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decrypted credential material. Exactly one per source at a time.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
  pub source:        String,
  pub access_token:  String,
  pub refresh_token: Option<String>,
  pub token_type:    String,
  pub expires_at:    Option<DateTime<Utc>>,
  /// Space-separated granted scopes, as the provider reported them.
  pub scopes:        String,
  /// Provider account metadata (display name, email), JSON.
  pub account_info:  Option<serde_json::Value>,
}

impl CredentialRecord {
  /// Whether the access token is expired as of `now`.
  /// A record without an expiry never expires.
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    matches!(self.expires_at, Some(at) if at <= now)
  }
}

// Tokens must never appear in logs; Debug prints the bookkeeping only.
impl std::fmt::Debug for CredentialRecord {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CredentialRecord")
      .field("source", &self.source)
      .field("access_token", &"<redacted>")
      .field(
        "refresh_token",
        &self.refresh_token.as_ref().map(|_| "<redacted>"),
      )
      .field("token_type", &self.token_type)
      .field("expires_at", &self.expires_at)
      .field("scopes", &self.scopes)
      .finish_non_exhaustive()
  }
}

/// The at-rest form. `access_token` and `refresh_token` are ciphertext.
#[derive(Debug, Clone)]
pub struct StoredCredential {
  pub source:        String,
  pub access_token:  String,
  pub refresh_token: Option<String>,
  pub token_type:    String,
  pub expires_at:    Option<DateTime<Utc>>,
  pub scopes:        String,
  pub account_info:  Option<serde_json::Value>,
}
