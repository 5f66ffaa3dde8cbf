//! Cached row records — the durable snapshot side of the cache boundary.
//!
//! The `data` payload is an opaque string at this layer: either plain JSON
//! or a sealed ciphertext, decided by the engine's cache codec. The store
//! never interprets it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted copy of a fetched row, keyed by `(source, item_id)`.
/// Upserting the same key replaces the payload and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRow {
  pub source:     String,
  pub item_id:    String,
  pub kind:       String,
  /// The underlying item's own timestamp (not the caching time).
  pub timestamp:  DateTime<Utc>,
  /// Opaque payload: plain JSON field map or sealed ciphertext.
  pub data:       String,
  pub cached_at:  DateTime<Utc>,
  /// Rows past this instant are invisible to reads, though not necessarily
  /// deleted.
  pub expires_at: Option<DateTime<Utc>>,
}

impl CachedRow {
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    matches!(self.expires_at, Some(at) if at <= now)
  }
}
