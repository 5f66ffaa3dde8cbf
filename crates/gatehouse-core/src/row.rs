//! The [`DataRow`] — one unit of fetched data, regardless of source.
//!
//! A row is identified by `(source, item_id)` across cache and live fetch.
//! Everything source-specific lives in the loosely-typed field map; the
//! envelope carries only what the policy layer needs to reason about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A string-keyed, loosely-typed field map.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// One unit of fetched data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRow {
  /// Which configured source produced this row (e.g. `"gmail"`).
  pub source:    String,
  /// The source-native identifier (message id, issue number, …).
  pub item_id:   String,
  /// Type tag within the source (e.g. `"email"`, `"issue"`).
  pub kind:      String,
  /// When the underlying item happened, in the source's own terms.
  pub timestamp: DateTime<Utc>,
  /// Arbitrary named fields; operators and filters act on these.
  pub fields:    FieldMap,
}

impl DataRow {
  /// The cache identity key for this row.
  pub fn key(&self) -> (&str, &str) {
    (&self.source, &self.item_id)
  }

  /// Fetch a field's textual content, if the field exists and is a string.
  pub fn text_field(&self, name: &str) -> Option<&str> {
    self.fields.get(name).and_then(|v| v.as_str())
  }

  /// Fetch a field's string content case-insensitively by field name.
  pub fn text_field_ci(&self, name: &str) -> Option<&str> {
    self
      .fields
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .and_then(|(_, v)| v.as_str())
  }
}
