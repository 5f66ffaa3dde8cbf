//! [`SourceBoundary`] — the owner-configured fetch ceiling for a source.
//!
//! The boundary is enforced upstream of any policy or filter step: a
//! connector must refuse to return rows outside it, and cache reads re-check
//! it because cached rows may predate a boundary change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::row::DataRow;

/// What a connector may ever fetch for one source. All lists are allow/deny
/// ceilings; an empty allow-list means "no restriction".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceBoundary {
  /// Only items at or after this instant.
  #[serde(default)]
  pub after:        Option<DateTime<Utc>>,
  /// If non-empty, a row must carry at least one of these labels.
  #[serde(default)]
  pub allow_labels: Vec<String>,
  /// A row carrying any of these labels is always out of bounds.
  #[serde(default)]
  pub deny_labels:  Vec<String>,
  /// If non-empty, a row's `repo` field must be one of these.
  #[serde(default)]
  pub allow_repos:  Vec<String>,
  /// If non-empty, a row's type tag must be one of these.
  #[serde(default)]
  pub allow_kinds:  Vec<String>,
}

impl SourceBoundary {
  /// Whether `row` falls inside this boundary.
  pub fn permits(&self, row: &DataRow) -> bool {
    if let Some(after) = self.after
      && row.timestamp < after
    {
      return false;
    }

    if !self.allow_kinds.is_empty() && !self.allow_kinds.contains(&row.kind) {
      return false;
    }

    let labels = row_labels(row);
    if self.deny_labels.iter().any(|d| labels.contains(d)) {
      return false;
    }
    if !self.allow_labels.is_empty()
      && !self.allow_labels.iter().any(|a| labels.contains(a))
    {
      return false;
    }

    if !self.allow_repos.is_empty() {
      match row.text_field("repo") {
        Some(repo) if self.allow_repos.iter().any(|r| r == repo) => {}
        _ => return false,
      }
    }

    true
  }
}

/// The row's `labels` field as strings; missing or non-array yields empty.
fn row_labels(row: &DataRow) -> Vec<String> {
  row
    .fields
    .get("labels")
    .and_then(|v| v.as_array())
    .map(|arr| {
      arr
        .iter()
        .filter_map(|v| v.as_str().map(str::to_owned))
        .collect()
    })
    .unwrap_or_default()
}

/// Per-source cache opt-in: how often to sync, how long rows live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePolicy {
  /// Sync interval string, e.g. `"30s"`, `"10m"`, `"1h"`.
  pub interval: String,
  /// Row TTL string, e.g. `"7d"`, `"1h"`; defaults to 7 days if malformed.
  #[serde(default)]
  pub ttl:      Option<String>,
}

/// Owner configuration for one source: its fetch ceiling and cache opt-in.
///
/// `cache: Some(_)` means the source is served exclusively from cache;
/// `cache: None` means every pull fetches live. There is no fallback in
/// either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
  pub source:   String,
  #[serde(default)]
  pub boundary: SourceBoundary,
  #[serde(default)]
  pub cache:    Option<CachePolicy>,
}

impl SourceConfig {
  pub fn cache_enabled(&self) -> bool {
    self.cache.is_some()
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;

  fn row(ts: DateTime<Utc>, fields: serde_json::Value) -> DataRow {
    let serde_json::Value::Object(fields) = fields else {
      panic!("fields must be an object")
    };
    DataRow {
      source: "gmail".into(),
      item_id: "m1".into(),
      kind: "email".into(),
      timestamp: ts,
      fields,
    }
  }

  fn ts(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, 12, 0, 0).unwrap()
  }

  #[test]
  fn default_boundary_permits_everything() {
    let b = SourceBoundary::default();
    assert!(b.permits(&row(ts(1), json!({}))));
  }

  #[test]
  fn after_date_excludes_older_rows() {
    let b = SourceBoundary { after: Some(ts(10)), ..Default::default() };
    assert!(!b.permits(&row(ts(9), json!({}))));
    assert!(b.permits(&row(ts(10), json!({}))));
    assert!(b.permits(&row(ts(11), json!({}))));
  }

  #[test]
  fn label_allow_and_deny_lists() {
    let b = SourceBoundary {
      allow_labels: vec!["work".into()],
      deny_labels:  vec!["private".into()],
      ..Default::default()
    };
    assert!(b.permits(&row(ts(1), json!({"labels": ["work"]}))));
    assert!(!b.permits(&row(ts(1), json!({"labels": ["personal"]}))));
    // Deny wins even when an allowed label is also present.
    assert!(!b.permits(&row(ts(1), json!({"labels": ["work", "private"]}))));
    assert!(!b.permits(&row(ts(1), json!({}))));
  }

  #[test]
  fn repo_allow_list() {
    let b = SourceBoundary {
      allow_repos: vec!["me/dotfiles".into()],
      ..Default::default()
    };
    assert!(b.permits(&row(ts(1), json!({"repo": "me/dotfiles"}))));
    assert!(!b.permits(&row(ts(1), json!({"repo": "me/secrets"}))));
    assert!(!b.permits(&row(ts(1), json!({}))));
  }

  #[test]
  fn kind_allow_list() {
    let b = SourceBoundary {
      allow_kinds: vec!["issue".into()],
      ..Default::default()
    };
    assert!(!b.permits(&row(ts(1), json!({}))));
  }
}
