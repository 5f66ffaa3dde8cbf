//! Quick filters — single enable/disable row- or field-level rules.
//!
//! A quick filter is the owner-facing alternative to a full manifest: one
//! rule, one value, one toggle. Row rules decide whether a row survives;
//! the `hide_field` rule never rejects a row, it only strips a named field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The rule half of a quick filter. The variant name doubles as the `type`
/// column discriminant. Unknown types decode to [`FilterRule::Other`], which
/// always passes — an unrecognised rule must never reject rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FilterRule {
  /// Keep rows with `timestamp >= value`.
  TimeAfter(DateTime<Utc>),
  /// Keep rows whose `sender` field contains the value (case-insensitive).
  SenderInclude(String),
  /// Keep rows whose `title` field contains the value (case-insensitive).
  SubjectInclude(String),
  /// Drop rows whose `sender` field contains the value (case-insensitive).
  SenderExclude(String),
  /// Drop rows whose `title` field contains the value (case-insensitive).
  SubjectExclude(String),
  /// Keep only rows whose `has_attachment` field is `true`.
  HasAttachment,
  /// Strip the named field from every row (field name case-insensitive).
  /// Never rejects a row.
  HideField(String),
  /// An unrecognised rule type: a no-op pass-through.
  Other { kind: String, value: String },
}

impl FilterRule {
  /// The discriminant string stored in the `type` column.
  pub fn discriminant(&self) -> &str {
    match self {
      Self::TimeAfter(_) => "time_after",
      Self::SenderInclude(_) => "sender_include",
      Self::SubjectInclude(_) => "subject_include",
      Self::SenderExclude(_) => "sender_exclude",
      Self::SubjectExclude(_) => "subject_exclude",
      Self::HasAttachment => "has_attachment",
      Self::HideField(_) => "hide_field",
      Self::Other { kind, .. } => kind,
    }
  }

  /// The raw value string stored in the `value` column.
  pub fn value_string(&self) -> String {
    match self {
      Self::TimeAfter(dt) => dt.to_rfc3339(),
      Self::SenderInclude(v)
      | Self::SubjectInclude(v)
      | Self::SenderExclude(v)
      | Self::SubjectExclude(v)
      | Self::HideField(v) => v.clone(),
      Self::HasAttachment => String::new(),
      Self::Other { value, .. } => value.clone(),
    }
  }

  /// Rebuild a rule from its stored `(type, value)` pair.
  ///
  /// An unknown type, or a `time_after` with an unparsable timestamp, yields
  /// [`FilterRule::Other`] rather than an error: stored rules must never make
  /// the read path fail.
  pub fn from_parts(kind: &str, value: &str) -> Self {
    match kind {
      "time_after" => match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => Self::TimeAfter(dt.with_timezone(&Utc)),
        Err(_) => Self::Other { kind: kind.into(), value: value.into() },
      },
      "sender_include" => Self::SenderInclude(value.into()),
      "subject_include" => Self::SubjectInclude(value.into()),
      "sender_exclude" => Self::SenderExclude(value.into()),
      "subject_exclude" => Self::SubjectExclude(value.into()),
      "has_attachment" => Self::HasAttachment,
      "hide_field" => Self::HideField(value.into()),
      other => Self::Other { kind: other.into(), value: value.into() },
    }
  }

  /// Whether this rule strips fields rather than dropping rows.
  pub fn hides_field(&self) -> bool {
    matches!(self, Self::HideField(_))
  }
}

/// A single enabled/disabled rule scoped to one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickFilter {
  pub id:      Uuid,
  pub source:  String,
  pub rule:    FilterRule,
  pub enabled: bool,
}

/// Input for creating a quick filter; the id is assigned by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct NewQuickFilter {
  pub source:  String,
  pub rule:    FilterRule,
  #[serde(default = "default_enabled")]
  pub enabled: bool,
}

fn default_enabled() -> bool {
  true
}
