//! Stored manifest records.
//!
//! The raw policy text is what persists; the parsed document
//! (`gatehouse-manifest`) is always rebuilt from it on use, so the text on
//! disk is the single source of truth for what a policy says.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a stored manifest participates in the read path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestStatus {
  Enabled,
  Disabled,
}

impl ManifestStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Enabled => "enabled",
      Self::Disabled => "disabled",
    }
  }

  pub fn from_str(s: &str) -> Option<Self> {
    match s {
      "enabled" => Some(Self::Enabled),
      "disabled" => Some(Self::Disabled),
      _ => None,
    }
  }
}

/// A persisted policy manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRecord {
  pub id:       Uuid,
  pub source:   String,
  /// The `@purpose` line, denormalised for listing without reparsing.
  pub purpose:  String,
  pub raw_text: String,
  pub status:   ManifestStatus,
}

/// Input to the store's save operation; the id is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewManifest {
  pub source:   String,
  pub purpose:  String,
  pub raw_text: String,
  pub status:   ManifestStatus,
}
