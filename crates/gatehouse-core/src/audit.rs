//! The audit ledger's entry types.
//!
//! Entries are append-only: auto-numbered, timestamped at insert, never
//! updated or deleted. Every data-exposing or state-changing operation
//! appends one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened. The variant name is the `event` column discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
  /// Rows were returned to an agent.
  DataPull,
  ActionProposed,
  ActionApproved,
  ActionRejected,
  /// Execution was attempted after approval; the outcome is in the details.
  ActionCommitted,
  /// A credential record was stored for a source.
  SourceConnected,
  /// A credential record was deleted.
  SourceDisconnected,
}

impl AuditEvent {
  /// The discriminant string stored in the `event` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::DataPull => "data_pull",
      Self::ActionProposed => "action_proposed",
      Self::ActionApproved => "action_approved",
      Self::ActionRejected => "action_rejected",
      Self::ActionCommitted => "action_committed",
      Self::SourceConnected => "source_connected",
      Self::SourceDisconnected => "source_disconnected",
    }
  }

  pub fn from_str(s: &str) -> Option<Self> {
    Some(match s {
      "data_pull" => Self::DataPull,
      "action_proposed" => Self::ActionProposed,
      "action_approved" => Self::ActionApproved,
      "action_rejected" => Self::ActionRejected,
      "action_committed" => Self::ActionCommitted,
      "source_connected" => Self::SourceConnected,
      "source_disconnected" => Self::SourceDisconnected,
      _ => return None,
    })
  }
}

/// One immutable audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
  /// Monotonically increasing, assigned by the store.
  pub id:      i64,
  /// Assigned by the store at insert time.
  pub at:      DateTime<Utc>,
  pub event:   AuditEvent,
  pub source:  String,
  /// Structured detail payload. Must never contain raw credential material.
  pub details: serde_json::Value,
}

/// Input to the ledger's append operation.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
  pub event:   AuditEvent,
  pub source:  String,
  pub details: serde_json::Value,
}

/// Parameters for querying the ledger. All fields conjunctive; `limit`
/// bounds the result from the newest end.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
  pub event:  Option<AuditEvent>,
  pub source: Option<String>,
  pub limit:  Option<usize>,
}
