//! Staging actions — agent-proposed writes held for owner review.
//!
//! Status transitions are strictly one-way:
//! `pending → approved → committed`, or `pending → rejected`. `pending` is
//! initial; `committed` and `rejected` are terminal. The payload is mutable
//! only while pending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::row::FieldMap;

/// Where an action is in its review lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
  /// Proposed; awaiting the owner's decision.
  Pending,
  /// Owner approved; connector execution in flight. A transient state —
  /// observable only if the process dies mid-execution.
  Approved,
  /// Execution attempted. The outcome (success or failure) lives in the
  /// audit detail, not in the status.
  Committed,
  /// Owner declined; nothing was executed.
  Rejected,
}

impl ActionStatus {
  /// Terminal statuses admit no further edit or resolve.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Committed | Self::Rejected)
  }

  /// The string stored in the `status` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Approved => "approved",
      Self::Committed => "committed",
      Self::Rejected => "rejected",
    }
  }
}

impl std::fmt::Display for ActionStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A proposed write action, pending (or past) owner review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingAction {
  pub action_id:   Uuid,
  pub source:      String,
  /// Connector-defined action name, e.g. `"send_email"`.
  pub action_type: String,
  /// Connector-defined action parameters.
  pub payload:     FieldMap,
  /// The agent's free-text justification; always audited.
  pub purpose:     String,
  pub status:      ActionStatus,
  pub proposed_at: DateTime<Utc>,
  pub resolved_at: Option<DateTime<Utc>>,
}

/// Input to `propose`; id, status, and timestamps are assigned by the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAction {
  pub source:      String,
  pub action_type: String,
  pub payload:     FieldMap,
  pub purpose:     String,
}

/// The owner's decision on a pending action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
  Approve,
  Reject,
}
