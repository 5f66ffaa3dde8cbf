//! Error types for `gatehouse-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown source: {0:?}")]
  UnknownSource(String),

  #[error("no connector registered for source: {0:?}")]
  NoConnector(String),

  #[error("staging action not found: {0}")]
  ActionNotFound(Uuid),

  /// An edit or resolve was attempted on an action that already left
  /// `pending`. The action is untouched.
  #[error("action {id} is not pending (status: {status})")]
  ActionNotPending { id: Uuid, status: String },

  #[error("manifest not found: {0}")]
  ManifestNotFound(Uuid),

  #[error("quick filter not found: {0}")]
  FilterNotFound(Uuid),

  #[error("connector failure: {0}")]
  Connector(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
