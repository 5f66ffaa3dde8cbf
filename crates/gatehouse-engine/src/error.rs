//! Error type for `gatehouse-engine`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] gatehouse_core::Error),

  #[error("manifest parse error: {0}")]
  Parse(#[from] gatehouse_manifest::Error),

  #[error("manifest validation error: {0}")]
  Validation(#[from] gatehouse_manifest::ValidationError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// An operator aborted the pipeline. Partial output is discarded.
  #[error("operator {node:?} ({kind}): {message}")]
  Operator {
    node:    String,
    kind:    String,
    message: String,
  },

  /// A sealed payload failed to authenticate, or was sealed but no key is
  /// configured. Never swallowed as "not encrypted".
  #[error("decryption failure: {0}")]
  Decryption(&'static str),

  /// A cached payload that is neither sealed nor a JSON object.
  #[error("cached payload for {source_name}/{item_id} is malformed")]
  MalformedCachePayload { source_name: String, item_id: String },

  #[error("invalid duration string: {0:?} (expected e.g. \"30s\", \"10m\", \"1h\")")]
  BadDuration(String),

  #[error("invalid encryption key: {0}")]
  BadKey(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Wrap a backend error. The store's concrete error type varies per
  /// backend, so it travels boxed.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
