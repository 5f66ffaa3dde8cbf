//! Error types for `gatehouse-manifest`.

use thiserror::Error;

/// A syntax error in policy text. No partial document survives one.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
  #[error("missing @purpose line")]
  MissingPurpose,

  #[error("missing @graph line")]
  MissingGraph,

  #[error("@graph lists no nodes")]
  EmptyGraph,

  #[error("duplicate node name: {0:?}")]
  DuplicateNode(String),

  #[error("line {line}: cannot parse declaration: {text:?}")]
  BadDeclaration { line: usize, text: String },

  #[error("line {line}: unterminated string literal")]
  UnterminatedString { line: usize },

  #[error("line {line}: cannot parse property list: {text:?}")]
  BadProperties { line: usize, text: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A semantic error found by [`crate::validate`]. Validation is pure; it
/// never touches a connector or the database.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
  /// Graph names with no matching declaration. Carries every offender.
  #[error("undeclared operators in graph: {0:?}")]
  UndeclaredOperators(Vec<String>),

  /// Declared kinds no registered operator handles. Carries every offender
  /// so a caller can report all problems at once.
  #[error("unsupported operator kinds: {0:?}")]
  UnsupportedOperators(Vec<String>),

  /// A `stage` node must be the final element of the graph.
  #[error("stage node {0:?} must be terminal")]
  StageNotTerminal(String),
}
