//! The Gatehouse policy DSL: document types, parser, and validator.
//!
//! A manifest is a small declarative text policy:
//!
//! ```text
//! @purpose: "Pull emails with common fields"
//! @graph: pull_emails -> select_fields
//! pull_emails: pull { source: "gmail", type: "email" }
//! select_fields: select { fields: ["title", "body", "labels"] }
//! ```
//!
//! Pure and synchronous; no HTTP or database dependencies. Parsing checks
//! syntax only; graph/declaration resolution is [`validate`]'s job.

pub mod error;
mod parse;
mod validate;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use error::{Error, Result, ValidationError};
pub use validate::validate;

// ─── Operator kinds ──────────────────────────────────────────────────────────

/// The closed set of operator kinds the engine can execute. Unknown tags are
/// rejected at validation time, never at execution time.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OperatorKind {
  /// Fetch rows (cache or live) for a source. Always first in practice.
  Pull,
  /// Narrow every row's field map to a named set.
  Select,
  /// Keep or drop whole rows by a field predicate.
  Filter,
  /// Rewrite a field's textual content in place (the `redact` transform).
  Transform,
  /// Convert the row stream into a staged write request. Terminal only.
  Stage,
  /// Persist the row stream into the cache, passing rows through.
  Store,
}

impl OperatorKind {
  /// Parse a declaration's kind tag. `redact` is accepted as a spelling of
  /// `transform` — the worked policies in the wild use both.
  pub fn from_tag(tag: &str) -> Option<Self> {
    Some(match tag {
      "pull" => Self::Pull,
      "select" => Self::Select,
      "filter" => Self::Filter,
      "transform" | "redact" => Self::Transform,
      "stage" => Self::Stage,
      "store" => Self::Store,
      _ => return None,
    })
  }

  /// The canonical tag, as reported in execution trails.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pull => "pull",
      Self::Select => "select",
      Self::Filter => "filter",
      Self::Transform => "transform",
      Self::Stage => "stage",
      Self::Store => "store",
    }
  }
}

// ─── Property values ─────────────────────────────────────────────────────────

/// A declaration property value: a quoted string or a string array.
/// Unknown property keys are preserved opaquely and only interpreted by the
/// operator that consumes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
  Str(String),
  List(Vec<String>),
}

impl PropValue {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Str(s) => Some(s),
      Self::List(_) => None,
    }
  }

  pub fn as_list(&self) -> Option<&[String]> {
    match self {
      Self::Str(_) => None,
      Self::List(items) => Some(items),
    }
  }
}

// ─── Document ────────────────────────────────────────────────────────────────

/// One step of a policy pipeline, as declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDecl {
  /// The raw kind tag as written. May be unregistered — validation decides.
  pub kind:  String,
  pub props: BTreeMap<String, PropValue>,
}

impl OperatorDecl {
  /// The registered kind, if the tag is one the engine knows.
  pub fn operator_kind(&self) -> Option<OperatorKind> {
    OperatorKind::from_tag(&self.kind)
  }

  /// A required string property, by key.
  pub fn str_prop(&self, key: &str) -> Option<&str> {
    self.props.get(key).and_then(PropValue::as_str)
  }

  /// A required list property, by key.
  pub fn list_prop(&self, key: &str) -> Option<&[String]> {
    self.props.get(key).and_then(PropValue::as_list)
  }
}

/// A named, parsed access policy: purpose, execution order, declarations.
///
/// Declarations not referenced by the graph are inert but legal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
  pub purpose:   String,
  /// Node names in execution order.
  pub graph:     Vec<String>,
  pub operators: BTreeMap<String, OperatorDecl>,
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Parse policy text into a [`PolicyDocument`].
///
/// Fails on malformed syntax: missing `@purpose` or `@graph`, an unparsable
/// declaration, or a duplicate node name. No partial document is returned.
pub fn parse(input: &str) -> Result<PolicyDocument> {
  parse::parse_document(input)
}
