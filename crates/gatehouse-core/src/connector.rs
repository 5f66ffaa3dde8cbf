//! The `SourceConnector` capability and its per-source registry.
//!
//! Connectors are the external collaborators that talk to real provider
//! APIs. The broker consumes exactly two operations: a boundary-honoring
//! fetch and a named action execution. Because each source ships its own
//! connector type, the registry holds them as trait objects; the trait
//! therefore returns boxed futures rather than `impl Future`.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  boundary::SourceBoundary,
  row::{DataRow, FieldMap},
};

/// The outcome of executing a staged action against the real API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
  pub success:     bool,
  pub message:     String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result_data: Option<FieldMap>,
}

/// A boxed `Send` future, as returned by connector trait objects.
pub type ConnectorFuture<'a, T> =
  Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// What a source integration must provide.
///
/// `fetch` must refuse to return rows outside `boundary` — the boundary is
/// enforced upstream of any policy or filter step. Unknown entries in
/// `params` may be ignored.
pub trait SourceConnector: Send + Sync {
  fn fetch<'a>(
    &'a self,
    boundary: &'a SourceBoundary,
    params: &'a FieldMap,
  ) -> ConnectorFuture<'a, Vec<DataRow>>;

  fn execute_action<'a>(
    &'a self,
    action_type: &'a str,
    action_data: &'a FieldMap,
  ) -> ConnectorFuture<'a, ActionResult>;
}

/// Maps a source name to its connector. Built once at startup.
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
  connectors: HashMap<String, Arc<dyn SourceConnector>>,
}

impl ConnectorRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(
    &mut self,
    source: impl Into<String>,
    connector: Arc<dyn SourceConnector>,
  ) {
    self.connectors.insert(source.into(), connector);
  }

  pub fn get(&self, source: &str) -> Option<Arc<dyn SourceConnector>> {
    self.connectors.get(source).cloned()
  }

  /// Like [`ConnectorRegistry::get`], but a missing connector is an error.
  pub fn require(&self, source: &str) -> Result<Arc<dyn SourceConnector>> {
    self
      .get(source)
      .ok_or_else(|| Error::NoConnector(source.to_string()))
  }

  pub fn sources(&self) -> impl Iterator<Item = &str> {
    self.connectors.keys().map(String::as_str)
  }
}
