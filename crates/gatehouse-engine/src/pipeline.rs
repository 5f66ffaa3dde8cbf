//! The pipeline executor: run a validated policy document's graph, one
//! operator at a time, over a flowing row batch.

use chrono::{DateTime, Duration, Utc};
use gatehouse_core::{
  boundary::SourceBoundary,
  connector::SourceConnector,
  row::DataRow,
  store::BrokerStore,
};
use gatehouse_manifest::{OperatorKind, PolicyDocument};
use uuid::Uuid;

use crate::{
  crypto::SecretCipher,
  error::{Error, Result},
  ops,
  registry::OperatorRegistry,
};

/// Everything an operator may touch during one run. Borrowed, not owned;
/// a context lives only as long as the request or timer tick that built it.
pub struct ExecContext<'a, S: BrokerStore> {
  /// The source this pipeline is scoped to.
  pub source:      &'a str,
  /// The owner's fetch ceiling for the source.
  pub boundary:    &'a SourceBoundary,
  pub store:       &'a S,
  /// Live-fetch collaborator; `None` is fine for cache-only sources.
  pub connector:   Option<&'a dyn SourceConnector>,
  /// Cache payload cipher, when the owner configured a key.
  pub cipher:      Option<&'a SecretCipher>,
  /// Whether `pull` reads the cache instead of fetching live.
  pub cache_only:  bool,
  /// TTL for rows written by a `store` step without its own `ttl`.
  pub default_ttl: Duration,
  pub now:         DateTime<Utc>,
}

/// One executed step, for the execution trail.
#[derive(Debug, Clone)]
pub struct PipelineRun {
  pub node:     String,
  pub kind:     &'static str,
  pub rows_in:  usize,
  pub rows_out: usize,
}

/// What a completed run produced.
#[derive(Debug)]
pub struct PipelineOutput {
  /// The final row batch. Empty when the run ended in a `stage` step.
  pub rows:          Vec<DataRow>,
  /// The pending action a terminal `stage` step created, if any.
  pub staged_action: Option<Uuid>,
  pub trail:         Vec<PipelineRun>,
  /// Wall-clock time the run took, including store and connector waits.
  pub elapsed_ms:    u64,
}

/// Validate `doc` and execute its graph in order.
///
/// All-or-nothing: the first failing operator aborts the run with an error
/// and no partial output.
pub async fn execute<S: BrokerStore>(
  doc: &PolicyDocument,
  registry: &OperatorRegistry,
  ctx: &ExecContext<'_, S>,
) -> Result<PipelineOutput> {
  let started = std::time::Instant::now();
  gatehouse_manifest::validate(doc)?;

  let mut rows: Vec<DataRow> = Vec::new();
  let mut staged_action = None;
  let mut trail = Vec::with_capacity(doc.graph.len());

  for node in &doc.graph {
    // Validation resolved every graph name and kind tag already.
    let decl = doc.operators.get(node).ok_or_else(|| Error::Operator {
      node:    node.clone(),
      kind:    "?".to_string(),
      message: "undeclared node survived validation".to_string(),
    })?;
    let kind = decl.operator_kind().ok_or_else(|| Error::Operator {
      node:    node.clone(),
      kind:    decl.kind.clone(),
      message: "unregistered kind survived validation".to_string(),
    })?;
    if !registry.supports(kind) {
      return Err(Error::Operator {
        node:    node.clone(),
        kind:    decl.kind.clone(),
        message: "operator not in this engine's table".to_string(),
      });
    }

    let rows_in = rows.len();
    rows = match kind {
      OperatorKind::Pull => ops::pull(ctx, node, decl).await?,
      OperatorKind::Select => ops::select(node, decl, rows)?,
      OperatorKind::Filter => ops::filter(node, decl, rows)?,
      OperatorKind::Transform => ops::transform(node, decl, rows)?,
      OperatorKind::Stage => {
        staged_action = Some(ops::stage(ctx, decl, &doc.purpose, rows).await?);
        Vec::new()
      }
      OperatorKind::Store => ops::store_rows(ctx, decl, rows).await?,
    };

    trail.push(PipelineRun {
      node: node.clone(),
      kind: kind.as_str(),
      rows_in,
      rows_out: rows.len(),
    });
  }

  Ok(PipelineOutput {
    rows,
    staged_action,
    trail,
    elapsed_ms: started.elapsed().as_millis() as u64,
  })
}
