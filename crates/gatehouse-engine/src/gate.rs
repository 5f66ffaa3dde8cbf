//! The read gate: the one door through which agent pulls leave the broker.
//!
//! Every pull is scoped to a configured source and lands in the audit
//! ledger. When the source has an enabled manifest, that policy pipeline is
//! authoritative and quick filters do not run; without one, the gate serves
//! the raw batch (cache or live, per the source config) through the quick
//! filters.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use gatehouse_core::{
  audit::{AuditEvent, NewAuditEntry},
  boundary::SourceConfig,
  connector::ConnectorRegistry,
  manifest::{ManifestRecord, ManifestStatus},
  row::{DataRow, FieldMap},
  store::BrokerStore,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
  cache,
  crypto::SecretCipher,
  error::{Error, Result},
  pipeline::{self, ExecContext},
  quickfilter,
  registry::OperatorRegistry,
  sync::parse_ttl,
};

/// An agent's read request.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
  pub source:    String,
  /// The agent's stated reason; audited verbatim.
  pub purpose:   String,
  /// Connector fetch parameters for manifest-less live pulls.
  #[serde(default)]
  pub query:     FieldMap,
  #[serde(default)]
  pub limit:     Option<usize>,
  /// Who asked, as the caller identifies itself.
  #[serde(default)]
  pub initiator: Option<String>,
}

/// What a pull produced, with the counts that went to the audit ledger.
#[derive(Debug)]
pub struct PullOutcome {
  pub rows:          Vec<DataRow>,
  /// Rows in the batch before policy, filters, and limit.
  pub fetched:       usize,
  /// Rows actually returned.
  pub returned:      usize,
  /// The governing manifest, when one was enabled.
  pub manifest_id:   Option<Uuid>,
  /// Set when the governing pipeline ended in a `stage` step.
  pub staged_action: Option<Uuid>,
  /// Wall-clock time the pull took, fetch and policy included.
  pub elapsed_ms:    u64,
}

pub struct ReadGate<S> {
  store:      Arc<S>,
  connectors: ConnectorRegistry,
  operators:  OperatorRegistry,
  cipher:     Option<SecretCipher>,
  sources:    HashMap<String, SourceConfig>,
}

impl<S: BrokerStore> ReadGate<S> {
  pub fn new(
    store: Arc<S>,
    connectors: ConnectorRegistry,
    operators: OperatorRegistry,
    cipher: Option<SecretCipher>,
    sources: impl IntoIterator<Item = SourceConfig>,
  ) -> Self {
    Self {
      store,
      connectors,
      operators,
      cipher,
      sources: sources
        .into_iter()
        .map(|c| (c.source.clone(), c))
        .collect(),
    }
  }

  pub fn source_config(&self, source: &str) -> Option<&SourceConfig> {
    self.sources.get(source)
  }

  pub fn sources(&self) -> impl Iterator<Item = &SourceConfig> {
    self.sources.values()
  }

  /// Serve one read request and audit it.
  pub async fn pull(&self, req: &PullRequest) -> Result<PullOutcome> {
    let started = std::time::Instant::now();
    let config = self
      .sources
      .get(&req.source)
      .ok_or_else(|| {
        Error::Core(gatehouse_core::Error::UnknownSource(req.source.clone()))
      })?;

    let manifest = self.governing_manifest(&req.source).await?;
    let mut outcome = match &manifest {
      Some(manifest) => self.pull_via_manifest(config, manifest).await?,
      None => self.pull_via_filters(config, req).await?,
    };

    if let Some(limit) = req.limit {
      outcome.rows.truncate(limit);
    }
    outcome.returned = outcome.rows.len();
    outcome.elapsed_ms = started.elapsed().as_millis() as u64;

    self
      .store
      .append_audit(NewAuditEntry {
        event:   AuditEvent::DataPull,
        source:  req.source.clone(),
        details: json!({
          "purpose":     req.purpose,
          "initiator":   req.initiator,
          "manifest_id": outcome.manifest_id,
          "fetched":     outcome.fetched,
          "returned":    outcome.returned,
        }),
      })
      .await
      .map_err(Error::store)?;

    tracing::info!(
      source = %req.source,
      fetched = outcome.fetched,
      returned = outcome.returned,
      governed = outcome.manifest_id.is_some(),
      elapsed_ms = outcome.elapsed_ms,
      "data pull"
    );
    Ok(outcome)
  }

  /// The newest enabled manifest for a source, if any.
  async fn governing_manifest(
    &self,
    source: &str,
  ) -> Result<Option<ManifestRecord>> {
    let manifests = self
      .store
      .list_manifests(Some(source))
      .await
      .map_err(Error::store)?;
    Ok(
      manifests
        .into_iter()
        .filter(|m| m.status == ManifestStatus::Enabled)
        .next_back(),
    )
  }

  async fn pull_via_manifest(
    &self,
    config: &SourceConfig,
    manifest: &ManifestRecord,
  ) -> Result<PullOutcome> {
    let doc = gatehouse_manifest::parse(&manifest.raw_text)?;
    let connector = self.connectors.get(&config.source);
    let default_ttl =
      parse_ttl(config.cache.as_ref().and_then(|c| c.ttl.as_deref()));

    let ctx = ExecContext {
      source: &config.source,
      boundary: &config.boundary,
      store: self.store.as_ref(),
      connector: connector.as_deref(),
      cipher: self.cipher.as_ref(),
      cache_only: config.cache_enabled(),
      default_ttl,
      now: Utc::now(),
    };
    let output = pipeline::execute(&doc, &self.operators, &ctx).await?;

    // The pull step's output is the pre-policy batch size.
    let fetched = output
      .trail
      .iter()
      .find(|step| step.kind == "pull")
      .map(|step| step.rows_out)
      .unwrap_or(0);
    Ok(PullOutcome {
      returned: output.rows.len(),
      rows: output.rows,
      fetched,
      manifest_id: Some(manifest.id),
      staged_action: output.staged_action,
      elapsed_ms: output.elapsed_ms,
    })
  }

  async fn pull_via_filters(
    &self,
    config: &SourceConfig,
    req: &PullRequest,
  ) -> Result<PullOutcome> {
    let rows = if config.cache_enabled() {
      cache::read_rows(
        self.store.as_ref(),
        &config.source,
        None,
        &config.boundary,
        self.cipher.as_ref(),
        Utc::now(),
      )
      .await?
    } else {
      let connector = self.connectors.require(&config.source)?;
      let mut rows = connector.fetch(&config.boundary, &req.query).await?;
      rows.retain(|r| config.boundary.permits(r));
      rows
    };

    let fetched = rows.len();
    let filters = self
      .store
      .list_filters(&config.source)
      .await
      .map_err(Error::store)?;
    let rows = quickfilter::apply_filters(rows, &filters);

    Ok(PullOutcome {
      returned: rows.len(),
      rows,
      fetched,
      manifest_id: None,
      staged_action: None,
      elapsed_ms: 0,
    })
  }
}
