//! Integration tests for the engine against the SQLite store and a scripted
//! connector.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use gatehouse_core::{
  boundary::{CachePolicy, SourceBoundary, SourceConfig},
  connector::{
    ActionResult, ConnectorFuture, ConnectorRegistry, SourceConnector,
  },
  credential::CredentialRecord,
  filter::{FilterRule, NewQuickFilter},
  manifest::{ManifestStatus, NewManifest},
  row::{DataRow, FieldMap},
  staging::{ActionStatus, Decision, NewAction},
  store::BrokerStore,
};
use gatehouse_store_sqlite::SqliteStore;
use serde_json::json;

use crate::{
  CredentialVault, Error, OperatorRegistry, PullRequest, ReadGate,
  SecretCipher, StagingEngine, SyncScheduler,
  sync::{parse_ttl, sync_once},
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn ts(day: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2025, 6, day, 12, 0, 0).unwrap()
}

fn email(item_id: &str, day: u32, fields: serde_json::Value) -> DataRow {
  let serde_json::Value::Object(fields) = fields else {
    panic!("fields must be an object")
  };
  DataRow {
    source: "gmail".into(),
    item_id: item_id.into(),
    kind: "email".into(),
    timestamp: ts(day),
    fields,
  }
}

/// A scripted connector: serves a fixed row set, records executed actions.
struct MockConnector {
  rows:     Vec<DataRow>,
  fail:     bool,
  delay:    std::time::Duration,
  executed: Mutex<Vec<String>>,
}

impl MockConnector {
  fn new(rows: Vec<DataRow>) -> Arc<Self> {
    Arc::new(Self {
      rows,
      fail: false,
      delay: std::time::Duration::ZERO,
      executed: Mutex::new(Vec::new()),
    })
  }

  fn failing() -> Arc<Self> {
    Arc::new(Self {
      rows: Vec::new(),
      fail: true,
      delay: std::time::Duration::ZERO,
      executed: Mutex::new(Vec::new()),
    })
  }

  fn slow(rows: Vec<DataRow>, delay: std::time::Duration) -> Arc<Self> {
    Arc::new(Self { rows, fail: false, delay, executed: Mutex::new(Vec::new()) })
  }

  fn executed(&self) -> Vec<String> {
    self.executed.lock().unwrap().clone()
  }
}

impl SourceConnector for MockConnector {
  fn fetch<'a>(
    &'a self,
    boundary: &'a SourceBoundary,
    _params: &'a FieldMap,
  ) -> ConnectorFuture<'a, Vec<DataRow>> {
    Box::pin(async move {
      if !self.delay.is_zero() {
        tokio::time::sleep(self.delay).await;
      }
      Ok(
        self
          .rows
          .iter()
          .filter(|r| boundary.permits(r))
          .cloned()
          .collect(),
      )
    })
  }

  fn execute_action<'a>(
    &'a self,
    action_type: &'a str,
    _action_data: &'a FieldMap,
  ) -> ConnectorFuture<'a, ActionResult> {
    Box::pin(async move {
      self.executed.lock().unwrap().push(action_type.to_string());
      Ok(ActionResult {
        success:     !self.fail,
        message:     if self.fail { "provider rejected".into() } else { "ok".into() },
        result_data: None,
      })
    })
  }
}

async fn store() -> Arc<SqliteStore> {
  Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"))
}

fn live_config() -> SourceConfig {
  SourceConfig {
    source:   "gmail".into(),
    boundary: SourceBoundary::default(),
    cache:    None,
  }
}

fn cached_config() -> SourceConfig {
  SourceConfig {
    source:   "gmail".into(),
    boundary: SourceBoundary::default(),
    cache:    Some(CachePolicy { interval: "1h".into(), ttl: Some("7d".into()) }),
  }
}

fn registry_with(connector: Arc<MockConnector>) -> ConnectorRegistry {
  let mut registry = ConnectorRegistry::new();
  registry.register("gmail", connector);
  registry
}

// ─── Read gate: manifest pipeline ────────────────────────────────────────────

const REDACTING_POLICY: &str = r#"
# Narrow emails to safe fields and strip SSNs before the agent sees them.
@purpose: "Pull emails with common fields"
@graph: pull_emails -> select_fields -> redact_ssn
pull_emails: pull { source: "gmail", type: "email" }
select_fields: select { fields: ["title", "body", "sender"] }
redact_ssn: redact { field: "body", pattern: "\\d{3}-\\d{2}-\\d{4}", replacement: "[SSN REDACTED]" }
"#;

#[tokio::test]
async fn enabled_manifest_governs_the_pull() {
  let store = store().await;
  let connector = MockConnector::new(vec![
    email("m1", 1, json!({
      "title": "Tax forms",
      "body": "my ssn is 123-45-6789, please file",
      "sender": "accountant@example.com",
      "thread_id": "t-91",
    })),
    email("m2", 2, json!({
      "title": "Lunch",
      "body": "noon?",
      "sender": "friend@example.com",
    })),
  ]);

  store
    .save_manifest(NewManifest {
      source:   "gmail".into(),
      purpose:  "Pull emails with common fields".into(),
      raw_text: REDACTING_POLICY.into(),
      status:   ManifestStatus::Enabled,
    })
    .await
    .unwrap();

  let gate = ReadGate::new(
    Arc::clone(&store),
    registry_with(Arc::clone(&connector)),
    OperatorRegistry::standard(),
    None,
    [live_config()],
  );

  let outcome = gate
    .pull(&PullRequest {
      source:    "gmail".into(),
      purpose:   "summarize my inbox".into(),
      query:     FieldMap::new(),
      limit:     None,
      initiator: Some("agent".into()),
    })
    .await
    .unwrap();

  assert_eq!(outcome.fetched, 2);
  assert_eq!(outcome.returned, 2);
  assert!(outcome.manifest_id.is_some());

  let m1 = outcome.rows.iter().find(|r| r.item_id == "m1").unwrap();
  assert_eq!(
    m1.text_field("body").unwrap(),
    "my ssn is [SSN REDACTED], please file"
  );
  // select narrowed the field map; the extra header is gone.
  assert!(!m1.fields.contains_key("thread_id"));

  let audits = store
    .query_audit(&gatehouse_core::audit::AuditQuery::default())
    .await
    .unwrap();
  assert_eq!(audits.len(), 1);
  assert_eq!(audits[0].event, gatehouse_core::audit::AuditEvent::DataPull);
  assert_eq!(
    audits[0].details.get("purpose").and_then(|v| v.as_str()),
    Some("summarize my inbox")
  );
}

#[tokio::test]
async fn disabled_manifest_falls_back_to_quick_filters() {
  let store = store().await;
  let connector = MockConnector::new(vec![
    email("m1", 1, json!({"title": "promo blast", "sender": "ads@shop"})),
    email("m2", 2, json!({"title": "standup notes", "sender": "boss@co"})),
  ]);

  store
    .save_manifest(NewManifest {
      source:   "gmail".into(),
      purpose:  "Pull emails with common fields".into(),
      raw_text: REDACTING_POLICY.into(),
      status:   ManifestStatus::Disabled,
    })
    .await
    .unwrap();
  store
    .add_filter(NewQuickFilter {
      source:  "gmail".into(),
      rule:    FilterRule::SenderExclude("ads@".into()),
      enabled: true,
    })
    .await
    .unwrap();

  let gate = ReadGate::new(
    Arc::clone(&store),
    registry_with(connector),
    OperatorRegistry::standard(),
    None,
    [live_config()],
  );

  let outcome = gate
    .pull(&PullRequest {
      source:    "gmail".into(),
      purpose:   "inbox check".into(),
      query:     FieldMap::new(),
      limit:     None,
      initiator: None,
    })
    .await
    .unwrap();

  assert!(outcome.manifest_id.is_none());
  assert_eq!(outcome.fetched, 2);
  assert_eq!(outcome.returned, 1);
  assert_eq!(outcome.rows[0].item_id, "m2");
}

#[tokio::test]
async fn limit_truncates_after_filtering() {
  let store = store().await;
  let connector = MockConnector::new(vec![
    email("m1", 1, json!({"title": "a"})),
    email("m2", 2, json!({"title": "b"})),
    email("m3", 3, json!({"title": "c"})),
  ]);

  let gate = ReadGate::new(
    Arc::clone(&store),
    registry_with(connector),
    OperatorRegistry::standard(),
    None,
    [live_config()],
  );

  let outcome = gate
    .pull(&PullRequest {
      source:    "gmail".into(),
      purpose:   "peek".into(),
      query:     FieldMap::new(),
      limit:     Some(2),
      initiator: None,
    })
    .await
    .unwrap();
  assert_eq!(outcome.fetched, 3);
  assert_eq!(outcome.returned, 2);
}

#[tokio::test]
async fn unknown_source_is_refused() {
  let store = store().await;
  let gate = ReadGate::new(
    Arc::clone(&store),
    ConnectorRegistry::new(),
    OperatorRegistry::standard(),
    None,
    [live_config()],
  );

  let err = gate
    .pull(&PullRequest {
      source:    "dropbox".into(),
      purpose:   "?".into(),
      query:     FieldMap::new(),
      limit:     None,
      initiator: None,
    })
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(gatehouse_core::Error::UnknownSource(_))
  ));
}

#[tokio::test]
async fn a_pull_reports_its_elapsed_time() {
  let store = store().await;
  let connector = MockConnector::slow(
    vec![email("m1", 1, json!({"title": "a"}))],
    std::time::Duration::from_millis(30),
  );

  let gate = ReadGate::new(
    Arc::clone(&store),
    registry_with(connector),
    OperatorRegistry::standard(),
    None,
    [live_config()],
  );
  let outcome = gate
    .pull(&PullRequest {
      source:    "gmail".into(),
      purpose:   "timing check".into(),
      query:     FieldMap::new(),
      limit:     None,
      initiator: None,
    })
    .await
    .unwrap();

  // The connector slept 30ms; the reported wall-clock time covers it.
  assert!(
    outcome.elapsed_ms >= 25,
    "elapsed_ms = {}",
    outcome.elapsed_ms
  );
}

// ─── Cache path ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn cache_only_source_with_empty_cache_yields_empty() {
  let store = store().await;
  // No connector at all: the cache path must never need one.
  let gate = ReadGate::new(
    Arc::clone(&store),
    ConnectorRegistry::new(),
    OperatorRegistry::standard(),
    None,
    [cached_config()],
  );

  let outcome = gate
    .pull(&PullRequest {
      source:    "gmail".into(),
      purpose:   "offline read".into(),
      query:     FieldMap::new(),
      limit:     None,
      initiator: None,
    })
    .await
    .unwrap();
  assert!(outcome.rows.is_empty());
  assert_eq!(outcome.fetched, 0);
}

#[tokio::test]
async fn sync_then_serve_from_cache_sealed_at_rest() {
  let store = store().await;
  let cipher = SecretCipher::from_key_bytes([3; 32]);
  let connector = MockConnector::new(vec![
    email("m1", 1, json!({"title": "hello", "body": "cache me"})),
  ]);

  let written = sync_once(
    store.as_ref(),
    connector.as_ref(),
    &SourceBoundary::default(),
    Some(&cipher),
    parse_ttl(Some("7d")),
  )
  .await
  .unwrap();
  assert_eq!(written, 1);

  // At rest the payload is ciphertext, not the plaintext field map.
  let at_rest = store.get_cached("gmail", None, Utc::now()).await.unwrap();
  assert!(at_rest[0].data.starts_with("enc:v1:"));
  assert!(!at_rest[0].data.contains("cache me"));

  let gate = ReadGate::new(
    Arc::clone(&store),
    ConnectorRegistry::new(),
    OperatorRegistry::standard(),
    Some(cipher),
    [cached_config()],
  );
  let outcome = gate
    .pull(&PullRequest {
      source:    "gmail".into(),
      purpose:   "read cached".into(),
      query:     FieldMap::new(),
      limit:     None,
      initiator: None,
    })
    .await
    .unwrap();
  assert_eq!(outcome.returned, 1);
  assert_eq!(outcome.rows[0].text_field("body"), Some("cache me"));
}

#[tokio::test]
async fn boundary_change_is_rechecked_on_cache_reads() {
  let store = store().await;
  let connector = MockConnector::new(vec![
    email("old", 1, json!({"title": "stale"})),
    email("new", 20, json!({"title": "fresh"})),
  ]);

  sync_once(
    store.as_ref(),
    connector.as_ref(),
    &SourceBoundary::default(),
    None,
    parse_ttl(None),
  )
  .await
  .unwrap();

  // Tighten the boundary after the rows were cached.
  let mut config = cached_config();
  config.boundary.after = Some(ts(10));

  let gate = ReadGate::new(
    Arc::clone(&store),
    ConnectorRegistry::new(),
    OperatorRegistry::standard(),
    None,
    [config],
  );
  let outcome = gate
    .pull(&PullRequest {
      source:    "gmail".into(),
      purpose:   "recent only".into(),
      query:     FieldMap::new(),
      limit:     None,
      initiator: None,
    })
    .await
    .unwrap();
  assert_eq!(outcome.returned, 1);
  assert_eq!(outcome.rows[0].item_id, "new");
}

#[tokio::test]
async fn disabling_cache_purges_stored_rows() {
  let store = store().await;
  let connector = MockConnector::new(vec![
    email("m1", 1, json!({"title": "keep until disabled"})),
    email("m2", 2, json!({"title": "me too"})),
  ]);

  sync_once(
    store.as_ref(),
    connector.as_ref(),
    &SourceBoundary::default(),
    None,
    parse_ttl(None),
  )
  .await
  .unwrap();
  assert_eq!(store.get_cached("gmail", None, Utc::now()).await.unwrap().len(), 2);

  let scheduler =
    SyncScheduler::new(Arc::clone(&store), ConnectorRegistry::new(), None);
  let purged = scheduler.disable("gmail", true).await.unwrap();
  assert_eq!(purged, 2);
  assert!(store.get_cached("gmail", None, Utc::now()).await.unwrap().is_empty());

  // Without the purge flag nothing is deleted.
  sync_once(
    store.as_ref(),
    connector.as_ref(),
    &SourceBoundary::default(),
    None,
    parse_ttl(None),
  )
  .await
  .unwrap();
  assert_eq!(scheduler.disable("gmail", false).await.unwrap(), 0);
  assert_eq!(store.get_cached("gmail", None, Utc::now()).await.unwrap().len(), 2);
}

// ─── Staging ─────────────────────────────────────────────────────────────────

fn send_email_action() -> NewAction {
  let serde_json::Value::Object(payload) =
    json!({"to": "bob@example.com", "body": "draft"})
  else {
    unreachable!()
  };
  NewAction {
    source: "gmail".into(),
    action_type: "send_email".into(),
    payload,
    purpose: "reply to bob".into(),
  }
}

#[tokio::test]
async fn nothing_executes_before_approval() {
  let store = store().await;
  let connector = MockConnector::new(Vec::new());
  let engine =
    StagingEngine::new(Arc::clone(&store), registry_with(Arc::clone(&connector)));

  let action = engine.propose(send_email_action()).await.unwrap();
  assert_eq!(action.status, ActionStatus::Pending);
  assert!(connector.executed().is_empty());

  let approved = engine
    .resolve(action.action_id, Decision::Approve)
    .await
    .unwrap();
  assert_eq!(approved.status, ActionStatus::Committed);
  assert!(approved.resolved_at.is_some());
  assert_eq!(connector.executed(), ["send_email"]);
}

#[tokio::test]
async fn rejection_executes_nothing_and_is_terminal() {
  let store = store().await;
  let connector = MockConnector::new(Vec::new());
  let engine =
    StagingEngine::new(Arc::clone(&store), registry_with(Arc::clone(&connector)));

  let action = engine.propose(send_email_action()).await.unwrap();
  let rejected = engine
    .resolve(action.action_id, Decision::Reject)
    .await
    .unwrap();
  assert_eq!(rejected.status, ActionStatus::Rejected);
  assert!(connector.executed().is_empty());

  // Terminal: a second decision is refused, either way.
  let err = engine
    .resolve(action.action_id, Decision::Approve)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(gatehouse_core::Error::ActionNotPending { .. })
  ));
}

#[tokio::test]
async fn payload_edits_stop_at_resolution() {
  let store = store().await;
  let connector = MockConnector::new(Vec::new());
  let engine =
    StagingEngine::new(Arc::clone(&store), registry_with(connector));

  let action = engine.propose(send_email_action()).await.unwrap();
  let serde_json::Value::Object(edited) = json!({"to": "carol@example.com"})
  else {
    unreachable!()
  };
  let updated = engine
    .edit_payload(action.action_id, edited.clone())
    .await
    .unwrap();
  assert_eq!(updated.payload, edited);

  engine
    .resolve(action.action_id, Decision::Reject)
    .await
    .unwrap();
  let err = engine
    .edit_payload(action.action_id, FieldMap::new())
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(gatehouse_core::Error::ActionNotPending { .. })
  ));
}

#[tokio::test]
async fn missing_connector_leaves_the_action_pending() {
  let store = store().await;
  let engine =
    StagingEngine::new(Arc::clone(&store), ConnectorRegistry::new());

  let action = engine.propose(send_email_action()).await.unwrap();
  let err = engine
    .resolve(action.action_id, Decision::Approve)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(gatehouse_core::Error::NoConnector(_))
  ));

  let fetched = store.get_action(action.action_id).await.unwrap().unwrap();
  assert_eq!(fetched.status, ActionStatus::Pending);
}

#[tokio::test]
async fn failed_execution_still_commits_with_the_outcome_audited() {
  let store = store().await;
  let connector = MockConnector::failing();
  let engine =
    StagingEngine::new(Arc::clone(&store), registry_with(Arc::clone(&connector)));

  let action = engine.propose(send_email_action()).await.unwrap();
  let resolved = engine
    .resolve(action.action_id, Decision::Approve)
    .await
    .unwrap();
  assert_eq!(resolved.status, ActionStatus::Committed);

  let audits = store
    .query_audit(&gatehouse_core::audit::AuditQuery {
      event: Some(gatehouse_core::audit::AuditEvent::ActionCommitted),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(audits.len(), 1);
  assert_eq!(audits[0].details.get("success"), Some(&json!(false)));
  assert_eq!(
    audits[0].details.get("message").and_then(|v| v.as_str()),
    Some("provider rejected")
  );
}

// ─── Vault ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn vault_round_trips_and_never_stores_plaintext() {
  let store = store().await;
  let vault =
    CredentialVault::new(Arc::clone(&store), SecretCipher::from_key_bytes([7; 32]));

  vault
    .store(CredentialRecord {
      source:        "gmail".into(),
      access_token:  "ya29.access-secret".into(),
      refresh_token: Some("1//refresh-secret".into()),
      token_type:    "Bearer".into(),
      expires_at:    Some(Utc::now() + Duration::hours(1)),
      scopes:        "mail.read".into(),
      account_info:  Some(json!({"email": "owner@example.com"})),
    })
    .await
    .unwrap();

  let at_rest = store.get_credential("gmail").await.unwrap().unwrap();
  assert!(at_rest.access_token.starts_with("enc:v1:"));
  assert!(!at_rest.access_token.contains("secret"));
  assert!(at_rest.refresh_token.unwrap().starts_with("enc:v1:"));

  let loaded = vault.load("gmail").await.unwrap().unwrap();
  assert_eq!(loaded.access_token, "ya29.access-secret");
  assert_eq!(loaded.refresh_token.as_deref(), Some("1//refresh-secret"));
  assert!(vault.is_connected("gmail").await.unwrap());
  assert_eq!(vault.is_expired("gmail", Utc::now()).await.unwrap(), Some(false));
}

#[tokio::test]
async fn vault_refresh_and_disconnect() {
  let store = store().await;
  let vault =
    CredentialVault::new(Arc::clone(&store), SecretCipher::from_key_bytes([7; 32]));

  vault
    .store(CredentialRecord {
      source:        "gmail".into(),
      access_token:  "old-token".into(),
      refresh_token: Some("keep-me".into()),
      token_type:    "Bearer".into(),
      expires_at:    Some(Utc::now() - Duration::hours(1)),
      scopes:        "mail.read".into(),
      account_info:  None,
    })
    .await
    .unwrap();
  assert_eq!(vault.is_expired("gmail", Utc::now()).await.unwrap(), Some(true));

  assert!(
    vault
      .record_refresh("gmail", "new-token", Some(Utc::now() + Duration::hours(1)))
      .await
      .unwrap()
  );
  let loaded = vault.load("gmail").await.unwrap().unwrap();
  assert_eq!(loaded.access_token, "new-token");
  assert_eq!(loaded.refresh_token.as_deref(), Some("keep-me"));

  assert!(vault.disconnect("gmail").await.unwrap());
  assert!(!vault.is_connected("gmail").await.unwrap());
  assert_eq!(vault.is_expired("gmail", Utc::now()).await.unwrap(), None);

  let events: Vec<_> = store
    .query_audit(&gatehouse_core::audit::AuditQuery::default())
    .await
    .unwrap()
    .into_iter()
    .map(|e| e.event)
    .collect();
  assert!(events.contains(&gatehouse_core::audit::AuditEvent::SourceConnected));
  assert!(events.contains(&gatehouse_core::audit::AuditEvent::SourceDisconnected));
}

// ─── Manifest staging through the pipeline ───────────────────────────────────

const STAGING_POLICY: &str = r#"
@purpose: "Draft a digest from recent emails"
@graph: pull_emails -> select_fields -> stage_digest
pull_emails: pull { source: "gmail", type: "email" }
select_fields: select { fields: ["title", "sender"] }
stage_digest: stage { action_type: "draft_digest", folder: "digests" }
"#;

#[tokio::test]
async fn terminal_stage_step_creates_a_pending_action() {
  let store = store().await;
  let connector = MockConnector::new(vec![
    email("m1", 1, json!({"title": "a", "sender": "x@y", "body": "drop me"})),
  ]);

  store
    .save_manifest(NewManifest {
      source:   "gmail".into(),
      purpose:  "Draft a digest from recent emails".into(),
      raw_text: STAGING_POLICY.into(),
      status:   ManifestStatus::Enabled,
    })
    .await
    .unwrap();

  let gate = ReadGate::new(
    Arc::clone(&store),
    registry_with(Arc::clone(&connector)),
    OperatorRegistry::standard(),
    None,
    [live_config()],
  );
  let outcome = gate
    .pull(&PullRequest {
      source:    "gmail".into(),
      purpose:   "make my digest".into(),
      query:     FieldMap::new(),
      limit:     None,
      initiator: None,
    })
    .await
    .unwrap();

  assert!(outcome.rows.is_empty());
  let action_id = outcome.staged_action.expect("staged action");
  let action = store.get_action(action_id).await.unwrap().unwrap();
  assert_eq!(action.status, ActionStatus::Pending);
  assert_eq!(action.action_type, "draft_digest");
  let rows = action.payload.get("rows").and_then(|v| v.as_array()).unwrap();
  assert_eq!(rows.len(), 1);
  // Scalar props other than the consumed action_type land in the payload.
  assert_eq!(action.payload.get("folder"), Some(&json!("digests")));
  assert!(!action.payload.contains_key("action_type"));
  // The select step ran before staging.
  assert!(rows[0].get("fields").unwrap().get("body").is_none());
  // Nothing executed: staging is not execution.
  assert!(connector.executed().is_empty());
}
