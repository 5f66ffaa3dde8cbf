use std::sync::Arc;

use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use axum::{
  body::Body,
  http::{Request, StatusCode, header},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::Utc;
use gatehouse_core::{
  boundary::{SourceBoundary, SourceConfig},
  connector::{
    ActionResult, ConnectorFuture, ConnectorRegistry, SourceConnector,
  },
  row::{DataRow, FieldMap},
};
use gatehouse_engine::{OperatorRegistry, ReadGate, StagingEngine};
use gatehouse_store_sqlite::SqliteStore;
use rand_core::OsRng;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::{AppState, auth::AuthConfig, router};

// ─── Fixtures ────────────────────────────────────────────────────────────────

struct StubConnector;

fn email(item_id: &str, sender: &str, title: &str) -> DataRow {
  let mut fields = FieldMap::new();
  fields.insert("sender".into(), json!(sender));
  fields.insert("title".into(), json!(title));
  fields.insert("body".into(), json!("hello"));
  DataRow {
    source: "gmail".into(),
    item_id: item_id.into(),
    kind: "email".into(),
    timestamp: Utc::now(),
    fields,
  }
}

impl SourceConnector for StubConnector {
  fn fetch<'a>(
    &'a self,
    boundary: &'a SourceBoundary,
    _params: &'a FieldMap,
  ) -> ConnectorFuture<'a, Vec<DataRow>> {
    Box::pin(async move {
      let rows = vec![
        email("m1", "boss@example.com", "Quarterly plan"),
        email("m2", "noreply@promo.example", "Huge sale"),
      ];
      Ok(rows.into_iter().filter(|r| boundary.permits(r)).collect())
    })
  }

  fn execute_action<'a>(
    &'a self,
    action_type: &'a str,
    _action_data: &'a FieldMap,
  ) -> ConnectorFuture<'a, ActionResult> {
    Box::pin(async move {
      Ok(ActionResult {
        success:     true,
        message:     format!("{action_type} done"),
        result_data: None,
      })
    })
  }
}

async fn make_state(password: &str) -> AppState<SqliteStore> {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let salt = SaltString::generate(&mut OsRng);
  let hash = Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .unwrap()
    .to_string();

  let mut connectors = ConnectorRegistry::new();
  connectors.register("gmail", Arc::new(StubConnector));

  let sources = vec![SourceConfig {
    source:   "gmail".into(),
    boundary: SourceBoundary::default(),
    cache:    None,
  }];

  AppState {
    store:   Arc::clone(&store),
    gate:    Arc::new(ReadGate::new(
      Arc::clone(&store),
      connectors.clone(),
      OperatorRegistry::standard(),
      None,
      sources,
    )),
    staging: Arc::new(StagingEngine::new(Arc::clone(&store), connectors)),
    auth:    Arc::new(AuthConfig {
      username:      "owner".to_string(),
      password_hash: hash,
    }),
  }
}

fn auth_header(user: &str, pass: &str) -> String {
  format!("Basic {}", B64.encode(format!("{user}:{pass}")))
}

async fn call(
  state: AppState<SqliteStore>,
  method: &str,
  uri: &str,
  auth: Option<&str>,
  body: Option<Value>,
) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  if let Some(auth) = auth {
    builder = builder.header(header::AUTHORIZATION, auth);
  }
  let req = match body {
    Some(v) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(v.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };
  let resp = router(state).oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
    .await
    .unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

// ─── Auth ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unauthenticated_requests_get_a_basic_challenge() {
  let state = make_state("secret").await;
  let req = Request::builder()
    .method("GET")
    .uri("/actions")
    .body(Body::empty())
    .unwrap();
  let resp = router(state).oneshot(req).await.unwrap();
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  let challenge = resp.headers().get(header::WWW_AUTHENTICATE).unwrap();
  assert!(challenge.to_str().unwrap().starts_with("Basic"));
}

#[tokio::test]
async fn a_wrong_password_is_refused() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "wrong");
  let (status, _) = call(state, "GET", "/actions", Some(&auth), None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ─── Pull ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn a_pull_without_a_purpose_is_refused() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "secret");
  let (status, body) = call(
    state,
    "POST",
    "/pull",
    Some(&auth),
    Some(json!({ "source": "gmail" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("purpose"));
}

#[tokio::test]
async fn a_pull_from_an_unconfigured_source_is_404() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "secret");
  let (status, _) = call(
    state,
    "POST",
    "/pull",
    Some(&auth),
    Some(json!({ "source": "slack", "purpose": "triage" })),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn a_pull_returns_rows_and_lands_in_the_ledger() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "secret");

  let (status, body) = call(
    state.clone(),
    "POST",
    "/pull",
    Some(&auth),
    Some(json!({ "source": "gmail", "purpose": "inbox triage" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["rows"].as_array().unwrap().len(), 2);
  assert_eq!(body["fetched"], 2);
  assert_eq!(body["returned"], 2);
  assert!(body["elapsed_ms"].is_u64());

  let (status, entries) =
    call(state, "GET", "/audit?event=data_pull", Some(&auth), None).await;
  assert_eq!(status, StatusCode::OK);
  let entries = entries.as_array().unwrap();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0]["details"]["purpose"], "inbox triage");
}

#[tokio::test]
async fn a_pull_honours_the_limit() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "secret");
  let (status, body) = call(
    state,
    "POST",
    "/pull",
    Some(&auth),
    Some(json!({ "source": "gmail", "purpose": "triage", "limit": 1 })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["rows"].as_array().unwrap().len(), 1);
  assert_eq!(body["fetched"], 2);
  assert_eq!(body["returned"], 1);
}

// ─── Staged actions ──────────────────────────────────────────────────────────

async fn propose_send(
  state: AppState<SqliteStore>,
  auth: &str,
) -> Uuid {
  let (status, body) = call(
    state,
    "POST",
    "/actions",
    Some(auth),
    Some(json!({
      "source":      "gmail",
      "action_type": "send_email",
      "action_data": { "to": "alice@example.com", "subject": "hi" },
      "purpose":     "reply to alice",
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["status"], "pending_review");
  body["action_id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn a_staged_action_waits_for_approval() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "secret");
  let id = propose_send(state.clone(), &auth).await;

  let (status, pending) =
    call(state.clone(), "GET", "/actions?status=pending", Some(&auth), None)
      .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(pending.as_array().unwrap().len(), 1);

  let (status, resolved) = call(
    state.clone(),
    "POST",
    &format!("/actions/{id}/approve"),
    Some(&auth),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(resolved["status"], "committed");

  // A committed action cannot be resolved again.
  let (status, _) = call(
    state,
    "POST",
    &format!("/actions/{id}/approve"),
    Some(&auth),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn a_rejected_action_is_terminal() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "secret");
  let id = propose_send(state.clone(), &auth).await;

  let (status, resolved) = call(
    state.clone(),
    "POST",
    &format!("/actions/{id}/reject"),
    Some(&auth),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(resolved["status"], "rejected");

  let (status, _) = call(
    state,
    "PATCH",
    &format!("/actions/{id}"),
    Some(&auth),
    Some(json!({ "subject": "changed" })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn a_pending_payload_can_be_edited_in_place() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "secret");
  let id = propose_send(state.clone(), &auth).await;

  let (status, updated) = call(
    state,
    "PATCH",
    &format!("/actions/{id}"),
    Some(&auth),
    Some(json!({ "subject": "hi (edited)" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(updated["payload"]["subject"], "hi (edited)");
  // Untouched fields survive the merge.
  assert_eq!(updated["payload"]["to"], "alice@example.com");
}

#[tokio::test]
async fn resolving_an_unknown_action_is_404() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "secret");
  let id = Uuid::new_v4();
  let (status, _) = call(
    state,
    "POST",
    &format!("/actions/{id}/approve"),
    Some(&auth),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn an_unknown_status_query_is_refused() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "secret");
  let (status, _) =
    call(state, "GET", "/actions?status=done", Some(&auth), None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ─── Manifests ───────────────────────────────────────────────────────────────

const TRIAGE_POLICY: &str = r#"
@purpose: "Inbox triage with redacted bodies"
@graph: pull_mail -> pick_fields
pull_mail: pull { source: "gmail", type: "email" }
pick_fields: select { fields: ["sender", "title"] }
"#;

#[tokio::test]
async fn a_valid_manifest_is_stored_enabled() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "secret");

  let (status, record) = call(
    state.clone(),
    "POST",
    "/manifests",
    Some(&auth),
    Some(json!({ "source": "gmail", "text": TRIAGE_POLICY })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(record["status"], "enabled");
  assert_eq!(record["purpose"], "Inbox triage with redacted bodies");

  let (status, listed) =
    call(state, "GET", "/manifests?source=gmail", Some(&auth), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_policy_text_is_refused() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "secret");
  let (status, body) = call(
    state,
    "POST",
    "/manifests",
    Some(&auth),
    Some(json!({ "source": "gmail", "text": "@graph: a -> b" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("@purpose"));
}

#[tokio::test]
async fn a_policy_with_undeclared_nodes_is_refused_by_name() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "secret");
  let text = concat!(
    "@purpose: \"broken\"\n",
    "@graph: pull_mail -> vanish\n",
    "pull_mail: pull { source: \"gmail\" }\n",
  );
  let (status, body) = call(
    state,
    "POST",
    "/manifests",
    Some(&auth),
    Some(json!({ "source": "gmail", "text": text })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("vanish"));
}

#[tokio::test]
async fn disabling_a_manifest_takes_it_out_of_service() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "secret");

  let (_, record) = call(
    state.clone(),
    "POST",
    "/manifests",
    Some(&auth),
    Some(json!({ "source": "gmail", "text": TRIAGE_POLICY })),
  )
  .await;
  let id = record["id"].as_str().unwrap().to_string();

  let (status, _) = call(
    state.clone(),
    "POST",
    &format!("/manifests/{id}/disable"),
    Some(&auth),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NO_CONTENT);

  let (status, _) = call(
    state,
    "POST",
    &format!("/manifests/{}/disable", Uuid::new_v4()),
    Some(&auth),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ─── Quick filters ───────────────────────────────────────────────────────────

#[tokio::test]
async fn listing_filters_requires_a_source() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "secret");
  let (status, _) = call(state, "GET", "/filters", Some(&auth), None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn filter_lifecycle_round_trip() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "secret");

  let (status, filter) = call(
    state.clone(),
    "POST",
    "/filters",
    Some(&auth),
    Some(json!({
      "source": "gmail",
      "rule":   { "type": "sender_exclude", "value": "noreply@" },
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(filter["enabled"], true);
  let id = filter["id"].as_str().unwrap().to_string();

  let (status, listed) =
    call(state.clone(), "GET", "/filters?source=gmail", Some(&auth), None)
      .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(listed.as_array().unwrap().len(), 1);

  let (status, _) = call(
    state.clone(),
    "POST",
    &format!("/filters/{id}/disable"),
    Some(&auth),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NO_CONTENT);

  let (status, _) = call(
    state.clone(),
    "DELETE",
    &format!("/filters/{id}"),
    Some(&auth),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NO_CONTENT);

  let (status, _) = call(
    state,
    "DELETE",
    &format!("/filters/{id}"),
    Some(&auth),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ─── Audit ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn an_unknown_audit_event_is_refused() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "secret");
  let (status, _) =
    call(state, "GET", "/audit?event=explosion", Some(&auth), None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn the_ledger_limit_keeps_the_newest_entries() {
  let state = make_state("secret").await;
  let auth = auth_header("owner", "secret");

  for purpose in ["first", "second", "third"] {
    let (status, _) = call(
      state.clone(),
      "POST",
      "/pull",
      Some(&auth),
      Some(json!({ "source": "gmail", "purpose": purpose })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
  }

  let (status, entries) =
    call(state, "GET", "/audit?limit=2", Some(&auth), None).await;
  assert_eq!(status, StatusCode::OK);
  let entries = entries.as_array().unwrap();
  assert_eq!(entries.len(), 2);
  assert_eq!(entries[0]["details"]["purpose"], "third");
  assert_eq!(entries[1]["details"]["purpose"], "second");
}
