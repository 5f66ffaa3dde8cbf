//! Handler for the audit-ledger query endpoint.

use axum::{
  Json,
  extract::{Query, State},
};
use gatehouse_core::{
  audit::{AuditEntry, AuditEvent, AuditQuery},
  store::BrokerStore,
};
use serde::Deserialize;

use crate::{AppState, auth::Authenticated, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub event:  Option<String>,
  pub source: Option<String>,
  pub limit:  Option<usize>,
}

/// `GET /audit?event=&source=&limit=` — conjunctive filters, newest first.
pub async fn list<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<AuditEntry>>, ApiError>
where
  S: BrokerStore + 'static,
{
  let event = params
    .event
    .as_deref()
    .map(|s| {
      AuditEvent::from_str(s)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown event: {s:?}")))
    })
    .transpose()?;

  let entries = state
    .store
    .query_audit(&AuditQuery {
      event,
      source: params.source.clone(),
      limit: params.limit,
    })
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(entries))
}
