//! Handler for the agent-facing read endpoint.
//!
//! | Method | Path    | Notes |
//! |--------|---------|-------|
//! | `POST` | `/pull` | Body: `{"source", "purpose", "query"?, "limit"?}` |

use axum::{Json, extract::State};
use gatehouse_core::{row::DataRow, store::BrokerStore};
use gatehouse_engine::PullRequest;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, auth::Authenticated, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct PullBody {
  pub source:    String,
  /// Required and non-empty: a pull without a stated purpose is refused.
  pub purpose:   Option<String>,
  #[serde(default)]
  pub query:     gatehouse_core::row::FieldMap,
  #[serde(default)]
  pub limit:     Option<usize>,
  #[serde(default)]
  pub initiator: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PullResponse {
  pub rows:          Vec<DataRow>,
  pub fetched:       usize,
  pub returned:      usize,
  pub elapsed_ms:    u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub manifest_id:   Option<Uuid>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub staged_action: Option<Uuid>,
}

/// `POST /pull`
pub async fn pull<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Json(body): Json<PullBody>,
) -> Result<Json<PullResponse>, ApiError>
where
  S: BrokerStore + 'static,
{
  let purpose = match body.purpose.as_deref().map(str::trim) {
    Some(p) if !p.is_empty() => p.to_string(),
    _ => return Err(ApiError::BadRequest("purpose is required".to_string())),
  };

  let outcome = state
    .gate
    .pull(&PullRequest {
      source: body.source,
      purpose,
      query: body.query,
      limit: body.limit,
      initiator: body.initiator,
    })
    .await?;

  Ok(Json(PullResponse {
    rows:          outcome.rows,
    fetched:       outcome.fetched,
    returned:      outcome.returned,
    elapsed_ms:    outcome.elapsed_ms,
    manifest_id:   outcome.manifest_id,
    staged_action: outcome.staged_action,
  }))
}
