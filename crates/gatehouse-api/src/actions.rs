//! Handlers for `/actions` endpoints — the action staging surface.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `POST`  | `/actions` | Stage a write; nothing executes synchronously |
//! | `GET`   | `/actions` | Optional `?status=pending\|approved\|committed\|rejected` |
//! | `GET`   | `/actions/:id` | 404 if not found |
//! | `PATCH` | `/actions/:id` | Merge fields into a pending payload |
//! | `POST`  | `/actions/:id/approve` | Execute through the connector |
//! | `POST`  | `/actions/:id/reject`  | Terminal; executes nothing |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use gatehouse_core::{
  row::FieldMap,
  staging::{ActionStatus, Decision, NewAction, StagingAction},
  store::BrokerStore,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{AppState, auth::Authenticated, error::ApiError};

// ─── Propose ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ProposeBody {
  pub source:      String,
  pub action_type: String,
  #[serde(default)]
  pub action_data: FieldMap,
  pub purpose:     String,
}

/// `POST /actions`
pub async fn propose<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Json(body): Json<ProposeBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: BrokerStore + 'static,
{
  let action = state
    .staging
    .propose(NewAction {
      source:      body.source,
      action_type: body.action_type,
      payload:     body.action_data,
      purpose:     body.purpose,
    })
    .await?;

  Ok((
    StatusCode::CREATED,
    Json(json!({
      "action_id": action.action_id,
      "status":    "pending_review",
    })),
  ))
}

// ─── List / get ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub status: Option<String>,
}

fn parse_status(s: &str) -> Result<ActionStatus, ApiError> {
  match s {
    "pending" => Ok(ActionStatus::Pending),
    "approved" => Ok(ActionStatus::Approved),
    "committed" => Ok(ActionStatus::Committed),
    "rejected" => Ok(ActionStatus::Rejected),
    other => {
      Err(ApiError::BadRequest(format!("unknown status: {other:?}")))
    }
  }
}

/// `GET /actions[?status=<status>]`
pub async fn list<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<StagingAction>>, ApiError>
where
  S: BrokerStore + 'static,
{
  let status = params.status.as_deref().map(parse_status).transpose()?;
  let actions = state
    .store
    .list_actions(status)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(actions))
}

/// `GET /actions/:id`
pub async fn get_one<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<StagingAction>, ApiError>
where
  S: BrokerStore + 'static,
{
  let action = state
    .store
    .get_action(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("action {id} not found")))?;
  Ok(Json(action))
}

// ─── Edit ────────────────────────────────────────────────────────────────────

/// `PATCH /actions/:id` — merge the body's fields into a pending payload.
pub async fn edit<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Json(changes): Json<FieldMap>,
) -> Result<Json<StagingAction>, ApiError>
where
  S: BrokerStore + 'static,
{
  let action = state
    .store
    .get_action(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("action {id} not found")))?;

  let mut merged = action.payload;
  merged.extend(changes);

  let updated = state.staging.edit_payload(id, merged).await?;
  Ok(Json(updated))
}

// ─── Resolve ─────────────────────────────────────────────────────────────────

/// `POST /actions/:id/approve`
pub async fn approve<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<StagingAction>, ApiError>
where
  S: BrokerStore + 'static,
{
  let action = state.staging.resolve(id, Decision::Approve).await?;
  Ok(Json(action))
}

/// `POST /actions/:id/reject`
pub async fn reject<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<StagingAction>, ApiError>
where
  S: BrokerStore + 'static,
{
  let action = state.staging.resolve(id, Decision::Reject).await?;
  Ok(Json(action))
}
