//! Handlers for `/manifests` endpoints.
//!
//! A manifest arrives as raw policy text. It is parsed and validated before
//! anything is persisted; a policy that would fail at pull time is refused at
//! submission time, with the complete offending name lists in the message.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use gatehouse_core::{
  manifest::{ManifestRecord, ManifestStatus, NewManifest},
  store::BrokerStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, auth::Authenticated, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub source: String,
  /// The policy DSL text, verbatim.
  pub text:   String,
}

/// `POST /manifests` — parse, validate, persist enabled.
pub async fn create<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Json(body): Json<CreateBody>,
) -> Result<(StatusCode, Json<ManifestRecord>), ApiError>
where
  S: BrokerStore + 'static,
{
  let doc = gatehouse_manifest::parse(&body.text)
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
  gatehouse_manifest::validate(&doc)
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

  let record = state
    .store
    .save_manifest(NewManifest {
      source:   body.source,
      purpose:  doc.purpose,
      raw_text: body.text,
      status:   ManifestStatus::Enabled,
    })
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;

  Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub source: Option<String>,
}

/// `GET /manifests[?source=<source>]`
pub async fn list<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<ManifestRecord>>, ApiError>
where
  S: BrokerStore + 'static,
{
  let manifests = state
    .store
    .list_manifests(params.source.as_deref())
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(manifests))
}

/// `POST /manifests/:id/enable`
pub async fn enable<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: BrokerStore + 'static,
{
  set_status(&state, id, ManifestStatus::Enabled).await
}

/// `POST /manifests/:id/disable`
pub async fn disable<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: BrokerStore + 'static,
{
  set_status(&state, id, ManifestStatus::Disabled).await
}

async fn set_status<S>(
  state: &AppState<S>,
  id: Uuid,
  status: ManifestStatus,
) -> Result<StatusCode, ApiError>
where
  S: BrokerStore + 'static,
{
  let changed = state
    .store
    .set_manifest_status(id, status)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  if changed {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!("manifest {id} not found")))
  }
}
