//! Handlers for `/filters` endpoints — quick-filter CRUD and toggling.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use gatehouse_core::{
  filter::{NewQuickFilter, QuickFilter},
  store::BrokerStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, auth::Authenticated, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub source: Option<String>,
}

/// `GET /filters?source=<source>`
pub async fn list<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<QuickFilter>>, ApiError>
where
  S: BrokerStore + 'static,
{
  let source = params
    .source
    .as_deref()
    .ok_or_else(|| ApiError::BadRequest("source is required".to_string()))?;
  let filters = state
    .store
    .list_filters(source)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(filters))
}

/// `POST /filters`
pub async fn create<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Json(body): Json<NewQuickFilter>,
) -> Result<(StatusCode, Json<QuickFilter>), ApiError>
where
  S: BrokerStore + 'static,
{
  let filter = state
    .store
    .add_filter(body)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok((StatusCode::CREATED, Json(filter)))
}

/// `POST /filters/:id/enable`
pub async fn enable<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: BrokerStore + 'static,
{
  set_enabled(&state, id, true).await
}

/// `POST /filters/:id/disable`
pub async fn disable<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: BrokerStore + 'static,
{
  set_enabled(&state, id, false).await
}

/// `DELETE /filters/:id`
pub async fn delete<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: BrokerStore + 'static,
{
  let removed = state
    .store
    .delete_filter(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  if removed {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!("filter {id} not found")))
  }
}

async fn set_enabled<S>(
  state: &AppState<S>,
  id: Uuid,
  enabled: bool,
) -> Result<StatusCode, ApiError>
where
  S: BrokerStore + 'static,
{
  let changed = state
    .store
    .set_filter_enabled(id, enabled)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  if changed {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!("filter {id} not found")))
  }
}
