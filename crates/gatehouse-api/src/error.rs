//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized")]
  Unauthorized,

  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("internal error: {0}")]
  Internal(String),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::Unauthorized => {
        let mut res = (
          StatusCode::UNAUTHORIZED,
          Json(json!({ "error": "unauthorized" })),
        )
          .into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"gatehouse\""),
        );
        return res;
      }
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
      ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

/// Map engine failures onto HTTP statuses. Decryption details stay generic so
/// nothing secret-adjacent leaks into a response body.
impl From<gatehouse_engine::Error> for ApiError {
  fn from(err: gatehouse_engine::Error) -> Self {
    use gatehouse_core::Error as CoreError;
    use gatehouse_engine::Error as EngineError;

    match err {
      EngineError::Core(CoreError::UnknownSource(s)) => {
        ApiError::NotFound(format!("unknown source: {s}"))
      }
      EngineError::Core(CoreError::ActionNotFound(id)) => {
        ApiError::NotFound(format!("action {id} not found"))
      }
      EngineError::Core(CoreError::ActionNotPending { id, status }) => {
        ApiError::Conflict(format!("action {id} is not pending ({status})"))
      }
      EngineError::Core(CoreError::NoConnector(s)) => {
        ApiError::Conflict(format!("no connector registered for {s:?}"))
      }
      EngineError::Core(CoreError::ManifestNotFound(id)) => {
        ApiError::NotFound(format!("manifest {id} not found"))
      }
      EngineError::Core(CoreError::FilterNotFound(id)) => {
        ApiError::NotFound(format!("filter {id} not found"))
      }
      EngineError::Parse(e) => ApiError::BadRequest(e.to_string()),
      EngineError::Validation(e) => ApiError::BadRequest(e.to_string()),
      EngineError::BadDuration(s) => {
        ApiError::BadRequest(format!("invalid duration: {s:?}"))
      }
      EngineError::Store(e) => ApiError::Store(e),
      EngineError::Decryption(_) => {
        ApiError::Internal("decryption failure".to_string())
      }
      other => ApiError::Internal(other.to_string()),
    }
  }
}
