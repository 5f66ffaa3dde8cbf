//! HTTP surface for the Gatehouse broker.
//!
//! Exposes an axum [`Router`] backed by any
//! [`BrokerStore`](gatehouse_core::store::BrokerStore). Every route requires
//! HTTP Basic auth; the owner and the agent share one credential pair, and
//! accountability comes from the audit ledger rather than from separate
//! principals.
//!
//! Route map:
//!
//! | Method   | Path                    | Purpose |
//! |----------|-------------------------|---------|
//! | `POST`   | `/pull`                 | Governed read |
//! | `POST`   | `/actions`              | Stage a write |
//! | `GET`    | `/actions`              | List staged actions |
//! | `GET`    | `/actions/{id}`         | One action |
//! | `PATCH`  | `/actions/{id}`         | Edit a pending payload |
//! | `POST`   | `/actions/{id}/approve` | Approve and execute |
//! | `POST`   | `/actions/{id}/reject`  | Reject, terminal |
//! | `POST`   | `/manifests`            | Submit policy text |
//! | `GET`    | `/manifests`            | List manifests |
//! | `POST`   | `/manifests/{id}/enable`  | Re-enable |
//! | `POST`   | `/manifests/{id}/disable` | Disable |
//! | `GET`    | `/filters`              | List quick filters |
//! | `POST`   | `/filters`              | Create a quick filter |
//! | `POST`   | `/filters/{id}/enable`  | Re-enable |
//! | `POST`   | `/filters/{id}/disable` | Disable |
//! | `DELETE` | `/filters/{id}`         | Remove |
//! | `GET`    | `/audit`                | Query the ledger |

pub mod actions;
pub mod audit;
pub mod auth;
pub mod error;
pub mod filters;
pub mod manifests;
pub mod read;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{delete, get, post},
};
use gatehouse_core::{boundary::SourceConfig, store::BrokerStore};
use gatehouse_engine::{ReadGate, StagingEngine};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::AuthConfig;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  pub auth_username:      String,
  pub auth_password_hash: String,
  /// Base64 of 32 random bytes. When absent, credentials cannot be vaulted
  /// and cached rows are written in the clear.
  #[serde(default)]
  pub encryption_key:     Option<String>,
  /// Per-source boundaries and cache policies.
  #[serde(default)]
  pub sources:            Vec<SourceConfig>,
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S: BrokerStore> {
  pub store:   Arc<S>,
  pub gate:    Arc<ReadGate<S>>,
  pub staging: Arc<StagingEngine<S>>,
  pub auth:    Arc<AuthConfig>,
}

// Manual impl: `S` itself need not be `Clone` behind the `Arc`s.
impl<S: BrokerStore> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:   Arc::clone(&self.store),
      gate:    Arc::clone(&self.gate),
      staging: Arc::clone(&self.staging),
      auth:    Arc::clone(&self.auth),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the broker's axum [`Router`].
pub fn router<S>(state: AppState<S>) -> Router
where
  S: BrokerStore + 'static,
{
  Router::new()
    // Reads
    .route("/pull", post(read::pull::<S>))
    // Staged actions
    .route(
      "/actions",
      post(actions::propose::<S>).get(actions::list::<S>),
    )
    .route(
      "/actions/{id}",
      get(actions::get_one::<S>).patch(actions::edit::<S>),
    )
    .route("/actions/{id}/approve", post(actions::approve::<S>))
    .route("/actions/{id}/reject", post(actions::reject::<S>))
    // Manifests
    .route(
      "/manifests",
      post(manifests::create::<S>).get(manifests::list::<S>),
    )
    .route("/manifests/{id}/enable", post(manifests::enable::<S>))
    .route("/manifests/{id}/disable", post(manifests::disable::<S>))
    // Quick filters
    .route("/filters", get(filters::list::<S>).post(filters::create::<S>))
    .route("/filters/{id}/enable", post(filters::enable::<S>))
    .route("/filters/{id}/disable", post(filters::disable::<S>))
    .route("/filters/{id}", delete(filters::delete::<S>))
    // Audit ledger
    .route("/audit", get(audit::list::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests;
