//! The `BrokerStore` trait — the broker's single durable collaborator.
//!
//! The trait is implemented by storage backends (e.g.
//! `gatehouse-store-sqlite`). The engine and API depend on this abstraction,
//! not on any concrete backend. All coordination between concurrent request
//! handlers and sync timers happens through these upsert/compare-and-set
//! semantics; there is no other shared mutable state.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  audit::{AuditEntry, AuditQuery, NewAuditEntry},
  cache::CachedRow,
  credential::StoredCredential,
  filter::{NewQuickFilter, QuickFilter},
  manifest::{ManifestRecord, ManifestStatus, NewManifest},
  staging::{ActionStatus, StagingAction},
};

/// Abstraction over the broker's persistent store.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (tokio with `axum`).
pub trait BrokerStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Manifests ─────────────────────────────────────────────────────────

  /// Persist a new manifest and return the stored record.
  fn save_manifest(
    &self,
    input: NewManifest,
  ) -> impl Future<Output = Result<ManifestRecord, Self::Error>> + Send + '_;

  fn get_manifest(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<ManifestRecord>, Self::Error>> + Send + '_;

  /// List manifests, optionally restricted to one source.
  fn list_manifests(
    &self,
    source: Option<&str>,
  ) -> impl Future<Output = Result<Vec<ManifestRecord>, Self::Error>> + Send + '_;

  /// Flip a manifest's status. Returns `false` if the id is unknown.
  fn set_manifest_status(
    &self,
    id: Uuid,
    status: ManifestStatus,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Quick filters ─────────────────────────────────────────────────────

  fn add_filter(
    &self,
    input: NewQuickFilter,
  ) -> impl Future<Output = Result<QuickFilter, Self::Error>> + Send + '_;

  /// All filters for a source, enabled or not, in insertion order.
  fn list_filters(
    &self,
    source: &str,
  ) -> impl Future<Output = Result<Vec<QuickFilter>, Self::Error>> + Send + '_;

  /// Returns `false` if the id is unknown.
  fn set_filter_enabled(
    &self,
    id: Uuid,
    enabled: bool,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Returns `false` if the id is unknown.
  fn delete_filter(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Cache ─────────────────────────────────────────────────────────────

  /// Insert or replace by `(source, item_id)`. Last writer wins.
  fn upsert_cached(
    &self,
    row: CachedRow,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Non-expired cached rows for a source as of `now`, optionally narrowed
  /// to one type tag. Expired rows are invisible, not deleted.
  fn get_cached(
    &self,
    source: &str,
    kind: Option<&str>,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<CachedRow>, Self::Error>> + Send + '_;

  /// Delete every cached row for a source; returns the count removed.
  fn purge_cached(
    &self,
    source: &str,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Staging ───────────────────────────────────────────────────────────

  fn insert_action(
    &self,
    action: StagingAction,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_action(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<StagingAction>, Self::Error>> + Send + '_;

  fn list_actions(
    &self,
    status: Option<ActionStatus>,
  ) -> impl Future<Output = Result<Vec<StagingAction>, Self::Error>> + Send + '_;

  /// Replace the payload of a still-pending action. Returns `false` (and
  /// writes nothing) if the action is missing or no longer pending.
  fn update_action_payload(
    &self,
    id: Uuid,
    payload_json: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Compare-and-set status transition guarded on the expected current
  /// status. Returns `false` (and writes nothing) if the guard fails, which
  /// is how one-way transitions survive concurrent resolvers.
  fn transition_action(
    &self,
    id: Uuid,
    from: ActionStatus,
    to: ActionStatus,
    resolved_at: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Audit ledger ──────────────────────────────────────────────────────

  /// Append one entry; the store assigns id and timestamp. The ledger has
  /// no update or delete operation.
  fn append_audit(
    &self,
    entry: NewAuditEntry,
  ) -> impl Future<Output = Result<AuditEntry, Self::Error>> + Send + '_;

  fn query_audit<'a>(
    &'a self,
    query: &'a AuditQuery,
  ) -> impl Future<Output = Result<Vec<AuditEntry>, Self::Error>> + Send + 'a;

  // ── Credentials ───────────────────────────────────────────────────────

  /// Insert or replace the single record for a source.
  fn put_credential(
    &self,
    cred: StoredCredential,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_credential(
    &self,
    source: &str,
  ) -> impl Future<Output = Result<Option<StoredCredential>, Self::Error>> + Send + '_;

  /// Returns `false` if no record existed.
  fn delete_credential(
    &self,
    source: &str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Overwrite only the access-token ciphertext and expiry — the post-refresh
  /// bookkeeping path, which must not require resupplying the refresh token.
  /// Returns `false` if no record existed.
  fn update_access_token(
    &self,
    source: &str,
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
