//! [`SqliteStore`] — the SQLite implementation of [`BrokerStore`].

use std::{future::Future, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use gatehouse_core::{
  audit::{AuditEntry, AuditQuery, NewAuditEntry},
  cache::CachedRow,
  credential::StoredCredential,
  filter::{NewQuickFilter, QuickFilter},
  manifest::{ManifestRecord, ManifestStatus, NewManifest},
  staging::{ActionStatus, StagingAction},
  store::BrokerStore,
};

use crate::{
  Error, Result,
  encode::{
    RawAction, RawAudit, RawCached, RawCredential, RawFilter, RawManifest,
    encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Gatehouse broker store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── BrokerStore impl ────────────────────────────────────────────────────────

impl BrokerStore for SqliteStore {
  type Error = Error;

  // ── Manifests ─────────────────────────────────────────────────────────────

  async fn save_manifest(&self, input: NewManifest) -> Result<ManifestRecord> {
    let record = ManifestRecord {
      id:       Uuid::new_v4(),
      source:   input.source,
      purpose:  input.purpose,
      raw_text: input.raw_text,
      status:   input.status,
    };

    let id_str     = encode_uuid(record.id);
    let source     = record.source.clone();
    let purpose    = record.purpose.clone();
    let raw_text   = record.raw_text.clone();
    let status_str = record.status.as_str().to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO manifests (manifest_id, source, purpose, raw_text, status)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, source, purpose, raw_text, status_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn get_manifest(&self, id: Uuid) -> Result<Option<ManifestRecord>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawManifest> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT manifest_id, source, purpose, raw_text, status
             FROM manifests WHERE manifest_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawManifest {
                manifest_id: row.get(0)?,
                source:      row.get(1)?,
                purpose:     row.get(2)?,
                raw_text:    row.get(3)?,
                status:      row.get(4)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawManifest::into_record).transpose()
  }

  fn list_manifests(
    &self,
    source: Option<&str>,
  ) -> impl Future<Output = Result<Vec<ManifestRecord>>> + Send + '_ {
    let source = source.map(str::to_owned);

    async move {
    let raws: Vec<RawManifest> = self
      .conn
      .call(move |conn| {
        let sql_all = "SELECT manifest_id, source, purpose, raw_text, status
                       FROM manifests ORDER BY rowid";
        let sql_one = "SELECT manifest_id, source, purpose, raw_text, status
                       FROM manifests WHERE source = ?1 ORDER BY rowid";
        let map = |row: &rusqlite::Row<'_>| {
          Ok(RawManifest {
            manifest_id: row.get(0)?,
            source:      row.get(1)?,
            purpose:     row.get(2)?,
            raw_text:    row.get(3)?,
            status:      row.get(4)?,
          })
        };

        let rows = if let Some(s) = source {
          let mut stmt = conn.prepare(sql_one)?;
          stmt
            .query_map(rusqlite::params![s], map)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(sql_all)?;
          stmt.query_map([], map)?.collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawManifest::into_record).collect()
    }
  }

  async fn set_manifest_status(
    &self,
    id: Uuid,
    status: ManifestStatus,
  ) -> Result<bool> {
    let id_str     = encode_uuid(id);
    let status_str = status.as_str().to_owned();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE manifests SET status = ?2 WHERE manifest_id = ?1",
          rusqlite::params![id_str, status_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  // ── Quick filters ─────────────────────────────────────────────────────────

  async fn add_filter(&self, input: NewQuickFilter) -> Result<QuickFilter> {
    let filter = QuickFilter {
      id:      Uuid::new_v4(),
      source:  input.source,
      rule:    input.rule,
      enabled: input.enabled,
    };

    let id_str    = encode_uuid(filter.id);
    let source    = filter.source.clone();
    let rule_type = filter.rule.discriminant().to_owned();
    let value     = filter.rule.value_string();
    let enabled   = filter.enabled;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO filters (filter_id, source, rule_type, value, enabled)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, source, rule_type, value, enabled],
        )?;
        Ok(())
      })
      .await?;

    Ok(filter)
  }

  fn list_filters(
    &self,
    source: &str,
  ) -> impl Future<Output = Result<Vec<QuickFilter>>> + Send + '_ {
    let source = source.to_owned();

    async move {
    let raws: Vec<RawFilter> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT filter_id, source, rule_type, value, enabled
           FROM filters WHERE source = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![source], |row| {
            Ok(RawFilter {
              filter_id: row.get(0)?,
              source:    row.get(1)?,
              rule_type: row.get(2)?,
              value:     row.get(3)?,
              enabled:   row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFilter::into_filter).collect()
    }
  }

  async fn set_filter_enabled(&self, id: Uuid, enabled: bool) -> Result<bool> {
    let id_str = encode_uuid(id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE filters SET enabled = ?2 WHERE filter_id = ?1",
          rusqlite::params![id_str, enabled],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn delete_filter(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM filters WHERE filter_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  // ── Cache ─────────────────────────────────────────────────────────────────

  async fn upsert_cached(&self, row: CachedRow) -> Result<()> {
    let timestamp_str  = encode_dt(row.timestamp);
    let cached_at_str  = encode_dt(row.cached_at);
    let expires_at_str = row.expires_at.map(encode_dt);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO cached_data
             (source, source_item_id, kind, item_timestamp, data, cached_at, expires_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT (source, source_item_id) DO UPDATE SET
             kind           = excluded.kind,
             item_timestamp = excluded.item_timestamp,
             data           = excluded.data,
             cached_at      = excluded.cached_at,
             expires_at     = excluded.expires_at",
          rusqlite::params![
            row.source,
            row.item_id,
            row.kind,
            timestamp_str,
            row.data,
            cached_at_str,
            expires_at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  fn get_cached(
    &self,
    source: &str,
    kind: Option<&str>,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<CachedRow>>> + Send + '_ {
    let source  = source.to_owned();
    let kind    = kind.map(str::to_owned);
    let now_str = encode_dt(now);

    async move {
    let raws: Vec<RawCached> = self
      .conn
      .call(move |conn| {
        // RFC 3339 UTC strings compare correctly as text.
        let mut stmt = conn.prepare(
          "SELECT source, source_item_id, kind, item_timestamp, data,
                  cached_at, expires_at
           FROM cached_data
           WHERE source = ?1
             AND (?2 IS NULL OR kind = ?2)
             AND (expires_at IS NULL OR expires_at > ?3)
           ORDER BY item_timestamp DESC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![source, kind, now_str], |row| {
            Ok(RawCached {
              source:         row.get(0)?,
              source_item_id: row.get(1)?,
              kind:           row.get(2)?,
              item_timestamp: row.get(3)?,
              data:           row.get(4)?,
              cached_at:      row.get(5)?,
              expires_at:     row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCached::into_cached).collect()
    }
  }

  fn purge_cached(
    &self,
    source: &str,
  ) -> impl Future<Output = Result<u64>> + Send + '_ {
    let source = source.to_owned();

    async move {
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM cached_data WHERE source = ?1",
          rusqlite::params![source],
        )?)
      })
      .await?;
    Ok(removed as u64)
    }
  }

  // ── Staging ───────────────────────────────────────────────────────────────

  async fn insert_action(&self, action: StagingAction) -> Result<()> {
    let id_str       = encode_uuid(action.action_id);
    let payload_json =
      serde_json::to_string(&serde_json::Value::Object(action.payload))?;
    let status_str   = action.status.as_str().to_owned();
    let proposed_str = encode_dt(action.proposed_at);
    let resolved_str = action.resolved_at.map(encode_dt);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO staging
             (action_id, source, action_type, payload_json, purpose,
              status, proposed_at, resolved_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str,
            action.source,
            action.action_type,
            payload_json,
            action.purpose,
            status_str,
            proposed_str,
            resolved_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_action(&self, id: Uuid) -> Result<Option<StagingAction>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawAction> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT action_id, source, action_type, payload_json, purpose,
                    status, proposed_at, resolved_at
             FROM staging WHERE action_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawAction {
                action_id:    row.get(0)?,
                source:       row.get(1)?,
                action_type:  row.get(2)?,
                payload_json: row.get(3)?,
                purpose:      row.get(4)?,
                status:       row.get(5)?,
                proposed_at:  row.get(6)?,
                resolved_at:  row.get(7)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawAction::into_action).transpose()
  }

  async fn list_actions(
    &self,
    status: Option<ActionStatus>,
  ) -> Result<Vec<StagingAction>> {
    let status_str = status.map(|s| s.as_str().to_owned());

    let raws: Vec<RawAction> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT action_id, source, action_type, payload_json, purpose,
                  status, proposed_at, resolved_at
           FROM staging
           WHERE (?1 IS NULL OR status = ?1)
           ORDER BY proposed_at",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![status_str], |row| {
            Ok(RawAction {
              action_id:    row.get(0)?,
              source:       row.get(1)?,
              action_type:  row.get(2)?,
              payload_json: row.get(3)?,
              purpose:      row.get(4)?,
              status:       row.get(5)?,
              proposed_at:  row.get(6)?,
              resolved_at:  row.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAction::into_action).collect()
  }

  async fn update_action_payload(
    &self,
    id: Uuid,
    payload_json: String,
  ) -> Result<bool> {
    let id_str = encode_uuid(id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE staging SET payload_json = ?2
           WHERE action_id = ?1 AND status = 'pending'",
          rusqlite::params![id_str, payload_json],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn transition_action(
    &self,
    id: Uuid,
    from: ActionStatus,
    to: ActionStatus,
    resolved_at: Option<DateTime<Utc>>,
  ) -> Result<bool> {
    let id_str       = encode_uuid(id);
    let from_str     = from.as_str().to_owned();
    let to_str       = to.as_str().to_owned();
    let resolved_str = resolved_at.map(encode_dt);

    // The status guard in the WHERE clause is the whole mechanism: the
    // UPDATE writes nothing unless the action is still in `from`.
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE staging
           SET status      = ?3,
               resolved_at = CASE WHEN ?4 IS NULL THEN resolved_at ELSE ?4 END
           WHERE action_id = ?1 AND status = ?2",
          rusqlite::params![id_str, from_str, to_str, resolved_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  // ── Audit ledger ──────────────────────────────────────────────────────────

  async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditEntry> {
    let at           = Utc::now();
    let at_str       = encode_dt(at);
    let event_str    = entry.event.as_str().to_owned();
    let source       = entry.source.clone();
    let details_json = entry.details.to_string();

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO audit_log (at, event, source, details_json)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![at_str, event_str, source, details_json],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(AuditEntry {
      id,
      at,
      event: entry.event,
      source: entry.source,
      details: entry.details,
    })
  }

  async fn query_audit(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
    let event_str = query.event.map(|e| e.as_str().to_owned());
    let source    = query.source.clone();
    let limit     = query.limit.map(|l| l as i64).unwrap_or(i64::MAX);

    let raws: Vec<RawAudit> = self
      .conn
      .call(move |conn| {
        // Newest first; the limit trims from the newest end.
        let mut stmt = conn.prepare(
          "SELECT id, at, event, source, details_json
           FROM audit_log
           WHERE (?1 IS NULL OR event = ?1)
             AND (?2 IS NULL OR source = ?2)
           ORDER BY id DESC
           LIMIT ?3",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![event_str, source, limit], |row| {
            Ok(RawAudit {
              id:           row.get(0)?,
              at:           row.get(1)?,
              event:        row.get(2)?,
              source:       row.get(3)?,
              details_json: row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAudit::into_entry).collect()
  }

  // ── Credentials ───────────────────────────────────────────────────────────

  async fn put_credential(&self, cred: StoredCredential) -> Result<()> {
    let expires_str  = cred.expires_at.map(encode_dt);
    let account_json = cred
      .account_info
      .as_ref()
      .map(serde_json::Value::to_string);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO oauth_tokens
             (source, access_token, refresh_token, token_type,
              expires_at, scopes, account_info_json)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            cred.source,
            cred.access_token,
            cred.refresh_token,
            cred.token_type,
            expires_str,
            cred.scopes,
            account_json,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  fn get_credential(
    &self,
    source: &str,
  ) -> impl Future<Output = Result<Option<StoredCredential>>> + Send + '_ {
    let source = source.to_owned();

    async move {
    let raw: Option<RawCredential> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT source, access_token, refresh_token, token_type,
                    expires_at, scopes, account_info_json
             FROM oauth_tokens WHERE source = ?1",
            rusqlite::params![source],
            |row| {
              Ok(RawCredential {
                source:            row.get(0)?,
                access_token:      row.get(1)?,
                refresh_token:     row.get(2)?,
                token_type:        row.get(3)?,
                expires_at:        row.get(4)?,
                scopes:            row.get(5)?,
                account_info_json: row.get(6)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawCredential::into_credential).transpose()
    }
  }

  fn delete_credential(
    &self,
    source: &str,
  ) -> impl Future<Output = Result<bool>> + Send + '_ {
    let source = source.to_owned();

    async move {
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM oauth_tokens WHERE source = ?1",
          rusqlite::params![source],
        )?)
      })
      .await?;
    Ok(changed > 0)
    }
  }

  fn update_access_token(
    &self,
    source: &str,
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<bool>> + Send + '_ {
    let source      = source.to_owned();
    let expires_str = expires_at.map(encode_dt);

    async move {
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE oauth_tokens SET access_token = ?2, expires_at = ?3
           WHERE source = ?1",
          rusqlite::params![source, access_token, expires_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
    }
  }
}
