//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Structured fields (payloads,
//! audit details, account info) are stored as compact JSON. UUIDs are stored
//! as hyphenated lowercase strings.

use chrono::{DateTime, Utc};
use gatehouse_core::{
  audit::{AuditEntry, AuditEvent},
  cache::CachedRow,
  credential::StoredCredential,
  filter::{FilterRule, QuickFilter},
  manifest::{ManifestRecord, ManifestStatus},
  row::FieldMap,
  staging::{ActionStatus, StagingAction},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Status enums ────────────────────────────────────────────────────────────

pub fn decode_manifest_status(s: &str) -> Result<ManifestStatus> {
  ManifestStatus::from_str(s)
    .ok_or_else(|| Error::Decode(format!("unknown manifest status: {s:?}")))
}

pub fn decode_action_status(s: &str) -> Result<ActionStatus> {
  match s {
    "pending" => Ok(ActionStatus::Pending),
    "approved" => Ok(ActionStatus::Approved),
    "committed" => Ok(ActionStatus::Committed),
    "rejected" => Ok(ActionStatus::Rejected),
    other => Err(Error::Decode(format!("unknown action status: {other:?}"))),
  }
}

pub fn decode_audit_event(s: &str) -> Result<AuditEvent> {
  AuditEvent::from_str(s)
    .ok_or_else(|| Error::Decode(format!("unknown audit event: {s:?}")))
}

// ─── Field maps ──────────────────────────────────────────────────────────────

pub fn decode_field_map(s: &str) -> Result<FieldMap> {
  match serde_json::from_str(s)? {
    serde_json::Value::Object(map) => Ok(map),
    _ => Err(Error::Decode("payload is not a JSON object".to_string())),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `manifests` row.
pub struct RawManifest {
  pub manifest_id: String,
  pub source:      String,
  pub purpose:     String,
  pub raw_text:    String,
  pub status:      String,
}

impl RawManifest {
  pub fn into_record(self) -> Result<ManifestRecord> {
    Ok(ManifestRecord {
      id:       decode_uuid(&self.manifest_id)?,
      source:   self.source,
      purpose:  self.purpose,
      raw_text: self.raw_text,
      status:   decode_manifest_status(&self.status)?,
    })
  }
}

/// Raw strings read directly from a `filters` row.
pub struct RawFilter {
  pub filter_id: String,
  pub source:    String,
  pub rule_type: String,
  pub value:     String,
  pub enabled:   bool,
}

impl RawFilter {
  pub fn into_filter(self) -> Result<QuickFilter> {
    Ok(QuickFilter {
      id:      decode_uuid(&self.filter_id)?,
      source:  self.source,
      // Unknown rule types decode to a pass-through, never an error.
      rule:    FilterRule::from_parts(&self.rule_type, &self.value),
      enabled: self.enabled,
    })
  }
}

/// Raw strings read directly from a `cached_data` row.
pub struct RawCached {
  pub source:         String,
  pub source_item_id: String,
  pub kind:           String,
  pub item_timestamp: String,
  pub data:           String,
  pub cached_at:      String,
  pub expires_at:     Option<String>,
}

impl RawCached {
  pub fn into_cached(self) -> Result<CachedRow> {
    Ok(CachedRow {
      source:     self.source,
      item_id:    self.source_item_id,
      kind:       self.kind,
      timestamp:  decode_dt(&self.item_timestamp)?,
      data:       self.data,
      cached_at:  decode_dt(&self.cached_at)?,
      expires_at: self.expires_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Raw strings read directly from a `staging` row.
pub struct RawAction {
  pub action_id:    String,
  pub source:       String,
  pub action_type:  String,
  pub payload_json: String,
  pub purpose:      String,
  pub status:       String,
  pub proposed_at:  String,
  pub resolved_at:  Option<String>,
}

impl RawAction {
  pub fn into_action(self) -> Result<StagingAction> {
    Ok(StagingAction {
      action_id:   decode_uuid(&self.action_id)?,
      source:      self.source,
      action_type: self.action_type,
      payload:     decode_field_map(&self.payload_json)?,
      purpose:     self.purpose,
      status:      decode_action_status(&self.status)?,
      proposed_at: decode_dt(&self.proposed_at)?,
      resolved_at: self.resolved_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Raw strings read directly from an `audit_log` row.
pub struct RawAudit {
  pub id:           i64,
  pub at:           String,
  pub event:        String,
  pub source:       String,
  pub details_json: String,
}

impl RawAudit {
  pub fn into_entry(self) -> Result<AuditEntry> {
    Ok(AuditEntry {
      id:      self.id,
      at:      decode_dt(&self.at)?,
      event:   decode_audit_event(&self.event)?,
      source:  self.source,
      details: serde_json::from_str(&self.details_json)?,
    })
  }
}

/// Raw strings read directly from an `oauth_tokens` row.
pub struct RawCredential {
  pub source:            String,
  pub access_token:      String,
  pub refresh_token:     Option<String>,
  pub token_type:        String,
  pub expires_at:        Option<String>,
  pub scopes:            String,
  pub account_info_json: Option<String>,
}

impl RawCredential {
  pub fn into_credential(self) -> Result<StoredCredential> {
    Ok(StoredCredential {
      source:        self.source,
      access_token:  self.access_token,
      refresh_token: self.refresh_token,
      token_type:    self.token_type,
      expires_at:    self.expires_at.as_deref().map(decode_dt).transpose()?,
      scopes:        self.scopes,
      account_info:  self
        .account_info_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?,
    })
  }
}
