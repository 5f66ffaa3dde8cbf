//! The cache codec — how [`DataRow`]s become [`CachedRow`] payloads and back.
//!
//! Payloads are the row's field map as compact JSON, sealed by the cipher
//! when one is configured. Reading is strict: a payload carrying the sealed
//! marker must authenticate (a failed open is a hard error, never "treat as
//! raw"); a payload without the marker is accepted as a legacy unencrypted
//! row only if it parses as a JSON object.

use chrono::{DateTime, Duration, Utc};

use gatehouse_core::{
  boundary::SourceBoundary,
  cache::CachedRow,
  row::{DataRow, FieldMap},
  store::BrokerStore,
};

use crate::{
  crypto::SecretCipher,
  error::{Error, Result},
};

/// Serialise a field map, sealing it if a cipher is configured.
pub fn seal_fields(
  fields: &FieldMap,
  cipher: Option<&SecretCipher>,
) -> Result<String> {
  let json = serde_json::to_string(fields)?;
  match cipher {
    Some(c) => c.seal(json.as_bytes()),
    None => Ok(json),
  }
}

/// Decode a stored payload back into a field map.
pub fn open_fields(
  payload: &str,
  cipher: Option<&SecretCipher>,
  source: &str,
  item_id: &str,
) -> Result<FieldMap> {
  let json: String = if SecretCipher::is_sealed(payload) {
    let cipher = cipher
      .ok_or(Error::Decryption("sealed payload but no key configured"))?;
    String::from_utf8(cipher.open(payload)?)
      .map_err(|_| Error::Decryption("sealed payload is not UTF-8"))?
  } else {
    payload.to_string()
  };

  match serde_json::from_str::<serde_json::Value>(&json) {
    Ok(serde_json::Value::Object(map)) => Ok(map),
    _ => Err(Error::MalformedCachePayload {
      source_name: source.to_string(),
      item_id: item_id.to_string(),
    }),
  }
}

/// Build the cached form of a row.
pub fn to_cached(
  row: &DataRow,
  cipher: Option<&SecretCipher>,
  now: DateTime<Utc>,
  ttl: Duration,
) -> Result<CachedRow> {
  Ok(CachedRow {
    source:     row.source.clone(),
    item_id:    row.item_id.clone(),
    kind:       row.kind.clone(),
    timestamp:  row.timestamp,
    data:       seal_fields(&row.fields, cipher)?,
    cached_at:  now,
    expires_at: Some(now + ttl),
  })
}

/// Rebuild a live row from its cached form.
pub fn to_row(
  cached: &CachedRow,
  cipher: Option<&SecretCipher>,
) -> Result<DataRow> {
  Ok(DataRow {
    source:    cached.source.clone(),
    item_id:   cached.item_id.clone(),
    kind:      cached.kind.clone(),
    timestamp: cached.timestamp,
    fields:    open_fields(
      &cached.data,
      cipher,
      &cached.source,
      &cached.item_id,
    )?,
  })
}

/// Read non-expired cached rows for a source within the boundary.
///
/// There is no fallback to a live fetch on a cache miss; an empty cache
/// yields an empty result.
pub(crate) async fn read_rows<S: BrokerStore>(
  store: &S,
  source: &str,
  kind: Option<&str>,
  boundary: &SourceBoundary,
  cipher: Option<&SecretCipher>,
  now: DateTime<Utc>,
) -> Result<Vec<DataRow>> {
  let cached = store
    .get_cached(source, kind, now)
    .await
    .map_err(Error::store)?;

  let mut rows = Vec::with_capacity(cached.len());
  for c in &cached {
    rows.push(to_row(c, cipher)?);
  }
  // Cached rows may predate a boundary change; re-check on every read.
  rows.retain(|r| boundary.permits(r));
  Ok(rows)
}

/// Upsert a batch of rows into the cache. Last writer wins per key.
pub(crate) async fn write_rows<S: BrokerStore>(
  store: &S,
  rows: &[DataRow],
  cipher: Option<&SecretCipher>,
  now: DateTime<Utc>,
  ttl: Duration,
) -> Result<()> {
  for row in rows {
    let cached = to_cached(row, cipher, now, ttl)?;
    store.upsert_cached(cached).await.map_err(Error::store)?;
  }
  Ok(())
}
