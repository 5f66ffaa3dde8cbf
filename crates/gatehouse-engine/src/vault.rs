//! The credential vault: token material at rest, always encrypted.
//!
//! The vault is the only component that sees credential plaintext. The store
//! persists opaque ciphertext; connectors receive a decrypted
//! [`CredentialRecord`] whose `Debug` impl redacts tokens. Unlike the cache
//! cipher, the vault's cipher is not optional.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatehouse_core::{
  audit::{AuditEvent, NewAuditEntry},
  credential::{CredentialRecord, StoredCredential},
  store::BrokerStore,
};
use serde_json::json;

use crate::{
  crypto::SecretCipher,
  error::{Error, Result},
};

pub struct CredentialVault<S> {
  store:  Arc<S>,
  cipher: SecretCipher,
}

impl<S: BrokerStore> CredentialVault<S> {
  pub fn new(store: Arc<S>, cipher: SecretCipher) -> Self {
    Self { store, cipher }
  }

  /// Encrypt and persist credentials for a source, replacing any previous
  /// record. Audited as a source connection; the audit detail carries
  /// bookkeeping only, never token material.
  pub async fn store(&self, record: CredentialRecord) -> Result<()> {
    let stored = StoredCredential {
      source:        record.source.clone(),
      access_token:  self.cipher.seal(record.access_token.as_bytes())?,
      refresh_token: match &record.refresh_token {
        Some(token) => Some(self.cipher.seal(token.as_bytes())?),
        None => None,
      },
      token_type:    record.token_type.clone(),
      expires_at:    record.expires_at,
      scopes:        record.scopes.clone(),
      account_info:  record.account_info.clone(),
    };

    self
      .store
      .put_credential(stored)
      .await
      .map_err(Error::store)?;
    self
      .store
      .append_audit(NewAuditEntry {
        event:   AuditEvent::SourceConnected,
        source:  record.source.clone(),
        details: json!({
          "scopes":     record.scopes,
          "expires_at": record.expires_at,
        }),
      })
      .await
      .map_err(Error::store)?;

    tracing::info!(source = %record.source, "credentials stored");
    Ok(())
  }

  /// Load and decrypt the credentials for a source, if connected.
  pub async fn load(&self, source: &str) -> Result<Option<CredentialRecord>> {
    let Some(stored) = self
      .store
      .get_credential(source)
      .await
      .map_err(Error::store)?
    else {
      return Ok(None);
    };

    let access_token = self.open_token(&stored.access_token)?;
    let refresh_token = match &stored.refresh_token {
      Some(sealed) => Some(self.open_token(sealed)?),
      None => None,
    };
    Ok(Some(CredentialRecord {
      source: stored.source,
      access_token,
      refresh_token,
      token_type: stored.token_type,
      expires_at: stored.expires_at,
      scopes: stored.scopes,
      account_info: stored.account_info,
    }))
  }

  /// Whether a credential record exists for the source.
  pub async fn is_connected(&self, source: &str) -> Result<bool> {
    Ok(
      self
        .store
        .get_credential(source)
        .await
        .map_err(Error::store)?
        .is_some(),
    )
  }

  /// Whether the source's access token is expired as of `now`.
  /// `None` means the source is not connected at all.
  pub async fn is_expired(
    &self,
    source: &str,
    now: DateTime<Utc>,
  ) -> Result<Option<bool>> {
    Ok(
      self
        .store
        .get_credential(source)
        .await
        .map_err(Error::store)?
        .map(|stored| matches!(stored.expires_at, Some(at) if at <= now)),
    )
  }

  /// Persist a refreshed access token without touching the refresh token.
  /// Returns `false` if the source is not connected.
  pub async fn record_refresh(
    &self,
    source: &str,
    access_token: &str,
    expires_at: Option<DateTime<Utc>>,
  ) -> Result<bool> {
    let sealed = self.cipher.seal(access_token.as_bytes())?;
    self
      .store
      .update_access_token(source, sealed, expires_at)
      .await
      .map_err(Error::store)
  }

  /// Delete a source's credentials. Returns `false` if none existed;
  /// audited only when something was actually removed.
  pub async fn disconnect(&self, source: &str) -> Result<bool> {
    let removed = self
      .store
      .delete_credential(source)
      .await
      .map_err(Error::store)?;
    if removed {
      self
        .store
        .append_audit(NewAuditEntry {
          event:   AuditEvent::SourceDisconnected,
          source:  source.to_string(),
          details: json!({}),
        })
        .await
        .map_err(Error::store)?;
      tracing::info!(source, "credentials removed");
    }
    Ok(removed)
  }

  fn open_token(&self, sealed: &str) -> Result<String> {
    let raw = self.cipher.open(sealed)?;
    String::from_utf8(raw)
      .map_err(|_| Error::Decryption("stored token is not UTF-8"))
  }
}
