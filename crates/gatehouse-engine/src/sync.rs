//! Background cache sync: duration parsing, one-shot refresh, and the
//! per-source timer scheduler.

use std::{collections::HashMap, sync::Arc, sync::Mutex};

use chrono::{Duration, Utc};
use gatehouse_core::{
  boundary::SourceBoundary,
  connector::{ConnectorRegistry, SourceConnector},
  row::FieldMap,
  store::BrokerStore,
};
use tokio::task::JoinHandle;

use crate::{
  cache,
  crypto::SecretCipher,
  error::{Error, Result},
};

/// Parse a sync interval such as `"30s"`, `"10m"`, or `"1h"`.
pub fn parse_interval(input: &str) -> Result<Duration> {
  let s = input.trim();
  let (digits, unit) = s.split_at(s.len().saturating_sub(1));
  let value: i64 = digits
    .parse()
    .map_err(|_| Error::BadDuration(input.to_string()))?;
  if value <= 0 {
    return Err(Error::BadDuration(input.to_string()));
  }
  match unit {
    "s" => Ok(Duration::seconds(value)),
    "m" => Ok(Duration::minutes(value)),
    "h" => Ok(Duration::hours(value)),
    _ => Err(Error::BadDuration(input.to_string())),
  }
}

/// Parse a cache TTL such as `"7d"`, `"12h"`, or `"30m"`.
///
/// A missing or malformed TTL falls back to seven days rather than erroring;
/// a bad TTL string must never take the cache path down.
pub fn parse_ttl(input: Option<&str>) -> Duration {
  let default = Duration::days(7);
  let Some(s) = input.map(str::trim) else {
    return default;
  };
  let (digits, unit) = s.split_at(s.len().saturating_sub(1));
  let Ok(value) = digits.parse::<i64>() else {
    return default;
  };
  if value <= 0 {
    return default;
  }
  match unit {
    "d" => Duration::days(value),
    "h" => Duration::hours(value),
    "m" => Duration::minutes(value),
    _ => default,
  }
}

/// One cache refresh for a source: fetch live within the boundary, upsert
/// into the cache. Returns how many rows were written.
pub async fn sync_once<S: BrokerStore>(
  store: &S,
  connector: &dyn SourceConnector,
  boundary: &SourceBoundary,
  cipher: Option<&SecretCipher>,
  ttl: Duration,
) -> Result<usize> {
  let mut rows = connector.fetch(boundary, &FieldMap::new()).await?;
  // The connector must honor the boundary, but trust is not a mechanism.
  rows.retain(|r| boundary.permits(r));
  cache::write_rows(store, &rows, cipher, Utc::now(), ttl).await?;
  Ok(rows.len())
}

/// Owns one background refresh timer per cache-enabled source.
///
/// A tick that fails logs a warning and waits for the next tick; the timer
/// itself never dies. Timers hold no locks across awaits and share state
/// with request handlers only through the store.
pub struct SyncScheduler<S: BrokerStore + 'static> {
  store:      Arc<S>,
  connectors: ConnectorRegistry,
  cipher:     Option<SecretCipher>,
  tasks:      Mutex<HashMap<String, JoinHandle<()>>>,
}

impl<S: BrokerStore + 'static> SyncScheduler<S> {
  pub fn new(
    store: Arc<S>,
    connectors: ConnectorRegistry,
    cipher: Option<SecretCipher>,
  ) -> Self {
    Self { store, connectors, cipher, tasks: Mutex::new(HashMap::new()) }
  }

  /// Start (or restart) the refresh timer for a source. The first refresh
  /// runs immediately, then every `interval`.
  pub fn enable(
    &self,
    source: &str,
    boundary: SourceBoundary,
    interval: Duration,
    ttl: Duration,
  ) -> Result<()> {
    let connector = self.connectors.require(source)?;
    let period = interval
      .to_std()
      .map_err(|_| Error::BadDuration(interval.to_string()))?;

    let store = Arc::clone(&self.store);
    let cipher = self.cipher.clone();
    let task_source = source.to_string();
    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(period);
      loop {
        ticker.tick().await;
        match sync_once(
          store.as_ref(),
          connector.as_ref(),
          &boundary,
          cipher.as_ref(),
          ttl,
        )
        .await
        {
          Ok(count) => {
            tracing::debug!(source = %task_source, rows = count, "cache sync")
          }
          Err(error) => {
            tracing::warn!(source = %task_source, %error, "cache sync failed")
          }
        }
      }
    });

    let mut tasks = self.tasks.lock().expect("sync task table poisoned");
    if let Some(old) = tasks.insert(source.to_string(), handle) {
      old.abort();
    }
    Ok(())
  }

  /// Stop the timer for a source, optionally purging its cached rows.
  /// Returns how many rows were purged.
  pub async fn disable(&self, source: &str, purge: bool) -> Result<u64> {
    {
      let mut tasks = self.tasks.lock().expect("sync task table poisoned");
      if let Some(handle) = tasks.remove(source) {
        handle.abort();
      }
    }
    if purge {
      self.store.purge_cached(source).await.map_err(Error::store)
    } else {
      Ok(0)
    }
  }

  /// Abort every timer. Called on shutdown.
  pub fn shutdown(&self) {
    let mut tasks = self.tasks.lock().expect("sync task table poisoned");
    for (_, handle) in tasks.drain() {
      handle.abort();
    }
  }
}

impl<S: BrokerStore + 'static> Drop for SyncScheduler<S> {
  fn drop(&mut self) {
    self.shutdown();
  }
}
