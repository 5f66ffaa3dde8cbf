//! The operator implementations behind the pipeline executor.
//!
//! Each operator consumes the current row batch and produces the next one.
//! Any failure aborts the whole run; partial output never escapes.

use chrono::{DateTime, NaiveDate, Utc};
use gatehouse_core::{
  audit::{AuditEvent, NewAuditEntry},
  row::{DataRow, FieldMap},
  staging::{ActionStatus, StagingAction},
  store::BrokerStore,
};
use gatehouse_manifest::{OperatorDecl, PropValue};
use serde_json::json;
use uuid::Uuid;

use crate::{
  cache,
  error::{Error, Result},
  pipeline::ExecContext,
  sync::parse_ttl,
};

fn op_err(node: &str, kind: &str, message: impl Into<String>) -> Error {
  Error::Operator {
    node:    node.to_string(),
    kind:    kind.to_string(),
    message: message.into(),
  }
}

// ─── pull ────────────────────────────────────────────────────────────────────

/// Fetch the initial row batch: from the cache when the source is
/// cache-backed, live through the connector otherwise. Never both.
pub(crate) async fn pull<S: BrokerStore>(
  ctx: &ExecContext<'_, S>,
  node: &str,
  decl: &OperatorDecl,
) -> Result<Vec<DataRow>> {
  if let Some(declared) = decl.str_prop("source")
    && declared != ctx.source
  {
    return Err(op_err(
      node,
      "pull",
      format!(
        "declared source {declared:?} does not match pipeline source {:?}",
        ctx.source
      ),
    ));
  }
  let kind = decl.str_prop("type");

  if ctx.cache_only {
    return cache::read_rows(
      ctx.store,
      ctx.source,
      kind,
      ctx.boundary,
      ctx.cipher,
      ctx.now,
    )
    .await;
  }

  let connector = ctx
    .connector
    .ok_or_else(|| op_err(node, "pull", "no connector for live fetch"))?;
  let params = props_as_params(decl);
  let mut rows = connector.fetch(ctx.boundary, &params).await?;
  // The connector must honor the boundary; re-check regardless.
  rows.retain(|r| ctx.boundary.permits(r));
  if let Some(kind) = kind {
    rows.retain(|r| r.kind == kind);
  }
  Ok(rows)
}

/// Flatten declaration properties into a connector parameter map.
fn props_as_params(decl: &OperatorDecl) -> FieldMap {
  decl
    .props
    .iter()
    .map(|(k, v)| {
      let value = match v {
        PropValue::Str(s) => json!(s),
        PropValue::List(items) => json!(items),
      };
      (k.clone(), value)
    })
    .collect()
}

// ─── select ──────────────────────────────────────────────────────────────────

/// Narrow every row's field map to the declared field set. Field names match
/// case-insensitively; a requested field a row lacks is simply absent.
pub(crate) fn select(
  node: &str,
  decl: &OperatorDecl,
  mut rows: Vec<DataRow>,
) -> Result<Vec<DataRow>> {
  let fields = decl
    .list_prop("fields")
    .ok_or_else(|| op_err(node, "select", "missing `fields` list property"))?;

  for row in &mut rows {
    row
      .fields
      .retain(|k, _| fields.iter().any(|f| f.eq_ignore_ascii_case(k)));
  }
  Ok(rows)
}

// ─── filter ──────────────────────────────────────────────────────────────────

/// Keep rows satisfying a single field predicate.
///
/// `eq`/`neq` compare exactly, `contains` case-insensitively, `gt`/`lt`
/// lexicographically. The pseudo-field `timestamp` compares the row's
/// timestamp against an RFC 3339 instant or a bare date. A row missing the
/// field fails every predicate except `neq`.
pub(crate) fn filter(
  node: &str,
  decl: &OperatorDecl,
  rows: Vec<DataRow>,
) -> Result<Vec<DataRow>> {
  let field = decl
    .str_prop("field")
    .ok_or_else(|| op_err(node, "filter", "missing `field` property"))?;
  let op = decl.str_prop("op").unwrap_or("eq");
  let value = decl
    .str_prop("value")
    .ok_or_else(|| op_err(node, "filter", "missing `value` property"))?;

  if !matches!(op, "eq" | "neq" | "contains" | "gt" | "lt") {
    return Err(op_err(node, "filter", format!("unknown op {op:?}")));
  }

  if field.eq_ignore_ascii_case("timestamp") {
    let instant = parse_instant(value).ok_or_else(|| {
      op_err(node, "filter", format!("unparsable instant {value:?}"))
    })?;
    return Ok(
      rows
        .into_iter()
        .filter(|r| match op {
          "eq" => r.timestamp == instant,
          "neq" => r.timestamp != instant,
          "contains" => false,
          "gt" => r.timestamp > instant,
          _ => r.timestamp < instant,
        })
        .collect(),
    );
  }

  Ok(
    rows
      .into_iter()
      .filter(|r| match r.text_field_ci(field) {
        Some(actual) => match op {
          "eq" => actual == value,
          "neq" => actual != value,
          "contains" => {
            actual.to_lowercase().contains(&value.to_lowercase())
          }
          "gt" => actual > value,
          _ => actual < value,
        },
        None => op == "neq",
      })
      .collect(),
  )
}

/// RFC 3339, or a bare `YYYY-MM-DD` taken as midnight UTC.
fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
    return Some(dt.with_timezone(&Utc));
  }
  NaiveDate::parse_from_str(value, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|naive| naive.and_utc())
}

// ─── transform ───────────────────────────────────────────────────────────────

/// Rewrite a field's textual content by regex substitution. Rows without the
/// field, or with a non-string value there, pass through untouched.
pub(crate) fn transform(
  node: &str,
  decl: &OperatorDecl,
  mut rows: Vec<DataRow>,
) -> Result<Vec<DataRow>> {
  let field = decl
    .str_prop("field")
    .ok_or_else(|| op_err(node, "transform", "missing `field` property"))?;
  let pattern = decl
    .str_prop("pattern")
    .ok_or_else(|| op_err(node, "transform", "missing `pattern` property"))?;
  let replacement = decl.str_prop("replacement").unwrap_or("[REDACTED]");

  let re = regex::Regex::new(pattern).map_err(|e| {
    op_err(node, "transform", format!("bad pattern {pattern:?}: {e}"))
  })?;

  for row in &mut rows {
    let Some(key) = row
      .fields
      .keys()
      .find(|k| k.eq_ignore_ascii_case(field))
      .cloned()
    else {
      continue;
    };
    if let Some(text) = row.fields.get(&key).and_then(|v| v.as_str()) {
      let rewritten = re.replace_all(text, replacement).into_owned();
      row.fields.insert(key, json!(rewritten));
    }
  }
  Ok(rows)
}

// ─── stage ───────────────────────────────────────────────────────────────────

/// Convert the row batch into a pending staging action. Nothing reaches the
/// connector here; the action waits for the owner like any other proposal.
pub(crate) async fn stage<S: BrokerStore>(
  ctx: &ExecContext<'_, S>,
  decl: &OperatorDecl,
  purpose: &str,
  rows: Vec<DataRow>,
) -> Result<Uuid> {
  let action_type = decl.str_prop("action_type").unwrap_or("manifest_rows");

  let serde_json::Value::Object(mut payload) = json!({ "rows": rows }) else {
    unreachable!()
  };
  // Scalar props ride along as action parameters; `action_type` is consumed
  // above and `rows` is reserved.
  for (key, value) in &decl.props {
    if key == "action_type" {
      continue;
    }
    if let PropValue::Str(text) = value {
      payload.entry(key.clone()).or_insert_with(|| json!(text));
    }
  }
  let action = StagingAction {
    action_id: Uuid::new_v4(),
    source: ctx.source.to_string(),
    action_type: action_type.to_string(),
    payload,
    purpose: purpose.to_string(),
    status: ActionStatus::Pending,
    proposed_at: ctx.now,
    resolved_at: None,
  };
  let action_id = action.action_id;
  let row_count = rows_len(&action);

  ctx
    .store
    .insert_action(action)
    .await
    .map_err(Error::store)?;
  ctx
    .store
    .append_audit(NewAuditEntry {
      event:   AuditEvent::ActionProposed,
      source:  ctx.source.to_string(),
      details: json!({
        "action_id":   action_id,
        "action_type": action_type,
        "row_count":   row_count,
        "purpose":     purpose,
        "via":         "pipeline",
      }),
    })
    .await
    .map_err(Error::store)?;

  Ok(action_id)
}

fn rows_len(action: &StagingAction) -> usize {
  action
    .payload
    .get("rows")
    .and_then(|v| v.as_array())
    .map(Vec::len)
    .unwrap_or(0)
}

// ─── store ───────────────────────────────────────────────────────────────────

/// Persist the row batch into the cache, passing rows through unchanged.
pub(crate) async fn store_rows<S: BrokerStore>(
  ctx: &ExecContext<'_, S>,
  decl: &OperatorDecl,
  rows: Vec<DataRow>,
) -> Result<Vec<DataRow>> {
  let ttl = match decl.str_prop("ttl") {
    Some(text) => parse_ttl(Some(text)),
    None => ctx.default_ttl,
  };
  cache::write_rows(ctx.store, &rows, ctx.cipher, ctx.now, ttl).await?;
  Ok(rows)
}
