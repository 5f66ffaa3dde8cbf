//! The quick-filter engine.
//!
//! Applies a source's enabled quick filters to a row batch. Row rules are
//! conjunctive (a row must satisfy every enabled rule); `hide_field` rules
//! strip fields from survivors and never reject a row. Disabled filters and
//! unrecognised rule types are no-ops, so an empty or unknown filter set is
//! the identity.

use gatehouse_core::{
  filter::{FilterRule, QuickFilter},
  row::DataRow,
};

/// Run `filters` over `rows`, returning the surviving (possibly
/// field-stripped) rows in their original order.
pub fn apply_filters(
  rows: Vec<DataRow>,
  filters: &[QuickFilter],
) -> Vec<DataRow> {
  let enabled: Vec<&FilterRule> = filters
    .iter()
    .filter(|f| f.enabled)
    .map(|f| &f.rule)
    .collect();
  if enabled.is_empty() {
    return rows;
  }

  let (hides, predicates): (Vec<_>, Vec<_>) =
    enabled.into_iter().partition(|r| r.hides_field());

  rows
    .into_iter()
    .filter(|row| predicates.iter().all(|rule| row_passes(rule, row)))
    .map(|mut row| {
      for rule in &hides {
        if let FilterRule::HideField(name) = rule {
          row.fields.retain(|k, _| !k.eq_ignore_ascii_case(name));
        }
      }
      row
    })
    .collect()
}

/// Whether one row-level rule admits the row.
///
/// Include rules fail closed: a row missing the inspected field is dropped.
/// Exclude rules fail open: a row missing the field has nothing to exclude.
fn row_passes(rule: &FilterRule, row: &DataRow) -> bool {
  match rule {
    FilterRule::TimeAfter(after) => row.timestamp >= *after,
    FilterRule::SenderInclude(needle) => contains_ci(row, "sender", needle),
    FilterRule::SubjectInclude(needle) => contains_ci(row, "title", needle),
    FilterRule::SenderExclude(needle) => !contains_ci(row, "sender", needle),
    FilterRule::SubjectExclude(needle) => !contains_ci(row, "title", needle),
    FilterRule::HasAttachment => row
      .fields
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case("has_attachment"))
      .and_then(|(_, v)| v.as_bool())
      .unwrap_or(false),
    FilterRule::HideField(_) => true,
    FilterRule::Other { .. } => true,
  }
}

fn contains_ci(row: &DataRow, field: &str, needle: &str) -> bool {
  row
    .text_field_ci(field)
    .is_some_and(|v| v.to_lowercase().contains(&needle.to_lowercase()))
}
