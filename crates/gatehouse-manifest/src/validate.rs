//! Structural and semantic checks on a parsed [`PolicyDocument`].

use crate::{OperatorKind, PolicyDocument, error::ValidationError};

/// Validate a parsed document against the registered operator set.
///
/// Checks, in order:
/// 1. every graph name has a declaration;
/// 2. every declared kind is a registered operator — all offenders are
///    reported at once;
/// 3. a `stage` node, if present, is the last element of the graph.
///
/// Pure and side-effect-free; never touches a connector or the database.
pub fn validate(doc: &PolicyDocument) -> Result<(), ValidationError> {
  let undeclared: Vec<String> = doc
    .graph
    .iter()
    .filter(|name| !doc.operators.contains_key(*name))
    .cloned()
    .collect();
  if !undeclared.is_empty() {
    return Err(ValidationError::UndeclaredOperators(undeclared));
  }

  let mut unsupported: Vec<String> = doc
    .operators
    .values()
    .filter(|decl| decl.operator_kind().is_none())
    .map(|decl| decl.kind.clone())
    .collect();
  if !unsupported.is_empty() {
    unsupported.sort();
    unsupported.dedup();
    return Err(ValidationError::UnsupportedOperators(unsupported));
  }

  // The graph may be empty when a document is built directly rather than
  // parsed; there is then nothing left to check.
  let last = doc.graph.len().saturating_sub(1);
  for (pos, name) in doc.graph.iter().enumerate() {
    let is_stage =
      doc.operators[name].operator_kind() == Some(OperatorKind::Stage);
    if is_stage && pos != last {
      return Err(ValidationError::StageNotTerminal(name.clone()));
    }
  }

  Ok(())
}
