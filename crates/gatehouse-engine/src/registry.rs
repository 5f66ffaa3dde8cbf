//! The operator table: which declaration kinds this engine executes.

use std::collections::BTreeSet;

use gatehouse_manifest::OperatorKind;

/// The set of operator kinds the executor will dispatch. Kept separate from
/// the manifest validator's closed set so the engine can refuse a kind it
/// does not (yet) execute without changing the DSL.
#[derive(Debug, Clone)]
pub struct OperatorRegistry {
  kinds: BTreeSet<OperatorKind>,
}

impl OperatorRegistry {
  /// The full standard table: pull, select, filter, transform, stage, store.
  pub fn standard() -> Self {
    Self {
      kinds: BTreeSet::from([
        OperatorKind::Pull,
        OperatorKind::Select,
        OperatorKind::Filter,
        OperatorKind::Transform,
        OperatorKind::Stage,
        OperatorKind::Store,
      ]),
    }
  }

  pub fn supports(&self, kind: OperatorKind) -> bool {
    self.kinds.contains(&kind)
  }

  pub fn kinds(&self) -> impl Iterator<Item = OperatorKind> + '_ {
    self.kinds.iter().copied()
  }
}

impl Default for OperatorRegistry {
  fn default() -> Self {
    Self::standard()
  }
}
