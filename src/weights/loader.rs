use tracing::{info, warn};

use super::named::NamedParameters;
use super::store::ParameterStore;

/// A live parameter whose stored counterpart has a different shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeMismatch {
  pub name: String,
  pub expected: Vec<usize>,
  pub found: Vec<usize>,
}

/// Outcome of restoring a module from a [`ParameterStore`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
  pub loaded: Vec<String>,
  /// Live parameters with no entry in the container.
  pub missing: Vec<String>,
  pub mismatched: Vec<ShapeMismatch>,
}

impl LoadReport {
  /// True when every live parameter was overwritten.
  pub fn is_complete(&self) -> bool {
    self.missing.is_empty() && self.mismatched.is_empty()
  }

  /// Names of all live parameters that kept their previous value.
  pub fn skipped(&self) -> impl Iterator<Item = &str> {
    self
      .missing
      .iter()
      .map(String::as_str)
      .chain(self.mismatched.iter().map(|m| m.name.as_str()))
  }
}

/// Training bookkeeping carried alongside the weights.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelState {
  pub epoch: i64,
  pub lr: Vec<f64>,
}

impl Default for ModelState {
  fn default() -> Self {
    Self {
      epoch: 0,
      lr: vec![0.01],
    }
  }
}

impl ModelState {
  /// Epoch defaults to -1; the history is empty unless the stored rate is positive.
  pub fn from_store(store: &ParameterStore) -> Self {
    let lr = match store.lr() {
      Some(lr) if lr > 0.0 => vec![lr],
      _ => Vec::new(),
    };
    Self {
      epoch: store.epoch().unwrap_or(-1),
      lr,
    }
  }
}

/// Overwrites every parameter of `module` that has a same-named, same-shaped entry in `store`.
pub fn restore<M: NamedParameters>(module: M, store: &ParameterStore) -> (M, LoadReport) {
  let mut report = LoadReport::default();
  let module = module.restore("", store, &mut report);

  if !report.mismatched.is_empty() {
    warn!(
      count = report.mismatched.len(),
      "parameters kept their value because of a shape mismatch"
    );
  }
  info!(
    loaded = report.loaded.len(),
    missing = report.missing.len(),
    mismatched = report.mismatched.len(),
    "restored parameters"
  );
  (module, report)
}
