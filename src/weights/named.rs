use burn::{
  module::{Param, RunningState},
  nn::{BatchNorm, conv::Conv2d},
  tensor::{Tensor, TensorData, backend::Backend},
};
use tracing::debug;

use super::loader::{LoadReport, ShapeMismatch};
use super::store::ParameterStore;
use crate::error::Result;

/// Joins a parent prefix and a child name with a dot.
pub fn join(prefix: &str, name: &str) -> String {
  if prefix.is_empty() {
    name.to_string()
  } else {
    format!("{prefix}.{name}")
  }
}

/// Modules whose learnable tensors are addressable by dotted names.
///
/// `restore` replaces a tensor only when the store has an entry with the same
/// name and shape; every other tensor keeps its current value and the reason is
/// recorded in the report.
pub trait NamedParameters: Sized {
  fn export(&self, prefix: &str, store: &mut ParameterStore) -> Result<()>;

  fn restore(self, prefix: &str, store: &ParameterStore, report: &mut LoadReport) -> Self;
}

impl<B: Backend> NamedParameters for Conv2d<B> {
  fn export(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
    store.insert_tensor(join(prefix, "weight"), self.weight.val())?;
    if let Some(bias) = &self.bias {
      store.insert_tensor(join(prefix, "bias"), bias.val())?;
    }
    Ok(())
  }

  fn restore(mut self, prefix: &str, store: &ParameterStore, report: &mut LoadReport) -> Self {
    self.weight = restore_param(self.weight, &join(prefix, "weight"), store, report);
    self.bias = self
      .bias
      .map(|bias| restore_param(bias, &join(prefix, "bias"), store, report));
    self
  }
}

impl<B: Backend> NamedParameters for BatchNorm<B, 2> {
  fn export(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
    store.insert_tensor(join(prefix, "weight"), self.gamma.val())?;
    store.insert_tensor(join(prefix, "bias"), self.beta.val())?;
    store.insert_tensor(join(prefix, "running_mean"), self.running_mean.value())?;
    store.insert_tensor(join(prefix, "running_var"), self.running_var.value())?;
    Ok(())
  }

  fn restore(mut self, prefix: &str, store: &ParameterStore, report: &mut LoadReport) -> Self {
    self.gamma = restore_param(self.gamma, &join(prefix, "weight"), store, report);
    self.beta = restore_param(self.beta, &join(prefix, "bias"), store, report);
    self.running_mean =
      restore_running(self.running_mean, &join(prefix, "running_mean"), store, report);
    self.running_var =
      restore_running(self.running_var, &join(prefix, "running_var"), store, report);
    self
  }
}

fn restore_param<B: Backend, const D: usize>(
  param: Param<Tensor<B, D>>,
  name: &str,
  store: &ParameterStore,
  report: &mut LoadReport,
) -> Param<Tensor<B, D>> {
  match matching(&param.val(), name, store, report) {
    Some(tensor) => Param::from_tensor(tensor),
    None => param,
  }
}

fn restore_running<B: Backend, const D: usize>(
  state: RunningState<Tensor<B, D>>,
  name: &str,
  store: &ParameterStore,
  report: &mut LoadReport,
) -> RunningState<Tensor<B, D>> {
  match matching(&state.value(), name, store, report) {
    Some(tensor) => RunningState::new(tensor),
    None => state,
  }
}

fn matching<B: Backend, const D: usize>(
  current: &Tensor<B, D>,
  name: &str,
  store: &ParameterStore,
  report: &mut LoadReport,
) -> Option<Tensor<B, D>> {
  let expected = current.dims().to_vec();
  let Some(stored) = store.get(name) else {
    debug!(parameter = name, "parameter absent from container");
    report.missing.push(name.to_string());
    return None;
  };
  if stored.shape != expected {
    debug!(parameter = name, ?expected, found = ?stored.shape, "parameter shape mismatch");
    report.mismatched.push(ShapeMismatch {
      name: name.to_string(),
      expected,
      found: stored.shape.clone(),
    });
    return None;
  }
  report.loaded.push(name.to_string());
  Some(Tensor::from_data(
    TensorData::new(stored.values.clone(), stored.shape.clone()),
    &current.device(),
  ))
}
