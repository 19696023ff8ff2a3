use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use burn::tensor::{Tensor, backend::Backend};
use safetensors::{Dtype, SafeTensors, tensor::TensorView};
use tracing::{debug, warn};

use crate::error::{Result, ScorerError};

const EPOCH_KEY: &str = "epoch";
const LR_KEY: &str = "lr";

/// A named, row-major `f32` array.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTensor {
  pub shape: Vec<usize>,
  pub values: Vec<f32>,
}

impl StoredTensor {
  pub fn new(name: &str, shape: Vec<usize>, values: Vec<f32>) -> Result<Self> {
    let expected: usize = shape.iter().product();
    if expected != values.len() {
      return Err(ScorerError::MalformedParameter {
        name: name.to_string(),
        shape,
        values: values.len(),
      });
    }
    Ok(Self { shape, values })
  }
}

/// In-memory parameter container, persisted as a safetensors file.
///
/// Every tensor is keyed by its dotted parameter name. The training epoch and
/// learning rate travel as header metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterStore {
  tensors: BTreeMap<String, StoredTensor>,
  epoch: Option<i64>,
  lr: Option<f64>,
}

impl ParameterStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, name: &str) -> Option<&StoredTensor> {
    self.tensors.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.tensors.contains_key(name)
  }

  pub fn insert(&mut self, name: impl Into<String>, tensor: StoredTensor) -> Option<StoredTensor> {
    self.tensors.insert(name.into(), tensor)
  }

  pub fn remove(&mut self, name: &str) -> Option<StoredTensor> {
    self.tensors.remove(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.tensors.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.tensors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tensors.is_empty()
  }

  pub fn epoch(&self) -> Option<i64> {
    self.epoch
  }

  pub fn set_epoch(&mut self, epoch: Option<i64>) {
    self.epoch = epoch;
  }

  pub fn lr(&self) -> Option<f64> {
    self.lr
  }

  pub fn set_lr(&mut self, lr: Option<f64>) {
    self.lr = lr;
  }

  /// Reads a tensor back from the device and stores it under `name`.
  pub fn insert_tensor<B: Backend, const D: usize>(
    &mut self,
    name: String,
    tensor: Tensor<B, D>,
  ) -> Result<()> {
    let shape = tensor.dims().to_vec();
    let values = tensor
      .into_data()
      .convert::<f32>()
      .to_vec::<f32>()
      .map_err(|err| ScorerError::TensorData(format!("{err:?}")))?;
    let stored = StoredTensor::new(&name, shape, values)?;
    self.tensors.insert(name, stored);
    Ok(())
  }

  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    debug!(path = %path.display(), "reading parameter container");
    let bytes = std::fs::read(path)?;
    Self::from_bytes(&bytes)
  }

  pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
    std::fs::write(path, self.to_bytes()?)?;
    Ok(())
  }

  /// Entries with a dtype other than `F32`/`F64` are skipped with a warning.
  pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
    let tensors = SafeTensors::deserialize(bytes)?;
    let (_, metadata) = SafeTensors::read_metadata(bytes)?;
    let attrs = metadata.metadata().clone().unwrap_or_default();

    let mut store = Self {
      tensors: BTreeMap::new(),
      epoch: attrs.get(EPOCH_KEY).and_then(|value| parse_epoch(value)),
      lr: attrs.get(LR_KEY).and_then(|value| value.parse::<f64>().ok()),
    };

    for (name, view) in tensors.tensors() {
      match decode(&name, &view) {
        Ok(tensor) => {
          store.tensors.insert(name, tensor);
        }
        Err(err) => warn!(parameter = %name, %err, "skipping container entry"),
      }
    }
    Ok(store)
  }

  pub fn to_bytes(&self) -> Result<Vec<u8>> {
    let buffers: Vec<(&str, &StoredTensor, Vec<u8>)> = self
      .tensors
      .iter()
      .map(|(name, tensor)| {
        let bytes = tensor.values.iter().flat_map(|v| v.to_le_bytes()).collect();
        (name.as_str(), tensor, bytes)
      })
      .collect();

    let mut views = Vec::with_capacity(buffers.len());
    for (name, tensor, bytes) in &buffers {
      views.push((*name, TensorView::new(Dtype::F32, tensor.shape.clone(), bytes)?));
    }

    let mut attrs = HashMap::new();
    if let Some(epoch) = self.epoch {
      attrs.insert(EPOCH_KEY.to_string(), epoch.to_string());
    }
    if let Some(lr) = self.lr {
      attrs.insert(LR_KEY.to_string(), lr.to_string());
    }
    let metadata = if attrs.is_empty() { None } else { Some(attrs) };

    Ok(safetensors::serialize(views, &metadata)?)
  }
}

// Integer epochs written by float-typed tooling ("10.0") still count.
fn parse_epoch(value: &str) -> Option<i64> {
  value
    .parse::<i64>()
    .ok()
    .or_else(|| value.parse::<f64>().ok().map(|epoch| epoch as i64))
}

fn decode(name: &str, view: &TensorView<'_>) -> Result<StoredTensor> {
  let data = view.data();
  let values = match view.dtype() {
    Dtype::F32 => data
      .chunks_exact(4)
      .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
      .collect(),
    Dtype::F64 => data
      .chunks_exact(8)
      .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
      .collect(),
    other => {
      return Err(ScorerError::UnsupportedDtype {
        name: name.to_string(),
        dtype: format!("{other:?}"),
      });
    }
  };
  StoredTensor::new(name, view.shape().to_vec(), values)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> ParameterStore {
    let mut store = ParameterStore::new();
    store.insert(
      "conv1.0.weight",
      StoredTensor::new("conv1.0.weight", vec![2, 1, 1, 2], vec![0.5, -1.0, 2.0, 3.25]).unwrap(),
    );
    store.insert(
      "conv1.0.bias",
      StoredTensor::new("conv1.0.bias", vec![2], vec![0.0, 1.0]).unwrap(),
    );
    store
  }

  #[test]
  fn test_file_round_trip_keeps_attributes() {
    let mut store = sample();
    store.set_epoch(Some(10));
    store.set_lr(Some(0.001));

    let path = std::env::temp_dir().join("psroi_scorer_store_test.safetensors");
    store.save(&path).unwrap();
    let loaded = ParameterStore::open(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded, store);
    assert_eq!(loaded.names().collect::<Vec<_>>(), vec!["conv1.0.bias", "conv1.0.weight"]);
  }

  #[test]
  fn test_missing_attributes_stay_unset() {
    let bytes = sample().to_bytes().unwrap();
    let loaded = ParameterStore::from_bytes(&bytes).unwrap();
    assert_eq!(loaded.epoch(), None);
    assert_eq!(loaded.lr(), None);
    assert_eq!(loaded.len(), 2);
  }

  #[test]
  fn test_float_epoch_is_accepted() {
    assert_eq!(parse_epoch("10"), Some(10));
    assert_eq!(parse_epoch("10.0"), Some(10));
    assert_eq!(parse_epoch("ten"), None);
  }

  #[test]
  fn test_shape_and_values_must_agree() {
    let err = StoredTensor::new("bad", vec![2, 2], vec![1.0]).unwrap_err();
    assert!(matches!(err, ScorerError::MalformedParameter { values: 1, .. }));
  }

  #[test]
  fn test_garbage_is_an_error() {
    assert!(ParameterStore::from_bytes(b"not a container").is_err());
  }
}
