use burn::{
  module::Module,
  tensor::{Device, Tensor, backend::Backend},
};

use super::backbone::Backbone;
use super::decoder::Decoder;
use super::head::ScoreHead;
use crate::config::ScorerConfig;
use crate::error::Result;
use crate::weights::{LoadReport, NamedParameters, ParameterStore, join};

/// Backbone, fusion decoder and score head, from a normalized frame to the score map.
#[derive(Module, Debug)]
pub struct ClassifierNetwork<B: Backend> {
  backbone: Backbone<B>,
  decoder: Decoder<B>,
  head: ScoreHead<B>,
}

impl ScorerConfig {
  /// Builds a freshly initialized network.
  pub fn init_network<B: Backend>(&self, device: &Device<B>) -> ClassifierNetwork<B> {
    let decoder = Decoder::new(self.stem_channels, self.dropout, device);
    let head = ScoreHead::new(decoder.out_channels(), self.score_channels(), device);
    ClassifierNetwork {
      backbone: Backbone::new(device),
      decoder,
      head,
    }
  }
}

impl<B: Backend> ClassifierNetwork<B> {
  /// `[1, 3, H, W]` to `[1, roi_size², H / 4 + 2, W / 4 + 2]`.
  pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
    let features = self.backbone.forward(input);
    let fused = self.decoder.forward(&features);
    self.head.forward(fused)
  }
}

/// Backbone and decoder tensors sit at the root; the head lives under `cls_conv`.
impl<B: Backend> NamedParameters for ClassifierNetwork<B> {
  fn export(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
    self.backbone.export(prefix, store)?;
    self.decoder.export(prefix, store)?;
    self.head.export(&join(prefix, "cls_conv"), store)
  }

  fn restore(mut self, prefix: &str, store: &ParameterStore, report: &mut LoadReport) -> Self {
    self.backbone = self.backbone.restore(prefix, store, report);
    self.decoder = self.decoder.restore(prefix, store, report);
    self.head = self.head.restore(&join(prefix, "cls_conv"), store, report);
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::weights::restore;
  use burn::backend::NdArray;
  use burn::tensor::Shape;

  type TB = NdArray;

  #[test]
  fn test_forward_shape() {
    let device = Default::default();
    let network = ScorerConfig::new().init_network::<TB>(&device);
    let input: Tensor<TB, 4> = Tensor::zeros(Shape::new([1, 3, 64, 64]), &device);
    assert_eq!(network.forward(input).dims(), [1, 49, 18, 18]);
  }

  #[test]
  fn test_export_restore_is_complete() {
    let device = Default::default();
    let config = ScorerConfig::new();
    let mut store = ParameterStore::new();
    config
      .init_network::<TB>(&device)
      .export("", &mut store)
      .unwrap();
    assert!(store.contains("cls_conv.3.weight"));
    assert!(store.contains("cls_conv.1.running_var"));

    let (_, report) = restore(config.init_network::<TB>(&device), &store);
    assert!(report.is_complete());
    assert_eq!(report.loaded.len(), store.len());
  }

  #[test]
  fn test_restored_network_reproduces_output() {
    let device = Default::default();
    let config = ScorerConfig::new();
    let source = config.init_network::<TB>(&device);
    let mut store = ParameterStore::new();
    source.export("", &mut store).unwrap();

    let (copy, _) = restore(config.init_network::<TB>(&device), &store);
    let input: Tensor<TB, 4> = Tensor::ones(Shape::new([1, 3, 32, 48]), &device).mul_scalar(0.25);
    let a = source.forward(input.clone()).into_data().to_vec::<f32>().unwrap();
    let b = copy.forward(input).into_data().to_vec::<f32>().unwrap();
    for (x, y) in a.iter().zip(&b) {
      assert!((x - y).abs() < 1e-4);
    }
  }
}
