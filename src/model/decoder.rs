use burn::{
  module::Module,
  nn::{Dropout, DropoutConfig},
  tensor::{Device, Tensor, backend::Backend},
};

use super::backbone::FEATURE_CHANNELS;
use super::blocks::{ConvBlock, ConvRelu, DilationLayer, SumBranches, upsample_bilinear_2x};
use crate::error::Result;
use crate::weights::{LoadReport, NamedParameters, ParameterStore, join};

/// Output channels of the upsample branch of each refinement step, coarsest first.
const UPSAMPLE_CHANNELS: [usize; 2] = [256, 128];

// The projection branch runs at half the upsample width.
fn fused_channels(upsample_channels: usize) -> usize {
  upsample_channels + upsample_channels / 2
}

/// Dropout then 3x3 conv + ReLU on the stride-16 map.
#[derive(Module, Debug)]
pub struct Stem<B: Backend> {
  dropout: Dropout,
  conv: ConvRelu<B>,
}

impl<B: Backend> Stem<B> {
  pub fn new(in_channels: usize, out_channels: usize, dropout: f64, device: &Device<B>) -> Self {
    Self {
      dropout: DropoutConfig::new(dropout).init(),
      conv: ConvRelu::new(in_channels, out_channels, 3, 1, 1, device),
    }
  }

  pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
    self.conv.forward(self.dropout.forward(input))
  }
}

impl<B: Backend> NamedParameters for Stem<B> {
  fn export(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
    self.conv.export(&join(prefix, "1"), store)
  }

  fn restore(mut self, prefix: &str, store: &ParameterStore, report: &mut LoadReport) -> Self {
    self.conv = self.conv.restore(&join(prefix, "1"), store, report);
    self
  }
}

/// 3x3 conv block followed by 2x bilinear upsampling.
#[derive(Module, Debug)]
pub struct UpsampleBranch<B: Backend> {
  block: ConvBlock<B>,
}

impl<B: Backend> UpsampleBranch<B> {
  pub fn new(in_channels: usize, out_channels: usize, device: &Device<B>) -> Self {
    Self {
      block: ConvBlock::new(in_channels, out_channels, 3, 1, device),
    }
  }

  pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
    upsample_bilinear_2x(self.block.forward(input))
  }
}

impl<B: Backend> NamedParameters for UpsampleBranch<B> {
  fn export(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
    self.block.export_as(&join(prefix, "0"), &join(prefix, "1"), store)
  }

  fn restore(mut self, prefix: &str, store: &ParameterStore, report: &mut LoadReport) -> Self {
    self.block = self
      .block
      .restore_as(&join(prefix, "0"), &join(prefix, "1"), store, report);
    self
  }
}

/// Summed 3x3 and 5x5 branches over an encoder map, then a 1x1 conv block.
#[derive(Module, Debug)]
pub struct ProjectionBranch<B: Backend> {
  branches: SumBranches<B>,
  block: ConvBlock<B>,
}

impl<B: Backend> ProjectionBranch<B> {
  pub fn new(in_channels: usize, out_channels: usize, device: &Device<B>) -> Self {
    Self {
      branches: SumBranches::new(vec![
        DilationLayer::new(in_channels, out_channels, 3, 1, device),
        DilationLayer::new(in_channels, out_channels, 5, 1, device),
      ]),
      block: ConvBlock::new(out_channels, out_channels, 1, 0, device),
    }
  }

  pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
    self.block.forward(self.branches.forward(input))
  }
}

impl<B: Backend> NamedParameters for ProjectionBranch<B> {
  fn export(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
    self.branches.export(&join(prefix, "0"), store)?;
    self.block.export_as(&join(prefix, "1"), &join(prefix, "2"), store)
  }

  fn restore(mut self, prefix: &str, store: &ParameterStore, report: &mut LoadReport) -> Self {
    self.branches = self.branches.restore(&join(prefix, "0"), store, report);
    self.block = self
      .block
      .restore_as(&join(prefix, "1"), &join(prefix, "2"), store, report);
    self
  }
}

/// One refinement step: doubles the resolution of the running state and
/// concatenates the projected encoder map of the new stride.
#[derive(Module, Debug)]
pub struct DecoderStage<B: Backend> {
  upsample: UpsampleBranch<B>,
  projection: ProjectionBranch<B>,
}

impl<B: Backend> DecoderStage<B> {
  pub fn new(
    state_channels: usize,
    feature_channels: usize,
    upsample_channels: usize,
    device: &Device<B>,
  ) -> Self {
    Self {
      upsample: UpsampleBranch::new(state_channels, upsample_channels, device),
      projection: ProjectionBranch::new(feature_channels, upsample_channels / 2, device),
    }
  }

  pub fn forward(&self, state: Tensor<B, 4>, feature: Tensor<B, 4>) -> Tensor<B, 4> {
    let depth = self.upsample.forward(state);
    let project = self.projection.forward(feature);
    Tensor::cat(vec![depth, project], 1)
  }
}

/// Fuses the backbone maps into a single stride-4 map.
///
/// Stage `i` (1-based) is stored as `upconv_{i}` and `proj_{i}` and consumes
/// the encoder map `i` steps finer than the stride-16 one.
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
  stem: Stem<B>,
  stages: Vec<DecoderStage<B>>,
}

impl<B: Backend> Decoder<B> {
  pub fn new(stem_channels: usize, dropout: f64, device: &Device<B>) -> Self {
    let coarsest = FEATURE_CHANNELS.len() - 1;
    let mut state = stem_channels;
    let mut stages = Vec::with_capacity(UPSAMPLE_CHANNELS.len());
    for (i, &upsample) in UPSAMPLE_CHANNELS.iter().enumerate() {
      let feature = FEATURE_CHANNELS[coarsest - 1 - i];
      let stage = DecoderStage::new(state, feature, upsample, device);
      state = fused_channels(upsample);
      stages.push(stage);
    }
    Self {
      stem: Stem::new(FEATURE_CHANNELS[coarsest], stem_channels, dropout, device),
      stages,
    }
  }

  /// Channels of the fused map.
  pub fn out_channels(&self) -> usize {
    UPSAMPLE_CHANNELS
      .last()
      .map(|&c| fused_channels(c))
      .unwrap_or_default()
  }

  pub fn forward(&self, features: &[Tensor<B, 4>; 4]) -> Tensor<B, 4> {
    let coarsest = features.len() - 1;
    let state = self.stem.forward(features[coarsest].clone());
    self
      .stages
      .iter()
      .enumerate()
      .fold(state, |state, (i, stage)| {
        stage.forward(state, features[coarsest - 1 - i].clone())
      })
  }
}

impl<B: Backend> NamedParameters for Decoder<B> {
  fn export(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
    self.stem.export(&join(prefix, "stage_0"), store)?;
    for (i, stage) in self.stages.iter().enumerate() {
      stage.upsample.export(&join(prefix, &format!("upconv_{}", i + 1)), store)?;
      stage.projection.export(&join(prefix, &format!("proj_{}", i + 1)), store)?;
    }
    Ok(())
  }

  fn restore(mut self, prefix: &str, store: &ParameterStore, report: &mut LoadReport) -> Self {
    self.stem = self.stem.restore(&join(prefix, "stage_0"), store, report);
    self.stages = self
      .stages
      .into_iter()
      .enumerate()
      .map(|(i, stage)| DecoderStage {
        upsample: stage
          .upsample
          .restore(&join(prefix, &format!("upconv_{}", i + 1)), store, report),
        projection: stage
          .projection
          .restore(&join(prefix, &format!("proj_{}", i + 1)), store, report),
      })
      .collect();
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use burn::backend::NdArray;
  use burn::tensor::Shape;

  type TB = NdArray;

  fn features(device: &Device<TB>, h: usize, w: usize) -> [Tensor<TB, 4>; 4] {
    [
      Tensor::ones(Shape::new([1, 64, h / 2, w / 2]), device),
      Tensor::ones(Shape::new([1, 128, h / 4, w / 4]), device),
      Tensor::ones(Shape::new([1, 256, h / 8, w / 8]), device),
      Tensor::ones(Shape::new([1, 512, h / 16, w / 16]), device),
    ]
  }

  #[test]
  fn test_stage_widths() {
    let device = Default::default();
    let stage = DecoderStage::<TB>::new(256, 256, 256, &device);
    let state: Tensor<TB, 4> = Tensor::ones(Shape::new([1, 256, 3, 5]), &device);
    let feature: Tensor<TB, 4> = Tensor::ones(Shape::new([1, 256, 6, 10]), &device);
    assert_eq!(stage.forward(state, feature).dims(), [1, 384, 6, 10]);
  }

  #[test]
  fn test_decoder_output_is_stride_four() {
    let device = Default::default();
    let decoder = Decoder::<TB>::new(256, 0.5, &device);
    assert_eq!(decoder.out_channels(), 192);

    let output = decoder.forward(&features(&device, 64, 96));
    assert_eq!(output.dims(), [1, 192, 16, 24]);
  }

  #[test]
  fn test_decoder_parameter_names() {
    let device = Default::default();
    let mut store = ParameterStore::new();
    Decoder::<TB>::new(256, 0.5, &device)
      .export("", &mut store)
      .unwrap();

    let shape = |name: &str| store.get(name).unwrap().shape.clone();
    assert_eq!(shape("stage_0.1.weight"), vec![256, 512, 3, 3]);
    assert_eq!(shape("upconv_1.0.weight"), vec![256, 256, 3, 3]);
    assert_eq!(shape("upconv_1.1.running_mean"), vec![256]);
    assert_eq!(shape("proj_1.0.0.conv.weight"), vec![128, 256, 3, 3]);
    assert_eq!(shape("proj_1.0.1.conv.weight"), vec![128, 256, 5, 5]);
    assert_eq!(shape("proj_1.1.weight"), vec![128, 128, 1, 1]);
    assert_eq!(shape("proj_1.2.running_var"), vec![128]);
    assert_eq!(shape("upconv_2.0.weight"), vec![128, 384, 3, 3]);
    assert_eq!(shape("proj_2.0.1.conv.weight"), vec![64, 128, 5, 5]);
    assert!(!store.contains("proj_3.1.weight"));
  }
}
