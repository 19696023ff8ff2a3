use burn::{
  module::Module,
  nn::{
    PaddingConfig2d, Relu,
    conv::{Conv2d, Conv2dConfig},
    pool::{MaxPool2d, MaxPool2dConfig},
  },
  tensor::{Device, Tensor, backend::Backend},
};

use super::blocks::ConvRelu;
use crate::error::Result;
use crate::weights::{LoadReport, NamedParameters, ParameterStore, join};

/// Channels of the stride 2, 4, 8 and 16 feature maps.
pub const FEATURE_CHANNELS: [usize; 4] = [64, 128, 256, 512];

// Fire Definition
#[derive(Module, Debug)]
pub struct Fire<B: Backend> {
  squeeze: Conv2d<B>,
  expand1x1: Conv2d<B>,
  expand3x3: Conv2d<B>,
  activation: Relu,
}

impl<B: Backend> Fire<B> {
  pub fn new(
    in_channels: usize,
    squeeze_channels: usize,
    expand1x1_channels: usize,
    expand3x3_channels: usize,
    device: &Device<B>,
  ) -> Self {
    Self {
      squeeze: Conv2dConfig::new([in_channels, squeeze_channels], [1, 1]).init(device),
      expand1x1: Conv2dConfig::new([squeeze_channels, expand1x1_channels], [1, 1]).init(device),
      expand3x3: Conv2dConfig::new([squeeze_channels, expand3x3_channels], [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device),
      activation: Relu::new(),
    }
  }

  pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
    let x = self.activation.forward(self.squeeze.forward(input));
    let a = self.activation.forward(self.expand1x1.forward(x.clone()));
    let b = self.activation.forward(self.expand3x3.forward(x));
    Tensor::cat(vec![a, b], 1)
  }
}

impl<B: Backend> NamedParameters for Fire<B> {
  fn export(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
    self.squeeze.export(&join(prefix, "squeeze"), store)?;
    self.expand1x1.export(&join(prefix, "expand1x1"), store)?;
    self.expand3x3.export(&join(prefix, "expand3x3"), store)
  }

  fn restore(mut self, prefix: &str, store: &ParameterStore, report: &mut LoadReport) -> Self {
    self.squeeze = self.squeeze.restore(&join(prefix, "squeeze"), store, report);
    self.expand1x1 = self.expand1x1.restore(&join(prefix, "expand1x1"), store, report);
    self.expand3x3 = self.expand3x3.restore(&join(prefix, "expand3x3"), store, report);
    self
  }
}

/// Max-pool followed by a run of Fire modules; module `i` is named `{prefix}.{i + 1}`.
#[derive(Module, Debug)]
pub struct FireStage<B: Backend> {
  pool: MaxPool2d,
  fires: Vec<Fire<B>>,
}

impl<B: Backend> FireStage<B> {
  /// Each entry is `(in, squeeze, expand)`; both expand paths get `expand` channels.
  pub fn new(fires: &[(usize, usize, usize)], device: &Device<B>) -> Self {
    Self {
      pool: MaxPool2dConfig::new([3, 3])
        .with_strides([2, 2])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(),
      fires: fires
        .iter()
        .map(|&(input, squeeze, expand)| Fire::new(input, squeeze, expand, expand, device))
        .collect(),
    }
  }

  pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
    self
      .fires
      .iter()
      .fold(self.pool.forward(input), |x, fire| fire.forward(x))
  }
}

impl<B: Backend> NamedParameters for FireStage<B> {
  fn export(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
    for (i, fire) in self.fires.iter().enumerate() {
      fire.export(&join(prefix, &(i + 1).to_string()), store)?;
    }
    Ok(())
  }

  fn restore(mut self, prefix: &str, store: &ParameterStore, report: &mut LoadReport) -> Self {
    self.fires = self
      .fires
      .into_iter()
      .enumerate()
      .map(|(i, fire)| fire.restore(&join(prefix, &(i + 1).to_string()), store, report))
      .collect();
    self
  }
}

/// SqueezeNet 1.1 feature extractor with outputs at strides 2, 4, 8 and 16.
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
  conv1: ConvRelu<B>,
  conv2: FireStage<B>,
  conv3: FireStage<B>,
  conv4: FireStage<B>,
}

impl<B: Backend> Backbone<B> {
  pub fn new(device: &Device<B>) -> Self {
    Self {
      conv1: ConvRelu::new(3, FEATURE_CHANNELS[0], 3, 2, 1, device),
      conv2: FireStage::new(&[(64, 16, 64), (128, 16, 64)], device),
      conv3: FireStage::new(&[(128, 32, 128), (256, 32, 128)], device),
      conv4: FireStage::new(
        &[(256, 48, 192), (384, 48, 192), (384, 64, 256), (512, 64, 256)],
        device,
      ),
    }
  }

  /// Returns the maps finest first.
  pub fn forward(&self, input: Tensor<B, 4>) -> [Tensor<B, 4>; 4] {
    let x2 = self.conv1.forward(input);
    let x4 = self.conv2.forward(x2.clone());
    let x8 = self.conv3.forward(x4.clone());
    let x16 = self.conv4.forward(x8.clone());
    [x2, x4, x8, x16]
  }
}

impl<B: Backend> NamedParameters for Backbone<B> {
  fn export(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
    self.conv1.export(&join(prefix, "conv1.0"), store)?;
    self.conv2.export(&join(prefix, "conv2"), store)?;
    self.conv3.export(&join(prefix, "conv3"), store)?;
    self.conv4.export(&join(prefix, "conv4"), store)
  }

  fn restore(mut self, prefix: &str, store: &ParameterStore, report: &mut LoadReport) -> Self {
    self.conv1 = self.conv1.restore(&join(prefix, "conv1.0"), store, report);
    self.conv2 = self.conv2.restore(&join(prefix, "conv2"), store, report);
    self.conv3 = self.conv3.restore(&join(prefix, "conv3"), store, report);
    self.conv4 = self.conv4.restore(&join(prefix, "conv4"), store, report);
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use burn::backend::NdArray;
  use burn::tensor::Shape;

  type TB = NdArray;

  #[test]
  fn test_fire_concatenates_expand_paths() {
    let device = Default::default();
    let fire = Fire::<TB>::new(64, 16, 64, 64, &device);
    let input: Tensor<TB, 4> = Tensor::ones(Shape::new([1, 64, 9, 7]), &device);
    assert_eq!(fire.forward(input).dims(), [1, 128, 9, 7]);
  }

  #[test]
  fn test_backbone_strides_and_channels() {
    let device = Default::default();
    let backbone = Backbone::<TB>::new(&device);
    let input: Tensor<TB, 4> = Tensor::zeros(Shape::new([1, 3, 64, 96]), &device);
    let [x2, x4, x8, x16] = backbone.forward(input);

    assert_eq!(x2.dims(), [1, 64, 32, 48]);
    assert_eq!(x4.dims(), [1, 128, 16, 24]);
    assert_eq!(x8.dims(), [1, 256, 8, 12]);
    assert_eq!(x16.dims(), [1, 512, 4, 6]);
  }

  #[test]
  fn test_backbone_parameter_names() {
    let device = Default::default();
    let mut store = ParameterStore::new();
    Backbone::<TB>::new(&device).export("", &mut store).unwrap();

    assert_eq!(store.get("conv1.0.weight").unwrap().shape, vec![64, 3, 3, 3]);
    assert_eq!(store.get("conv2.1.squeeze.weight").unwrap().shape, vec![16, 64, 1, 1]);
    assert_eq!(store.get("conv2.2.expand3x3.bias").unwrap().shape, vec![64]);
    assert_eq!(store.get("conv4.4.expand1x1.weight").unwrap().shape, vec![256, 64, 1, 1]);
    assert!(!store.contains("conv2.0.squeeze.weight"));
    // 1 conv + 8 fires, 3 convs each, weight and bias per conv.
    assert_eq!(store.len(), 2 + 8 * 3 * 2);
  }
}
