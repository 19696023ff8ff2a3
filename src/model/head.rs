use burn::{
  module::Module,
  nn::{
    PaddingConfig2d,
    conv::{Conv2d, Conv2dConfig},
  },
  tensor::{Device, Tensor, backend::Backend},
};

use super::blocks::ConvBlock;
use crate::error::Result;
use crate::weights::{LoadReport, NamedParameters, ParameterStore, join};

/// Maps the fused features to `roi_size²` position-sensitive score channels.
///
/// The final 1x1 projection is zero-padded by one pixel, so the score map is
/// two pixels larger than its input in each dimension.
#[derive(Module, Debug)]
pub struct ScoreHead<B: Backend> {
  block: ConvBlock<B>,
  projection: Conv2d<B>,
}

impl<B: Backend> ScoreHead<B> {
  pub fn new(in_channels: usize, score_channels: usize, device: &Device<B>) -> Self {
    Self {
      block: ConvBlock::new(in_channels, in_channels, 3, 1, device),
      projection: Conv2dConfig::new([in_channels, score_channels], [1, 1])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device),
    }
  }

  pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
    self.projection.forward(self.block.forward(input))
  }
}

impl<B: Backend> NamedParameters for ScoreHead<B> {
  fn export(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
    self.block.export_as(&join(prefix, "0"), &join(prefix, "1"), store)?;
    self.projection.export(&join(prefix, "3"), store)
  }

  fn restore(mut self, prefix: &str, store: &ParameterStore, report: &mut LoadReport) -> Self {
    self.block = self
      .block
      .restore_as(&join(prefix, "0"), &join(prefix, "1"), store, report);
    self.projection = self.projection.restore(&join(prefix, "3"), store, report);
    self
  }
}
