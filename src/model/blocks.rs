use burn::{
  module::Module,
  nn::{
    BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    conv::{Conv2d, Conv2dConfig},
  },
  tensor::{Device, Tensor, backend::Backend},
};

use crate::error::Result;
use crate::weights::{LoadReport, NamedParameters, ParameterStore, join};

// ConvRelu Definition
#[derive(Module, Debug)]
pub struct ConvRelu<B: Backend> {
  conv: Conv2d<B>,
  activation: Relu,
}

impl<B: Backend> ConvRelu<B> {
  pub fn new(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    device: &Device<B>,
  ) -> Self {
    Self {
      conv: Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .init(device),
      activation: Relu::new(),
    }
  }

  pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
    self.activation.forward(self.conv.forward(input))
  }
}

/// Parameters live directly under the prefix, like a bare convolution.
impl<B: Backend> NamedParameters for ConvRelu<B> {
  fn export(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
    self.conv.export(prefix, store)
  }

  fn restore(mut self, prefix: &str, store: &ParameterStore, report: &mut LoadReport) -> Self {
    self.conv = self.conv.restore(prefix, store, report);
    self
  }
}

// ConvBlock Definition
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
  conv: Conv2d<B>,
  bn: BatchNorm<B, 2>,
  activation: Relu,
}

impl<B: Backend> ConvBlock<B> {
  pub fn new(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    padding: usize,
    device: &Device<B>,
  ) -> Self {
    Self {
      conv: Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .init(device),
      bn: BatchNormConfig::new(out_channels).init(device),
      activation: Relu::new(),
    }
  }

  pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
    let x = self.conv.forward(input);
    let x = self.bn.forward(x);
    self.activation.forward(x)
  }

  /// The convolution and the normalization sit at two sibling indices of the parent.
  pub fn export_as(&self, conv: &str, bn: &str, store: &mut ParameterStore) -> Result<()> {
    self.conv.export(conv, store)?;
    self.bn.export(bn, store)
  }

  pub fn restore_as(
    mut self,
    conv: &str,
    bn: &str,
    store: &ParameterStore,
    report: &mut LoadReport,
  ) -> Self {
    self.conv = self.conv.restore(conv, store, report);
    self.bn = self.bn.restore(bn, store, report);
    self
  }
}

/// Convolution + ReLU whose padding keeps the spatial size for any kernel and dilation.
#[derive(Module, Debug)]
pub struct DilationLayer<B: Backend> {
  conv: Conv2d<B>,
  activation: Relu,
}

impl<B: Backend> DilationLayer<B> {
  pub fn new(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    dilation: usize,
    device: &Device<B>,
  ) -> Self {
    let padding = (kernel_size - 1) / 2 * dilation;
    Self {
      conv: Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_dilation([dilation, dilation])
        .init(device),
      activation: Relu::new(),
    }
  }

  pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
    self.activation.forward(self.conv.forward(input))
  }
}

impl<B: Backend> NamedParameters for DilationLayer<B> {
  fn export(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
    self.conv.export(&join(prefix, "conv"), store)
  }

  fn restore(mut self, prefix: &str, store: &ParameterStore, report: &mut LoadReport) -> Self {
    self.conv = self.conv.restore(&join(prefix, "conv"), store, report);
    self
  }
}

/// Runs every branch on the same input and adds the outputs element-wise.
///
/// All branches must produce the same shape.
#[derive(Module, Debug)]
pub struct SumBranches<B: Backend> {
  branches: Vec<DilationLayer<B>>,
}

impl<B: Backend> SumBranches<B> {
  pub fn new(branches: Vec<DilationLayer<B>>) -> Self {
    Self { branches }
  }

  pub fn len(&self) -> usize {
    self.branches.len()
  }

  pub fn is_empty(&self) -> bool {
    self.branches.is_empty()
  }

  pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
    let mut branches = self.branches.iter();
    let Some(first) = branches.next() else {
      return input;
    };
    branches.fold(first.forward(input.clone()), |sum, branch| {
      sum + branch.forward(input.clone())
    })
  }
}

/// Branch `i` is named `{prefix}.{i}`.
impl<B: Backend> NamedParameters for SumBranches<B> {
  fn export(&self, prefix: &str, store: &mut ParameterStore) -> Result<()> {
    for (i, branch) in self.branches.iter().enumerate() {
      branch.export(&join(prefix, &i.to_string()), store)?;
    }
    Ok(())
  }

  fn restore(mut self, prefix: &str, store: &ParameterStore, report: &mut LoadReport) -> Self {
    self.branches = self
      .branches
      .into_iter()
      .enumerate()
      .map(|(i, branch)| branch.restore(&join(prefix, &i.to_string()), store, report))
      .collect();
    self
  }
}

/// 2x bilinear upsampling of the two spatial axes, without corner alignment.
pub fn upsample_bilinear_2x<B: Backend>(input: Tensor<B, 4>) -> Tensor<B, 4> {
  let x = upsample_axis(input, 2);
  upsample_axis(x, 3)
}

// Output 2i samples source i - 0.25 and output 2i+1 samples i + 0.25, clamped at the borders.
fn upsample_axis<B: Backend>(input: Tensor<B, 4>, axis: usize) -> Tensor<B, 4> {
  let mut dims = input.dims();
  let len = dims[axis];
  let (prev, next) = if len > 1 {
    let prev = Tensor::cat(
      vec![
        input.clone().narrow(axis, 0, 1),
        input.clone().narrow(axis, 0, len - 1),
      ],
      axis,
    );
    let next = Tensor::cat(
      vec![
        input.clone().narrow(axis, 1, len - 1),
        input.clone().narrow(axis, len - 1, 1),
      ],
      axis,
    );
    (prev, next)
  } else {
    (input.clone(), input.clone())
  };

  let even = prev.mul_scalar(0.25) + input.clone().mul_scalar(0.75);
  let odd = input.mul_scalar(0.75) + next.mul_scalar(0.25);

  dims[axis] = len * 2;
  Tensor::stack::<5>(vec![even, odd], axis + 1).reshape(dims)
}
