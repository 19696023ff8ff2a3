use burn::tensor::{Tensor, backend::Backend};

use crate::error::{Result, ScorerError};
use crate::region::ScaledRegion;

/// Smallest region side, in score-map cells, so degenerate boxes still cover a bin.
const MIN_REGION_SIDE: f32 = 0.1;

/// Host copy of a `[channels, height, width]` score map with one summed-area
/// table per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMap {
  channels: usize,
  height: usize,
  width: usize,
  values: Vec<f32>,
  // (height + 1) x (width + 1) per channel, first row and column zero.
  integral: Vec<f64>,
}

impl ScoreMap {
  pub fn new(channels: usize, height: usize, width: usize, values: Vec<f32>) -> Result<Self> {
    let shape = vec![channels, height, width];
    if values.len() != channels * height * width {
      return Err(ScorerError::MalformedParameter {
        name: "score map".to_string(),
        shape,
        values: values.len(),
      });
    }

    let stride = width + 1;
    let plane = (height + 1) * stride;
    let mut integral = vec![0.0f64; channels * plane];
    for c in 0..channels {
      let table = &mut integral[c * plane..(c + 1) * plane];
      let source = &values[c * height * width..(c + 1) * height * width];
      for y in 0..height {
        let mut row = 0.0f64;
        for x in 0..width {
          row += source[y * width + x] as f64;
          table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row;
        }
      }
    }

    Ok(Self {
      channels,
      height,
      width,
      values,
      integral,
    })
  }

  /// Copies the first batch entry of a `[N, C, H, W]` tensor to the host.
  pub fn from_tensor<B: Backend>(tensor: Tensor<B, 4>) -> Result<Self> {
    let [_, channels, height, width] = tensor.dims();
    let first = tensor.narrow(0, 0, 1);
    let values = first
      .into_data()
      .convert::<f32>()
      .to_vec::<f32>()
      .map_err(|err| ScorerError::TensorData(format!("{err:?}")))?;
    Self::new(channels, height, width, values)
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn get(&self, channel: usize, y: usize, x: usize) -> f32 {
    self.values[(channel * self.height + y) * self.width + x]
  }

  /// Sum of `channel` over rows `y0..y1` and columns `x0..x1`.
  pub fn window_sum(&self, channel: usize, y0: usize, y1: usize, x0: usize, x1: usize) -> f64 {
    let stride = self.width + 1;
    let table = &self.integral[channel * (self.height + 1) * stride..];
    table[y1 * stride + x1] - table[y0 * stride + x1] - table[y1 * stride + x0]
      + table[y0 * stride + x0]
  }
}

/// The `size x size` bin averages of one region, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct PooledBins {
  size: usize,
  values: Vec<f32>,
}

impl PooledBins {
  pub fn size(&self) -> usize {
    self.size
  }

  pub fn get(&self, row: usize, col: usize) -> f32 {
    self.values[row * self.size + col]
  }

  pub fn values(&self) -> &[f32] {
    &self.values
  }

  pub fn mean(&self) -> f32 {
    if self.values.is_empty() {
      return 0.0;
    }
    let sum: f64 = self.values.iter().map(|&v| v as f64).sum();
    (sum / self.values.len() as f64) as f32
  }
}

/// Position-sensitive average pooling: bin `(i, j)` reads channel `i * size + j`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsRoiPool {
  size: usize,
  spatial_scale: f32,
}

impl PsRoiPool {
  pub fn new(size: usize, spatial_scale: f32) -> Self {
    Self {
      size,
      spatial_scale,
    }
  }

  pub fn size(&self) -> usize {
    self.size
  }

  pub fn spatial_scale(&self) -> f32 {
    self.spatial_scale
  }

  pub fn pool_all(&self, map: &ScoreMap, regions: &[ScaledRegion]) -> Result<Vec<PooledBins>> {
    let expected = self.size * self.size;
    if map.channels() != expected {
      return Err(ScorerError::ScoreChannels {
        expected,
        got: map.channels(),
      });
    }
    Ok(regions.iter().map(|region| self.pool(map, region)).collect())
  }

  /// Callers must ensure the map has `size²` channels.
  pub fn pool(&self, map: &ScoreMap, region: &ScaledRegion) -> PooledBins {
    let k = self.size;
    let s = self.spatial_scale;
    let x0 = region.x1.round() * s;
    let y0 = region.y1.round() * s;
    let x_end = (region.x2.round() + 1.0) * s;
    let y_end = (region.y2.round() + 1.0) * s;

    let bin_w = (x_end - x0).max(MIN_REGION_SIDE) / k as f32;
    let bin_h = (y_end - y0).max(MIN_REGION_SIDE) / k as f32;

    let mut values = Vec::with_capacity(k * k);
    for i in 0..k {
      let h_start = clip((i as f32 * bin_h + y0).floor(), map.height());
      let h_end = clip(((i + 1) as f32 * bin_h + y0).ceil(), map.height());
      for j in 0..k {
        let w_start = clip((j as f32 * bin_w + x0).floor(), map.width());
        let w_end = clip(((j + 1) as f32 * bin_w + x0).ceil(), map.width());

        if h_end <= h_start || w_end <= w_start {
          values.push(0.0);
          continue;
        }
        let area = ((h_end - h_start) * (w_end - w_start)) as f64;
        let sum = map.window_sum(i * k + j, h_start, h_end, w_start, w_end);
        values.push((sum / area) as f32);
      }
    }
    PooledBins { size: k, values }
  }
}

// Saturating cast; NaN lands on zero.
fn clip(value: f32, upper: usize) -> usize {
  (value as i64).clamp(0, upper as i64) as usize
}
