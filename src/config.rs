use burn::config::Config;

/// Resize and padding policy applied to every observed frame.
#[derive(Config, Debug)]
pub struct PreprocessConfig {
  /// Working short side for ordinary frames.
  #[config(default = 368)]
  pub small_side: u32,
  /// Working short side for frames whose short side exceeds `large_threshold`.
  #[config(default = 640)]
  pub large_side: u32,
  #[config(default = 720)]
  pub large_threshold: u32,
  /// Padded frames are multiples of this in both dimensions.
  #[config(default = 16)]
  pub alignment: u32,
}

impl PreprocessConfig {
  /// Short side the frame is resized to.
  pub fn target_side(&self, width: u32, height: u32) -> u32 {
    if width.min(height) > self.large_threshold {
      self.large_side
    } else {
      self.small_side
    }
  }
}

#[derive(Config, Debug)]
pub struct ScorerConfig {
  /// Side of the position-sensitive bin grid; the score map has `roi_size²` channels.
  #[config(default = 7)]
  pub roi_size: usize,
  /// Stride of the score map relative to the preprocessed frame.
  #[config(default = 4)]
  pub feature_stride: usize,
  #[config(default = 256)]
  pub stem_channels: usize,
  #[config(default = 0.5)]
  pub dropout: f64,
  #[config(default = "PreprocessConfig::new()")]
  pub preprocess: PreprocessConfig,
}

impl ScorerConfig {
  pub fn score_channels(&self) -> usize {
    self.roi_size * self.roi_size
  }

  pub fn spatial_scale(&self) -> f32 {
    1.0 / self.feature_stride as f32
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = ScorerConfig::new();
    assert_eq!(config.roi_size, 7);
    assert_eq!(config.score_channels(), 49);
    assert_eq!(config.feature_stride, 4);
    assert_eq!(config.preprocess.alignment, 16);
  }

  #[test]
  fn test_target_side_threshold() {
    let config = PreprocessConfig::new();
    assert_eq!(config.target_side(1280, 720), 368);
    assert_eq!(config.target_side(1920, 1080), 640);
    assert_eq!(config.target_side(640, 368), 368);
  }

  #[test]
  fn test_config_file_round_trip() {
    let path = std::env::temp_dir().join("psroi_scorer_config_test.json");
    let config = ScorerConfig::new().with_roi_size(5);
    config.save(&path).unwrap();

    let loaded = ScorerConfig::load(&path).unwrap();
    assert_eq!(loaded.roi_size, 5);
    assert_eq!(loaded.preprocess.small_side, 368);
    std::fs::remove_file(path).ok();
  }
}
