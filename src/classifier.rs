use std::path::Path;

use burn::tensor::backend::Backend;
use tracing::{debug, info};

use crate::config::ScorerConfig;
use crate::error::Result;
use crate::model::ClassifierNetwork;
use crate::pooling::{PooledBins, PsRoiPool, ScoreMap};
use crate::preprocess::{Frame, Preprocessor};
use crate::region::{Region, ScaledRegion};
use crate::scorer::region_score;
use crate::weights::{LoadReport, ModelState, NamedParameters, ParameterStore, restore};

/// Checkpoint read by [`AppearanceClassifier::load_default_weights`].
pub const DEFAULT_WEIGHTS: &str = "data/squeezenet_small40_coco_mot16_ckpt_10.safetensors";

/// Everything `score` needs about one observed frame.
#[derive(Debug, Clone)]
pub struct FrameContext {
  score_map: ScoreMap,
  scale: f32,
  resized_shape: [usize; 2],
  padded_shape: [usize; 2],
}

impl FrameContext {
  pub fn score_map(&self) -> &ScoreMap {
    &self.score_map
  }

  pub fn scale(&self) -> f32 {
    self.scale
  }

  /// `[height, width]` of the frame after resizing, before padding.
  pub fn resized_shape(&self) -> [usize; 2] {
    self.resized_shape
  }

  pub fn padded_shape(&self) -> [usize; 2] {
    self.padded_shape
  }
}

/// Scores candidate boxes of a frame by position-sensitive pooling over a
/// dense score map.
#[derive(Debug)]
pub struct AppearanceClassifier<B: Backend> {
  network: ClassifierNetwork<B>,
  preprocessor: Preprocessor,
  pool: PsRoiPool,
  state: ModelState,
  device: B::Device,
}

impl<B: Backend> AppearanceClassifier<B> {
  /// A randomly initialized classifier; load weights before trusting its scores.
  pub fn new(config: &ScorerConfig, device: &B::Device) -> Self {
    Self {
      network: config.init_network(device),
      preprocessor: Preprocessor::new(config.preprocess.clone()),
      pool: PsRoiPool::new(config.roi_size, config.spatial_scale()),
      state: ModelState::default(),
      device: device.clone(),
    }
  }

  pub fn network(&self) -> &ClassifierNetwork<B> {
    &self.network
  }

  pub fn state(&self) -> &ModelState {
    &self.state
  }

  /// Runs the whole network on `frame`.
  pub fn observe(&self, frame: &Frame) -> Result<FrameContext> {
    let prepared = self.preprocessor.prepare::<B>(frame, &self.device)?;
    let output = self.network.forward(prepared.tensor);
    let score_map = ScoreMap::from_tensor(output)?;
    debug!(
      channels = score_map.channels(),
      height = score_map.height(),
      width = score_map.width(),
      scale = prepared.scale,
      "observed frame"
    );

    Ok(FrameContext {
      score_map,
      scale: prepared.scale,
      resized_shape: prepared.resized_shape,
      padded_shape: prepared.padded_shape,
    })
  }

  /// Raw bin averages for each region, in input order.
  pub fn pool(&self, context: &FrameContext, regions: &[Region]) -> Result<Vec<PooledBins>> {
    let scaled: Vec<ScaledRegion> = regions
      .iter()
      .map(|region| region.scaled(context.scale))
      .collect();
    self.pool.pool_all(&context.score_map, &scaled)
  }

  /// One score in `[0, 1]` per region, in input order.
  pub fn score(&self, context: &FrameContext, regions: &[Region]) -> Result<Vec<f32>> {
    if regions.is_empty() {
      return Ok(Vec::new());
    }
    Ok(
      self
        .pool(context, regions)?
        .iter()
        .map(region_score)
        .collect(),
    )
  }

  /// Overwrites every parameter with a same-named, same-shaped entry and
  /// adopts the stored epoch and learning rate.
  pub fn load_parameters(&mut self, store: &ParameterStore) -> LoadReport {
    let (network, report) = restore(self.network.clone(), store);
    self.network = network;
    self.state = ModelState::from_store(store);
    report
  }

  /// Chaining form of [`Self::load_parameters`].
  pub fn with_parameters(mut self, store: &ParameterStore) -> (Self, LoadReport) {
    let report = self.load_parameters(store);
    (self, report)
  }

  pub fn load_weights<P: AsRef<Path>>(&mut self, path: P) -> Result<LoadReport> {
    let path = path.as_ref();
    let store = ParameterStore::open(path)?;
    let report = self.load_parameters(&store);
    info!(
      path = %path.display(),
      epoch = self.state.epoch,
      complete = report.is_complete(),
      "loaded weights"
    );
    Ok(report)
  }

  pub fn load_default_weights(&mut self) -> Result<LoadReport> {
    self.load_weights(DEFAULT_WEIGHTS)
  }

  /// Current parameters plus the epoch and latest learning rate.
  pub fn export_parameters(&self) -> Result<ParameterStore> {
    let mut store = ParameterStore::new();
    self.network.export("", &mut store)?;
    store.set_epoch(Some(self.state.epoch));
    store.set_lr(self.state.lr.last().copied());
    Ok(store)
  }
}
