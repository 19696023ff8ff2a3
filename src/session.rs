use burn::tensor::backend::Backend;

use crate::classifier::{AppearanceClassifier, FrameContext};
use crate::error::{Result, ScorerError};
use crate::preprocess::Frame;
use crate::region::Region;

/// Keeps the most recently observed frame so a tracker can `update` once per
/// frame and `predict` many times.
#[derive(Debug)]
pub struct TrackerSession<B: Backend> {
  classifier: AppearanceClassifier<B>,
  context: Option<FrameContext>,
}

impl<B: Backend> TrackerSession<B> {
  pub fn new(classifier: AppearanceClassifier<B>) -> Self {
    Self {
      classifier,
      context: None,
    }
  }

  pub fn classifier(&self) -> &AppearanceClassifier<B> {
    &self.classifier
  }

  pub fn classifier_mut(&mut self) -> &mut AppearanceClassifier<B> {
    &mut self.classifier
  }

  pub fn context(&self) -> Option<&FrameContext> {
    self.context.as_ref()
  }

  /// Replaces the current frame; returns the resized shape and the scale.
  pub fn update(&mut self, frame: &Frame) -> Result<([usize; 2], f32)> {
    let context = self.classifier.observe(frame)?;
    let observed = (context.resized_shape(), context.scale());
    self.context = Some(context);
    Ok(observed)
  }

  /// Scores regions of the last frame passed to [`Self::update`].
  pub fn predict(&self, regions: &[Region]) -> Result<Vec<f32>> {
    let context = self.context.as_ref().ok_or(ScorerError::NoFrameObserved)?;
    self.classifier.score(context, regions)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{PreprocessConfig, ScorerConfig};
  use burn::backend::NdArray;

  type TB = NdArray;

  fn session() -> TrackerSession<TB> {
    let config = ScorerConfig::new().with_preprocess(PreprocessConfig::new().with_small_side(32));
    TrackerSession::new(AppearanceClassifier::new(&config, &Default::default()))
  }

  #[test]
  fn test_predict_before_update_fails() {
    let session = session();
    assert!(matches!(session.predict(&[]), Err(ScorerError::NoFrameObserved)));
    assert!(session.context().is_none());
  }

  #[test]
  fn test_update_then_predict() {
    let mut session = session();
    let frame = Frame::from_bgr(64, 32, vec![90; 64 * 32 * 3]).unwrap();
    let (shape, scale) = session.update(&frame).unwrap();
    assert_eq!(shape, [32, 64]);
    assert_eq!(scale, 1.0);

    let scores = session
      .predict(&[Region::new(0.0, 0.0, 16.0, 16.0)])
      .unwrap();
    assert_eq!(scores.len(), 1);
    assert!(session.predict(&[]).unwrap().is_empty());
  }
}
