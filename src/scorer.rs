use crate::pooling::PooledBins;

/// Scalar logistic function; pooled bins already live on the host.
pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// Confidence in `[0, 1]` that the pooled region holds a trackable object.
pub fn region_score(bins: &PooledBins) -> f32 {
  sigmoid(bins.mean())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sigmoid() {
    assert_eq!(sigmoid(0.0), 0.5);
    assert!(sigmoid(40.0) <= 1.0 && sigmoid(40.0) > 0.999);
    assert!(sigmoid(-200.0) >= 0.0 && sigmoid(-200.0) < 1e-6);
    assert!((sigmoid(2.0) + sigmoid(-2.0) - 1.0).abs() < 1e-6);
  }
}
