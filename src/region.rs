use std::str::FromStr;

use crate::error::ScorerError;

/// Axis-aligned box `(x1, y1, x2, y2)` in original-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Region {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl Region {
  pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  /// Moves the box into model space.
  pub fn scaled(&self, scale: f32) -> ScaledRegion {
    ScaledRegion {
      x1: self.x1 * scale,
      y1: self.y1 * scale,
      x2: self.x2 * scale,
      y2: self.y2 * scale,
    }
  }
}

impl From<[f32; 4]> for Region {
  fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
    Self { x1, y1, x2, y2 }
  }
}

impl FromStr for Region {
  type Err = ScorerError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let values = s
      .split(',')
      .map(|v| v.trim().parse::<f32>())
      .collect::<Result<Vec<_>, _>>()
      .map_err(|_| ScorerError::InvalidRegion(s.to_string()))?;
    let coords: [f32; 4] = values
      .try_into()
      .map_err(|_| ScorerError::InvalidRegion(s.to_string()))?;
    Ok(coords.into())
  }
}

/// A [`Region`] multiplied by the frame scale, in preprocessed-frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScaledRegion {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_scaled() {
    let region = Region::from([10.0, 20.0, 110.0, 220.0]);
    let scaled = region.scaled(0.5);
    assert_eq!(scaled, ScaledRegion { x1: 5.0, y1: 10.0, x2: 55.0, y2: 110.0 });
  }

  #[test]
  fn test_parse() {
    let region: Region = "0, 0,100,100.5".parse().unwrap();
    assert_eq!(region, Region::new(0.0, 0.0, 100.0, 100.5));
    assert!("1,2,3".parse::<Region>().is_err());
    assert!("1,2,3,x".parse::<Region>().is_err());
  }
}
