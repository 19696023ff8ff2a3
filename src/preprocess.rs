use std::path::Path;

use burn::tensor::{Tensor, TensorData, backend::Backend};
use image::{Rgb, RgbImage, imageops};
use tracing::debug;

use crate::config::PreprocessConfig;
use crate::error::{Result, ScorerError};

/// Byte order of the three channels of a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
  Bgr,
  Rgb,
}

/// An 8-bit, 3-channel frame as handed over by the capture pipeline.
#[derive(Debug, Clone)]
pub struct Frame {
  pixels: RgbImage,
  order: ChannelOrder,
}

impl Frame {
  /// Wraps an interleaved BGR buffer, the layout most capture devices produce.
  pub fn from_bgr(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
    Self::from_raw(width, height, data, ChannelOrder::Bgr)
  }

  pub fn from_raw(width: u32, height: u32, data: Vec<u8>, order: ChannelOrder) -> Result<Self> {
    if width == 0 || height == 0 {
      return Err(ScorerError::EmptyImage { width, height });
    }
    let expected = width as usize * height as usize * 3;
    let got = data.len();
    let mismatch = ScorerError::BufferSize {
      width,
      height,
      expected,
      got,
    };
    if got != expected {
      return Err(mismatch);
    }
    let pixels = RgbImage::from_raw(width, height, data).ok_or(mismatch)?;
    Ok(Self { pixels, order })
  }

  pub fn from_rgb_image(pixels: RgbImage) -> Result<Self> {
    let (width, height) = pixels.dimensions();
    if width == 0 || height == 0 {
      return Err(ScorerError::EmptyImage { width, height });
    }
    Ok(Self {
      pixels,
      order: ChannelOrder::Rgb,
    })
  }

  /// Decodes an image file; decoded files are already in RGB order.
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let pixels = image::open(path)?.to_rgb8();
    Self::from_rgb_image(pixels)
  }

  pub fn width(&self) -> u32 {
    self.pixels.width()
  }

  pub fn height(&self) -> u32 {
    self.pixels.height()
  }

  pub fn order(&self) -> ChannelOrder {
    self.order
  }

  pub fn to_rgb(&self) -> RgbImage {
    match self.order {
      ChannelOrder::Rgb => self.pixels.clone(),
      ChannelOrder::Bgr => {
        let mut rgb = self.pixels.clone();
        for pixel in rgb.pixels_mut() {
          pixel.0.swap(0, 2);
        }
        rgb
      }
    }
  }
}

/// Network input for one frame.
#[derive(Debug, Clone)]
pub struct Preprocessed<B: Backend> {
  /// `[1, 3, H, W]`, RGB, values in `[-0.5, 0.5]`.
  pub tensor: Tensor<B, 4>,
  /// The resized frame after padding, before normalization.
  pub padded: RgbImage,
  /// `[height, width]` after resizing, before padding.
  pub resized_shape: [usize; 2],
  /// `[height, width]` after padding.
  pub padded_shape: [usize; 2],
  /// Model-space size over original size.
  pub scale: f32,
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
  config: PreprocessConfig,
}

impl Preprocessor {
  pub fn new(config: PreprocessConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &PreprocessConfig {
    &self.config
  }

  /// Resizes the short side to the working size, pads to the alignment and normalizes.
  pub fn prepare<B: Backend>(&self, frame: &Frame, device: &B::Device) -> Result<Preprocessed<B>> {
    let rgb = frame.to_rgb();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
      return Err(ScorerError::EmptyImage { width, height });
    }

    let target = self.config.target_side(width, height);
    let scale = target as f64 / width.min(height) as f64;
    let new_w = ((width as f64 * scale).round() as u32).max(1);
    let new_h = ((height as f64 * scale).round() as u32).max(1);

    let resized = if (new_w, new_h) == (width, height) {
      rgb
    } else {
      resize_bilinear(&rgb, new_w, new_h)
    };

    let padded_w = align_up(new_w, self.config.alignment);
    let padded_h = align_up(new_h, self.config.alignment);
    let mut padded = RgbImage::new(padded_w, padded_h);
    imageops::replace(&mut padded, &resized, 0, 0);

    debug!(width, height, new_w, new_h, padded_w, padded_h, scale, "preprocessed frame");

    let values = normalized_chw(&padded);
    let tensor = Tensor::from_data(
      TensorData::new(values, [1, 3, padded_h as usize, padded_w as usize]),
      device,
    );

    Ok(Preprocessed {
      tensor,
      padded,
      resized_shape: [new_h as usize, new_w as usize],
      padded_shape: [padded_h as usize, padded_w as usize],
      scale: scale as f32,
    })
  }
}

/// Two-tap bilinear resampling with half-pixel centers; the kernel does not
/// widen when downscaling.
fn resize_bilinear(src: &RgbImage, width: u32, height: u32) -> RgbImage {
  let (src_w, src_h) = src.dimensions();
  let xs = taps(src_w, width);
  let ys = taps(src_h, height);

  RgbImage::from_fn(width, height, |x, y| {
    let (x0, x1, fx) = xs[x as usize];
    let (y0, y1, fy) = ys[y as usize];
    let (a, b) = (src.get_pixel(x0, y0), src.get_pixel(x1, y0));
    let (c, d) = (src.get_pixel(x0, y1), src.get_pixel(x1, y1));
    let mut out = [0u8; 3];
    for (ch, value) in out.iter_mut().enumerate() {
      let top = a[ch] as f32 * (1.0 - fx) + b[ch] as f32 * fx;
      let bottom = c[ch] as f32 * (1.0 - fx) + d[ch] as f32 * fx;
      *value = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
  })
}

// Source neighbours and weight of the second one for every destination index.
fn taps(src_len: u32, dst_len: u32) -> Vec<(u32, u32, f32)> {
  let ratio = src_len as f32 / dst_len as f32;
  let last = src_len - 1;
  (0..dst_len)
    .map(|i| {
      let pos = ((i as f32 + 0.5) * ratio - 0.5).max(0.0);
      let i0 = (pos.floor() as u32).min(last);
      let i1 = (i0 + 1).min(last);
      (i0, i1, pos - i0 as f32)
    })
    .collect()
}

fn align_up(value: u32, alignment: u32) -> u32 {
  let alignment = alignment.max(1);
  value.div_ceil(alignment) * alignment
}

/// Planar `v / 255 - 0.5` values in channel-height-width order.
fn normalized_chw(image: &RgbImage) -> Vec<f32> {
  let (width, height) = image.dimensions();
  let plane = width as usize * height as usize;
  let mut values = vec![0.0f32; 3 * plane];
  for (x, y, pixel) in image.enumerate_pixels() {
    let idx = y as usize * width as usize + x as usize;
    for c in 0..3 {
      values[c * plane + idx] = pixel[c] as f32 / 255.0 - 0.5;
    }
  }
  values
}

#[cfg(test)]
mod tests {
  use super::*;
  use burn::backend::NdArray;

  type TB = NdArray;

  fn gray(width: u32, height: u32) -> Frame {
    Frame::from_bgr(width, height, vec![128; (width * height * 3) as usize]).unwrap()
  }

  #[test]
  fn test_padded_shape_is_aligned() {
    let device = Default::default();
    let preprocessor = Preprocessor::new(PreprocessConfig::new());
    for (w, h) in [(640, 368), (1920, 1080), (333, 517), (17, 9), (1000, 721)] {
      let prepared = preprocessor.prepare::<TB>(&gray(w, h), &device).unwrap();
      let [ph, pw] = prepared.padded_shape;
      assert_eq!(ph % 16, 0, "height {ph} for {w}x{h}");
      assert_eq!(pw % 16, 0, "width {pw} for {w}x{h}");
      assert_eq!(prepared.tensor.dims(), [1, 3, ph, pw]);
      assert!(prepared.resized_shape[0] <= ph && prepared.resized_shape[1] <= pw);
    }
  }

  #[test]
  fn test_scale_follows_short_side() {
    let device = Default::default();
    let preprocessor = Preprocessor::new(PreprocessConfig::new());

    let small = preprocessor.prepare::<TB>(&gray(640, 368), &device).unwrap();
    assert_eq!(small.scale, 1.0);
    assert_eq!(small.resized_shape, [368, 640]);

    let large = preprocessor.prepare::<TB>(&gray(1920, 1080), &device).unwrap();
    assert!((large.scale - 640.0 / 1080.0).abs() < 1e-6);
    assert_eq!(large.resized_shape, [640, 1138]);
    assert_eq!(large.padded_shape, [640, 1152]);
  }

  #[test]
  fn test_bgr_is_swapped_and_normalized() {
    let device = Default::default();
    let mut data = Vec::new();
    for _ in 0..(368 * 368) {
      data.extend_from_slice(&[0u8, 128, 255]);
    }
    let frame = Frame::from_bgr(368, 368, data).unwrap();
    let prepared = Preprocessor::new(PreprocessConfig::new())
      .prepare::<TB>(&frame, &device)
      .unwrap();

    let values = prepared.tensor.into_data().to_vec::<f32>().unwrap();
    let plane = 368 * 368;
    assert!((values[0] - 0.5).abs() < 1e-6, "red plane comes from the last byte");
    assert!((values[2 * plane] + 0.5).abs() < 1e-6, "blue plane comes from the first byte");
    assert!(values.iter().all(|v| (-0.5..=0.5).contains(v)));
  }

  #[test]
  fn test_padding_is_zero() {
    let device = Default::default();
    let prepared = Preprocessor::new(PreprocessConfig::new())
      .prepare::<TB>(&gray(370, 368), &device)
      .unwrap();
    assert_eq!(prepared.padded_shape, [368, 384]);
    assert_eq!(prepared.padded.get_pixel(383, 0).0, [0, 0, 0]);
    assert_eq!(prepared.padded.get_pixel(0, 0).0, [128, 128, 128]);
  }

  #[test]
  fn test_downscale_does_not_blur_across_edges() {
    let mut src = RgbImage::new(8, 2);
    for (x, _, pixel) in src.enumerate_pixels_mut() {
      *pixel = if x < 4 { Rgb([0, 0, 0]) } else { Rgb([200, 200, 200]) };
    }
    let resized = resize_bilinear(&src, 4, 1);
    let row: Vec<u8> = (0..4).map(|x| resized.get_pixel(x, 0)[0]).collect();
    assert_eq!(row, vec![0, 0, 200, 200]);
  }

  #[test]
  fn test_upscale_interpolates_between_centers() {
    let src = RgbImage::from_fn(2, 1, |x, _| Rgb([(x * 100) as u8, 0, 0]));
    let resized = resize_bilinear(&src, 4, 1);
    let row: Vec<u8> = (0..4).map(|x| resized.get_pixel(x, 0)[0]).collect();
    assert_eq!(row, vec![0, 25, 75, 100]);
  }

  #[test]
  fn test_malformed_frames_are_rejected() {
    assert!(matches!(
      Frame::from_bgr(0, 10, vec![]),
      Err(ScorerError::EmptyImage { .. })
    ));
    assert!(matches!(
      Frame::from_bgr(4, 4, vec![0; 10]),
      Err(ScorerError::BufferSize { expected: 48, got: 10, .. })
    ));
  }
}
