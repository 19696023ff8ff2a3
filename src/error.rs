use thiserror::Error;

/// Errors surfaced by the scoring pipeline.
#[derive(Error, Debug)]
pub enum ScorerError {
  #[error("image is empty ({width}x{height})")]
  EmptyImage { width: u32, height: u32 },

  #[error("pixel buffer holds {got} bytes, expected {expected} for a {width}x{height} frame")]
  BufferSize {
    width: u32,
    height: u32,
    expected: usize,
    got: usize,
  },

  #[error("no frame has been observed yet")]
  NoFrameObserved,

  #[error("score map has {got} channels, pooling needs {expected}")]
  ScoreChannels { expected: usize, got: usize },

  #[error("invalid region `{0}`, expected x1,y1,x2,y2")]
  InvalidRegion(String),

  #[error("tensor readback failed: {0}")]
  TensorData(String),

  #[error("parameter `{name}` has unsupported dtype {dtype}")]
  UnsupportedDtype { name: String, dtype: String },

  #[error("parameter `{name}` holds {values} values for shape {shape:?}")]
  MalformedParameter {
    name: String,
    shape: Vec<usize>,
    values: usize,
  },

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("safetensors error: {0}")]
  SafeTensor(#[from] safetensors::SafeTensorError),

  #[error("image error: {0}")]
  Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, ScorerError>;
