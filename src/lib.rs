//! Region confidence scoring for multi-object tracking.
//!
//! A frame is run once through a SqueezeNet encoder and a feature-fusion
//! decoder into a dense position-sensitive score map; candidate boxes are then
//! scored by pooling that map bin by bin and squashing the mean with a sigmoid.

pub mod classifier;
pub mod config;
pub mod error;
pub mod model;
pub mod pooling;
pub mod preprocess;
pub mod region;
pub mod scorer;
pub mod session;
pub mod weights;

pub use classifier::{AppearanceClassifier, DEFAULT_WEIGHTS, FrameContext};
pub use config::{PreprocessConfig, ScorerConfig};
pub use error::{Result, ScorerError};
pub use pooling::{PooledBins, PsRoiPool, ScoreMap};
pub use preprocess::{ChannelOrder, Frame, Preprocessed, Preprocessor};
pub use region::{Region, ScaledRegion};
pub use session::TrackerSession;
pub use weights::{LoadReport, ModelState, ParameterStore, ShapeMismatch};
