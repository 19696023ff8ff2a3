pub mod backbone;
pub mod blocks;
pub mod decoder;
pub mod head;
pub mod network;

pub use backbone::{Backbone, FEATURE_CHANNELS, Fire};
pub use blocks::{ConvBlock, DilationLayer, SumBranches, upsample_bilinear_2x};
pub use decoder::{Decoder, DecoderStage};
pub use head::ScoreHead;
pub use network::ClassifierNetwork;
