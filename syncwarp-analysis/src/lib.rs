//! Audio analysis for syncwarp
//!
//! Provides the sample stream abstraction the engine consumes and the
//! spectral flux frames both alignment strategies compare.

mod frames;
mod stream;

pub use frames::{FeatureError, FeatureFrameSource, Frame, FrameConfig, REFERENCE_SAMPLE_RATE};
pub use stream::{AudioStream, MemoryStream, StreamError, StreamProperties};
