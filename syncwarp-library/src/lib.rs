//! File adapters for syncwarp - decoding, result caching and settings

mod cache;
mod config;
mod loader;

pub use cache::{AlignmentCache, AlignmentKey, CacheError, CachedAlignment, FileIdentity};
pub use config::Settings;
pub use loader::{mix_to_mono, DecodedTrack, LoadError, RecordingMetadata, TrackLoader};
