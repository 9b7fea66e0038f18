//! Error types for the alignment engine

use crate::ring::RingBufferError;
use std::fmt;
use syncwarp_analysis::FeatureError;
use thiserror::Error;

/// Which of the two aligned sequences an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequence {
    A,
    B,
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sequence::A => write!(f, "A"),
            Sequence::B => write!(f, "B"),
        }
    }
}

/// Errors that terminate an alignment run
#[derive(Error, Debug)]
pub enum AlignError {
    #[error("Invalid alignment configuration: {0}")]
    InvalidConfig(String),
    #[error("Feature extraction failed: {0}")]
    Feature(#[from] FeatureError),
    #[error("Frame window violated for sequence {sequence}: {source}")]
    FrameWindow {
        sequence: Sequence,
        source: RingBufferError,
    },
    #[error("Frame producer for sequence {sequence} failed: {source}")]
    ProducerFailed {
        sequence: Sequence,
        source: FeatureError,
    },
    #[error("Frame producer for sequence {sequence} stopped without finishing")]
    ProducerDisconnected { sequence: Sequence },
    #[error("Alignment cancelled")]
    Cancelled,
}
