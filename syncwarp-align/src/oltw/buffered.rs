//! Online time warping over fully loaded sequences

use super::{FrameStore, OnlineWarp};
use crate::config::{check_width, AlignConfig};
use crate::dtw::load_frames;
use crate::error::{AlignError, Sequence};
use crate::path::WarpPath;
use crate::progress::RunControl;
use crate::ring::RingBufferError;
use syncwarp_analysis::{AudioStream, Frame};

/// Both sequences in memory, revealed to the engine one frame at a time
pub(crate) struct BufferedFrames {
    a: Vec<Frame>,
    b: Vec<Frame>,
    loaded_a: usize,
    loaded_b: usize,
}

impl BufferedFrames {
    pub fn new(a: Vec<Frame>, b: Vec<Frame>) -> Self {
        Self {
            a,
            b,
            loaded_a: 0,
            loaded_b: 0,
        }
    }

    fn frame(&self, sequence: Sequence, index: usize) -> Result<&Frame, AlignError> {
        let (frames, loaded) = match sequence {
            Sequence::A => (&self.a, self.loaded_a),
            Sequence::B => (&self.b, self.loaded_b),
        };
        if index >= loaded {
            return Err(AlignError::FrameWindow {
                sequence,
                source: RingBufferError::OutOfRange {
                    index,
                    count: loaded,
                },
            });
        }
        Ok(&frames[index])
    }
}

impl FrameStore for BufferedFrames {
    fn has_more(&mut self, sequence: Sequence) -> Result<bool, AlignError> {
        Ok(match sequence {
            Sequence::A => self.loaded_a < self.a.len(),
            Sequence::B => self.loaded_b < self.b.len(),
        })
    }

    fn advance(&mut self, sequence: Sequence) -> Result<(), AlignError> {
        let (loaded, len) = match sequence {
            Sequence::A => (&mut self.loaded_a, self.a.len()),
            Sequence::B => (&mut self.loaded_b, self.b.len()),
        };
        *loaded = (*loaded + 1).min(len);
        Ok(())
    }

    fn local_cost(&self, i: usize, j: usize) -> Result<f32, AlignError> {
        Ok(self.frame(Sequence::A, i)?.distance(self.frame(Sequence::B, j)?))
    }

    fn expected_total(&self) -> Option<usize> {
        Some(self.a.len() + self.b.len())
    }
}

/// Online alignment of two fully loaded streams, comparing costs normalized
/// by path length
pub(crate) fn run_buffered<A, B>(
    a: A,
    b: B,
    config: &AlignConfig,
    control: RunControl<'_>,
) -> Result<WarpPath, AlignError>
where
    A: AudioStream + Send,
    B: AudioStream + Send,
{
    config.validate()?;
    let (frames_a, frames_b) = load_frames(a, b, &config.frames)?;
    control.checkpoint()?;
    check_width("search width", config.search_width, frames_a.len(), frames_b.len())?;

    let store = BufferedFrames::new(frames_a, frames_b);
    let steps = OnlineWarp::new(store, config.search_width, config.diagonal_weight)
        .normalized()
        .run(control)?;
    Ok(WarpPath::new(steps, config.frames))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CancelToken, NoProgress, ProgressRecorder};
    use crate::testing::{delayed, noise, synthetic_frames};
    use syncwarp_analysis::MemoryStream;

    #[test]
    fn test_frames_beyond_loaded_are_rejected() {
        let mut store = BufferedFrames::new(synthetic_frames(5, 1), synthetic_frames(5, 2));
        store.advance(Sequence::A).unwrap();
        store.advance(Sequence::B).unwrap();
        assert!(store.local_cost(0, 0).is_ok());

        let result = store.local_cost(0, 1);
        assert!(matches!(
            result,
            Err(AlignError::FrameWindow {
                sequence: Sequence::B,
                source: RingBufferError::OutOfRange { index: 1, count: 1 },
            })
        ));
    }

    #[test]
    fn test_exhaustion() {
        let mut store = BufferedFrames::new(synthetic_frames(2, 1), Vec::new());
        assert!(!store.has_more(Sequence::B).unwrap());
        store.advance(Sequence::A).unwrap();
        store.advance(Sequence::A).unwrap();
        assert!(!store.has_more(Sequence::A).unwrap());
        assert_eq!(store.expected_total(), Some(2));
    }

    #[test]
    fn test_delayed_copy_tracks_offset() {
        let samples = noise(44100 * 20, 5);
        let b = delayed(&samples, 1.0);
        let config = AlignConfig {
            search_width: 150,
            ..Default::default()
        };
        let recorder = ProgressRecorder::new();
        let cancel = CancelToken::new();
        let control = RunControl {
            progress: &recorder,
            cancel: &cancel,
        };

        let path = run_buffered(
            MemoryStream::new(samples, 44100),
            MemoryStream::new(b, 44100),
            &config,
            control,
        )
        .unwrap();

        assert!(path.is_monotonic());
        assert_eq!(path.first(), Some((0, 0)));
        assert_eq!(path.last(), Some((999, 999)));

        let hop = config.frames.hop_duration();
        let middle: Vec<_> = path
            .time_pairs()
            .into_iter()
            .filter(|p| p.time_a >= 8.0 && p.time_a <= 16.0)
            .collect();
        let matching = middle.iter().filter(|p| (p.offset() + 1.0).abs() <= hop).count();
        assert!(
            matching * 10 >= middle.len() * 9,
            "{} of {} pairs at -1s",
            matching,
            middle.len()
        );
        assert_eq!(recorder.last(), Some(100.0));
    }

    #[test]
    fn test_width_larger_than_data_is_config_error() {
        let samples = noise(44100, 9);
        let cancel = CancelToken::new();
        let run = |search_width| {
            run_buffered(
                MemoryStream::new(samples.clone(), 44100),
                MemoryStream::new(samples.clone(), 44100),
                &AlignConfig {
                    search_width,
                    ..Default::default()
                },
                RunControl {
                    progress: &NoProgress,
                    cancel: &cancel,
                },
            )
        };

        assert!(matches!(run(5000), Err(AlignError::InvalidConfig(_))));
        let path = run(50).unwrap();
        assert_eq!(path.len(), 50);
        assert!(path.steps().iter().all(|&(i, j)| i == j));
    }
}
