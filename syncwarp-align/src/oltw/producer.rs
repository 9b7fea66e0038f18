//! Streaming frame supply: one producer thread per sequence feeding a
//! bounded queue, drained by the alignment loop into ring buffers

use super::{FrameStore, OnlineWarp};
use crate::config::{check_width, AlignConfig};
use crate::error::{AlignError, Sequence};
use crate::path::WarpPath;
use crate::progress::RunControl;
use crate::ring::RingBuffer;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use syncwarp_analysis::{AudioStream, FeatureError, FeatureFrameSource, Frame};
use tracing::{debug, trace, warn};

/// Message from a producer to the alignment loop
#[derive(Debug)]
pub(crate) enum ProducerMessage {
    Frame(Frame),
    /// Reading the stream failed; nothing follows
    Failed(FeatureError),
    /// The stream is exhausted; nothing follows
    Finished,
}

/// Read frames from `source` into `sender` until the stream ends, the
/// stream fails or the receiver goes away.
///
/// With a `rate`, frame `n` is not sent before `n / rate` seconds have
/// elapsed since the producer started.
pub(crate) fn produce<S: AudioStream>(
    mut source: FeatureFrameSource<S>,
    sender: Sender<ProducerMessage>,
    rate: Option<f64>,
    sequence: Sequence,
) {
    let started = Instant::now();

    loop {
        let message = match source.has_next() {
            Ok(true) => match source.read_frame() {
                Ok(frame) => ProducerMessage::Frame(frame),
                Err(e) => ProducerMessage::Failed(e),
            },
            Ok(false) => ProducerMessage::Finished,
            Err(e) => ProducerMessage::Failed(e),
        };
        let last = !matches!(message, ProducerMessage::Frame(_));

        if let (Some(rate), false) = (rate, last) {
            let due = Duration::from_secs_f64(source.frames_read() as f64 / rate);
            let elapsed = started.elapsed();
            if due > elapsed {
                thread::sleep(due - elapsed);
            }
        }

        if sender.send(message).is_err() {
            debug!(%sequence, frames = source.frames_read(), "consumer gone, producer stopping");
            return;
        }
        if last {
            trace!(%sequence, frames = source.frames_read(), "producer done");
            return;
        }
    }
}

/// Consumer side of one producer queue
pub(crate) struct Feed {
    sequence: Sequence,
    receiver: Receiver<ProducerMessage>,
    frames: RingBuffer<Frame>,
    /// Frame received but not yet advanced onto
    lookahead: Option<Frame>,
    finished: bool,
}

impl Feed {
    pub fn new(sequence: Sequence, receiver: Receiver<ProducerMessage>, width: usize) -> Self {
        Self {
            sequence,
            receiver,
            frames: RingBuffer::new(width),
            lookahead: None,
            finished: false,
        }
    }

    /// Blocks until the producer sends a frame or finishes
    fn has_more(&mut self) -> Result<bool, AlignError> {
        if self.lookahead.is_some() {
            return Ok(true);
        }
        if self.finished {
            return Ok(false);
        }

        match self.receiver.recv() {
            Ok(ProducerMessage::Frame(frame)) => {
                self.lookahead = Some(frame);
                Ok(true)
            }
            Ok(ProducerMessage::Finished) => {
                debug!(sequence = %self.sequence, frames = self.frames.total_appended(), "sequence complete");
                self.finished = true;
                Ok(false)
            }
            Ok(ProducerMessage::Failed(source)) => Err(AlignError::ProducerFailed {
                sequence: self.sequence,
                source,
            }),
            Err(_) => Err(AlignError::ProducerDisconnected {
                sequence: self.sequence,
            }),
        }
    }

    fn advance(&mut self) -> Result<(), AlignError> {
        if !self.has_more()? {
            return Err(AlignError::ProducerFailed {
                sequence: self.sequence,
                source: FeatureError::EndOfStream,
            });
        }
        if let Some(frame) = self.lookahead.take() {
            self.frames.append(frame);
        }
        Ok(())
    }

    fn frame(&self, index: usize) -> Result<&Frame, AlignError> {
        self.frames
            .get_absolute(index)
            .map_err(|source| AlignError::FrameWindow {
                sequence: self.sequence,
                source,
            })
    }
}

/// Frames of both sequences as they arrive from their producers
pub(crate) struct StreamedFrames {
    a: Feed,
    b: Feed,
    expected_total: Option<usize>,
}

impl StreamedFrames {
    pub fn new(a: Feed, b: Feed, expected_total: Option<usize>) -> Self {
        Self {
            a,
            b,
            expected_total,
        }
    }

    fn feed(&mut self, sequence: Sequence) -> &mut Feed {
        match sequence {
            Sequence::A => &mut self.a,
            Sequence::B => &mut self.b,
        }
    }
}

impl FrameStore for StreamedFrames {
    fn has_more(&mut self, sequence: Sequence) -> Result<bool, AlignError> {
        self.feed(sequence).has_more()
    }

    fn advance(&mut self, sequence: Sequence) -> Result<(), AlignError> {
        self.feed(sequence).advance()
    }

    fn local_cost(&self, i: usize, j: usize) -> Result<f32, AlignError> {
        Ok(self.a.frame(i)?.distance(self.b.frame(j)?))
    }

    fn expected_total(&self) -> Option<usize> {
        self.expected_total
    }
}

/// Online alignment of two streams read concurrently
pub(crate) fn run_streaming<A, B>(
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
    let source_a = FeatureFrameSource::new(a, config.frames)?;
    let source_b = FeatureFrameSource::new(b, config.frames)?;
    let expected = source_a.expected_frames().zip(source_b.expected_frames());
    if let Some((len_a, len_b)) = expected {
        check_width("search width", config.search_width, len_a, len_b)?;
    }
    let expected_total = expected.map(|(len_a, len_b)| len_a + len_b);

    let width = config.search_width;
    let rate = config.producer_rate;
    let (tx_a, rx_a) = bounded(config.queue_capacity);
    let (tx_b, rx_b) = bounded(config.queue_capacity);
    debug!(
        width,
        queue_capacity = config.queue_capacity,
        ?rate,
        "starting frame producers"
    );

    thread::scope(|scope| {
        let producer_a = scope.spawn(move || produce(source_a, tx_a, rate, Sequence::A));
        let producer_b = scope.spawn(move || produce(source_b, tx_b, rate, Sequence::B));

        let store = StreamedFrames::new(
            Feed::new(Sequence::A, rx_a, width),
            Feed::new(Sequence::B, rx_b, width),
            expected_total,
        );
        // The engine owns the receivers; dropping it unblocks producers stuck on a full queue
        let result = OnlineWarp::new(store, width, config.diagonal_weight).run(control);

        for (sequence, handle) in [(Sequence::A, producer_a), (Sequence::B, producer_b)] {
            if handle.join().is_err() {
                warn!(%sequence, "frame producer panicked");
            }
        }
        result.map(|steps| WarpPath::new(steps, config.frames))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CancelToken, NoProgress, ProgressRecorder};
    use crate::ring::RingBufferError;
    use crate::testing::{delayed, noise, synthetic_frames};
    use syncwarp_analysis::{MemoryStream, StreamError, StreamProperties};

    /// Delivers `good` samples of noise, then fails or panics
    struct BrokenStream {
        samples: MemoryStream,
        panic: bool,
    }

    impl BrokenStream {
        fn new(good: usize, panic: bool) -> Self {
            Self {
                samples: MemoryStream::new(noise(good, 3), 44100),
                panic,
            }
        }
    }

    impl AudioStream for BrokenStream {
        fn properties(&self) -> StreamProperties {
            StreamProperties::mono_f32(44100)
        }

        fn position(&self) -> u64 {
            self.samples.position()
        }

        fn read(&mut self, buffer: &mut [f32]) -> Result<usize, StreamError> {
            match self.samples.read(buffer)? {
                0 if self.panic => panic!("decoder crashed"),
                0 => Err(StreamError::Decode("corrupt packet".into())),
                read => Ok(read),
            }
        }
    }

    fn streaming(
        a: impl AudioStream + Send,
        b: impl AudioStream + Send,
        config: &AlignConfig,
        progress: &dyn crate::ProgressSink,
    ) -> Result<WarpPath, AlignError> {
        let cancel = CancelToken::new();
        run_streaming(a, b, config, RunControl { progress, cancel: &cancel })
    }

    #[test]
    fn test_feed_reports_eviction() {
        let (tx, rx) = bounded(16);
        for frame in synthetic_frames(5, 1) {
            tx.send(ProducerMessage::Frame(frame)).unwrap();
        }
        tx.send(ProducerMessage::Finished).unwrap();

        let mut feed = Feed::new(Sequence::A, rx, 3);
        while feed.has_more().unwrap() {
            feed.advance().unwrap();
        }
        assert!(feed.frame(4).is_ok());
        assert!(feed.frame(2).is_ok());
        assert!(matches!(
            feed.frame(1),
            Err(AlignError::FrameWindow {
                sequence: Sequence::A,
                source: RingBufferError::Evicted { index: 1, oldest: 2 },
            })
        ));
    }

    #[test]
    fn test_feed_distinguishes_finished_from_disconnected() {
        let (tx, rx) = bounded(4);
        tx.send(ProducerMessage::Finished).unwrap();
        let mut feed = Feed::new(Sequence::A, rx, 2);
        assert!(!feed.has_more().unwrap());
        assert!(!feed.has_more().unwrap(), "Finished is sticky");

        let (tx, rx) = bounded::<ProducerMessage>(4);
        drop(tx);
        let mut feed = Feed::new(Sequence::B, rx, 2);
        assert!(matches!(
            feed.has_more(),
            Err(AlignError::ProducerDisconnected { sequence: Sequence::B })
        ));
    }

    #[test]
    fn test_producer_stops_when_consumer_leaves() {
        let source = FeatureFrameSource::new(
            MemoryStream::new(noise(44100, 1), 44100),
            Default::default(),
        )
        .unwrap();
        let (tx, rx) = bounded(2);
        let handle = thread::spawn(move || produce(source, tx, None, Sequence::A));

        assert!(matches!(rx.recv().unwrap(), ProducerMessage::Frame(_)));
        drop(rx);
        handle.join().expect("Producer should exit once the receiver is dropped");
    }

    #[test]
    fn test_rate_limited_producer_paces_frames() {
        let source = FeatureFrameSource::new(
            MemoryStream::new(noise(882 * 10, 1), 44100),
            Default::default(),
        )
        .unwrap();
        let (tx, rx) = bounded(16);
        let started = Instant::now();
        produce(source, tx, Some(200.0), Sequence::A);

        let frames = rx
            .try_iter()
            .filter(|m| matches!(m, ProducerMessage::Frame(_)))
            .count();
        assert_eq!(frames, 10);
        assert!(
            started.elapsed() >= Duration::from_millis(50),
            "10 frames at 200/s should take at least 50ms, took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn test_silent_streams_reach_the_corner() {
        let config = AlignConfig {
            search_width: 20,
            queue_capacity: 8,
            ..Default::default()
        };
        let path = streaming(
            MemoryStream::new(vec![0.0; 882 * 120], 44100),
            MemoryStream::new(vec![0.0; 882 * 120], 44100),
            &config,
            &NoProgress,
        )
        .unwrap();

        assert!(path.is_monotonic());
        assert_eq!(path.first(), Some((0, 0)));
        assert_eq!(path.last(), Some((119, 119)));
    }

    #[test]
    fn test_unequal_lengths_reach_both_ends() {
        let config = AlignConfig {
            search_width: 30,
            ..Default::default()
        };
        let path = streaming(
            MemoryStream::new(noise(882 * 150, 4), 44100),
            MemoryStream::new(noise(882 * 90, 5), 44100),
            &config,
            &NoProgress,
        )
        .unwrap();

        assert!(path.is_monotonic());
        assert_eq!(path.last(), Some((149, 89)));
    }

    #[test]
    fn test_delayed_copy_tracks_offset() {
        let samples = noise(44100 * 20, 5);
        let b = delayed(&samples, 1.0);
        let config = AlignConfig {
            search_width: 150,
            queue_capacity: 32,
            ..Default::default()
        };
        let recorder = ProgressRecorder::new();

        let path = streaming(
            MemoryStream::new(samples, 44100),
            MemoryStream::new(b, 44100),
            &config,
            &recorder,
        )
        .unwrap();

        assert!(path.is_monotonic());
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
    fn test_producer_failure_terminates_run() {
        let result = streaming(
            MemoryStream::new(noise(44100, 1), 44100),
            BrokenStream::new(882 * 40, false),
            &AlignConfig {
                search_width: 10,
                ..Default::default()
            },
            &NoProgress,
        );
        assert!(matches!(
            result,
            Err(AlignError::ProducerFailed {
                sequence: Sequence::B,
                source: FeatureError::Stream(_),
            })
        ));
    }

    #[test]
    fn test_producer_panic_is_disconnect() {
        let result = streaming(
            BrokenStream::new(882 * 40, true),
            MemoryStream::new(noise(44100, 1), 44100),
            &AlignConfig {
                search_width: 10,
                ..Default::default()
            },
            &NoProgress,
        );
        assert!(matches!(
            result,
            Err(AlignError::ProducerDisconnected { sequence: Sequence::A })
        ));
    }

    #[test]
    fn test_cancelled_run_joins_producers() {
        let cancel = CancelToken::new();
        cancel.cancel();
        // Long streams with a tiny queue: producers block until the receivers drop
        let result = run_streaming(
            MemoryStream::new(noise(44100 * 5, 1), 44100),
            MemoryStream::new(noise(44100 * 5, 2), 44100),
            &AlignConfig {
                search_width: 50,
                queue_capacity: 1,
                ..Default::default()
            },
            RunControl {
                progress: &NoProgress,
                cancel: &cancel,
            },
        );
        assert!(matches!(result, Err(AlignError::Cancelled)));
    }

    #[test]
    fn test_zero_width_rejected() {
        let result = streaming(
            MemoryStream::new(noise(1000, 1), 44100),
            MemoryStream::new(noise(1000, 2), 44100),
            &AlignConfig {
                search_width: 0,
                ..Default::default()
            },
            &NoProgress,
        );
        assert!(matches!(result, Err(AlignError::InvalidConfig(_))));
    }

    #[test]
    fn test_width_larger_than_data_is_config_error() {
        let result = streaming(
            MemoryStream::new(noise(44100, 1), 44100),
            MemoryStream::new(noise(44100, 2), 44100),
            &AlignConfig {
                search_width: 5000,
                ..Default::default()
            },
            &NoProgress,
        );
        assert!(matches!(result, Err(AlignError::InvalidConfig(_))));
    }
}
