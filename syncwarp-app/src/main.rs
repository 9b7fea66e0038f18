//! syncwarp - align two recordings of the same event
//!
//! Decodes both files, computes a warping path between them and prints the
//! corresponding (time in A, time in B) pairs as tab-separated seconds.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, bail, Context};
use parking_lot::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use syncwarp_align::{AlignConfig, AlignMode, Aligner, ProgressSink};
use syncwarp_library::{AlignmentCache, AlignmentKey, FileIdentity, Settings, TrackLoader};

const USAGE: &str = "usage: syncwarp <file-a> <file-b> [--mode offline|streaming|buffered] \
[--max-offset SECS] [--width FRAMES] [--no-cache]";

/// Parsed command line, with unset options taken from the settings file
#[derive(Debug, Clone, PartialEq)]
struct Args {
    file_a: PathBuf,
    file_b: PathBuf,
    mode: AlignMode,
    max_offset_secs: f64,
    search_width: usize,
    use_cache: bool,
}

impl Args {
    fn parse<I: IntoIterator<Item = String>>(args: I, settings: &Settings) -> anyhow::Result<Self> {
        let mut files = Vec::new();
        let mut mode = settings.mode.parse::<AlignMode>().unwrap_or_else(|e| {
            warn!("{}, using offline", e);
            AlignMode::Offline
        });
        let mut max_offset_secs = settings.max_offset_secs;
        let mut search_width = settings.search_width;
        let mut use_cache = settings.use_cache;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--mode" => {
                    let value = args.next().ok_or_else(|| anyhow!("--mode needs a value"))?;
                    mode = value.parse().map_err(|e: String| anyhow!(e))?;
                }
                "--max-offset" => {
                    let value = args.next().ok_or_else(|| anyhow!("--max-offset needs a value"))?;
                    max_offset_secs = value
                        .parse()
                        .with_context(|| format!("invalid max offset '{}'", value))?;
                }
                "--width" => {
                    let value = args.next().ok_or_else(|| anyhow!("--width needs a value"))?;
                    search_width = value
                        .parse()
                        .with_context(|| format!("invalid width '{}'", value))?;
                }
                "--no-cache" => use_cache = false,
                "-h" | "--help" => bail!(USAGE),
                flag if flag.starts_with("--") => bail!("unknown option {}\n{}", flag, USAGE),
                _ => files.push(PathBuf::from(arg)),
            }
        }

        let [file_a, file_b]: [PathBuf; 2] = files
            .try_into()
            .map_err(|_| anyhow!("expected exactly two files\n{}", USAGE))?;

        Ok(Self {
            file_a,
            file_b,
            mode,
            max_offset_secs,
            search_width,
            use_cache,
        })
    }

    /// Parameters that change the result of the chosen mode
    fn cache_params(&self) -> String {
        match self.mode {
            AlignMode::Offline => format!("max_offset={}", self.max_offset_secs),
            AlignMode::Streaming | AlignMode::Buffered => format!("width={}", self.search_width),
        }
    }
}

/// Logs alignment progress every ten percent
#[derive(Default)]
struct LogProgress {
    last_logged: Mutex<u32>,
    started: Mutex<Option<Instant>>,
}

impl ProgressSink for LogProgress {
    fn report(&self, percent: f64) {
        let started = *self.started.lock().get_or_insert_with(Instant::now);
        let decile = (percent / 10.0).floor() as u32;
        let mut last = self.last_logged.lock();
        if decile > *last {
            *last = decile;
            info!(
                "aligning: {:.0}% ({:.1}s)",
                percent,
                started.elapsed().as_secs_f64()
            );
        }
    }

    fn finished(&self) {
        info!("alignment complete");
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::load();
    let args = Args::parse(std::env::args().skip(1), &settings)?;

    let cache = if args.use_cache {
        match AlignmentCache::open(&AlignmentCache::default_path()) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!("alignment cache unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };

    let key = AlignmentKey {
        a: FileIdentity::of(&args.file_a)
            .with_context(|| format!("cannot read {}", args.file_a.display()))?,
        b: FileIdentity::of(&args.file_b)
            .with_context(|| format!("cannot read {}", args.file_b.display()))?,
        mode: args.mode.as_str().to_string(),
        params: args.cache_params(),
    };

    if let Some(cache) = &cache {
        if let Some(cached) = cache.get(&key)? {
            info!(pairs = cached.pairs.len(), "using cached alignment");
            print_pairs(&cached.pairs);
            return Ok(());
        }
    }

    let pairs = align(&args, &settings)?;

    if let Some(cache) = &cache {
        if let Err(e) = cache.store(&key, &pairs) {
            warn!("failed to cache alignment: {}", e);
        }
    }
    print_pairs(&pairs);
    Ok(())
}

fn align(args: &Args, settings: &Settings) -> anyhow::Result<Vec<(f64, f64)>> {
    let loader = TrackLoader::new();

    // Decode both files at once
    let (track_a, track_b) = thread::scope(|scope| {
        let handle = scope.spawn(|| loader.load(&args.file_b));
        let track_a = loader.load(&args.file_a);
        let track_b = handle
            .join()
            .map_err(|_| anyhow!("decoder thread panicked"))?;
        anyhow::Ok((
            track_a.with_context(|| format!("failed to load {}", args.file_a.display()))?,
            track_b.with_context(|| format!("failed to load {}", args.file_b.display()))?,
        ))
    })?;

    info!(
        a = %track_a.metadata.title,
        a_secs = track_a.metadata.duration_secs,
        b = %track_b.metadata.title,
        b_secs = track_b.metadata.duration_secs,
        mode = args.mode.as_str(),
        "recordings loaded"
    );

    let config = AlignConfig {
        max_offset_secs: args.max_offset_secs,
        search_width: args.search_width,
        queue_capacity: settings.queue_capacity,
        producer_rate: settings.producer_rate,
        ..Default::default()
    };
    let aligner = Aligner::new(config).with_progress(Arc::new(LogProgress::default()));
    let path = aligner.align(args.mode, track_a.into_stream(), track_b.into_stream())?;

    let pairs: Vec<(f64, f64)> = path
        .time_pairs()
        .iter()
        .map(|p| (p.time_a, p.time_b))
        .collect();

    if let Some(offset) = median_offset(&pairs) {
        info!(steps = path.len(), "median offset A - B: {:.3}s", offset);
    }
    Ok(pairs)
}

fn median_offset(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.is_empty() {
        return None;
    }
    let mut offsets: Vec<f64> = pairs.iter().map(|(a, b)| a - b).collect();
    offsets.sort_by(|x, y| x.total_cmp(y));
    Some(offsets[offsets.len() / 2])
}

fn print_pairs(pairs: &[(f64, f64)]) {
    for (time_a, time_b) in pairs {
        println!("{:.3}\t{:.3}", time_a, time_b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_uses_settings_defaults() {
        let settings = Settings {
            mode: "buffered".to_string(),
            search_width: 80,
            ..Default::default()
        };
        let parsed = Args::parse(args(&["a.wav", "b.flac"]), &settings).unwrap();
        assert_eq!(parsed.file_a, PathBuf::from("a.wav"));
        assert_eq!(parsed.file_b, PathBuf::from("b.flac"));
        assert_eq!(parsed.mode, AlignMode::Buffered);
        assert_eq!(parsed.search_width, 80);
        assert!(parsed.use_cache);
    }

    #[test]
    fn test_parse_flags_override_settings() {
        let parsed = Args::parse(
            args(&["--mode", "streaming", "a.wav", "--width", "200", "b.wav", "--no-cache"]),
            &Settings::default(),
        )
        .unwrap();
        assert_eq!(parsed.mode, AlignMode::Streaming);
        assert_eq!(parsed.search_width, 200);
        assert!(!parsed.use_cache);
        assert_eq!(parsed.cache_params(), "width=200");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        let settings = Settings::default();
        assert!(Args::parse(args(&["only-one.wav"]), &settings).is_err());
        assert!(Args::parse(args(&["a", "b", "c"]), &settings).is_err());
        assert!(Args::parse(args(&["a", "b", "--max-offset", "soon"]), &settings).is_err());
        assert!(Args::parse(args(&["a", "b", "--mode", "fast"]), &settings).is_err());
        assert!(Args::parse(args(&["a", "b", "--verbose"]), &settings).is_err());
    }

    #[test]
    fn test_median_offset() {
        assert_eq!(median_offset(&[]), None);
        let pairs = [(0.0, 2.0), (1.0, 3.0), (5.0, 5.5)];
        assert_eq!(median_offset(&pairs), Some(-2.0));
    }
}
