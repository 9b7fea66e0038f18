//! Settings persistence for syncwarp
//!
//! Stores default alignment parameters as `key=value` lines.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

/// User defaults for alignment runs
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Strategy name: offline, streaming or buffered
    pub mode: String,
    /// Largest offset the offline band covers, in seconds
    pub max_offset_secs: f64,
    /// Lookback of the online aligners, in frames
    pub search_width: usize,
    /// Frames each producer queue holds
    pub queue_capacity: usize,
    /// Frames per second each producer may emit, unlimited when None
    pub producer_rate: Option<f64>,
    /// Whether results are stored in and read from the alignment cache
    pub use_cache: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: "offline".to_string(),
            max_offset_secs: 10.0,
            search_width: 500,
            queue_capacity: 256,
            producer_rate: None,
            use_cache: true,
        }
    }
}

impl Settings {
    /// Load settings from the default location
    ///
    /// Returns defaults if the file doesn't exist or can't be read.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path()).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    pub fn save(&self) -> io::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize())
    }

    /// Get the default settings file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("syncwarp")
            .join("settings.txt")
    }

    /// Parse `key=value` lines; unknown keys are ignored and malformed
    /// values keep their defaults
    fn parse(content: &str) -> Self {
        let mut settings = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "mode" => {
                    if !value.is_empty() {
                        settings.mode = value.to_ascii_lowercase();
                    }
                }
                "max_offset" => parse_into(key, value, &mut settings.max_offset_secs),
                "search_width" => parse_into(key, value, &mut settings.search_width),
                "queue_capacity" => parse_into(key, value, &mut settings.queue_capacity),
                "producer_rate" => {
                    if value.is_empty() || value == "unlimited" {
                        settings.producer_rate = None;
                    } else {
                        let mut rate = 0.0;
                        parse_into(key, value, &mut rate);
                        if rate > 0.0 {
                            settings.producer_rate = Some(rate);
                        }
                    }
                }
                "cache" => parse_into(key, value, &mut settings.use_cache),
                _ => {} // Ignore unknown keys
            }
        }

        settings
    }

    fn serialize(&self) -> String {
        let mut lines = vec![
            "# syncwarp settings".to_string(),
            format!("mode={}", self.mode),
            format!("max_offset={}", self.max_offset_secs),
            format!("search_width={}", self.search_width),
            format!("queue_capacity={}", self.queue_capacity),
        ];
        match self.producer_rate {
            Some(rate) => lines.push(format!("producer_rate={}", rate)),
            None => lines.push("producer_rate=unlimited".to_string()),
        }
        lines.push(format!("cache={}", self.use_cache));
        lines.join("\n")
    }
}

fn parse_into<T: FromStr>(key: &str, value: &str, slot: &mut T) {
    match value.parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value, "ignoring malformed setting"),
    }
}
