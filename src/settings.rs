use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::effect::{clamp_threshold, DEFAULT_MAX_SEARCH_STEPS, DEFAULT_THRESHOLD};
use crate::errors::{HarnessError, Result};

/// Upper bound of the search distance accepted on the command line.
pub const MAX_LAUNCH_SEARCH_STEPS: i32 = 16;

/// Environment variable naming an optional JSON configuration file.
pub const CONFIG_ENV_VAR: &str = "SMAA_HARNESS_CONFIG";

/// Positional launch parameters: `[distance] [threshold] [source] [destination]`.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "smaa-harness", version, about = "Interactive morphological antialiasing harness")]
#[command(allow_negative_numbers = true)]
pub struct LaunchOptions {
    /// Maximum edge search distance, clamped to 0..=16
    pub distance: Option<i32>,

    /// Edge detection threshold, clamped to 0.0..=0.5
    pub threshold: Option<f32>,

    /// Source image, appended to the catalog and selected
    pub source: Option<PathBuf>,

    /// Render one frame, save it here as PNG and exit
    pub destination: Option<PathBuf>,
}

impl LaunchOptions {
    pub fn max_search_steps(&self) -> u32 {
        self.distance
            .map(|d| d.clamp(0, MAX_LAUNCH_SEARCH_STEPS) as u32)
            .unwrap_or(DEFAULT_MAX_SEARCH_STEPS)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold.map(clamp_threshold).unwrap_or(DEFAULT_THRESHOLD)
    }

    pub fn is_batch(&self) -> bool {
        self.destination.is_some()
    }
}

/// Read-only harness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// How many times a profiled effect run is repeated per sample.
    pub repetitions: u32,
    pub benchmark_path: PathBuf,
    pub images_dir: PathBuf,
    pub image_extension: String,
    pub depth_extension: String,
    pub window_width: u32,
    pub window_height: u32,
    pub vsync: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            repetitions: crate::profiler::DEFAULT_REPETITIONS,
            benchmark_path: PathBuf::from(crate::benchmark::DEFAULT_OUTPUT),
            images_dir: PathBuf::from("Images"),
            image_extension: "png".to_string(),
            depth_extension: crate::image_loader::DEFAULT_DEPTH_EXTENSION.to_string(),
            window_width: 1280,
            window_height: 720,
            vsync: false,
        }
    }
}

impl HarnessConfig {
    /// Loads the file named by `SMAA_HARNESS_CONFIG`, or defaults when unset.
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HarnessError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| HarnessError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if let Ok(json) = serde_json::to_string(&config) {
            tracing::debug!(path = %path.display(), "config: {}", json);
        }
        Ok(config)
    }
}
