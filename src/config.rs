use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::app_dirs::AppDirs;
use crate::error::{Error, Result};
use crate::gaze::{GazeConfig, GazeStateClassifier, OpennessConfig};
use crate::reversal::{ReversalAnalyzer, ReversalConfig};
use crate::time_series::BucketConfig;

/// Every tunable constant of the analysis, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AnalysisConfig {
    pub gaze: GazeConfig,
    pub openness: OpennessConfig,
    pub strokes: ReversalConfig,
    pub buckets: BucketConfig,
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{name} must be a finite non-negative number, got {value}"
        )))
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        non_negative("gaze.saccade_threshold", self.gaze.saccade_threshold)?;
        non_negative("gaze.fixation_threshold", self.gaze.fixation_threshold)?;
        non_negative("openness.blink_threshold", self.openness.blink_threshold)?;
        non_negative("strokes.jitter_threshold", self.strokes.jitter_threshold)?;

        if self.gaze.blink_rate_window == 0 {
            return Err(Error::InvalidConfig(
                "gaze.blink_rate_window must be at least 1 frame".into(),
            ));
        }
        if !(self.openness.aspect_ratio_scale.is_finite() && self.openness.aspect_ratio_scale > 0.0)
        {
            return Err(Error::InvalidConfig(format!(
                "openness.aspect_ratio_scale must be positive, got {}",
                self.openness.aspect_ratio_scale
            )));
        }
        if !(self.buckets.width_sec.is_finite() && self.buckets.width_sec > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "buckets.width_sec must be positive, got {}",
                self.buckets.width_sec
            )));
        }

        if self.gaze.fixation_threshold >= self.gaze.saccade_threshold {
            warn!(
                fixation = self.gaze.fixation_threshold,
                saccade = self.gaze.saccade_threshold,
                "fixation threshold is not below saccade threshold; frames may be both"
            );
        }
        Ok(())
    }

    pub fn gaze_classifier(&self) -> GazeStateClassifier {
        GazeStateClassifier::new(self.gaze.clone(), self.openness.clone())
    }

    pub fn reversal_analyzer(&self) -> ReversalAnalyzer {
        ReversalAnalyzer::new(self.strokes.clone())
    }
}

pub trait ConfigStore {
    fn load(&self) -> AnalysisConfig;
    fn save(&self, cfg: &AnalysisConfig) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("kinetrace_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> AnalysisConfig {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<AnalysisConfig>(&bytes) {
                Ok(cfg) => return cfg,
                Err(e) => warn!(path = %self.path.display(), "ignoring malformed config: {e}"),
            },
            Err(e) => debug!(path = %self.path.display(), "no config file: {e}"),
        }
        AnalysisConfig::default()
    }

    fn save(&self, cfg: &AnalysisConfig) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).unwrap_or_default();
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_series::Metric;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = AnalysisConfig::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = AnalysisConfig {
            gaze: GazeConfig {
                saccade_threshold: 0.05,
                fixation_threshold: 0.001,
                blink_rate_window: 60,
            },
            openness: OpennessConfig {
                aspect_ratio_scale: 0.25,
                blink_threshold: 0.15,
            },
            strokes: ReversalConfig {
                jitter_threshold: 2.5,
            },
            buckets: BucketConfig {
                width_sec: 0.5,
                metrics: vec![Metric::VelocityX],
            },
        };
        store.save(&cfg).unwrap();
        assert_eq!(cfg, store.load());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"gaze": {"saccade_threshold": 0.02}}"#).unwrap();

        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.gaze.saccade_threshold, 0.02);
        assert_eq!(cfg.gaze.fixation_threshold, 0.002);
        assert_eq!(cfg.buckets, BucketConfig::default());
    }

    #[test]
    fn missing_or_malformed_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let missing = FileConfigStore::with_path(dir.path().join("absent.json"));
        assert_eq!(missing.load(), AnalysisConfig::default());

        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(FileConfigStore::with_path(&path).load(), AnalysisConfig::default());
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(AnalysisConfig::default().validate().is_ok());

        let mut cfg = AnalysisConfig::default();
        cfg.gaze.blink_rate_window = 0;
        assert_matches!(cfg.validate(), Err(Error::InvalidConfig(_)));

        let mut cfg = AnalysisConfig::default();
        cfg.buckets.width_sec = 0.0;
        assert_matches!(cfg.validate(), Err(Error::InvalidConfig(_)));

        let mut cfg = AnalysisConfig::default();
        cfg.strokes.jitter_threshold = f64::NAN;
        assert_matches!(cfg.validate(), Err(Error::InvalidConfig(_)));
    }

    #[test]
    fn overlapping_thresholds_only_warn() {
        let mut cfg = AnalysisConfig::default();
        cfg.gaze.fixation_threshold = 0.5;
        assert!(cfg.validate().is_ok());
    }
}
