use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEFAULT_ARTIFACT_PATH: &str = "calibration.bin";
const DEFAULT_REFERENCE_LENGTH: f64 = 1.0;
const DEFAULT_DISTANCE_THRESHOLD: f64 = 6.0;
const DEFAULT_MAX_DURATION_SECS: u64 = 30;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_OVERLAP_THRESHOLD: f32 = 0.45;
const DEFAULT_TIMING_LOG_PATH: &str = "protagonist.csv";
const DEFAULT_DETECTOR_BACKEND: &str = "stub";
const DEFAULT_MODEL_PATH: &str = "yolov5s.onnx";
const DEFAULT_MODEL_INPUT: u32 = 640;

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    calibration: Option<CalibrationConfigFile>,
    social_distancing: Option<SocialDistancingConfigFile>,
    runtime: Option<RuntimeConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CalibrationConfigFile {
    pkl_file_path: Option<PathBuf>,
    reference_length: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct SocialDistancingConfigFile {
    distance_threshold_ft: Option<f64>,
    measure_in_top_view: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct RuntimeConfigFile {
    max_duration_secs: Option<u64>,
    confidence_threshold: Option<f32>,
    overlap_threshold: Option<f32>,
    timing_log_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    person_class: Option<usize>,
}

/// Program configuration, built once at startup and passed by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub calibration: CalibrationSettings,
    pub social_distancing: SocialDistancingSettings,
    pub runtime: RuntimeSettings,
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSettings {
    /// Where the calibration artifact is written and read.
    pub artifact_path: PathBuf,
    /// Real-world length of one scale-sample segment.
    pub reference_length: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SocialDistancingSettings {
    /// Pairs strictly closer than this (real-world units) are violations.
    pub distance_threshold: f64,
    /// Project ground points into the top view before measuring.
    pub measure_in_top_view: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub max_duration: Duration,
    pub confidence_threshold: f32,
    pub overlap_threshold: f32,
    pub timing_log_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
    pub person_class: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_DETECTOR_BACKEND.to_string(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_width: DEFAULT_MODEL_INPUT,
            input_height: DEFAULT_MODEL_INPUT,
            person_class: 0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_file(ConfigFile::default())
    }
}

impl Config {
    /// Load configuration.
    ///
    /// The file is `path` if given, else `$SOCIAL_DISTANCING_CONFIG`, else
    /// `./config.toml` when it exists; otherwise defaults are used. Environment
    /// overrides are applied on top, then the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("SOCIAL_DISTANCING_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let file_cfg = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => read_config_file(&path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    read_config_file(default)?
                } else {
                    ConfigFile::default()
                }
            }
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate a TOML document, without consulting the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(raw).map_err(|e| Error::Config(format!("invalid config: {}", e)))?;
        let cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> Self {
        let calibration = CalibrationSettings {
            artifact_path: file
                .calibration
                .as_ref()
                .and_then(|c| c.pkl_file_path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_PATH)),
            reference_length: file
                .calibration
                .as_ref()
                .and_then(|c| c.reference_length)
                .unwrap_or(DEFAULT_REFERENCE_LENGTH),
        };
        let social_distancing = SocialDistancingSettings {
            distance_threshold: file
                .social_distancing
                .as_ref()
                .and_then(|s| s.distance_threshold_ft)
                .unwrap_or(DEFAULT_DISTANCE_THRESHOLD),
            measure_in_top_view: file
                .social_distancing
                .as_ref()
                .and_then(|s| s.measure_in_top_view)
                .unwrap_or(false),
        };
        let runtime = RuntimeSettings {
            max_duration: Duration::from_secs(
                file.runtime
                    .as_ref()
                    .and_then(|r| r.max_duration_secs)
                    .unwrap_or(DEFAULT_MAX_DURATION_SECS),
            ),
            confidence_threshold: file
                .runtime
                .as_ref()
                .and_then(|r| r.confidence_threshold)
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            overlap_threshold: file
                .runtime
                .as_ref()
                .and_then(|r| r.overlap_threshold)
                .unwrap_or(DEFAULT_OVERLAP_THRESHOLD),
            timing_log_path: file
                .runtime
                .and_then(|r| r.timing_log_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TIMING_LOG_PATH)),
        };
        let defaults = DetectorSettings::default();
        let detector = match file.detector {
            Some(d) => DetectorSettings {
                backend: d.backend.unwrap_or(defaults.backend),
                model_path: d.model_path.unwrap_or(defaults.model_path),
                input_width: d.input_width.unwrap_or(defaults.input_width),
                input_height: d.input_height.unwrap_or(defaults.input_height),
                person_class: d.person_class.unwrap_or(defaults.person_class),
            },
            None => defaults,
        };
        Self {
            calibration,
            social_distancing,
            runtime,
            detector,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("SOCIAL_DISTANCING_CALIBRATION_FILE") {
            if !path.trim().is_empty() {
                self.calibration.artifact_path = PathBuf::from(path);
            }
        }
        if let Ok(threshold) = std::env::var("SOCIAL_DISTANCING_THRESHOLD") {
            self.social_distancing.distance_threshold = threshold.trim().parse().map_err(|_| {
                Error::Config("SOCIAL_DISTANCING_THRESHOLD must be a number".to_string())
            })?;
        }
        if let Ok(secs) = std::env::var("SOCIAL_DISTANCING_MAX_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                Error::Config(
                    "SOCIAL_DISTANCING_MAX_SECS must be an integer number of seconds".to_string(),
                )
            })?;
            self.runtime.max_duration = Duration::from_secs(secs);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let threshold = self.social_distancing.distance_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(Error::Config(format!(
                "distance_threshold_ft must be positive, got {}",
                threshold
            )));
        }
        let length = self.calibration.reference_length;
        if !length.is_finite() || length <= 0.0 {
            return Err(Error::Config(format!(
                "reference_length must be positive, got {}",
                length
            )));
        }
        if self.runtime.max_duration.is_zero() {
            return Err(Error::Config(
                "max_duration_secs must be greater than zero".to_string(),
            ));
        }
        for (name, value) in [
            ("confidence_threshold", self.runtime.confidence_threshold),
            ("overlap_threshold", self.runtime.overlap_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(Error::Config(
                "detector input dimensions must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    toml::from_str(&raw)
        .map_err(|e| Error::Config(format!("invalid config file {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.runtime.max_duration, Duration::from_secs(30));
        assert_eq!(cfg.runtime.confidence_threshold, 0.5);
        assert_eq!(cfg.runtime.overlap_threshold, 0.45);
        assert!(!cfg.social_distancing.measure_in_top_view);
    }

    #[test]
    fn partial_file_keeps_other_defaults() -> Result<()> {
        let cfg = Config::from_toml_str(
            r#"
            [social_distancing]
            distance_threshold_ft = 4.5
            "#,
        )?;
        assert_eq!(cfg.social_distancing.distance_threshold, 4.5);
        assert_eq!(
            cfg.calibration.artifact_path,
            PathBuf::from(DEFAULT_ARTIFACT_PATH)
        );
        assert_eq!(cfg.detector.backend, "stub");
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Config::from_toml_str("[social_distancing]\ndistance_threshold_ft = 0.0").is_err());
        assert!(Config::from_toml_str("[runtime]\nconfidence_threshold = 1.5").is_err());
        assert!(Config::from_toml_str("[runtime]\nmax_duration_secs = 0").is_err());
        assert!(Config::from_toml_str("[runtime\n").is_err());
    }
}
