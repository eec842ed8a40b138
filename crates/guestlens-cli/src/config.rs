use anyhow::{Context, Result};
use guestlens_core::detector::DetectOptions;
use guestlens_core::matcher::Sensitivity;
use guestlens_core::normalize::{HeifConvertTool, DEFAULT_HEIF_CONVERT, DEFAULT_JPEG_QUALITY};
use guestlens_core::settings::PipelineSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI configuration: an optional TOML file, overridden by `GUESTLENS_*`
/// environment variables, overridden by command-line flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory containing the four ONNX model files.
    pub model_dir: PathBuf,
    /// Default sensitivity when `--sensitivity` is not given.
    pub sensitivity: Sensitivity,
    pub pipeline: PipelineSettings,
    /// `heif-convert` executable used for HEIC uploads.
    pub heif_convert: PathBuf,
    /// JPEG quality of converted HEIC uploads, 0-100.
    pub heif_quality: u8,
    pub fetch_timeout_secs: u64,
}

/// On-disk form; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    model_dir: Option<PathBuf>,
    sensitivity: Option<f32>,
    heif_convert: Option<PathBuf>,
    heif_quality: Option<u8>,
    fetch_timeout_secs: Option<u64>,
    pipeline: Option<PipelineSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: guestlens_core::default_model_dir(),
            sensitivity: Sensitivity::default(),
            pipeline: PipelineSettings::default(),
            heif_convert: PathBuf::from(DEFAULT_HEIF_CONVERT),
            heif_quality: DEFAULT_JPEG_QUALITY,
            fetch_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from `GUESTLENS_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Load `path`, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let base = Self::from_toml(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(base.with_env(|key| std::env::var(key).ok()))
    }

    /// The HEIC converter described by this configuration.
    pub fn heif_converter(&self) -> HeifConvertTool {
        HeifConvertTool::new(&self.heif_convert).with_quality(self.heif_quality)
    }

    fn from_toml(content: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(content)?;
        let mut config = Self::default();
        if let Some(dir) = file.model_dir {
            config.model_dir = dir;
        }
        if let Some(s) = file.sensitivity {
            config.sensitivity = Sensitivity::new(s);
        }
        if let Some(program) = file.heif_convert {
            config.heif_convert = program;
        }
        if let Some(quality) = file.heif_quality {
            config.heif_quality = quality;
        }
        if let Some(secs) = file.fetch_timeout_secs {
            config.fetch_timeout_secs = secs;
        }
        if let Some(pipeline) = file.pipeline {
            config.pipeline = pipeline;
        }
        Ok(config)
    }

    fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| var(key).and_then(|v| v.trim().parse::<f32>().ok());

        if let Some(dir) = var("GUESTLENS_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(s) = parsed("GUESTLENS_SENSITIVITY") {
            self.sensitivity = Sensitivity::new(s);
        }
        if let Some(margin) = parsed("GUESTLENS_MATCH_MARGIN") {
            self.pipeline.match_margin = margin;
        }
        if let Some(bound) = parsed("GUESTLENS_DEDUP_DISTANCE") {
            self.pipeline.dedup_distance = bound;
        }
        if let Some(size) = var("GUESTLENS_FAST_INPUT_SIZE").and_then(|v| v.trim().parse().ok()) {
            self.pipeline.fast_detect = DetectOptions::new(size, self.pipeline.fast_detect.min_confidence);
        }
        if let Some(conf) = parsed("GUESTLENS_MIN_CONFIDENCE") {
            self.pipeline.fast_detect.min_confidence = conf;
            self.pipeline.accurate_detect.min_confidence = conf;
        }
        if let Some(program) = var("GUESTLENS_HEIF_CONVERT") {
            self.heif_convert = PathBuf::from(program);
        }
        if let Some(quality) = var("GUESTLENS_HEIF_QUALITY").and_then(|v| v.trim().parse().ok()) {
            self.heif_quality = quality;
        }
        if let Some(secs) = var("GUESTLENS_FETCH_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            self.fetch_timeout_secs = secs;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default().with_env(env(&[
            ("GUESTLENS_MODEL_DIR", "/opt/models"),
            ("GUESTLENS_SENSITIVITY", "0.45"),
            ("GUESTLENS_MATCH_MARGIN", "0.02"),
            ("GUESTLENS_FAST_INPUT_SIZE", "640"),
            ("GUESTLENS_MIN_CONFIDENCE", "0.35"),
            ("GUESTLENS_FETCH_TIMEOUT_SECS", "5"),
            ("GUESTLENS_HEIF_QUALITY", "80"),
        ]));
        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
        assert!((config.sensitivity.value() - 0.45).abs() < 1e-6);
        assert!((config.pipeline.match_margin - 0.02).abs() < 1e-6);
        assert_eq!(config.pipeline.fast_detect.input_size, 640);
        assert!((config.pipeline.accurate_detect.min_confidence - 0.35).abs() < 1e-6);
        assert_eq!(config.fetch_timeout_secs, 5);
        assert_eq!(config.heif_quality, 80);
    }

    #[test]
    fn test_env_sensitivity_clamped_and_garbage_ignored() {
        let config = Config::default().with_env(env(&[
            ("GUESTLENS_SENSITIVITY", "2.0"),
            ("GUESTLENS_DEDUP_DISTANCE", "lots"),
        ]));
        assert!((config.sensitivity.value() - 0.70).abs() < 1e-6);
        assert!((config.pipeline.dedup_distance - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_toml_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guestlens.toml");
        std::fs::write(
            &path,
            r#"
model_dir = "/srv/guestlens/models"
sensitivity = 0.4
heif_quality = 70

[pipeline]
dedup_distance = 0.2
"#,
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let config = Config::from_toml(&content)
            .unwrap()
            .with_env(env(&[("GUESTLENS_SENSITIVITY", "0.5")]));
        assert_eq!(config.model_dir, PathBuf::from("/srv/guestlens/models"));
        assert!((config.sensitivity.value() - 0.5).abs() < 1e-6);
        assert!((config.pipeline.dedup_distance - 0.2).abs() < 1e-6);
        assert!((config.pipeline.match_margin - 0.05).abs() < 1e-6);
        assert_eq!(config.heif_quality, 70);
    }

    #[test]
    fn test_toml_unknown_key_rejected() {
        assert!(Config::from_toml("sensitivty = 0.4").is_err());
    }
}
