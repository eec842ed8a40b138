use crate::detector::{BackendKind, DetectOptions};
use crate::scanner::BackendPass;
use serde::{Deserialize, Serialize};

/// Distance below which two detections in one image are the same face.
pub const DEFAULT_DEDUP_DISTANCE: f32 = 0.15;
/// Subtracted from the guest's sensitivity before comparing similarities.
pub const DEFAULT_MATCH_MARGIN: f32 = 0.05;

/// Tunables of the matching pipeline.
///
/// The margin, the dedup bound and the sensitivity range were tuned for
/// unnormalized 128-d descriptors of a browser face model. SFace embeddings
/// are L2-normalized, so distances span [0, 2] and these defaults have not
/// been re-tuned for them. Calibrate against a labelled gallery before
/// relying on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub match_margin: f32,
    pub dedup_distance: f32,
    /// Single-face pass over the guest's own photo.
    pub reference_detect: DetectOptions,
    /// Gallery pass with the fast detector.
    pub fast_detect: DetectOptions,
    /// Gallery pass with the accurate detector.
    pub accurate_detect: DetectOptions,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            match_margin: DEFAULT_MATCH_MARGIN,
            dedup_distance: DEFAULT_DEDUP_DISTANCE,
            reference_detect: DetectOptions::new(320, 0.5),
            fast_detect: DetectOptions::new(416, 0.2),
            accurate_detect: DetectOptions::new(640, 0.2),
        }
    }
}

impl PipelineSettings {
    /// Gallery detector passes, in the order their results are merged.
    pub fn backend_passes(&self) -> Vec<BackendPass> {
        vec![
            BackendPass::new(BackendKind::Fast, self.fast_detect),
            BackendPass::new(BackendKind::Accurate, self.accurate_detect),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_passes_fast_then_accurate() {
        let passes = PipelineSettings::default().backend_passes();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].backend, BackendKind::Fast);
        assert_eq!(passes[1].backend, BackendKind::Accurate);
        assert!((passes[1].options.min_confidence - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings: PipelineSettings = serde_json::from_str(r#"{"match_margin": 0.1}"#).unwrap();
        assert!((settings.match_margin - 0.1).abs() < 1e-6);
        assert!((settings.dedup_distance - DEFAULT_DEDUP_DISTANCE).abs() < 1e-6);
        assert_eq!(settings.fast_detect.input_size, 416);
    }
}
