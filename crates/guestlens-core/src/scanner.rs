//! Multi-detector scanning of one gallery image.
//!
//! Each backend misses faces the other finds (profiles, small faces in group
//! shots), so every image goes through every pass and the results are merged.
//! A pass that fails is logged and contributes nothing.

use crate::detector::{BackendKind, DetectOptions};
use crate::models::FaceAnalyzer;
use crate::settings::PipelineSettings;
use crate::types::Detection;
use image::RgbImage;

/// One detector invocation: which backend, with which options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendPass {
    pub backend: BackendKind,
    pub options: DetectOptions,
}

impl BackendPass {
    pub fn new(backend: BackendKind, options: DetectOptions) -> Self {
        Self { backend, options }
    }
}

/// Unique faces found in one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOutcome {
    pub detections: Vec<Detection>,
    /// Number of passes that errored out.
    pub failed_passes: usize,
}

impl ScanOutcome {
    /// Every pass ran; the result is safe to cache.
    pub fn is_complete(&self) -> bool {
        self.failed_passes == 0
    }
}

/// Runs all detector passes over an image and deduplicates the union.
#[derive(Debug, Clone)]
pub struct MultiDetectorScanner {
    passes: Vec<BackendPass>,
    dedup_distance: f32,
}

impl MultiDetectorScanner {
    pub fn new(passes: Vec<BackendPass>, dedup_distance: f32) -> Self {
        Self {
            passes,
            dedup_distance,
        }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(settings.backend_passes(), settings.dedup_distance)
    }

    /// Scan one image. Never fails: a failing pass is isolated and counted.
    pub fn scan<A: FaceAnalyzer + ?Sized>(&self, analyzer: &mut A, image: &RgbImage) -> ScanOutcome {
        let mut candidates = Vec::new();
        let mut failed_passes = 0;

        for pass in &self.passes {
            match analyzer.describe_faces(pass.backend, image, &pass.options) {
                Ok(found) => {
                    tracing::trace!(backend = %pass.backend, faces = found.len(), "pass complete");
                    candidates.extend(found);
                }
                Err(e) => {
                    tracing::warn!(backend = %pass.backend, error = %e, "detector pass failed; skipping");
                    failed_passes += 1;
                }
            }
        }

        let total = candidates.len();
        let detections = dedup_detections(candidates, self.dedup_distance);
        tracing::debug!(candidates = total, unique = detections.len(), failed_passes, "image scanned");

        ScanOutcome {
            detections,
            failed_passes,
        }
    }
}

/// Drop detections whose embedding lies within `bound` of an earlier kept one.
///
/// First occurrence wins, so the fast backend's copy of a face is kept over
/// the accurate backend's. Running it on its own output changes nothing.
pub fn dedup_detections(candidates: Vec<Detection>, bound: f32) -> Vec<Detection> {
    let mut unique: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let duplicate = unique
            .iter()
            .any(|kept| kept.embedding.euclidean_distance(&candidate.embedding) < bound);
        if !duplicate {
            unique.push(candidate);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{detection_at, tagged_image, FakeAnalyzer};

    #[test]
    fn test_dedup_same_face_from_two_backends() {
        let candidates = vec![
            detection_at(0.40, BackendKind::Fast),
            detection_at(0.45, BackendKind::Accurate), // 0.05 away from the first
        ];
        let unique = dedup_detections(candidates, 0.15);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].backend, BackendKind::Fast);
    }

    #[test]
    fn test_dedup_keeps_distinct_faces() {
        let candidates = vec![
            detection_at(0.10, BackendKind::Fast),
            detection_at(0.50, BackendKind::Fast),
            detection_at(0.90, BackendKind::Accurate),
        ];
        assert_eq!(dedup_detections(candidates, 0.15).len(), 3);
    }

    #[test]
    fn test_dedup_bound_is_exclusive() {
        let candidates = vec![
            detection_at(0.25, BackendKind::Fast),
            detection_at(0.50, BackendKind::Accurate),
        ];
        assert_eq!(dedup_detections(candidates, 0.25).len(), 2);
    }

    #[test]
    fn test_dedup_idempotent() {
        let candidates = vec![
            detection_at(0.10, BackendKind::Fast),
            detection_at(0.15, BackendKind::Fast),
            detection_at(0.30, BackendKind::Accurate),
            detection_at(0.33, BackendKind::Accurate),
            detection_at(0.80, BackendKind::Accurate),
        ];
        let once = dedup_detections(candidates, 0.15);
        let twice = dedup_detections(once.clone(), 0.15);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_scan_merges_both_backends() {
        let mut analyzer = FakeAnalyzer::default()
            .with_faces(1, BackendKind::Fast, vec![detection_at(0.2, BackendKind::Fast)])
            .with_faces(1, BackendKind::Accurate, vec![
                detection_at(0.22, BackendKind::Accurate),
                detection_at(0.7, BackendKind::Accurate),
            ]);
        let scanner = MultiDetectorScanner::from_settings(&PipelineSettings::default());

        let outcome = scanner.scan(&mut analyzer, &tagged_image(1));
        assert!(outcome.is_complete());
        assert_eq!(outcome.detections.len(), 2);
        assert_eq!(analyzer.calls(BackendKind::Fast), 1);
        assert_eq!(analyzer.calls(BackendKind::Accurate), 1);
    }

    #[test]
    fn test_scan_isolates_failing_backend() {
        let mut analyzer = FakeAnalyzer::default()
            .with_failure(1, BackendKind::Fast, "session crashed")
            .with_faces(1, BackendKind::Accurate, vec![detection_at(0.3, BackendKind::Accurate)]);
        let scanner = MultiDetectorScanner::from_settings(&PipelineSettings::default());

        let outcome = scanner.scan(&mut analyzer, &tagged_image(1));
        assert_eq!(outcome.failed_passes, 1);
        assert!(!outcome.is_complete());
        assert_eq!(outcome.detections.len(), 1);
        assert_eq!(outcome.detections[0].backend, BackendKind::Accurate);
    }

    #[test]
    fn test_scan_no_faces() {
        let mut analyzer = FakeAnalyzer::default();
        let scanner = MultiDetectorScanner::from_settings(&PipelineSettings::default());
        let outcome = scanner.scan(&mut analyzer, &tagged_image(9));
        assert!(outcome.detections.is_empty());
        assert!(outcome.is_complete());
    }
}
