//! Gallery scan: fetch, scan, match and rank every gallery image.
//!
//! Images are processed one at a time in gallery order. Detections are
//! cached per image identity for the lifetime of the session, so rescanning
//! the same gallery with a different sensitivity only re-runs the matcher.

use crate::cache::DetectionCache;
use crate::fetch::ImageFetcher;
use crate::matcher::{MatchOutcome, MatchPolicy, Sensitivity};
use crate::models::FaceAnalyzer;
use crate::scanner::MultiDetectorScanner;
use crate::settings::PipelineSettings;
use crate::types::{Detection, Embedding, GalleryImage, MatchResult, ScanReport, ScanStats};

pub struct GallerySession {
    scanner: MultiDetectorScanner,
    policy: MatchPolicy,
    cache: DetectionCache,
}

impl GallerySession {
    pub fn new(settings: &PipelineSettings) -> Self {
        Self {
            scanner: MultiDetectorScanner::from_settings(settings),
            policy: MatchPolicy::new(settings.match_margin),
            cache: DetectionCache::default(),
        }
    }

    pub fn cache(&self) -> &DetectionCache {
        &self.cache
    }

    /// Forget all cached detections. The next scan runs every backend again.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
        tracing::debug!("detection cache cleared");
    }

    /// Scan `images` for the reference face.
    ///
    /// Never fails: images that cannot be fetched, contain no face, or do not
    /// match are skipped and counted in [`ScanStats`]. The session cache is
    /// replaced by the detections gathered during this scan.
    pub fn scan_gallery<A, F>(
        &mut self,
        analyzer: &mut A,
        fetcher: &F,
        reference: &Embedding,
        images: &[GalleryImage],
        threshold: Sensitivity,
        mut on_progress: impl FnMut(&str),
    ) -> ScanReport
    where
        A: FaceAnalyzer + ?Sized,
        F: ImageFetcher + ?Sized,
    {
        let total = images.len();
        let mut stats = ScanStats::default();
        if images.is_empty() {
            return ScanReport::new(0, Vec::new(), stats);
        }

        tracing::info!(
            images = total,
            sensitivity = threshold.value(),
            effective = self.policy.effective_threshold(threshold),
            "scanning gallery"
        );

        let mut next_cache = DetectionCache::default();
        let mut matches = Vec::new();

        for (index, image) in images.iter().enumerate() {
            on_progress(&format!("Scanning image {} of {}...", index + 1, total));

            let identity = image.identity();
            let detections: Vec<Detection> = match self.cache.get(identity) {
                Some(cached) => {
                    stats.cached += 1;
                    let cached = cached.to_vec();
                    next_cache.insert(identity, cached.clone());
                    cached
                }
                None => {
                    let decoded = match fetcher.fetch(image.scan_url()) {
                        Ok(decoded) => decoded,
                        Err(e) => {
                            tracing::debug!(id = %image.id, error = %e, "skipping image");
                            stats.failed += 1;
                            continue;
                        }
                    };
                    stats.scanned += 1;
                    let outcome = self.scanner.scan(analyzer, &decoded);
                    if outcome.is_complete() {
                        next_cache.insert(identity, outcome.detections.clone());
                    }
                    outcome.detections
                }
            };

            match self.policy.match_best(reference, &detections, threshold) {
                MatchOutcome::Accepted { similarity } => {
                    tracing::debug!(id = %image.id, similarity, "match");
                    matches.push(MatchResult {
                        image: image.clone(),
                        similarity,
                        rank: 0,
                        gallery_index: index,
                    });
                }
                MatchOutcome::Rejected { best: None } => {
                    tracing::debug!(id = %image.id, "no faces");
                    stats.no_faces += 1;
                }
                MatchOutcome::Rejected { best: Some(best) } => {
                    tracing::debug!(id = %image.id, best, "no match");
                    stats.rejected += 1;
                }
            }
        }

        // Vec::sort_by is stable: equal similarities keep gallery order.
        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for (i, m) in matches.iter_mut().enumerate() {
            m.rank = i + 1;
        }

        self.cache = next_cache;

        tracing::info!(
            images = total,
            matches = matches.len(),
            scanned = stats.scanned,
            cached = stats.cached,
            failed = stats.failed,
            "gallery scan complete"
        );
        ScanReport::new(total, matches, stats)
    }
}
