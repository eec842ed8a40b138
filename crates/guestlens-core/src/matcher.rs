use crate::settings::DEFAULT_MATCH_MARGIN;
use crate::types::{Detection, Embedding};
use serde::{Deserialize, Serialize};

pub const MIN_SENSITIVITY: f32 = 0.15;
pub const MAX_SENSITIVITY: f32 = 0.70;
pub const DEFAULT_SENSITIVITY: f32 = 0.30;
/// Used when a guest retries a search that found nothing.
pub const RETRY_SENSITIVITY: f32 = 0.20;

/// Guest-facing match threshold, always within [0.15, 0.70].
///
/// Lower values accept weaker similarities and so return more photos.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f32", into = "f32")]
pub struct Sensitivity(f32);

impl Sensitivity {
    /// Clamp `value` into range. NaN falls back to the default.
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self::default();
        }
        Self(value.clamp(MIN_SENSITIVITY, MAX_SENSITIVITY))
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self(DEFAULT_SENSITIVITY)
    }
}

impl From<f32> for Sensitivity {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}

impl From<Sensitivity> for f32 {
    fn from(value: Sensitivity) -> Self {
        value.0
    }
}

/// Result of comparing the reference against the faces of one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchOutcome {
    Accepted { similarity: f32 },
    /// `best` is `None` when the image had no faces at all.
    Rejected { best: Option<f32> },
}

impl MatchOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, MatchOutcome::Accepted { .. })
    }
}

/// Best-face matching against a margin-adjusted threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    /// Subtracted from the sensitivity before comparing. Internal only: the
    /// guest always sees the nominal sensitivity.
    pub margin: f32,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            margin: DEFAULT_MATCH_MARGIN,
        }
    }
}

impl MatchPolicy {
    pub fn new(margin: f32) -> Self {
        Self { margin }
    }

    /// Threshold the best similarity must exceed. Never below zero, so a
    /// face farther than distance 1 is rejected whatever the margin.
    pub fn effective_threshold(&self, threshold: Sensitivity) -> f32 {
        (threshold.value() - self.margin).max(0.0)
    }

    /// Score every face against the reference and accept on the best one.
    pub fn match_best(
        &self,
        reference: &Embedding,
        detections: &[Detection],
        threshold: Sensitivity,
    ) -> MatchOutcome {
        let best = detections
            .iter()
            .map(|d| reference.similarity(&d.embedding))
            .fold(None, |best: Option<f32>, sim| match best {
                Some(b) if b >= sim => Some(b),
                _ => Some(sim),
            });

        match best {
            Some(similarity) if similarity > self.effective_threshold(threshold) => {
                MatchOutcome::Accepted { similarity }
            }
            _ => MatchOutcome::Rejected { best },
        }
    }
}
