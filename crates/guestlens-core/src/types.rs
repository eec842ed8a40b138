use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detector::BackendKind;

/// Dimension of embeddings produced by the SFace recognizer.
pub const EMBEDDING_DIM: usize = 128;

/// Bounding box for a detected face, with optional alignment landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point landmarks in image space:
    /// [left_eye, right_eye, nose, left_mouth, right_mouth] as seen in the image.
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (128-dimensional for SFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "sface_2021dec").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Distance-derived similarity: `1 - euclidean_distance`.
    ///
    /// Identical embeddings score 1.0; the value goes negative once the
    /// distance exceeds 1.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        1.0 - self.euclidean_distance(other)
    }
}

/// One described face: where it was found, by which backend, and its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
    pub backend: BackendKind,
}

/// An image listed in the wedding gallery.
///
/// Field names follow the listing documents (`thumbUrl`, `uploadedAt`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryImage {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    #[serde(default)]
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl GalleryImage {
    /// URL fetched for face scanning. Thumbnails are preferred: they decode
    /// faster and are large enough for detection.
    pub fn scan_url(&self) -> &str {
        self.thumb_url.as_deref().unwrap_or(&self.url)
    }

    /// Stable identity used as the detection cache key.
    pub fn identity(&self) -> &str {
        self.scan_url()
    }
}

/// A gallery image accepted as containing the reference face.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub image: GalleryImage,
    /// Best `1 - distance` similarity among the faces found in the image.
    pub similarity: f32,
    /// 1-based position in the ranked match list.
    pub rank: usize,
    /// Position of the image in the scanned gallery.
    pub gallery_index: usize,
}

/// Per-scan counters, useful for logs and the CLI report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    /// Images run through the detector backends during this scan.
    pub scanned: usize,
    /// Images whose detections came from the cache.
    pub cached: usize,
    /// Images that could not be fetched or decoded.
    pub failed: usize,
    /// Images with no face found by any backend.
    pub no_faces: usize,
    /// Images with faces, none close enough to the reference.
    pub rejected: usize,
}

/// Outcome of one gallery scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub total_images: usize,
    pub matches: Vec<MatchResult>,
    pub summary_message: String,
    pub stats: ScanStats,
}

impl ScanReport {
    pub fn new(total_images: usize, matches: Vec<MatchResult>, stats: ScanStats) -> Self {
        let summary_message = if matches.is_empty() {
            "No matches found. Try uploading a clearer photo of yourself.".to_string()
        } else {
            format!("We found {} photos with your face!", matches.len())
        };
        Self {
            total_images,
            matches,
            summary_message,
            stats,
        }
    }

    /// The matched gallery images, best match first.
    pub fn matched_images(&self) -> Vec<&GalleryImage> {
        self.matches.iter().map(|m| &m.image).collect()
    }
}
