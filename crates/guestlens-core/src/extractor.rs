use crate::detector::{BackendKind, DetectOptions};
use crate::error::ExtractError;
use crate::models::FaceAnalyzer;
use crate::types::Embedding;
use image::RgbImage;

/// Embedding of the most confident face in the guest's own photo.
///
/// Only the fast backend runs here; the photo is a single, usually frontal
/// portrait and the guest is waiting on it.
pub fn extract_reference_descriptor<A: FaceAnalyzer + ?Sized>(
    analyzer: &mut A,
    image: &RgbImage,
    options: &DetectOptions,
) -> Result<Embedding, ExtractError> {
    let faces = analyzer.describe_faces(BackendKind::Fast, image, options)?;

    let best = faces.into_iter().max_by(|a, b| {
        a.bbox
            .confidence
            .partial_cmp(&b.bbox.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    match best {
        Some(face) => {
            tracing::info!(confidence = face.bbox.confidence, "reference face selected");
            Ok(face.embedding)
        }
        None => Err(ExtractError::NoFaceDetected),
    }
}
