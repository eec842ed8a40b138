//! guestlens-core — find a guest's face across a wedding gallery.
//!
//! The guest's photo is reduced to a 128-d SFace embedding, then every
//! gallery image is scanned by two detectors (YuNet and SCRFD), its faces
//! are embedded and deduplicated, and images whose best face is close
//! enough to the guest are returned ranked by similarity. All inference
//! runs on the CPU through ONNX Runtime.

pub mod alignment;
pub mod cache;
pub mod detector;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod finder;
pub mod landmarks;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod recognizer;
pub mod scanner;
pub mod scrfd;
pub mod settings;
pub mod types;
pub mod yunet;

#[cfg(test)]
pub(crate) mod testing;

pub use detector::{BackendKind, DetectOptions};
pub use error::{FaceMatchError, ImageLoadError, ModelLoadError};
pub use fetch::{HttpImageFetcher, ImageFetcher};
pub use finder::FaceFinder;
pub use matcher::{MatchPolicy, Sensitivity};
pub use models::{FaceAnalyzer, LazyModels, ModelLoader, ModelPaths, OnnxModelLoader};
pub use normalize::{Conversion, FormatNormalizer, HeifConvertTool, NormalizedPhoto, ReferencePhoto};
pub use orchestrator::GallerySession;
pub use settings::PipelineSettings;
pub use types::{BoundingBox, Detection, Embedding, GalleryImage, MatchResult, ScanReport, ScanStats};

use std::path::PathBuf;

/// Where the ONNX models live unless configured otherwise:
/// `$XDG_DATA_HOME/guestlens/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("guestlens")
        .join("models")
}
