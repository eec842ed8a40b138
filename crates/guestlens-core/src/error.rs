//! Error taxonomy for the face-matching pipeline.
//!
//! Gallery-side failures ([`ImageLoadError`], [`AnalyzeError`]) are absorbed by
//! the gallery scan; reference-side failures end up in [`FaceMatchError`],
//! which also knows how to phrase itself for the guest.

use crate::detector::DetectorError;
use crate::landmarks::LandmarkError;
use crate::recognizer::RecognizerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("fast detector: {0}")]
    FastDetector(#[source] DetectorError),
    #[error("landmark model: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("recognition model: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("accurate detector: {0}")]
    AccurateDetector(#[source] DetectorError),
    #[error("models unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ImageLoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch {url}: {reason}")]
    Http { url: String, reason: String },
    #[error("{url} is larger than {limit} bytes")]
    TooLarge { url: String, limit: u64 },
    #[error("failed to decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },
}

/// Failure of one detector pass over one image.
#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("landmarks: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("{0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("conversion tool `{0}` is not installed")]
    ToolUnavailable(String),
    #[error("conversion tool exited with {status}: {stderr}")]
    ToolFailed { status: String, stderr: String },
    #[error("conversion I/O: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("no face detected in the image")]
    NoFaceDetected,
    #[error(transparent)]
    Analyze(#[from] AnalyzeError),
}

/// Why the reference-photo path failed. Each variant carries the
/// conversion note so the message can say what happened to a HEIC upload.
#[derive(Error, Debug)]
pub enum FaceMatchError {
    #[error("failed to load face detection models: {0}")]
    ModelLoad(#[from] ModelLoadError),
    #[error("failed to load reference photo: {source}")]
    ImageLoad {
        #[source]
        source: ImageLoadError,
        conversion_info: String,
    },
    #[error("no face detected in the reference photo")]
    NoFaceDetected { conversion_info: String },
    #[error("face analysis failed: {source}")]
    Analyze {
        #[source]
        source: AnalyzeError,
        conversion_info: String,
    },
}

const NO_FACE_TIPS: &str = "Tips for better results:\n\
• Use a clear, front-facing photo\n\
• Ensure good lighting\n\
• Avoid sunglasses or hats\n\
• Make sure your face is clearly visible\n\
• Try a photo from a recent event\n\
• If using iPhone, try taking a screenshot of your photo first";

impl FaceMatchError {
    /// The single consolidated message shown to the guest.
    pub fn user_message(&self) -> String {
        match self {
            FaceMatchError::ModelLoad(_) => "Face detection models failed to load. \
                Please check your internet connection and try again."
                .to_string(),
            FaceMatchError::ImageLoad { .. } => {
                "Failed to process the image. Please try a different photo format (JPG, PNG)."
                    .to_string()
            }
            FaceMatchError::NoFaceDetected { conversion_info } => {
                format!("No face detected in your photo. {conversion_info}Please try a different photo.")
            }
            FaceMatchError::Analyze { .. } => {
                "Face detection failed. Please try again with a clearer photo.".to_string()
            }
        }
    }

    /// Optional follow-up advice, only offered when no face was found.
    pub fn tips(&self) -> Option<String> {
        match self {
            FaceMatchError::NoFaceDetected { conversion_info } => {
                Some(format!("{NO_FACE_TIPS}\n• File info: {}", conversion_info.trim_end()))
            }
            _ => None,
        }
    }
}
