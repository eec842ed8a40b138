//! The four ONNX models and their lazy loading.
//!
//! | Role | Default file |
//! |---|---|
//! | fast detector | `face_detection_yunet_2023mar.onnx` |
//! | landmarks | `face_landmark_68.onnx` |
//! | recognition | `face_recognition_sface_2021dec.onnx` |
//! | accurate detector | `det_10g.onnx` |

use crate::detector::{BackendKind, DetectOptions};
use crate::error::{AnalyzeError, ModelLoadError};
use crate::landmarks::{LandmarkError, LandmarkModel};
use crate::recognizer::FaceRecognizer;
use crate::scrfd::ScrfdDetector;
use crate::types::{BoundingBox, Detection};
use crate::yunet::YuNetDetector;
use image::RgbImage;
use std::path::{Path, PathBuf};

pub const FAST_DETECTOR_FILE: &str = "face_detection_yunet_2023mar.onnx";
pub const LANDMARK_MODEL_FILE: &str = "face_landmark_68.onnx";
pub const RECOGNIZER_FILE: &str = "face_recognition_sface_2021dec.onnx";
pub const ACCURATE_DETECTOR_FILE: &str = "det_10g.onnx";

/// Inference capability the pipeline runs on: detect with one backend,
/// then locate landmarks and embed every face found.
pub trait FaceAnalyzer {
    fn describe_faces(
        &mut self,
        backend: BackendKind,
        image: &RgbImage,
        options: &DetectOptions,
    ) -> Result<Vec<Detection>, AnalyzeError>;
}

/// Produces a ready [`FaceAnalyzer`]. Swapped for a fake in tests.
pub trait ModelLoader {
    type Models: FaceAnalyzer;

    fn load(&self) -> Result<Self::Models, ModelLoadError>;
}

/// Locations of the four model files.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPaths {
    pub fast_detector: PathBuf,
    pub landmarks: PathBuf,
    pub recognizer: PathBuf,
    pub accurate_detector: PathBuf,
}

impl ModelPaths {
    /// Default file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            fast_detector: dir.join(FAST_DETECTOR_FILE),
            landmarks: dir.join(LANDMARK_MODEL_FILE),
            recognizer: dir.join(RECOGNIZER_FILE),
            accurate_detector: dir.join(ACCURATE_DETECTOR_FILE),
        }
    }

    /// Paths that do not exist on disk.
    pub fn missing(&self) -> Vec<&Path> {
        [
            &self.fast_detector,
            &self.landmarks,
            &self.recognizer,
            &self.accurate_detector,
        ]
        .into_iter()
        .map(PathBuf::as_path)
        .filter(|p| !p.exists())
        .collect()
    }
}

/// All four loaded models.
pub struct ModelSet {
    fast: YuNetDetector,
    landmarks: LandmarkModel,
    recognizer: FaceRecognizer,
    accurate: ScrfdDetector,
}

impl ModelSet {
    /// Load every model; fails on the first one that cannot be loaded.
    pub fn load(paths: &ModelPaths) -> Result<Self, ModelLoadError> {
        let fast = YuNetDetector::load(&paths.fast_detector).map_err(ModelLoadError::FastDetector)?;
        let landmarks = LandmarkModel::load(&paths.landmarks)?;
        let recognizer = FaceRecognizer::load(&paths.recognizer)?;
        let accurate =
            ScrfdDetector::load(&paths.accurate_detector).map_err(ModelLoadError::AccurateDetector)?;

        Ok(Self {
            fast,
            landmarks,
            recognizer,
            accurate,
        })
    }

    /// Refine one box with landmark-derived alignment points. `None` when the
    /// face is too small to crop.
    fn refine_landmarks(&mut self, image: &RgbImage, face: BoundingBox) -> Result<Option<BoundingBox>, AnalyzeError> {
        let located = match self.landmarks.locate(image, &face) {
            Ok(located) => located,
            Err(LandmarkError::EmptyCrop) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let refined = located.alignment_points().or(face.landmarks);
        Ok(Some(BoundingBox {
            landmarks: refined,
            ..face
        }))
    }
}

impl FaceAnalyzer for ModelSet {
    fn describe_faces(
        &mut self,
        backend: BackendKind,
        image: &RgbImage,
        options: &DetectOptions,
    ) -> Result<Vec<Detection>, AnalyzeError> {
        let boxes = match backend {
            BackendKind::Fast => self.fast.detect(image, options)?,
            BackendKind::Accurate => self.accurate.detect(image, options)?,
        };

        let mut detections = Vec::with_capacity(boxes.len());
        for face in boxes {
            let Some(bbox) = self.refine_landmarks(image, face)? else {
                continue;
            };
            let Some(landmarks) = bbox.landmarks else {
                continue;
            };
            let embedding = self.recognizer.extract(image, &landmarks)?;
            detections.push(Detection {
                bbox,
                embedding,
                backend,
            });
        }
        Ok(detections)
    }
}

/// Loads the four ONNX models from disk.
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    paths: ModelPaths,
}

impl OnnxModelLoader {
    pub fn new(paths: ModelPaths) -> Self {
        Self { paths }
    }

    pub fn from_dir(dir: &Path) -> Self {
        Self::new(ModelPaths::in_dir(dir))
    }

    pub fn paths(&self) -> &ModelPaths {
        &self.paths
    }
}

impl ModelLoader for OnnxModelLoader {
    type Models = ModelSet;

    fn load(&self) -> Result<ModelSet, ModelLoadError> {
        if let Some(dir) = self.paths.fast_detector.parent() {
            if !dir.as_os_str().is_empty() && !dir.is_dir() {
                return Err(ModelLoadError::Unavailable(format!(
                    "model directory {} does not exist",
                    dir.display()
                )));
            }
        }
        ModelSet::load(&self.paths)
    }
}

/// Lazily loaded models with a readiness flag.
///
/// The first successful `ensure_loaded` keeps the models; later calls are
/// no-ops. A failed load leaves the handle unloaded so the next call retries.
pub struct LazyModels<L: ModelLoader> {
    loader: L,
    models: Option<L::Models>,
}

impl<L: ModelLoader> LazyModels<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            models: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.models.is_some()
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn ensure_loaded(&mut self) -> Result<&mut L::Models, ModelLoadError> {
        let models = match self.models.take() {
            Some(models) => models,
            None => {
                let models = self.loader.load()?;
                tracing::info!("face detection models loaded");
                models
            }
        };
        Ok(self.models.insert(models))
    }
}
