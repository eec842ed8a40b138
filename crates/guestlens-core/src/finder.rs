//! End-to-end "find my photos" flow.

use crate::error::{ExtractError, FaceMatchError, ModelLoadError};
use crate::extractor::extract_reference_descriptor;
use crate::fetch::ImageFetcher;
use crate::matcher::{Sensitivity, RETRY_SENSITIVITY};
use crate::models::{LazyModels, ModelLoader};
use crate::normalize::{decode_photo, FormatNormalizer, HeifConverter, ReferencePhoto};
use crate::orchestrator::GallerySession;
use crate::settings::PipelineSettings;
use crate::types::{Embedding, GalleryImage, ScanReport};

/// Owns the models, the gallery session and its cache for one guest.
pub struct FaceFinder<L: ModelLoader, F, C> {
    models: LazyModels<L>,
    fetcher: F,
    normalizer: FormatNormalizer<C>,
    session: GallerySession,
    settings: PipelineSettings,
}

impl<L, F, C> FaceFinder<L, F, C>
where
    L: ModelLoader,
    F: ImageFetcher,
    C: HeifConverter,
{
    pub fn new(loader: L, fetcher: F, converter: C, settings: &PipelineSettings) -> Self {
        Self {
            models: LazyModels::new(loader),
            fetcher,
            normalizer: FormatNormalizer::new(converter),
            session: GallerySession::new(settings),
            settings: settings.clone(),
        }
    }

    pub fn models_loaded(&self) -> bool {
        self.models.is_loaded()
    }

    /// Load the models if they are not loaded yet.
    pub fn ensure_models_loaded(&mut self) -> Result<(), ModelLoadError> {
        self.models.ensure_loaded().map(|_| ())
    }

    pub fn clear_cache(&mut self) {
        self.session.clear_cache();
    }

    /// Normalize, decode and describe the guest's photo.
    pub fn prepare_reference(
        &mut self,
        photo: ReferencePhoto,
        mut on_progress: impl FnMut(&str),
    ) -> Result<Embedding, FaceMatchError> {
        let models = self.models.ensure_loaded()?;

        if photo.is_heif() {
            on_progress("Converting iPhone photo format...");
        }
        let normalized = self.normalizer.normalize(photo);
        let conversion_info = normalized.conversion_info();

        on_progress("Detecting faces in your photo...");
        let image = decode_photo(&normalized.photo).map_err(|source| FaceMatchError::ImageLoad {
            source,
            conversion_info: conversion_info.clone(),
        })?;

        extract_reference_descriptor(models, &image, &self.settings.reference_detect).map_err(
            |e| match e {
                ExtractError::NoFaceDetected => FaceMatchError::NoFaceDetected { conversion_info },
                ExtractError::Analyze(source) => FaceMatchError::Analyze {
                    source,
                    conversion_info,
                },
            },
        )
    }

    /// Scan the gallery for an already prepared reference.
    pub fn scan_gallery(
        &mut self,
        reference: &Embedding,
        images: &[GalleryImage],
        threshold: Sensitivity,
        on_progress: impl FnMut(&str),
    ) -> Result<ScanReport, FaceMatchError> {
        let models = self.models.ensure_loaded()?;
        Ok(self
            .session
            .scan_gallery(models, &self.fetcher, reference, images, threshold, on_progress))
    }

    /// The whole flow. Reference-photo failures abort before the gallery
    /// is touched.
    pub fn find_matches(
        &mut self,
        photo: ReferencePhoto,
        images: &[GalleryImage],
        threshold: Sensitivity,
        mut on_progress: impl FnMut(&str),
    ) -> Result<ScanReport, FaceMatchError> {
        on_progress("Loading face detection models...");
        self.ensure_models_loaded()?;

        on_progress("Analyzing your photo...");
        let reference = self.prepare_reference(photo, &mut on_progress)?;

        on_progress("Scanning gallery for matches...");
        self.scan_gallery(&reference, images, threshold, on_progress)
    }

    /// "Try again with lower sensitivity": drop every cached detection and
    /// rerun the whole flow at [`RETRY_SENSITIVITY`].
    pub fn retry_with_lower_sensitivity(
        &mut self,
        photo: ReferencePhoto,
        images: &[GalleryImage],
        on_progress: impl FnMut(&str),
    ) -> Result<ScanReport, FaceMatchError> {
        tracing::info!(sensitivity = RETRY_SENSITIVITY, "retrying with lower sensitivity");
        self.clear_cache();
        self.find_matches(photo, images, Sensitivity::new(RETRY_SENSITIVITY), on_progress)
    }
}
