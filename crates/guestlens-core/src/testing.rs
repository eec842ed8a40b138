//! In-crate fakes for pipeline tests.
//!
//! Images are told apart by the red channel of their first pixel (the "tag"),
//! so a fake fetcher can hand out tiny solid-color images and the fake
//! analyzer can answer per image.

use crate::detector::{BackendKind, DetectOptions};
use crate::error::{AnalyzeError, ConversionError, ImageLoadError, ModelLoadError};
use crate::models::{FaceAnalyzer, ModelLoader};
use crate::normalize::{HeifConverter, ReferencePhoto};
use crate::fetch::ImageFetcher;
use crate::types::{BoundingBox, Detection, Embedding, EMBEDDING_DIM, GalleryImage};
use image::{Rgb, RgbImage};
use std::cell::Cell;
use std::collections::HashMap;

/// All-zero reference embedding.
pub fn reference() -> Embedding {
    Embedding::new(vec![0.0; EMBEDDING_DIM])
}

/// A detection whose embedding lies exactly `distance` from [`reference`].
pub fn detection_at(distance: f32, backend: BackendKind) -> Detection {
    let mut values = vec![0.0; EMBEDDING_DIM];
    values[0] = distance;
    Detection {
        bbox: BoundingBox {
            x: 10.0,
            y: 10.0,
            width: 40.0,
            height: 40.0,
            confidence: 0.9,
            landmarks: None,
        },
        embedding: Embedding::new(values),
        backend,
    }
}

pub fn tagged_image(tag: u8) -> RgbImage {
    RgbImage::from_pixel(4, 4, Rgb([tag, 0, 0]))
}

pub fn gallery_image(id: &str) -> GalleryImage {
    GalleryImage {
        id: id.to_string(),
        url: format!("https://cdn.example/{id}.jpg"),
        thumb_url: Some(format!("https://cdn.example/{id}_thumb.jpg")),
        full_url: None,
        filename: format!("{id}.jpg"),
        uploaded_at: None,
    }
}

enum Canned {
    Faces(Vec<Detection>),
    Failure(String),
}

/// Answers `describe_faces` from a table keyed by (image tag, backend).
/// Unknown keys yield no faces.
#[derive(Default)]
pub struct FakeAnalyzer {
    responses: HashMap<(u8, BackendKind), Canned>,
    calls: HashMap<BackendKind, usize>,
}

impl FakeAnalyzer {
    pub fn with_faces(mut self, tag: u8, backend: BackendKind, faces: Vec<Detection>) -> Self {
        self.responses.insert((tag, backend), Canned::Faces(faces));
        self
    }

    pub fn with_failure(mut self, tag: u8, backend: BackendKind, reason: &str) -> Self {
        self.responses
            .insert((tag, backend), Canned::Failure(reason.to_string()));
        self
    }

    pub fn calls(&self, backend: BackendKind) -> usize {
        self.calls.get(&backend).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.values().sum()
    }
}

impl FaceAnalyzer for FakeAnalyzer {
    fn describe_faces(
        &mut self,
        backend: BackendKind,
        image: &RgbImage,
        _options: &DetectOptions,
    ) -> Result<Vec<Detection>, AnalyzeError> {
        *self.calls.entry(backend).or_default() += 1;
        let tag = image.get_pixel(0, 0)[0];
        match self.responses.get(&(tag, backend)) {
            Some(Canned::Faces(faces)) => Ok(faces.clone()),
            Some(Canned::Failure(reason)) => Err(AnalyzeError::Backend(reason.clone())),
            None => Ok(Vec::new()),
        }
    }
}

/// Serves tagged images by URL; unknown URLs fail with an HTTP error.
#[derive(Default)]
pub struct FakeFetcher {
    tags: HashMap<String, u8>,
    fetches: Cell<usize>,
}

impl FakeFetcher {
    pub fn with_image(mut self, url: &str, tag: u8) -> Self {
        self.tags.insert(url.to_string(), tag);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.get()
    }
}

impl ImageFetcher for FakeFetcher {
    fn fetch(&self, url: &str) -> Result<RgbImage, ImageLoadError> {
        self.fetches.set(self.fetches.get() + 1);
        match self.tags.get(url) {
            Some(&tag) => Ok(tagged_image(tag)),
            None => Err(ImageLoadError::Http {
                url: url.to_string(),
                reason: "404 Not Found".to_string(),
            }),
        }
    }
}

/// Loader handing out clones of a prepared [`FakeAnalyzer`] table.
pub struct FakeLoader {
    build: fn() -> FakeAnalyzer,
    fail_first: usize,
    loads: Cell<usize>,
}

impl Default for FakeLoader {
    fn default() -> Self {
        Self {
            build: FakeAnalyzer::default,
            fail_first: 0,
            loads: Cell::new(0),
        }
    }
}

impl FakeLoader {
    pub fn new(build: fn() -> FakeAnalyzer) -> Self {
        Self {
            build,
            ..Self::default()
        }
    }

    /// The first `n` loads fail.
    pub fn failing_first(n: usize) -> Self {
        Self {
            fail_first: n,
            ..Self::default()
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.get()
    }
}

impl ModelLoader for FakeLoader {
    type Models = FakeAnalyzer;

    fn load(&self) -> Result<FakeAnalyzer, ModelLoadError> {
        let attempt = self.loads.get() + 1;
        self.loads.set(attempt);
        if attempt <= self.fail_first {
            return Err(ModelLoadError::Unavailable("network unreachable".to_string()));
        }
        Ok((self.build)())
    }
}

/// Converter that always fails, like a corrupt HEIC payload.
pub struct FailingConverter;

impl HeifConverter for FailingConverter {
    fn convert_to_jpeg(&self, _photo: &ReferencePhoto) -> Result<Vec<u8>, ConversionError> {
        Err(ConversionError::ToolFailed {
            status: "exit status: 1".to_string(),
            stderr: "Could not read HEIF/AVIF file: Invalid input".to_string(),
        })
    }
}

/// Converter that returns fixed JPEG bytes.
pub struct StaticConverter(pub Vec<u8>);

impl HeifConverter for StaticConverter {
    fn convert_to_jpeg(&self, _photo: &ReferencePhoto) -> Result<Vec<u8>, ConversionError> {
        Ok(self.0.clone())
    }
}

/// PNG bytes of a solid tagged image.
pub fn tagged_png(tag: u8) -> Vec<u8> {
    let mut bytes = Vec::new();
    let image = image::DynamicImage::ImageRgb8(tagged_image(tag));
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("png encode");
    bytes
}
