//! HEIC/HEIF reference photos are converted to JPEG before decoding.
//!
//! iPhones upload HEIC by default and the `image` crate cannot decode it.
//! Conversion goes through an external tool; when it fails the original
//! photo is kept and the outcome is reported in [`Conversion`].

use crate::error::{ConversionError, ImageLoadError};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const DEFAULT_HEIF_CONVERT: &str = "heif-convert";
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// The guest's own photo, as uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePhoto {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: Option<String>,
}

impl ReferencePhoto {
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>, mime_type: Option<String>) -> Self {
        Self {
            bytes,
            filename: filename.into(),
            mime_type,
        }
    }

    /// Read a photo from disk, guessing its MIME type from the extension.
    pub fn from_path(path: &Path) -> Result<Self, ImageLoadError> {
        let bytes = std::fs::read(path).map_err(|source| ImageLoadError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(bytes, filename, mime_from_path(path)))
    }

    /// HEIC/HEIF by MIME type or by extension, case-insensitively.
    pub fn is_heif(&self) -> bool {
        let by_mime = self
            .mime_type
            .as_deref()
            .map(|m| {
                let m = m.to_ascii_lowercase();
                m == "image/heic" || m == "image/heif"
            })
            .unwrap_or(false);
        by_mime || has_heif_extension(&self.filename)
    }

    /// MIME type, or "unknown" for the guest-facing file info line.
    pub fn type_label(&self) -> &str {
        self.mime_type.as_deref().unwrap_or("unknown")
    }
}

fn has_heif_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("heic") || e.eq_ignore_ascii_case("heif"))
        .unwrap_or(false)
}

fn mime_from_path(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "heic" => Some("image/heic".to_string()),
        "heif" => Some("image/heif".to_string()),
        _ => image::ImageFormat::from_extension(&ext).map(|f| f.to_mime_type().to_string()),
    }
}

/// What happened to the photo during normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    NotNeeded,
    Converted,
    /// Conversion was attempted and failed; the original photo was kept.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPhoto {
    pub photo: ReferencePhoto,
    pub conversion: Conversion,
    /// MIME label of the photo before normalization.
    pub original_type: String,
}

impl NormalizedPhoto {
    /// The returned photo differs from the uploaded one.
    pub fn converted(&self) -> bool {
        self.conversion == Conversion::Converted
    }

    /// Short note folded into the guest-facing error message.
    pub fn conversion_info(&self) -> String {
        match self.conversion {
            Conversion::Converted => {
                format!("Converted from {} to JPEG successfully. ", self.original_type)
            }
            Conversion::Failed(_) => "HEIC conversion failed, using original file. ".to_string(),
            Conversion::NotNeeded => format!("File type: {}. ", self.original_type),
        }
    }
}

/// Turns HEIC/HEIF bytes into JPEG bytes.
pub trait HeifConverter {
    fn convert_to_jpeg(&self, photo: &ReferencePhoto) -> Result<Vec<u8>, ConversionError>;
}

/// Runs the external `heif-convert` tool (libheif).
#[derive(Debug, Clone)]
pub struct HeifConvertTool {
    program: PathBuf,
    quality: u8,
}

impl Default for HeifConvertTool {
    fn default() -> Self {
        Self::new(DEFAULT_HEIF_CONVERT)
    }
}

impl HeifConvertTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.min(100);
        self
    }
}

impl HeifConverter for HeifConvertTool {
    fn convert_to_jpeg(&self, photo: &ReferencePhoto) -> Result<Vec<u8>, ConversionError> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("upload.heic");
        let output = dir.path().join("upload.jpg");
        std::fs::write(&input, &photo.bytes)?;

        let result = Command::new(&self.program)
            .arg("-q")
            .arg(self.quality.to_string())
            .arg(&input)
            .arg(&output)
            .output();
        let result = match result {
            Ok(result) => result,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConversionError::ToolUnavailable(
                    self.program.display().to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        if !result.status.success() {
            return Err(ConversionError::ToolFailed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(std::fs::read(&output)?)
    }
}

/// Converts HEIC/HEIF photos to JPEG, passing everything else through.
pub struct FormatNormalizer<C> {
    converter: C,
}

impl<C: HeifConverter> FormatNormalizer<C> {
    pub fn new(converter: C) -> Self {
        Self { converter }
    }

    /// Never fails: if conversion fails the original photo comes back
    /// tagged [`Conversion::Failed`].
    pub fn normalize(&self, photo: ReferencePhoto) -> NormalizedPhoto {
        let original_type = photo.type_label().to_string();
        if !photo.is_heif() {
            return NormalizedPhoto {
                photo,
                conversion: Conversion::NotNeeded,
                original_type,
            };
        }

        match self.converter.convert_to_jpeg(&photo) {
            Ok(jpeg) => {
                let filename = Path::new(&photo.filename)
                    .with_extension("jpg")
                    .to_string_lossy()
                    .into_owned();
                tracing::info!(from = %original_type, bytes = jpeg.len(), "converted reference photo to JPEG");
                NormalizedPhoto {
                    photo: ReferencePhoto::new(jpeg, filename, Some("image/jpeg".to_string())),
                    conversion: Conversion::Converted,
                    original_type,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "HEIC conversion failed; using original file");
                NormalizedPhoto {
                    photo,
                    conversion: Conversion::Failed(e.to_string()),
                    original_type,
                }
            }
        }
    }
}

/// Decode a (normalized) reference photo to RGB.
pub fn decode_photo(photo: &ReferencePhoto) -> Result<RgbImage, ImageLoadError> {
    crate::fetch::decode_image(&photo.filename, &photo.bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{tagged_png, FailingConverter, StaticConverter};

    fn heic(bytes: &[u8]) -> ReferencePhoto {
        ReferencePhoto::new(bytes.to_vec(), "IMG_0042.HEIC", Some("image/heic".to_string()))
    }

    #[test]
    fn test_is_heif_by_mime_or_extension() {
        assert!(heic(b"").is_heif());
        assert!(ReferencePhoto::new(vec![], "photo.heif", None).is_heif());
        assert!(ReferencePhoto::new(vec![], "photo.jpg", Some("IMAGE/HEIF".into())).is_heif());
        assert!(!ReferencePhoto::new(vec![], "photo.jpg", Some("image/jpeg".into())).is_heif());
        assert!(!ReferencePhoto::new(vec![], "heic", None).is_heif());
    }

    #[test]
    fn test_non_heif_passes_through() {
        let normalizer = FormatNormalizer::new(FailingConverter);
        let photo = ReferencePhoto::new(tagged_png(5), "me.png", Some("image/png".into()));
        let normalized = normalizer.normalize(photo.clone());

        assert_eq!(normalized.conversion, Conversion::NotNeeded);
        assert!(!normalized.converted());
        assert_eq!(normalized.photo, photo);
        assert_eq!(normalized.conversion_info(), "File type: image/png. ");
    }

    #[test]
    fn test_successful_conversion_renames() {
        let normalizer = FormatNormalizer::new(StaticConverter(vec![0xFF, 0xD8, 0xFF]));
        let normalized = normalizer.normalize(heic(b"ftypheic"));

        assert!(normalized.converted());
        assert_eq!(normalized.photo.filename, "IMG_0042.jpg");
        assert_eq!(normalized.photo.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(
            normalized.conversion_info(),
            "Converted from image/heic to JPEG successfully. "
        );
    }

    #[test]
    fn test_corrupt_heic_keeps_original() {
        let normalizer = FormatNormalizer::new(FailingConverter);
        let original = heic(b"not really heic");
        let normalized = normalizer.normalize(original.clone());

        assert!(matches!(normalized.conversion, Conversion::Failed(_)));
        assert!(!normalized.converted());
        assert_eq!(normalized.photo, original);
        assert_eq!(normalized.conversion_info(), "HEIC conversion failed, using original file. ");
        assert!(matches!(
            decode_photo(&normalized.photo),
            Err(ImageLoadError::Decode { .. })
        ));
    }

    #[test]
    fn test_missing_tool_is_unavailable() {
        let tool = HeifConvertTool::new("/nonexistent/bin/heif-convert");
        let result = tool.convert_to_jpeg(&heic(b"ftypheic"));
        assert!(matches!(result, Err(ConversionError::ToolUnavailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_tool_receives_quality_and_output_is_read_back() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-heif-convert");
        // Writes the -q value where the JPEG would go.
        std::fs::write(&script, "#!/bin/sh\nprintf '%s' \"$2\" > \"$4\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let jpeg = HeifConvertTool::new(&script)
            .with_quality(75)
            .convert_to_jpeg(&heic(b"ftypheic"))
            .unwrap();
        assert_eq!(jpeg, b"75");

        let clamped = HeifConvertTool::new(&script)
            .with_quality(250)
            .convert_to_jpeg(&heic(b"ftypheic"))
            .unwrap();
        assert_eq!(clamped, b"100");
    }

    #[test]
    fn test_from_path_guesses_mime() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("me.PNG");
        std::fs::write(&png, tagged_png(7)).unwrap();
        let photo = ReferencePhoto::from_path(&png).unwrap();
        assert_eq!(photo.mime_type.as_deref(), Some("image/png"));
        assert_eq!(photo.filename, "me.PNG");
        assert_eq!(decode_photo(&photo).unwrap().get_pixel(0, 0)[0], 7);

        let heif = dir.path().join("me.heic");
        std::fs::write(&heif, b"x").unwrap();
        assert!(ReferencePhoto::from_path(&heif).unwrap().is_heif());
    }
}
