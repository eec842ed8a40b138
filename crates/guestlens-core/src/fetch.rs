use crate::error::ImageLoadError;
use image::RgbImage;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Gallery thumbnails are well under this; full-size uploads can be large.
pub const DEFAULT_MAX_BYTES: u64 = 32 * 1024 * 1024;

/// Loads and decodes one gallery image.
pub trait ImageFetcher {
    fn fetch(&self, url: &str) -> Result<RgbImage, ImageLoadError>;
}

/// Fetches `http(s)://` URLs over the network and `file://` URLs or bare
/// paths from the local filesystem.
pub struct HttpImageFetcher {
    agent: ureq::Agent,
    max_bytes: u64,
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, ImageLoadError> {
        let response = self.agent.get(url).call().map_err(|e| ImageLoadError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(self.max_bytes + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| ImageLoadError::Http {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(ImageLoadError::TooLarge {
                url: url.to_string(),
                limit: self.max_bytes,
            });
        }
        Ok(bytes)
    }

    fn read_local(&self, path: &Path) -> Result<Vec<u8>, ImageLoadError> {
        let read_err = |source| ImageLoadError::Read {
            path: path.display().to_string(),
            source,
        };
        let len = std::fs::metadata(path).map_err(read_err)?.len();
        if len > self.max_bytes {
            return Err(ImageLoadError::TooLarge {
                url: path.display().to_string(),
                limit: self.max_bytes,
            });
        }
        std::fs::read(path).map_err(read_err)
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, url: &str) -> Result<RgbImage, ImageLoadError> {
        let bytes = if url.starts_with("http://") || url.starts_with("https://") {
            self.download(url)?
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            self.read_local(Path::new(path))?
        };
        tracing::trace!(url, bytes = bytes.len(), "image fetched");
        decode_image(url, &bytes)
    }
}

/// Decode encoded image bytes (format sniffed from content) to RGB.
pub fn decode_image(name: &str, bytes: &[u8]) -> Result<RgbImage, ImageLoadError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|source| ImageLoadError::Decode {
            name: name.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tagged_png;

    #[test]
    fn test_fetch_local_path_and_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guest.png");
        std::fs::write(&path, tagged_png(42)).unwrap();
        let fetcher = HttpImageFetcher::default();

        let by_path = fetcher.fetch(path.to_str().unwrap()).unwrap();
        assert_eq!(by_path.get_pixel(0, 0)[0], 42);

        let url = format!("file://{}", path.display());
        let by_url = fetcher.fetch(&url).unwrap();
        assert_eq!(by_url.dimensions(), (4, 4));
    }

    #[test]
    fn test_fetch_missing_file() {
        let result = HttpImageFetcher::default().fetch("/nonexistent/guestlens/a.jpg");
        assert!(matches!(result, Err(ImageLoadError::Read { .. })));
    }

    #[test]
    fn test_fetch_respects_size_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        std::fs::write(&path, tagged_png(1)).unwrap();

        let fetcher = HttpImageFetcher::default().with_max_bytes(8);
        let result = fetcher.fetch(path.to_str().unwrap());
        assert!(matches!(result, Err(ImageLoadError::TooLarge { limit: 8, .. })));
    }

    #[test]
    fn test_decode_garbage() {
        let result = decode_image("junk.jpg", b"definitely not an image");
        assert!(matches!(result, Err(ImageLoadError::Decode { .. })));
    }
}
