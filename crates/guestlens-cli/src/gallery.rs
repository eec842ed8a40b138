use anyhow::{Context, Result};
use guestlens_core::GalleryImage;
use std::path::Path;

/// Read a gallery listing (JSON array of images), newest upload first.
pub fn load_listing(path: &Path) -> Result<Vec<GalleryImage>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read gallery listing {}", path.display()))?;
    let mut images: Vec<GalleryImage> = serde_json::from_str(&content)
        .with_context(|| format!("invalid gallery listing {}", path.display()))?;
    sort_newest_first(&mut images);
    tracing::info!(images = images.len(), path = %path.display(), "gallery listing loaded");
    Ok(images)
}

/// Images without an upload time go last, in listing order.
pub fn sort_newest_first(images: &mut [GalleryImage]) {
    images.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
}
