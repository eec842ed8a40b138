use crate::types::Detection;
use std::collections::HashMap;

/// Unique detections per gallery image, keyed by image identity.
///
/// Owned by one [`GallerySession`](crate::orchestrator::GallerySession) and
/// replaced wholesale after each scan. Entries are never invalidated
/// individually: if gallery content changes behind a URL, call `clear`.
#[derive(Debug, Clone, Default)]
pub struct DetectionCache {
    entries: HashMap<String, Vec<Detection>>,
}

impl DetectionCache {
    pub fn get(&self, identity: &str) -> Option<&[Detection]> {
        self.entries.get(identity).map(Vec::as_slice)
    }

    pub fn insert(&mut self, identity: impl Into<String>, detections: Vec<Detection>) {
        self.entries.insert(identity.into(), detections);
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
