//! Extracted frames and the naming and timing policy behind them.

use std::sync::Arc;

use crate::{
    handle::{HandleRegistry, ResourceHandle},
    surface::ARTIFACT_EXTENSION,
};

/// One captured frame.
///
/// Immutable once created. The preview handle stays live until
/// [`release`](ExtractionResult::release) is called; hosts that display the
/// frame through the handle should release it when the preview goes away.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    image_data: Arc<[u8]>,
    preview: ResourceHandle,
    file_name: String,
    timestamp: f64,
}

impl ExtractionResult {
    pub(crate) fn new(
        image_data: Arc<[u8]>,
        preview: ResourceHandle,
        file_name: String,
        timestamp: f64,
    ) -> Self {
        Self {
            image_data,
            preview,
            file_name,
            timestamp,
        }
    }

    /// Encoded PNG bytes.
    pub fn image_data(&self) -> &[u8] {
        &self.image_data
    }

    /// Shared handle to the encoded bytes.
    pub fn image_arc(&self) -> Arc<[u8]> {
        Arc::clone(&self.image_data)
    }

    /// Locator for displaying the frame.
    pub fn preview_handle(&self) -> &ResourceHandle {
        &self.preview
    }

    /// Output file name, e.g. `clip_end_2.png`.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Source time in seconds the frame was captured at.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Revoke the preview handle. Returns `false` if it was already revoked.
    pub fn release(&self, registry: &HandleRegistry) -> bool {
        registry.revoke(&self.preview)
    }
}

/// Output file name for frame `index` of `frame_count`.
///
/// Single-frame extractions carry no numeric suffix. Otherwise frame `i`
/// gets suffix `frame_count - i`, so the frame nearest the end of the video
/// (index 0) carries the highest number.
pub fn artifact_file_name(base_name: &str, frame_count: usize, index: usize) -> String {
    if frame_count > 1 {
        format!(
            "{base_name}_end_{}.{ARTIFACT_EXTENSION}",
            frame_count - index
        )
    } else {
        format!("{base_name}_end.{ARTIFACT_EXTENSION}")
    }
}

/// Seek target for frame `index`: `max(0, duration - epsilon - index * stride)`.
pub fn target_timestamp(duration: f64, index: usize, epsilon: f64, stride: f64) -> f64 {
    (duration - epsilon - index as f64 * stride).max(0.0)
}
