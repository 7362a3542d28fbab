//! Offscreen rasterisation surface.
//!
//! A [`Surface`] is an RGBA pixel buffer sized to the video's native
//! resolution. The media resource draws its currently displayed frame into
//! it, and the surface encodes itself as a lossless PNG.

use std::io::Cursor;

use image::{ImageFormat, RgbaImage, imageops::FilterType};

use crate::error::EndframeError;

/// Media type of every artifact this crate produces.
pub const ARTIFACT_MEDIA_TYPE: &str = "image/png";

/// File extension matching [`ARTIFACT_MEDIA_TYPE`].
pub const ARTIFACT_EXTENSION: &str = "png";

/// An offscreen RGBA pixel buffer.
#[derive(Debug, Clone)]
pub struct Surface {
    pixels: RgbaImage,
}

impl Surface {
    /// Allocate a transparent surface. Returns `None` for a zero-sized
    /// surface, which has no drawable context.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            pixels: RgbaImage::new(width, height),
        })
    }

    /// Surface width in pixels.
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Surface height in pixels.
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Draw `frame` over the whole surface, stretching it if its size differs.
    pub fn draw(&mut self, frame: &RgbaImage) {
        if frame.dimensions() == self.pixels.dimensions() {
            self.pixels.copy_from_slice(frame.as_raw());
        } else {
            self.pixels = image::imageops::resize(
                frame,
                self.pixels.width(),
                self.pixels.height(),
                FilterType::Triangle,
            );
        }
    }

    /// Read-only view of the pixels.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Encode the surface contents as PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>, EndframeError> {
        let mut encoded = Cursor::new(Vec::new());
        self.pixels.write_to(&mut encoded, ImageFormat::Png)?;
        Ok(encoded.into_inner())
    }
}
