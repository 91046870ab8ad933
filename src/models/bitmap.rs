use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageResult, RgbaImage};

/// A decoded bitmap. Pixels are stored as RGBA, one byte per channel.
///
/// Once built the pixel buffer is never mutated, so values are shared across
/// threads behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pixels: RgbaImage,
}

impl Image {
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    /// Decode a standard image container (PNG, GIF, JPEG, BMP).
    pub fn decode(data: &[u8]) -> ImageResult<Self> {
        let img = image::load_from_memory(data)?;
        Ok(Self::from_rgba(img.to_rgba8()))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Channels of the pixel at (x, y) in R, G, B, A order.
    ///
    /// Panics when (x, y) is out of bounds.
    pub fn rgba(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels.get_pixel(x, y).0
    }

    /// The pixel at (x, y) packed as 0xAARRGGBB.
    pub fn argb(&self, x: u32, y: u32) -> u32 {
        let [r, g, b, a] = self.rgba(x, y);
        u32::from_be_bytes([a, r, g, b])
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn to_png(&self) -> ImageResult<Vec<u8>> {
        let mut output = Vec::new();
        DynamicImage::ImageRgba8(self.pixels.clone())
            .write_to(&mut Cursor::new(&mut output), image::ImageFormat::Png)?;
        Ok(output)
    }
}

/// Result of a cached lookup.
///
/// `Absent` is a real, stored answer ("looked up, nothing there"), which is
/// different from a key the cache has never seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Present(Arc<Image>),
    Absent,
}

impl Outcome {
    pub fn into_image(self) -> Option<Arc<Image>> {
        match self {
            Outcome::Present(img) => Some(img),
            Outcome::Absent => None,
        }
    }
}

impl From<Option<Image>> for Outcome {
    fn from(img: Option<Image>) -> Self {
        match img {
            Some(img) => Outcome::Present(Arc::new(img)),
            None => Outcome::Absent,
        }
    }
}
