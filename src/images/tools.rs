use image::{Rgba, RgbaImage};
use thiserror::Error;

use crate::models::Image;

/// Side length of a raw skin stream.
pub const RAW_SIZE: u32 = 64;

/// Byte length of a raw skin stream: 64 x 64 pixels, 4 bytes each.
pub const RAW_LEN: usize = (RAW_SIZE * RAW_SIZE * 4) as usize;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Request failed with status: {0}")]
    Status(reqwest::StatusCode),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Raw stream has {actual} bytes, expected {expected}")]
    RawLength { expected: usize, actual: usize },
}

/// Decode a headerless 64x64 stream of R, G, B, A bytes, row-major from the
/// top-left corner.
///
/// Anything other than exactly [`RAW_LEN`] bytes is rejected, so a truncated
/// stream never yields a partial image.
pub fn decode_raw(data: &[u8]) -> Result<Image, FetchError> {
    if data.len() != RAW_LEN {
        return Err(FetchError::RawLength {
            expected: RAW_LEN,
            actual: data.len(),
        });
    }

    // Channel order of the stream matches RgbaImage's layout, so the bytes
    // become the pixel buffer as-is.
    RgbaImage::from_raw(RAW_SIZE, RAW_SIZE, data.to_vec())
        .map(Image::from_rgba)
        .ok_or(FetchError::RawLength {
            expected: RAW_LEN,
            actual: data.len(),
        })
}

/// Resize with nearest-neighbor sampling.
///
/// Destination pixel (x, y) takes the colour of source pixel
/// (x * W / w, y * H / h), rounded down. No blending happens, so upscaling
/// repeats pixels and downscaling drops them.
pub fn scale(src: &Image, width: u32, height: u32) -> Image {
    let (src_width, src_height) = src.dimensions();
    if src_width == 0 || src_height == 0 {
        return Image::from_rgba(RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0])));
    }

    let source = src.as_rgba();
    let ys: Vec<u32> = (0..height)
        .map(|y| (y as u64 * src_height as u64 / height as u64) as u32)
        .collect();

    let mut output = RgbaImage::new(width, height);
    for x in 0..width {
        let src_x = (x as u64 * src_width as u64 / width as u64) as u32;
        for (y, &src_y) in ys.iter().enumerate() {
            output.put_pixel(x, y as u32, *source.get_pixel(src_x, src_y));
        }
    }

    Image::from_rgba(output)
}
