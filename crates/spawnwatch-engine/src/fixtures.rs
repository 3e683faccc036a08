use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

/// A 37x53 gradient whose colours depend on `seed`.
pub(crate) fn sample_image(seed: u8) -> RgbImage {
    let seed = seed as u32;
    RgbImage::from_fn(37, 53, |x, y| {
        Rgb([
            ((x * 7 + seed * 31) % 256) as u8,
            ((y * 5 + seed * 57) % 256) as u8,
            ((x * y + seed * 13) % 256) as u8,
        ])
    })
}

pub(crate) fn png_bytes(seed: u8) -> anyhow::Result<Vec<u8>> {
    encode(seed, ImageFormat::Png)
}

pub(crate) fn bmp_bytes(seed: u8) -> anyhow::Result<Vec<u8>> {
    encode(seed, ImageFormat::Bmp)
}

fn encode(seed: u8, format: ImageFormat) -> anyhow::Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(sample_image(seed)).write_to(&mut out, format)?;
    Ok(out.into_inner())
}
