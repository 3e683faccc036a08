use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use spawnwatch_contracts::store::ImageDigest;
use thiserror::Error;

/// Edge length of the square every image is resized to before hashing.
pub const NORMALIZED_EDGE: u32 = 100;
/// Resampling filter used for normalization. Changing it changes every digest.
pub const NORMALIZE_FILTER: FilterType = FilterType::Triangle;

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode normalized image: {0}")]
    Encode(#[source] image::ImageError),
}

pub fn digest_image(bytes: &[u8]) -> Result<ImageDigest, DigestError> {
    let decoded = image::load_from_memory(bytes).map_err(DigestError::Decode)?;
    digest_bitmap(&decoded)
}

/// Resize to 100x100, drop to 8-bit luminance, encode as PNG and SHA-256 the
/// encoded bytes.
pub fn digest_bitmap(image: &DynamicImage) -> Result<ImageDigest, DigestError> {
    let normalized = image
        .resize_exact(NORMALIZED_EDGE, NORMALIZED_EDGE, NORMALIZE_FILTER)
        .to_luma8();
    let mut encoded = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(normalized)
        .write_to(&mut encoded, ImageFormat::Png)
        .map_err(DigestError::Encode)?;

    let mut hasher = Sha256::new();
    hasher.update(encoded.get_ref());
    Ok(ImageDigest::from_bytes(&hasher.finalize()))
}
