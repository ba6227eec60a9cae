//! Image bytes to RGB8, honoring the EXIF orientation tag.

use image::{DynamicImage, ImageDecoder, ImageError, ImageReader, RgbImage};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty file")]
    Empty,

    #[error("cannot open image: {0}")]
    Image(#[from] ImageError),
}

/// Sniff the format, decode, apply the EXIF orientation and convert to RGB8.
#[tracing::instrument(skip_all, fields(bytes = bytes.len()))]
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(ImageError::IoError)?;

    let mut decoder = reader.into_decoder()?;
    let orientation = decoder.orientation()?;

    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);

    Ok(image.to_rgb8())
}

/// Read and decode an image file.
pub fn open_rgb(path: &Path) -> anyhow::Result<RgbImage> {
    let bytes = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
    decode_rgb(&bytes).map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))
}
