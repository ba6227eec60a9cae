//! Upload decoding and annotated image encoding.

use base64::{Engine, engine::general_purpose::STANDARD};
use image::{
    ImageError, RgbImage,
    codecs::{jpeg::JpegEncoder, png::PngEncoder},
};
use inference::DecodeError;
use thiserror::Error;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("cannot encode image: {0}")]
    Encode(#[source] ImageError),
}

/// Upload bytes to an upright RGB8 image.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, ImagingError> {
    Ok(inference::decode_rgb(bytes)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeFormat {
    Jpeg { quality: u8 },
    Png,
}

impl EncodeFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            EncodeFormat::Jpeg { .. } => "image/jpeg",
            EncodeFormat::Png => "image/png",
        }
    }
}

pub fn encode(image: &RgbImage, format: EncodeFormat) -> Result<Vec<u8>, ImagingError> {
    let mut buf = Vec::new();
    match format {
        EncodeFormat::Jpeg { quality } => {
            image.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        }
        EncodeFormat::Png => image.write_with_encoder(PngEncoder::new(&mut buf)),
    }
    .map_err(ImagingError::Encode)?;
    Ok(buf)
}

pub fn to_data_uri(bytes: &[u8], mime: &str) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}
