pub mod letterbox;

use ndarray::{Array, IxDyn};

pub use letterbox::LetterboxPreProcessor;

/// Square input most YOLO exports are traced with.
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (640, 640);

/// Model-ready tensor plus what is needed to map boxes back onto the source image.
#[derive(Debug)]
pub struct PreprocessResult {
    /// `[1, 3, H, W]` RGB tensor, values in `0.0..=1.0`
    pub tensor: Array<f32, IxDyn>,
    /// Scale factor applied during letterboxing
    pub scale: f32,
    /// Left padding (in model input pixels)
    pub offset_x: f32,
    /// Top padding (in model input pixels)
    pub offset_y: f32,
}

/// Trait for image preprocessing implementations
pub trait Preprocess {
    /// Preprocess an RGB image (HWC, 3 bytes per pixel) for inference
    fn preprocess(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult>;

    /// Get the input size this preprocessor targets
    fn input_size(&self) -> (u32, u32);
}
