use crate::{DEFAULT_INPUT_SIZE, Preprocess, PreprocessResult};
use common::{span, span_debug};
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use ndarray::{Array, IxDyn};

const LETTERBOX_COLOR: u8 = 114;

/// Resizes with preserved aspect ratio onto a gray canvas, the way YOLO
/// models are trained.
pub struct LetterboxPreProcessor {
    pub input_size: (u32, u32),
    letterboxed_buffer: Vec<u8>,
    resizer: Resizer,
}

/// Geometry of a letterbox placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub scale: f32,
    pub new_width: u32,
    pub new_height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Placement {
    pub fn compute(width: u32, height: u32, input_size: (u32, u32)) -> Self {
        let scale =
            (input_size.0 as f32 / width as f32).min(input_size.1 as f32 / height as f32);
        let new_width = ((width as f32 * scale).round() as u32).clamp(1, input_size.0);
        let new_height = ((height as f32 * scale).round() as u32).clamp(1, input_size.1);

        Self {
            scale,
            new_width,
            new_height,
            offset_x: (input_size.0 - new_width) / 2,
            offset_y: (input_size.1 - new_height) / 2,
        }
    }
}

impl LetterboxPreProcessor {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            letterboxed_buffer: vec![LETTERBOX_COLOR; (input_size.0 * input_size.1 * 3) as usize],
            resizer: Resizer::new(),
        }
    }

    pub fn preprocess_rgb(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult> {
        let _s = span!("preprocess_rgb");

        tracing::trace!(
            width,
            height,
            pixel_bytes = pixels.len(),
            "Preprocessing image dimensions"
        );

        if width == 0 || height == 0 {
            anyhow::bail!("Image has no pixels: {}x{}", width, height);
        }

        let expected_size = (width as usize) * (height as usize) * 3;
        if pixels.len() != expected_size {
            anyhow::bail!(
                "Buffer size mismatch: expected {}, got {} bytes",
                expected_size,
                pixels.len()
            );
        }

        let placement = self.resize_and_letterbox(pixels, width, height)?;
        let tensor = self.normalize()?;

        Ok(PreprocessResult {
            tensor,
            scale: placement.scale,
            offset_x: placement.offset_x as f32,
            offset_y: placement.offset_y as f32,
        })
    }

    fn resize_and_letterbox(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<Placement> {
        let _s = span!("resize_and_letterbox");

        let placement = Placement::compute(width, height, self.input_size);

        let src = ImageRef::new(width, height, pixels, PixelType::U8x3)?;
        let mut resized = Image::new(placement.new_width, placement.new_height, PixelType::U8x3);

        self.resizer.resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        self.letterboxed_buffer.fill(LETTERBOX_COLOR);

        let resized_data = resized.buffer();
        let stride = (self.input_size.0 * 3) as usize;
        let row_len = (placement.new_width * 3) as usize;

        for y in 0..placement.new_height as usize {
            let src_row = y * row_len;
            let dst_row =
                (y + placement.offset_y as usize) * stride + placement.offset_x as usize * 3;

            self.letterboxed_buffer[dst_row..dst_row + row_len]
                .copy_from_slice(&resized_data[src_row..src_row + row_len]);
        }

        Ok(placement)
    }

    fn normalize(&self) -> anyhow::Result<Array<f32, IxDyn>> {
        let _s = span_debug!("normalize");

        let width = self.input_size.0 as usize;
        let height = self.input_size.1 as usize;
        let spatial = width * height;

        let mut output = vec![0.0f32; 3 * spatial];

        for (i, px) in self.letterboxed_buffer.chunks_exact(3).enumerate() {
            output[i] = px[0] as f32 / 255.0;
            output[i + spatial] = px[1] as f32 / 255.0;
            output[i + 2 * spatial] = px[2] as f32 / 255.0;
        }

        Ok(Array::from_shape_vec(
            IxDyn(&[1, 3, height, width]),
            output,
        )?)
    }
}

impl Default for LetterboxPreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}

impl Preprocess for LetterboxPreProcessor {
    fn preprocess(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult> {
        self.preprocess_rgb(pixels, width, height)
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }
}
