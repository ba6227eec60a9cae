//! Draw detections onto an image.

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use inference::{ClassNames, Detection};
use std::path::Path;

const PALETTE: [[u8; 3]; 20] = [
    [0x04, 0x2A, 0xFF],
    [0x0B, 0xDB, 0xEB],
    [0xF3, 0xF3, 0xF3],
    [0x00, 0xDF, 0xB7],
    [0x11, 0x1F, 0x68],
    [0xFF, 0x6F, 0xDD],
    [0xFF, 0x44, 0x4F],
    [0xCC, 0xED, 0x00],
    [0x00, 0xF3, 0x44],
    [0xBD, 0x00, 0xFF],
    [0x00, 0xB4, 0xFF],
    [0xDD, 0x00, 0xBA],
    [0x00, 0xFF, 0xFF],
    [0x26, 0xC0, 0x00],
    [0x01, 0xFF, 0xB3],
    [0x7D, 0x24, 0xFF],
    [0x7B, 0x00, 0x68],
    [0xFF, 0x1B, 0x6C],
    [0xFC, 0x6D, 0x2F],
    [0xA2, 0xFF, 0x0B],
];

/// Upper bound on box outline thickness in pixels.
pub const MAX_LINE_WIDTH: u32 = 100;

const TEXT_LIGHT: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT_DARK: Rgb<u8> = Rgb([0, 0, 0]);

pub fn class_color(class_id: u32) -> Rgb<u8> {
    Rgb(PALETTE[class_id as usize % PALETTE.len()])
}

/// Dark text on bright label backgrounds.
fn text_color(background: Rgb<u8>) -> Rgb<u8> {
    let [r, g, b] = background.0;
    let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    if luma > 160.0 { TEXT_DARK } else { TEXT_LIGHT }
}

/// `max(round((w + h) / 2 * 0.003), 2)`
pub fn default_line_width(width: u32, height: u32) -> u32 {
    (((width as f64 + height as f64) / 2.0 * 0.003).round() as u32).max(2)
}

/// Keep the outline within `1..=MAX_LINE_WIDTH` and no thicker than the image.
fn clamp_line_width(line_width: u32, width: u32, height: u32) -> u32 {
    let limit = width.min(height).clamp(1, MAX_LINE_WIDTH);
    line_width.clamp(1, limit)
}

fn font_size(width: u32, height: u32) -> f32 {
    ((width as f64 + height as f64) / 2.0 * 0.035).round().max(12.0) as f32
}

/// Load a TTF/OTF font for label text. Missing or invalid fonts yield `None`.
pub fn load_font(path: &Path) -> Option<FontArc> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Annotation font unavailable, labels disabled");
            return None;
        }
    };

    match FontArc::try_from_vec(data) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Invalid annotation font, labels disabled");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotateOptions {
    /// Box outline thickness; derived from the image size when `None`
    pub line_width: Option<u32>,
    pub show_labels: bool,
    pub show_confidence: bool,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            line_width: None,
            show_labels: true,
            show_confidence: true,
        }
    }
}

pub struct Annotator<'a> {
    names: &'a ClassNames,
    font: Option<&'a FontArc>,
    options: AnnotateOptions,
}

impl<'a> Annotator<'a> {
    pub fn new(names: &'a ClassNames, font: Option<&'a FontArc>, options: AnnotateOptions) -> Self {
        Self {
            names,
            font,
            options,
        }
    }

    pub fn label_text(&self, detection: &Detection) -> Option<String> {
        if !self.options.show_labels {
            return None;
        }
        let name = self.names.label(detection.class_id);
        Some(if self.options.show_confidence {
            format!("{} {:.2}", name, detection.confidence)
        } else {
            name
        })
    }

    /// Copy of `image` with every detection drawn on it.
    #[tracing::instrument(skip_all, fields(detections = detections.len()))]
    pub fn render(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = image.clone();
        let (width, height) = canvas.dimensions();
        let line_width = clamp_line_width(
            self.options
                .line_width
                .unwrap_or_else(|| default_line_width(width, height)),
            width,
            height,
        );
        let scale = PxScale::from(font_size(width, height));

        for detection in detections {
            let color = class_color(detection.class_id);
            draw_box(&mut canvas, detection, line_width, color);

            if let (Some(font), Some(text)) = (self.font, self.label_text(detection)) {
                draw_label(&mut canvas, detection, &text, font, scale, line_width, color);
            }
        }

        canvas
    }
}

fn draw_box(canvas: &mut RgbImage, detection: &Detection, line_width: u32, color: Rgb<u8>) {
    let x1 = detection.x1.round() as i64;
    let y1 = detection.y1.round() as i64;
    let x2 = detection.x2.round() as i64;
    let y2 = detection.y2.round() as i64;

    // Outline grows inward from the box edge
    for inset in 0..i64::from(line_width) {
        let w = x2 - x1 - 2 * inset;
        let h = y2 - y1 - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let (Ok(x), Ok(y), Ok(w), Ok(h)) = (
            i32::try_from(x1 + inset),
            i32::try_from(y1 + inset),
            u32::try_from(w),
            u32::try_from(h),
        ) else {
            break;
        };
        draw_hollow_rect_mut(canvas, Rect::at(x, y).of_size(w, h), color);
    }
}

fn draw_label(
    canvas: &mut RgbImage,
    detection: &Detection,
    text: &str,
    font: &FontArc,
    scale: PxScale,
    line_width: u32,
    color: Rgb<u8>,
) {
    let (text_w, text_h) = text_size(scale, font, text);
    let pad = (line_width / 2).max(1);
    let label_w = text_w.saturating_add(pad.saturating_mul(2)).max(1);
    let label_h = text_h.saturating_add(pad.saturating_mul(2)).max(1);

    let x = (detection.x1.round() as i32).max(0);
    let top = detection.y1.round() as i32;
    // Above the box when there is room, otherwise just inside its top edge
    let above = i64::from(top) - i64::from(label_h);
    let y = if above >= 0 { above as i32 } else { top.max(0) };

    let inset = i32::try_from(pad).unwrap_or(i32::MAX);
    draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(label_w, label_h), color);
    draw_text_mut(
        canvas,
        text_color(color),
        x.saturating_add(inset),
        y.saturating_add(inset),
        scale,
        font,
        text,
    );
}
