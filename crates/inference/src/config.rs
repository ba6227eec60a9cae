use crate::backend::Device;
use anyhow::Context;
use std::env;
use std::path::Path;
use std::str::FromStr;

pub use common::Environment;

/// How to read the model's output tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Guess from the tensor shape
    Auto,
    /// `[1, 4 + nc, N]`, YOLOv8 / YOLO11
    AnchorMajor,
    /// `[1, N, 5 + nc]` with an objectness column, YOLOv5
    Objectness,
    /// `[1, N, 6]` already suppressed boxes, YOLOv10 / YOLO26
    EndToEnd,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "" => Ok(OutputFormat::Auto),
            "v8" | "yolov8" | "yolo11" | "anchor-major" => Ok(OutputFormat::AnchorMajor),
            "v5" | "yolov5" | "objectness" => Ok(OutputFormat::Objectness),
            "e2e" | "end-to-end" | "yolov10" | "yolo26" => Ok(OutputFormat::EndToEnd),
            other => anyhow::bail!("{} is not a supported output format", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub environment: Environment,
    pub model_path: String,
    pub input_size: (u32, u32),
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub device: Device,
    pub labels_path: Option<String>,
    pub output_format: OutputFormat,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            model_path: "./best.onnx".to_string(),
            input_size: (640, 640),
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
            device: Device::Auto,
            labels_path: None,
            output_format: OutputFormat::Auto,
        }
    }
}

/// Parse an optional environment variable, keeping the default when unset.
fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}: {}", raw, e))
            .with_context(|| format!("invalid value for {}", name)),
        Err(_) => Ok(default),
    }
}

impl InferenceConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let img_size: u32 = parse_var("IMG_SIZE", defaults.input_size.0)?;

        let config = Self {
            environment: Environment::from_env(),
            model_path: env::var("YOLO_WEIGHTS").unwrap_or(defaults.model_path),
            input_size: (img_size, img_size),
            confidence_threshold: parse_var("CONF_THRES", defaults.confidence_threshold)?,
            iou_threshold: parse_var("IOU_THRES", defaults.iou_threshold)?,
            max_detections: parse_var("MAX_DETECTIONS", defaults.max_detections)?,
            device: parse_var("INFERENCE_DEVICE", defaults.device)?,
            labels_path: env::var("LABELS_PATH").ok().filter(|p| !p.trim().is_empty()),
            output_format: parse_var("YOLO_OUTPUT_FORMAT", defaults.output_format)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.input_size.0 == 0 || self.input_size.1 == 0 {
            anyhow::bail!("IMG_SIZE must be positive");
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            anyhow::bail!(
                "CONF_THRES must be within 0..=1, got {}",
                self.confidence_threshold
            );
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            anyhow::bail!("IOU_THRES must be within 0..=1, got {}", self.iou_threshold);
        }
        if self.max_detections == 0 {
            anyhow::bail!("MAX_DETECTIONS must be positive");
        }
        Ok(())
    }

    /// File name of the weights, as reported by the health endpoint.
    pub fn model_name(&self) -> String {
        Path::new(&self.model_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.model_path.clone())
    }
}
