use crate::{
    backend::{Device, InferenceBackend, InferenceOutput},
    config::InferenceConfig,
    detection::{Detection, DetectionReport},
    labels::ClassNames,
    processing::post::{PostProcessor, TransformParams},
};
use anyhow::Context;
use common::span;
use image::RgbImage;
use preprocess::{LetterboxPreProcessor, Preprocess, PreprocessResult};

/// Letterbox, run the model, decode. One image at a time.
pub struct Detector<B: InferenceBackend> {
    backend: B,
    preprocessor: LetterboxPreProcessor,
    postprocessor: PostProcessor,
    class_names: ClassNames,
    model_name: String,
}

impl<B: InferenceBackend> Detector<B> {
    pub fn new(backend: B, config: &InferenceConfig, class_names: ClassNames) -> Self {
        let postprocessor = PostProcessor::new(
            config.confidence_threshold,
            config.iou_threshold,
            config.max_detections,
        )
        .with_output_format(config.output_format);

        Self {
            backend,
            preprocessor: LetterboxPreProcessor::new(config.input_size),
            postprocessor,
            class_names,
            model_name: config.model_name(),
        }
    }

    /// Load the backend and resolve class names: an explicit labels file wins
    /// over names embedded in the model.
    pub fn load(config: &InferenceConfig) -> anyhow::Result<Self> {
        tracing::info!(model_path = %config.model_path, "Loading inference model");
        let backend = B::load_model(&config.model_path, config.device)
            .with_context(|| format!("failed to load model {}", config.model_path))?;

        let class_names = match &config.labels_path {
            Some(path) => ClassNames::from_file(path)
                .with_context(|| format!("failed to read labels from {}", path))?,
            None => match backend.embedded_class_names() {
                Some(raw) => ClassNames::parse_metadata(&raw).unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Ignoring unreadable class names in model metadata");
                    ClassNames::default()
                }),
                None => ClassNames::default(),
            },
        };

        tracing::info!(
            classes = class_names.len(),
            device = %backend.device(),
            "Model loaded successfully"
        );

        Ok(Self::new(backend, config, class_names))
    }

    #[tracing::instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn detect(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Detection>> {
        let (width, height) = image.dimensions();

        let PreprocessResult {
            tensor,
            scale,
            offset_x,
            offset_y,
        } = self.preprocessor.preprocess(image.as_raw(), width, height)?;

        let InferenceOutput { predictions } = {
            let _s = span!("model_inference");
            self.backend.infer(&tensor)?
        };

        let transform = TransformParams {
            orig_width: width,
            orig_height: height,
            scale,
            offset_x,
            offset_y,
        };

        let detections = self
            .postprocessor
            .parse_detections(&predictions.view(), &transform)?;

        tracing::debug!(detections = detections.len(), "Image processed");

        Ok(detections)
    }

    /// Detect and package the result in unit coordinates.
    pub fn report(&mut self, image: &RgbImage) -> anyhow::Result<(Vec<Detection>, DetectionReport)> {
        let detections = self.detect(image)?;
        let report = DetectionReport::new(
            image.width(),
            image.height(),
            &detections,
            &self.class_names,
        );
        Ok((detections, report))
    }

    pub fn class_names(&self) -> &ClassNames {
        &self.class_names
    }

    pub fn device(&self) -> Device {
        self.backend.device()
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}
