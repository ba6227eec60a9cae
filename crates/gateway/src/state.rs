use crate::metrics::Metrics;
use crate::uploads::UploadStore;
use ab_glyph::FontArc;
use inference::{ClassNames, Detector, Device, InferenceBackend};
use posts::PostStore;
use std::sync::{Arc, Mutex};

pub struct AppState<B: InferenceBackend> {
    pub detector: Arc<Mutex<Detector<B>>>,
    pub device: Device,
    pub model_name: Arc<str>,
    pub class_names: Arc<ClassNames>,
    pub posts: Arc<PostStore>,
    pub uploads: Arc<UploadStore>,
    pub font: Option<FontArc>,
    pub metrics: Arc<Metrics>,
}

impl<B: InferenceBackend> AppState<B> {
    pub fn new(
        detector: Detector<B>,
        posts: PostStore,
        uploads: UploadStore,
        font: Option<FontArc>,
    ) -> Self {
        Self {
            device: detector.device(),
            model_name: Arc::from(detector.model_name()),
            class_names: Arc::new(detector.class_names().clone()),
            detector: Arc::new(Mutex::new(detector)),
            posts: Arc::new(posts),
            uploads: Arc::new(uploads),
            font,
            metrics: Arc::new(Metrics::new()),
        }
    }
}

// Derive would require `B: Clone`
impl<B: InferenceBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            detector: Arc::clone(&self.detector),
            device: self.device,
            model_name: Arc::clone(&self.model_name),
            class_names: Arc::clone(&self.class_names),
            posts: Arc::clone(&self.posts),
            uploads: Arc::clone(&self.uploads),
            font: self.font.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}
