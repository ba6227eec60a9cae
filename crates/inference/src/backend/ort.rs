use super::{Device, InferenceBackend, InferenceOutput};
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{CUDAExecutionProvider, ExecutionProvider},
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};

/// Tensor names used by Ultralytics ONNX exports
const INPUT_NAME: &str = "images";
const OUTPUT_NAME: &str = "output0";
const NAMES_METADATA_KEY: &str = "names";

pub struct OrtBackend {
    session: Session,
    device: Device,
}

impl OrtBackend {
    fn cuda_available() -> bool {
        match CUDAExecutionProvider::default().is_available() {
            Ok(available) => available,
            Err(e) => {
                tracing::debug!(error = %e, "Could not query CUDA execution provider");
                false
            }
        }
    }
}

impl InferenceBackend for OrtBackend {
    fn load_model(path: &str, device: Device) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?;

        let device = match device {
            Device::Auto if Self::cuda_available() => Device::Cuda,
            Device::Auto => Device::Cpu,
            explicit => explicit,
        };

        match device {
            Device::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder = builder.with_execution_providers([
                    CUDAExecutionProvider::default()
                        .with_device_id(0)
                        .build()
                        .error_on_failure(),
                ])?;
            }
            _ => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder.commit_from_file(path)?;

        tracing::info!(path, device = %device, "Model loaded");
        Ok(Self { session, device })
    }

    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        let outputs = self.session.run(ort::inputs![
            INPUT_NAME => TensorRef::from_array_view(images.view())?
        ])?;

        let predictions = outputs[OUTPUT_NAME].try_extract_array::<f32>()?;

        Ok(InferenceOutput {
            predictions: predictions.into_owned(),
        })
    }

    fn device(&self) -> Device {
        self.device
    }

    fn embedded_class_names(&self) -> Option<String> {
        let metadata = match self.session.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read model metadata");
                return None;
            }
        };

        match metadata.custom(NAMES_METADATA_KEY) {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read class names from model metadata");
                None
            }
        }
    }
}
