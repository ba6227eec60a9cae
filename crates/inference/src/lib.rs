pub mod backend;
pub mod config;
pub mod decode;
pub mod detection;
pub mod detector;
pub mod labels;
pub mod processing;

#[cfg(not(feature = "ort-backend"))]
compile_error!("The 'ort-backend' feature must be enabled");

// Re-export commonly used types for convenience
pub use backend::{Device, InferenceBackend, InferenceOutput};
pub use config::{InferenceConfig, OutputFormat};
pub use decode::{DecodeError, decode_rgb, open_rgb};
pub use detection::{Detection, DetectionReport, NormalizedBox};
pub use detector::Detector;
pub use labels::ClassNames;
