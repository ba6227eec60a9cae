use ndarray::{Array, IxDyn};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "ort-backend")]
pub mod ort;

/// Where the model runs. `Auto` resolves to CUDA when it is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Auto,
    Cpu,
    Cuda,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Auto => "auto",
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            other => anyhow::bail!(
                "{} is not a supported device. Use `auto`, `cpu` or `cuda`.",
                other
            ),
        }
    }
}

pub trait InferenceBackend {
    fn load_model(path: &str, device: Device) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Run the model on a `[1, 3, H, W]` tensor
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput>;

    /// Device actually in use after provider resolution (never `Auto`)
    fn device(&self) -> Device;

    /// Raw `names` entry from the model metadata, if the export embedded one
    fn embedded_class_names(&self) -> Option<String> {
        None
    }
}

pub struct InferenceOutput {
    pub predictions: ndarray::ArrayD<f32>, // [1, 4+nc, N] | [1, N, 5+nc] | [1, N, 6]
}
