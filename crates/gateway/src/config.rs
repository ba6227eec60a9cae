use std::env;
use std::path::PathBuf;

pub use common::Environment;

pub const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub environment: Environment,
    pub addr: String,
    pub data_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub font_path: PathBuf,
    pub otel_endpoint: Option<String>,
}

impl GatewayConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Self {
        let environment = Environment::from_env();

        let addr = env::var("GATEWAY_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());

        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(20 * 1024 * 1024);

        let font_path = env::var("ANNOTATION_FONT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_FONT_PATH));

        let otel_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Self {
            environment,
            addr,
            data_dir,
            max_upload_bytes,
            font_path,
            otel_endpoint,
        }
    }

    pub fn posts_path(&self) -> PathBuf {
        self.data_dir.join("posts.json")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            addr: "0.0.0.0:8000".to_string(),
            data_dir: PathBuf::from("."),
            max_upload_bytes: 20 * 1024 * 1024,
            font_path: PathBuf::from(DEFAULT_FONT_PATH),
            otel_endpoint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_paths_follow_data_dir() {
        let config = GatewayConfig {
            data_dir: PathBuf::from("/var/lib/ecomove"),
            ..GatewayConfig::default()
        };
        assert_eq!(config.posts_path(), PathBuf::from("/var/lib/ecomove/posts.json"));
        assert_eq!(config.uploads_dir(), PathBuf::from("/var/lib/ecomove/uploads"));
    }
}
