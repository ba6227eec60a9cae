use clap::Parser;
use common::{Environment, setup_cli_logging};
use inference::{Detector, Device, InferenceConfig, backend::ort::OrtBackend, open_rgb};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "detect")]
#[command(about = "Run YOLO object detection on a single image")]
struct Args {
    /// Image to analyze
    image: PathBuf,

    /// ONNX weights (defaults to YOLO_WEIGHTS or ./best.onnx)
    #[arg(short, long)]
    model: Option<String>,

    /// Confidence threshold
    #[arg(long)]
    conf: Option<f32>,

    /// IoU threshold for NMS
    #[arg(long)]
    iou: Option<f32>,

    /// Square model input size
    #[arg(long)]
    img_size: Option<u32>,

    /// auto, cpu or cuda
    #[arg(long)]
    device: Option<Device>,

    /// Text file with one class name per line
    #[arg(long)]
    labels: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    setup_cli_logging(Environment::from_env(), args.verbose);

    let mut config = InferenceConfig::from_env()?;
    if let Some(model) = args.model {
        config.model_path = model;
    }
    if let Some(conf) = args.conf {
        config.confidence_threshold = conf;
    }
    if let Some(iou) = args.iou {
        config.iou_threshold = iou;
    }
    if let Some(size) = args.img_size {
        config.input_size = (size, size);
    }
    if let Some(device) = args.device {
        config.device = device;
    }
    if args.labels.is_some() {
        config.labels_path = args.labels;
    }
    config.validate()?;

    tracing::debug!(config = ?config, "Loaded configuration");

    let image = open_rgb(&args.image)?;

    let mut detector = Detector::<OrtBackend>::load(&config)?;
    let (_, report) = detector.report(&image)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
