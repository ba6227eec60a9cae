use crate::{
    annotate::{AnnotateOptions, Annotator, MAX_LINE_WIDTH},
    errors::ApiError,
    imaging::{self, DEFAULT_JPEG_QUALITY, EncodeFormat},
    state::AppState,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Query, State},
};
use image::RgbImage;
use inference::{Detection, DetectionReport, InferenceBackend};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError};
use std::time::Instant;

/// Query string of `/detect_image`. Values stay raw so that bad input can be
/// ignored or rejected per parameter.
#[derive(Debug, Default, Deserialize)]
pub struct AnnotateQuery {
    pub lw: Option<String>,
    pub labels: Option<String>,
    pub conf: Option<String>,
    pub format: Option<String>,
    pub quality: Option<String>,
}

impl AnnotateQuery {
    pub fn options(&self) -> AnnotateOptions {
        AnnotateOptions {
            line_width: self
                .lw
                .as_deref()
                .and_then(|lw| lw.trim().parse::<i64>().ok())
                .filter(|lw| *lw > 0)
                .map(|lw| lw.min(i64::from(MAX_LINE_WIDTH)) as u32),
            show_labels: self.labels.as_deref() != Some("0"),
            show_confidence: self.conf.as_deref() != Some("0"),
        }
    }

    pub fn encode_format(&self) -> Result<EncodeFormat, ApiError> {
        let format = self.format.as_deref().unwrap_or("jpeg").to_lowercase();
        if format != "jpg" && format != "jpeg" {
            return Ok(EncodeFormat::Png);
        }

        let quality = match self.quality.as_deref() {
            None => DEFAULT_JPEG_QUALITY,
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map_err(|_| ApiError::bad_request(format!("invalid quality: {}", raw)))?
                .clamp(1, 100) as u8,
        };

        Ok(EncodeFormat::Jpeg { quality })
    }
}

#[derive(Serialize)]
pub struct AnnotatedReport {
    #[serde(flatten)]
    report: DetectionReport,
    image: String,
    mime: &'static str,
}

struct DetectionRun {
    image: RgbImage,
    detections: Vec<Detection>,
    report: DetectionReport,
}

/// First part named `file` that carries a filename.
async fn read_upload(mut multipart: Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") && field.file_name().is_some() {
            return Ok(field.bytes().await?);
        }
    }
    Err(ApiError::bad_request("missing file field"))
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        f()
    })
    .await
    .map_err(|e| ApiError::internal(format!("worker task failed: {}", e)))?
}

async fn decode_and_detect<B>(
    state: &AppState<B>,
    multipart: Multipart,
) -> Result<DetectionRun, ApiError>
where
    B: InferenceBackend + Send + 'static,
{
    let bytes = read_upload(multipart).await?;
    let detector = Arc::clone(&state.detector);

    blocking(move || {
        let image = imaging::decode_rgb(&bytes)?;
        let mut detector = detector.lock().unwrap_or_else(PoisonError::into_inner);
        let (detections, report) = detector
            .report(&image)
            .map_err(|e| ApiError::internal(format!("inference failed: {:#}", e)))?;
        Ok(DetectionRun {
            image,
            detections,
            report,
        })
    })
    .await
}

/// Every outcome, including a missing file part, is recorded.
async fn run_detection<B>(
    state: &AppState<B>,
    endpoint: &'static str,
    multipart: Multipart,
) -> Result<DetectionRun, ApiError>
where
    B: InferenceBackend + Send + 'static,
{
    let started = Instant::now();
    let result = decode_and_detect(state, multipart).await;

    match &result {
        Ok(run) => {
            state
                .metrics
                .record_detection(endpoint, started.elapsed(), run.detections.len());
            tracing::info!(
                endpoint,
                width = run.report.width,
                height = run.report.height,
                detections = run.detections.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Detection complete"
            );
        }
        Err(_) => state.metrics.record_detection_failure(endpoint),
    }

    result
}

#[tracing::instrument(skip_all)]
pub async fn detect<B>(
    State(state): State<AppState<B>>,
    multipart: Multipart,
) -> Result<Json<DetectionReport>, ApiError>
where
    B: InferenceBackend + Send + 'static,
{
    let run = run_detection(&state, "detect", multipart).await?;
    Ok(Json(run.report))
}

#[tracing::instrument(skip_all)]
pub async fn detect_image<B>(
    State(state): State<AppState<B>>,
    Query(query): Query<AnnotateQuery>,
    multipart: Multipart,
) -> Result<Json<AnnotatedReport>, ApiError>
where
    B: InferenceBackend + Send + 'static,
{
    let DetectionRun {
        image,
        detections,
        report,
    } = run_detection(&state, "detect_image", multipart).await?;

    let format = query.encode_format()?;
    let options = query.options();

    let class_names = Arc::clone(&state.class_names);
    let font = state.font.clone();

    let encoded = blocking(move || {
        let annotated = Annotator::new(&class_names, font.as_ref(), options).render(&image, &detections);
        Ok(imaging::encode(&annotated, format)?)
    })
    .await?;

    Ok(Json(AnnotatedReport {
        report,
        image: imaging::to_data_uri(&encoded, format.mime()),
        mime: format.mime(),
    }))
}
