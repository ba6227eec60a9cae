use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use gateway::{AppState, metrics::Metrics, router, uploads::UploadStore};
use image::{
    Rgb, RgbImage,
    codecs::{jpeg::JpegEncoder, png::PngEncoder},
};
use inference::{
    ClassNames, Detector, Device, InferenceBackend, InferenceConfig, InferenceOutput, OutputFormat,
};
use ndarray::{Array, IxDyn};
use opentelemetry::metrics::MeterProvider;
use opentelemetry_sdk::metrics::{
    InMemoryMetricExporter, PeriodicReader, SdkMeterProvider,
    data::{AggregatedMetrics, MetricData},
};
use posts::PostStore;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "gateway-test-boundary";
const ANCHORS: usize = 8;

/// Backend reporting a single `plastic` box centered in the model input.
struct FakeBackend;

impl InferenceBackend for FakeBackend {
    fn load_model(_path: &str, _device: Device) -> anyhow::Result<Self> {
        Ok(FakeBackend)
    }

    fn infer(&mut self, _images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        // [1, 4 + 2, ANCHORS], only anchor 0 is confident
        let mut data = vec![0.0f32; 6 * ANCHORS];
        data[0] = 320.0;
        data[ANCHORS] = 320.0;
        data[2 * ANCHORS] = 320.0;
        data[3 * ANCHORS] = 160.0;
        data[5 * ANCHORS] = 0.9;

        let predictions = Array::from_shape_vec(IxDyn(&[1, 6, ANCHORS]), data)?;
        Ok(InferenceOutput { predictions })
    }

    fn device(&self) -> Device {
        Device::Cpu
    }
}

const UPLOAD_LIMIT: usize = 20 * 1024 * 1024;

async fn test_state(dir: &TempDir) -> AppState<FakeBackend> {
    let config = InferenceConfig {
        output_format: OutputFormat::AnchorMajor,
        ..InferenceConfig::default()
    };
    let detector = Detector::new(
        FakeBackend,
        &config,
        ClassNames::from_list(["paper", "plastic"]),
    );

    let posts = PostStore::open(dir.path().join("posts.json")).await.unwrap();
    let uploads = UploadStore::open(dir.path().join("uploads")).await.unwrap();
    AppState::new(detector, posts, uploads, None)
}

async fn test_app() -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir).await;
    (router(state, UPLOAD_LIMIT), dir)
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([90, 140, 60]));
    let mut buf = Vec::new();
    image.write_with_encoder(PngEncoder::new(&mut buf)).unwrap();
    buf
}

/// JPEG whose EXIF orientation tag is set to `orientation`.
fn jpeg_with_orientation(width: u32, height: u32, orientation: u8) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([90, 140, 60]));
    let mut jpeg = Vec::new();
    image
        .write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, 90))
        .unwrap();

    #[rustfmt::skip]
    let segments: [&[u8]; 6] = [
        &[0xFF, 0xE1, 0x00, 0x22],
        b"Exif\0\0",
        &[0x4D, 0x4D, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08],
        &[0x00, 0x01],
        &[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, orientation, 0x00, 0x00],
        &[0x00, 0x00, 0x00, 0x00],
    ];

    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&segments.concat());
    out.extend_from_slice(&jpeg[2..]);
    out
}

#[derive(Clone, Copy)]
enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn multipart_request(uri: &str, parts: &[Part]) -> Request<Body> {
    Request::post(uri)
        .header(header::HOST, "example.test")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::HOST, "example.test")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

fn approx(value: &Value, expected: f64) -> bool {
    (value.as_f64().unwrap() - expected).abs() < 1e-4
}

#[tokio::test]
async fn health_reports_device_and_model() {
    let (app, _dir) = test_app().await;

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "ok", "device": "cpu", "model": "best.onnx"})
    );
}

#[tokio::test]
async fn detect_returns_normalized_boxes() {
    let (app, _dir) = test_app().await;
    let png = png_bytes(64, 32);

    let (status, body) = send(
        &app,
        multipart_request("/detect", &[Part::File("file", "bin.png", &png)]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["width"], 64);
    assert_eq!(body["height"], 32);

    let boxes = body["boxes"].as_array().unwrap();
    assert_eq!(boxes.len(), 1);
    // scale 10, offset_y 160: input box (160, 240, 480, 400) -> (16, 8, 48, 24)
    assert!(approx(&boxes[0]["x1"], 0.25));
    assert!(approx(&boxes[0]["y1"], 0.25));
    assert!(approx(&boxes[0]["x2"], 0.75));
    assert!(approx(&boxes[0]["y2"], 0.75));
    assert!(approx(&boxes[0]["confidence"], 0.9));
    assert_eq!(boxes[0]["label"], "plastic");
    assert_eq!(boxes[0]["class_id"], 1);
}

#[tokio::test]
async fn detect_rejects_bad_uploads() {
    let (app, _dir) = test_app().await;

    let (status, body) = send(
        &app,
        multipart_request("/detect", &[Part::Text("file", "not a file part")]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing file field");

    let (status, body) = send(
        &app,
        multipart_request("/detect", &[Part::File("file", "empty.jpg", b"")]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "empty file");

    let (status, body) = send(
        &app,
        multipart_request("/detect", &[Part::File("file", "notes.txt", b"hello")]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("cannot open image: ")
    );
}

#[tokio::test]
async fn detect_image_returns_jpeg_data_uri_by_default() {
    let (app, _dir) = test_app().await;
    let png = png_bytes(64, 32);

    let (status, body) = send(
        &app,
        multipart_request("/detect_image", &[Part::File("file", "bin.png", &png)]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mime"], "image/jpeg");
    assert!(
        body["image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,/9j/")
    );
    assert_eq!(body["boxes"].as_array().unwrap().len(), 1);
    assert_eq!(body["width"], 64);
}

#[tokio::test]
async fn detect_image_honours_format_and_quality() {
    let (app, _dir) = test_app().await;
    let png = png_bytes(64, 32);

    let (status, body) = send(
        &app,
        multipart_request(
            "/detect_image?format=png&lw=3&labels=0",
            &[Part::File("file", "bin.png", &png)],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mime"], "image/png");
    assert!(
        body["image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,iVBORw0KGgo")
    );

    let (status, body) = send(
        &app,
        multipart_request(
            "/detect_image?quality=best",
            &[Part::File("file", "bin.png", &png)],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("quality"));
}

#[tokio::test]
async fn posts_json_lifecycle() {
    let (app, _dir) = test_app().await;

    let (status, body) = get(&app, "/posts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, created) = send(
        &app,
        json_request(
            "/posts",
            json!({
                "title": " Glass jars ",
                "description": "Twelve clean jars",
                "location": "Porto",
                "phone": "912345678",
                "photo_url": "https://cdn.example.org/jars.jpg"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], 1);
    assert_eq!(created["title"], "Glass jars");
    assert_eq!(created["photo_url"], "https://cdn.example.org/jars.jpg");
    assert!(created["created_at"].as_str().unwrap().ends_with('Z'));

    let (status, fetched) = get(&app, "/posts/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, listed) = get(&app, "/posts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn posts_validation_and_lookup_errors() {
    let (app, _dir) = test_app().await;

    let (status, body) = send(
        &app,
        json_request("/posts", json!({"description": "d", "location": "l"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing fields: title, phone");

    let (status, body) = get(&app, "/posts/42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Post not found");

    let (status, _) = get(&app, "/posts/latest").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn posts_multipart_photo_is_stored_and_served() {
    let (app, dir) = test_app().await;
    let png = png_bytes(4, 4);

    let (status, created) = send(
        &app,
        multipart_request(
            "/posts",
            &[
                Part::Text("title", "Bike"),
                Part::Text("description", "Needs a new chain"),
                Part::Text("location", "Utrecht"),
                Part::Text("phone", "0612345678"),
                Part::File("photo", "my bike.png", &png),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let url = created["photo_url"].as_str().unwrap();
    let path = url.strip_prefix("http://example.test").unwrap();
    assert!(path.starts_with("/uploads/my_bike-"));
    assert!(path.ends_with(".png"));

    let name = path.strip_prefix("/uploads/").unwrap();
    assert!(dir.path().join("uploads").join(name).exists());

    // stored relative, absolutized only in the create response
    let (_, fetched) = get(&app, "/posts/1").await;
    assert_eq!(fetched["photo_url"], path);

    let response = app
        .clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let served = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(served.as_ref(), png.as_slice());
}

#[tokio::test]
async fn posts_multipart_photo_edge_cases() {
    let (app, _dir) = test_app().await;

    let fields = [
        Part::Text("title", "Desk"),
        Part::Text("description", "Oak"),
        Part::Text("location", "Gent"),
        Part::Text("phone", "0470000000"),
    ];

    let mut parts = fields.to_vec();
    parts.push(Part::File("photo", "malware.exe", b"MZ"));
    let (status, body) = send(&app, multipart_request("/posts", &parts)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unsupported image type.");

    // an unnamed photo part wins over photo_url and yields no photo
    let mut parts = fields.to_vec();
    parts.push(Part::Text("photo_url", "https://cdn.example.org/desk.jpg"));
    parts.push(Part::File("photo", "", b""));
    let (status, created) = send(&app, multipart_request("/posts", &parts)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["photo_url"], Value::Null);

    // without a photo part, the photo_url text field is used
    let mut parts = fields.to_vec();
    parts.push(Part::Text("photo_url", "/uploads/desk.jpg"));
    let (status, created) = send(&app, multipart_request("/posts", &parts)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["photo_url"], "http://example.test/uploads/desk.jpg");
}

#[tokio::test]
async fn unknown_body_is_an_empty_submission() {
    let (app, _dir) = test_app().await;

    let request = Request::post("/posts")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("title=x"))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Missing fields: title, description, location, phone"
    );
}

#[tokio::test]
async fn detect_applies_exif_orientation() {
    let (app, _dir) = test_app().await;
    let jpeg = jpeg_with_orientation(64, 32, 6);

    let (status, body) = send(
        &app,
        multipart_request("/detect", &[Part::File("file", "phone.jpg", &jpeg)]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["width"], 32);
    assert_eq!(body["height"], 64);
}

#[tokio::test]
async fn detect_image_reports_missing_file_before_bad_quality() {
    let (app, _dir) = test_app().await;

    let (status, body) = send(
        &app,
        multipart_request(
            "/detect_image?quality=best",
            &[Part::Text("note", "no file here")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing file field");
}

#[tokio::test]
async fn detect_image_survives_huge_line_width() {
    let (app, _dir) = test_app().await;
    let png = png_bytes(64, 32);

    let (status, body) = send(
        &app,
        multipart_request(
            "/detect_image?lw=4294967295&format=png",
            &[Part::File("file", "bin.png", &png)],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mime"], "image/png");
}

#[tokio::test]
async fn oversized_bodies_are_rejected_with_413() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(&dir).await, 1024);
    let big = vec![0xAB; 4096];

    let (status, body) = send(
        &app,
        multipart_request("/detect", &[Part::File("file", "big.png", &big)]),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "request body too large");

    let description = "x".repeat(4096);
    let (status, body) = send(
        &app,
        json_request(
            "/posts",
            json!({"title": "t", "description": description, "location": "l", "phone": "p"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "request body too large");
}

#[tokio::test]
async fn unknown_paths_are_json_404s() {
    let (app, _dir) = test_app().await;

    let (status, body) = get(&app, "/uploads/nope.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Not Found"}));

    let (status, body) = get(&app, "/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Not Found"}));
}

/// Latest cumulative value of `detect_requests_total` for an outcome.
fn detect_requests(exporter: &InMemoryMetricExporter, outcome: &str) -> u64 {
    let exported = exporter.get_finished_metrics().unwrap();
    let Some(latest) = exported.last() else {
        return 0;
    };

    let mut total = 0;
    for scope in latest.scope_metrics() {
        for metric in scope.metrics() {
            if metric.name() != "detect_requests_total" {
                continue;
            }
            if let AggregatedMetrics::U64(MetricData::Sum(sum)) = metric.data() {
                total += sum
                    .data_points()
                    .filter(|point| {
                        point
                            .attributes()
                            .any(|kv| kv.key.as_str() == "outcome" && kv.value.as_str() == outcome)
                    })
                    .map(|point| point.value())
                    .sum::<u64>();
            }
        }
    }
    total
}

#[tokio::test]
async fn every_failed_detection_is_counted() {
    let exporter = InMemoryMetricExporter::default();
    let provider = SdkMeterProvider::builder()
        .with_reader(PeriodicReader::builder(exporter.clone()).build())
        .build();

    let dir = tempfile::tempdir().unwrap();
    let mut state = test_state(&dir).await;
    state.metrics = Arc::new(Metrics::with_meter(&provider.meter("gateway-test")));
    let app = router(state, UPLOAD_LIMIT);
    let png = png_bytes(64, 32);

    let requests = [
        ("/detect", Part::Text("file", "not a file part")),
        ("/detect", Part::File("file", "empty.jpg", b"")),
        ("/detect_image", Part::File("file", "notes.txt", b"hello")),
        ("/detect", Part::File("file", "bin.png", &png)),
    ];
    for (uri, part) in requests {
        send(&app, multipart_request(uri, &[part])).await;
    }

    provider.force_flush().unwrap();
    assert_eq!(detect_requests(&exporter, "error"), 3);
    assert_eq!(detect_requests(&exporter, "ok"), 1);
}
