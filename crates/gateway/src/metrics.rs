use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram, Meter},
};
use std::time::Duration;

/// Request level instruments. Without an installed meter provider these are
/// no-ops.
pub struct Metrics {
    detect_requests: Counter<u64>,
    detect_duration: Histogram<f64>,
    detections: Counter<u64>,
    posts_created: Counter<u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::with_meter(&global::meter("gateway"))
    }

    pub fn with_meter(meter: &Meter) -> Self {
        Self {
            detect_requests: meter
                .u64_counter("detect_requests_total")
                .with_description("Detection requests by endpoint and outcome")
                .build(),
            detect_duration: meter
                .f64_histogram("detect_duration_seconds")
                .with_description("Decode plus inference time")
                .with_unit("s")
                .build(),
            detections: meter
                .u64_counter("detections_total")
                .with_description("Objects returned by detection requests")
                .build(),
            posts_created: meter
                .u64_counter("posts_created_total")
                .with_description("Community posts stored")
                .build(),
        }
    }

    pub fn record_detection(&self, endpoint: &'static str, elapsed: Duration, count: usize) {
        let attrs = [KeyValue::new("endpoint", endpoint)];
        self.detect_requests.add(
            1,
            &[
                KeyValue::new("endpoint", endpoint),
                KeyValue::new("outcome", "ok"),
            ],
        );
        self.detect_duration.record(elapsed.as_secs_f64(), &attrs);
        self.detections.add(count as u64, &attrs);
    }

    pub fn record_detection_failure(&self, endpoint: &'static str) {
        self.detect_requests.add(
            1,
            &[
                KeyValue::new("endpoint", endpoint),
                KeyValue::new("outcome", "error"),
            ],
        );
    }

    pub fn record_post_created(&self, with_photo: bool) {
        self.posts_created
            .add(1, &[KeyValue::new("with_photo", with_photo)]);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
