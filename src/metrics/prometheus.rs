//! Prometheus metrics for the federation endpoint

use actix_web::{get, HttpResponse};
use once_cell::sync::Lazy;
use prometheus::{
    opts, register_histogram, register_int_counter, register_int_counter_vec, Encoder,
    Histogram, HistogramOpts, IntCounter, IntCounterVec, TextEncoder,
};

static FEDERATION_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("federation_requests_total", "Federation requests received, by request kind"),
        &["kind"]
    )
    .expect("Failed to create federation requests counter")
});

static FEDERATION_DENIALS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("federation_denials_total", "Federation requests refused, by reason"),
        &["reason"]
    )
    .expect("Failed to create federation denials counter")
});

static FEDERATION_PROPOSALS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        opts!("federation_proposals_total", "Federation proposals queued for review")
    )
    .expect("Failed to create federation proposals counter")
});

static FEDERATION_STATUS_REPORTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        opts!("federation_status_reports_total", "Status reports recorded from pulling peers")
    )
    .expect("Failed to create status reports counter")
});

static FEDERATION_REQUEST_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(HistogramOpts::new(
        "federation_request_duration_seconds",
        "Federation request duration in seconds"
    ))
    .expect("Failed to create federation request duration histogram")
});

/// Request kinds reported under their own label; anything else is "unknown"
const KNOWN_KINDS: [&str; 5] = [
    "pull_repositories",
    "pull_users",
    "pull_settings",
    "proposal",
    "status",
];

/// Initialize all metrics
pub fn init_metrics() {
    Lazy::force(&FEDERATION_REQUESTS_TOTAL);
    Lazy::force(&FEDERATION_DENIALS_TOTAL);
    Lazy::force(&FEDERATION_PROPOSALS_TOTAL);
    Lazy::force(&FEDERATION_STATUS_REPORTS_TOTAL);
    Lazy::force(&FEDERATION_REQUEST_DURATION);
}

/// Record an inbound federation request
pub fn record_federation_request(kind: &str) {
    let label = if KNOWN_KINDS.contains(&kind) { kind } else { "unknown" };
    FEDERATION_REQUESTS_TOTAL.with_label_values(&[label]).inc();
}

/// Record a refused federation request
pub fn record_federation_denial(reason: &str) {
    FEDERATION_DENIALS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_proposal() {
    FEDERATION_PROPOSALS_TOTAL.inc();
}

pub fn record_status_report() {
    FEDERATION_STATUS_REPORTS_TOTAL.inc();
}

/// Record federation request duration
pub fn record_request_duration(duration_secs: f64) {
    FEDERATION_REQUEST_DURATION.observe(duration_secs);
}

/// Prometheus metrics endpoint
#[get("/metrics")]
pub async fn metrics_endpoint() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(format!("Failed to encode metrics: {}", e));
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4; charset=utf-8")
        .body(buffer)
}
