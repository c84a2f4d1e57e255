//! Health check endpoints

use actix_web::{get, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::rest::ApiState;
use crate::store::ProposalStore;

/// Federation state reported by the health endpoints
#[derive(Debug, Serialize)]
pub struct FederationHealth {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<&'static str>,
    pub allow_proposals: bool,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub instance: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub federation: Option<FederationHealth>,
}

impl HealthResponse {
    pub fn healthy(instance: &str, version: &str) -> Self {
        Self {
            status: "healthy".to_string(),
            version: version.to_string(),
            instance: instance.to_string(),
            timestamp: Utc::now(),
            uptime_seconds: None,
            federation: None,
        }
    }

    pub fn with_uptime(mut self, uptime: f64) -> Self {
        self.uptime_seconds = Some(uptime);
        self
    }

    pub fn with_federation(mut self, federation: FederationHealth) -> Self {
        self.federation = Some(federation);
        self
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub instance: String,
    pub version: String,
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> f64 {
        let duration = Utc::now().signed_duration_since(self.start_time);
        duration.num_milliseconds() as f64 / 1000.0
    }
}

fn federation_health(api: &ApiState) -> FederationHealth {
    let config = api.federation.config();
    let disabled_reason = config.disabled_reason();
    FederationHealth {
        enabled: disabled_reason.is_none(),
        disabled_reason,
        allow_proposals: config.allow_proposals,
    }
}

/// Health check endpoint
#[get("/health")]
pub async fn health_check(state: web::Data<AppState>, api: web::Data<ApiState>) -> HttpResponse {
    let response = HealthResponse::healthy(&state.instance, &state.version)
        .with_uptime(state.uptime_seconds())
        .with_federation(federation_health(&api));

    HttpResponse::Ok().json(response)
}

/// Readiness check endpoint; ready once the store answers
#[get("/ready")]
pub async fn readiness_check(state: web::Data<AppState>, api: web::Data<ApiState>) -> HttpResponse {
    if let Err(e) = api.store.list_proposals() {
        return HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "unavailable",
            "error": e.to_string()
        }));
    }
    let response = HealthResponse::healthy(&state.instance, &state.version);
    HttpResponse::Ok().json(response)
}

/// Liveness check endpoint
#[get("/live")]
pub async fn liveness_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "alive"
    }))
}

/// Configure health routes
pub fn configure_health_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(readiness_check)
        .service(liveness_check);
}
