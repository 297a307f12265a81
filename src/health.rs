//! # Health Monitoring
//!
//! `GET /health` (also under `/api/v1`) reports liveness, uptime, how many
//! translated calls are in progress, and the relay's lifetime counters.
//! Load balancers only look at the status code; the body is for humans and
//! dashboards.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let active_sessions = state.engine.registry().len().await;
    let relay = state.engine.metrics().snapshot();
    let config = &state.config;

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "sessions": {
            "active": active_sessions
        },
        "relay": relay,
        "translation": {
            "provider": config.translation.provider,
            "model": config.translation.model
        }
    }))
}
