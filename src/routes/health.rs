use actix_web::{web, HttpResponse, Responder};
use crate::models::{ErrorResponse, HealthResponse, StatsResponse};
use crate::services::BrokerHandle;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub broker: BrokerHandle,
}

/// Configure health and statistics routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/stats", web::get().to(stats));
}

/// Health check endpoint
///
/// Reports `degraded` when the broker task no longer answers.
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let broker_alive = state.broker.stats().await.is_ok();

    let status = if broker_alive { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Live connection counts
///
/// GET /api/v1/stats
///
/// ```json
/// { "connections": 12, "idle": 3, "waiting": 1, "paired": 8, "oldest_connection_secs": 340, "timestamp": "..." }
/// ```
async fn stats(state: web::Data<AppState>) -> impl Responder {
    match state.broker.stats().await {
        Ok(stats) => HttpResponse::Ok().json(StatsResponse {
            connections: stats.connections,
            idle: stats.idle,
            waiting: stats.waiting,
            paired: stats.paired,
            oldest_connection_secs: stats.oldest_connection_secs,
            timestamp: chrono::Utc::now(),
        }),
        Err(e) => {
            tracing::error!("Failed to read broker stats: {}", e);
            HttpResponse::ServiceUnavailable().json(ErrorResponse {
                error: "Broker unavailable".to_string(),
                message: e.to_string(),
                status_code: 503,
            })
        }
    }
}
