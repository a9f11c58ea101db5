// Route exports
pub mod health;
pub mod signaling;

use actix_web::web;

pub use health::AppState;
pub use signaling::{SignalingError, SignalingListener};

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(health::configure),
    );
}
