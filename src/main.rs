use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::io;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vyntra_relay::config::{LoggingSettings, Settings};
use vyntra_relay::core::Matcher;
use vyntra_relay::routes::{self, AppState, SignalingListener};
use vyntra_relay::services::Broker;

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingSettings) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true);

    if logging.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load();
    let logging = settings
        .as_ref()
        .map(|settings| settings.logging.clone())
        .unwrap_or_default();
    init_tracing(&logging);

    let settings = settings.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;

    info!("Starting Vyntra relay...");

    let matcher = Matcher::new(settings.matching.policy);
    let broker = Broker::spawn(matcher, settings.signaling.command_buffer);

    info!("Broker started with {:?} matching", settings.matching.policy);

    let signaling_addr = settings.signaling.socket_addr().map_err(|e| {
        error!("Invalid signaling address: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let listener = SignalingListener::bind(signaling_addr, broker.clone())
        .await
        .map_err(|e| {
            error!("Failed to bind signaling listener on {}: {}", signaling_addr, e);
            io::Error::new(io::ErrorKind::AddrInUse, e.to_string())
        })?
        .with_relay_buffer(settings.signaling.relay_buffer);

    info!("Signaling WebSocket listening on {}", signaling_addr);
    let signaling = tokio::spawn(listener.run());

    let app_state = AppState { broker };

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(2);

    info!("Starting HTTP server on {}:{}", host, port);

    let result = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await;

    signaling.abort();
    info!("Vyntra relay stopped");

    result
}
