//! # Call Translation Relay - Main Application Entry Point
//!
//! Bridges two phone calls whose parties speak different languages. A client
//! asks for a translated call over HTTP; the server dials both parties, and
//! from then on every utterance recognized on one call is translated and
//! streamed, token by token, to the other.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: every connection and every translation is a task on
//!   the same runtime
//! - **traits at the seams**: the translator, the carrier and the per-leg
//!   transport are all trait objects, so the relay core runs against test
//!   doubles as easily as against the real services
//! - **Arc**: the session registry is shared by HTTP handlers and WebSocket
//!   actors alike
//!
//! ## Application Architecture:
//! - **config**: layered configuration (defaults, TOML file, environment)
//! - **error**: relay and HTTP error types
//! - **relay**: the session relay engine (registry, pump, readiness, lifecycle)
//! - **websocket**: adapts carrier WebSockets to the engine's transport trait
//! - **handlers**: call initiation and the carrier's answer webhook
//! - **twiml**: call-control markup handed to the carrier
//! - **health**: health endpoint
//! - **state**: shared application state

mod config;
mod error;
mod handlers;
mod health;
mod relay;
mod state;
mod twiml;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use config::AppConfig;
use relay::chat_completion::ChatCompletionTranslator;
use relay::registry::SessionRegistry;
use relay::telephony::TwilioCallPlacer;
use relay::RelayEngine;
use state::AppState;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set once a termination signal arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging**
/// 3. **Builds the relay engine** with the production translator and carrier
/// 4. **Configures the HTTP server** with middleware and routes
/// 5. **Handles graceful shutdown** when receiving system signals
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    // One connection pool for both upstream services
    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let translator = ChatCompletionTranslator::new(http.clone(), config.translation.clone());
    let call_placer = TwilioCallPlacer::new(http, config.telephony.clone());
    let engine = RelayEngine::new(
        SessionRegistry::new(),
        Arc::new(translator),
        Arc::new(call_placer),
        config.relay.clone(),
    );

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let app_state = AppState::new(config, engine);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .route("/initiate-call", web::post().to(handlers::initiate_call))
            .route("/voice/{leg}/{session_id}", web::post().to(handlers::voice_webhook))
            .route("/ws/{leg}/{session_id}", web::get().to(websocket::leg_websocket))
            .service(web::scope("/api/v1").route("/health", web::get().to(health::health_check)))
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Logging is controlled by `RUST_LOG`, defaulting to
/// `call_translation_relay=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_translation_relay=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialize tracing")?;

    Ok(())
}

/// Flag shutdown on SIGTERM or SIGINT. If the handlers cannot be installed
/// the server keeps running and relies on actix's own signal handling.
fn setup_signal_handlers() {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async {
        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
