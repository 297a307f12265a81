//! # Application State
//!
//! State shared by every HTTP handler and WebSocket actor.
//!
//! ## Key Rust Concepts:
//!
//! ### Cheap clones
//! actix-web builds one `App` per worker thread, so the state is cloned once
//! per worker. Every field is either an `Arc` or a handle that wraps one
//! ([`RelayEngine`] is a bundle of `Arc`s around the session registry), so a
//! clone shares the same sessions rather than copying them.
//!
//! ### No config lock
//! The configuration is read-only after startup, so it sits behind a plain
//! `Arc` instead of an `Arc<RwLock<_>>`.

use crate::config::AppConfig;
use crate::relay::RelayEngine;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    /// Validated configuration, fixed for the life of the process
    pub config: Arc<AppConfig>,

    /// The relay engine, owner of every live session
    pub engine: RelayEngine,

    /// When the server started, for uptime reporting
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, engine: RelayEngine) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            start_time: Instant::now(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Host used in callback and WebSocket URLs handed to the carrier: the
    /// configured public host if set, otherwise the request's own host.
    pub fn public_host<'a>(&'a self, request_host: &'a str) -> &'a str {
        self.config.server.public_host.as_deref().unwrap_or(request_host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::registry::SessionRegistry;
    use crate::relay::testing::{relay_settings, RecordingCallPlacer, ScriptedTranslator};

    fn state(public_host: Option<&str>) -> AppState {
        let mut config = AppConfig::default();
        config.server.public_host = public_host.map(str::to_string);
        let engine = RelayEngine::new(
            SessionRegistry::new(),
            Arc::new(ScriptedTranslator::tokens(&[])),
            Arc::new(RecordingCallPlacer::default()),
            relay_settings(),
        );
        AppState::new(config, engine)
    }

    #[test]
    fn test_public_host_prefers_config() {
        assert_eq!(state(Some("relay.example.com")).public_host("10.0.0.5:8080"), "relay.example.com");
        assert_eq!(state(None).public_host("abc123.ngrok.app"), "abc123.ngrok.app");
    }

    #[tokio::test]
    async fn test_clones_share_sessions() {
        let state = state(None);
        let clone = state.clone();
        state
            .engine
            .create_session("s1", crate::relay::testing::sample_config("es-ES", "en-US"))
            .await
            .unwrap();

        assert_eq!(clone.engine.registry().len().await, 1);
        assert!(state.get_uptime_seconds() < 5);
    }
}
