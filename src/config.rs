//! # Configuration Management
//!
//! Configuration is layered from several sources:
//! - Default values (built into the code)
//! - TOML configuration file (`config.toml`, optional)
//! - Environment variables with the `APP_` prefix
//! - `HOST` / `PORT`, as set by most deployment platforms
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT`
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_TELEPHONY__AUTH_TOKEN`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Nested keys use a double underscore so that field names containing a single
//! underscore (`auth_token`, `hold_music_url`) survive the mapping.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub translation: TranslationConfig,
    pub telephony: TelephonyConfig,
    pub relay: RelayConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to
/// - `port`: TCP port number to listen on
/// - `public_host`: hostname the carrier should use to reach us. When unset,
///   the `Host` header of the incoming request is used instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub public_host: Option<String>,
}

/// Which chat-completion API dialect the translator speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    /// `{base_url}/chat/completions`, bearer auth, model in the body
    OpenAi,
    /// `{base_url}/openai/deployments/{model}/chat/completions`, `api-key` header
    Azure,
}

/// Streaming translation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    pub provider: TranslationProvider,
    pub base_url: String,
    /// Model name (OpenAI) or deployment name (Azure)
    pub model: String,
    pub api_key: String,
    /// Only used by the Azure dialect
    pub api_version: String,
    /// Lower temperature gives more consistent translations
    pub temperature: f32,
}

/// Carrier (Twilio) settings used to place the two outbound calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    pub api_base: String,
    pub account_sid: String,
    pub auth_token: String,
    /// Caller id both legs are dialed from
    pub from_number: String,
    pub record: bool,
}

/// Relay engine behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Played on the speaking leg after its utterance was delivered
    pub hold_music_url: String,
    /// Played to an attached leg while its counterpart has not joined yet
    pub wait_url: String,
    /// Readiness notice, translated into each leg's language
    pub ready_phrase: String,
    /// Language the readiness notice is written in
    pub ready_source_language: String,
    /// TTS provider used when the session request names none
    pub default_tts_provider: String,
    /// Upper bound for translating and delivering one utterance
    pub translation_timeout_secs: u64,
    /// How often the WebSocket adapter pings each leg
    pub heartbeat_interval_secs: u64,
    /// A leg that has not answered for this long is disconnected
    pub client_timeout_secs: u64,
}

impl RelayConfig {
    pub fn translation_timeout(&self) -> Duration {
        Duration::from_secs(self.translation_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                public_host: None,
            },
            translation: TranslationConfig {
                provider: TranslationProvider::OpenAi,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4.1-nano".to_string(),
                api_key: String::new(),
                api_version: "2024-12-01-preview".to_string(),
                temperature: 0.3,
            },
            telephony: TelephonyConfig {
                api_base: "https://api.twilio.com".to_string(),
                account_sid: String::new(),
                auth_token: String::new(),
                from_number: String::new(),
                record: true,
            },
            relay: RelayConfig {
                hold_music_url: "https://pub-09065925c50a4711a49096e7dbee29ce.r2.dev/ringtone-02-133354.mp3"
                    .to_string(),
                wait_url: "https://pub-09065925c50a4711a49096e7dbee29ce.r2.dev/mixkit-marimba-ringtone-1359.wav"
                    .to_string(),
                ready_phrase: "You are ready to talk.".to_string(),
                ready_source_language: "en-US".to_string(),
                default_tts_provider: "ElevenLabs".to_string(),
                translation_timeout_secs: 30,
                heartbeat_interval_secs: 30,
                client_timeout_secs: 90,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PUBLIC_HOST=relay.example.com`
    /// - `APP_TRANSLATION__PROVIDER=azure`
    /// - `APP_TELEPHONY__ACCOUNT_SID=AC...`
    /// - `PORT=3000`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        Self::load_from("config")
    }

    /// [`load`](Self::load) with the configuration file read from `file`.
    fn load_from(file: &str) -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name(file).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Missing credentials are not rejected here: the server can still answer
    /// health checks and TwiML webhooks without them, and the carrier or
    /// translation API reports the problem on first use.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.relay.translation_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Translation timeout must be greater than 0"));
        }

        if self.relay.heartbeat_interval_secs == 0
            || self.relay.client_timeout_secs <= self.relay.heartbeat_interval_secs
        {
            return Err(anyhow::anyhow!(
                "Client timeout must be longer than a non-zero heartbeat interval"
            ));
        }

        if self.relay.hold_music_url.is_empty() || self.relay.wait_url.is_empty() {
            return Err(anyhow::anyhow!("Hold music and wait URLs must be set"));
        }

        if !(0.0..=2.0).contains(&self.translation.temperature) {
            return Err(anyhow::anyhow!("Translation temperature must be within 0.0..=2.0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The default configuration is valid and has the expected values.
    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.relay.ready_phrase, "You are ready to talk.");
        assert_eq!(config.relay.translation_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    /// Validation catches invalid configurations.
    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.relay.translation_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.relay.client_timeout_secs = config.relay.heartbeat_interval_secs;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.relay.wait_url.clear();
        assert!(config.validate().is_err());
    }

    /// A config.toml file overrides only the keys it names.
    #[test]
    fn test_config_file_layered_over_defaults() {
        let path = env::temp_dir().join(format!("relay-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"
            [server]
            public_host = "relay.example.com"

            [translation]
            provider = "azure"
            base_url = "https://example.openai.azure.com"

            [relay]
            translation_timeout_secs = 12
            "#,
        )
        .unwrap();

        let loaded = AppConfig::load_from(path.to_str().unwrap());
        std::fs::remove_file(&path).unwrap();
        let config = loaded.unwrap();

        assert_eq!(config.server.public_host.as_deref(), Some("relay.example.com"));
        assert_eq!(config.translation.provider, TranslationProvider::Azure);
        assert_eq!(config.translation.base_url, "https://example.openai.azure.com");
        assert_eq!(config.relay.translation_timeout(), Duration::from_secs(12));
        // Untouched keys keep their defaults
        assert_eq!(config.translation.model, "gpt-4.1-nano");
        assert_eq!(config.relay.ready_phrase, "You are ready to talk.");
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let path = env::temp_dir().join(format!("relay-absent-{}", uuid::Uuid::new_v4()));
        let config = AppConfig::load_from(path.to_str().unwrap()).unwrap();

        assert_eq!(config.translation.provider, AppConfig::default().translation.provider);
        assert!(config.validate().is_ok());
    }
}
