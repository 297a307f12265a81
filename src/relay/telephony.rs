//! Outbound call placement.
//!
//! The relay only needs one operation from the carrier: dial a number and,
//! once answered, fetch call-control markup from a callback URL. The
//! production implementation talks to Twilio's REST API.

use crate::config::TelephonyConfig;
use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

#[async_trait]
pub trait CallPlacer: Send + Sync {
    /// Dial `to` from `from`; the carrier requests markup from `callback_url`.
    /// Returns the carrier's call id.
    async fn place_call(&self, to: &str, from: &str, callback_url: &str) -> RelayResult<String>;
}

pub struct TwilioCallPlacer {
    client: reqwest::Client,
    config: TelephonyConfig,
}

#[derive(Debug, Deserialize)]
struct CreatedCall {
    sid: String,
}

impl TwilioCallPlacer {
    pub fn new(client: reqwest::Client, config: TelephonyConfig) -> Self {
        Self { client, config }
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl CallPlacer for TwilioCallPlacer {
    async fn place_call(&self, to: &str, from: &str, callback_url: &str) -> RelayResult<String> {
        let record = if self.config.record { "true" } else { "false" };
        let form = [
            ("To", to),
            ("From", from),
            ("Url", callback_url),
            ("Method", "POST"),
            ("Record", record),
        ];

        let response = self
            .client
            .post(self.calls_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| RelayError::CallPlacement(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::CallPlacement(format!("carrier returned {}: {}", status, body)));
        }

        let call: CreatedCall = response
            .json()
            .await
            .map_err(|e| RelayError::CallPlacement(format!("unexpected carrier response: {}", e)))?;

        info!(to, call_sid = %call.sid, "Outbound call placed");
        Ok(call.sid)
    }
}
