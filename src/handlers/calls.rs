use crate::error::{AppError, AppResult};
use crate::relay::session::{LegConfig, SessionConfig};
use crate::relay::Leg;
use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

/// Body of `POST /initiate-call`.
///
/// The four numbers/languages are required; everything else falls back to
/// configured defaults.
#[derive(Debug, Default, Deserialize)]
pub struct InitiateCallRequest {
    pub from_number: Option<String>,
    pub to_number: Option<String>,
    pub source_language: Option<String>,
    pub target_language: Option<String>,
    pub source_tts_provider: Option<String>,
    pub source_voice: Option<String>,
    pub target_tts_provider: Option<String>,
    pub target_voice: Option<String>,
    pub play_waiting_music: Option<bool>,
}

fn required(field: Option<String>) -> AppResult<String> {
    field
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing required fields".to_string()))
}

/// E.164: a plus sign followed by 8 to 15 digits.
fn phone_number(field: Option<String>) -> AppResult<String> {
    let number = required(field)?;
    let digits = number.strip_prefix('+').unwrap_or_default();
    if !(8..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::ValidationError(format!("Not an E.164 phone number: {}", number)));
    }
    Ok(number)
}

impl InitiateCallRequest {
    pub fn into_session_config(self, default_tts_provider: &str) -> AppResult<SessionConfig> {
        let tts = |provider: Option<String>| provider.unwrap_or_else(|| default_tts_provider.to_string());

        Ok(SessionConfig {
            source: LegConfig {
                phone_number: phone_number(self.from_number)?,
                language: required(self.source_language)?,
                tts_provider: tts(self.source_tts_provider),
                voice: self.source_voice.unwrap_or_default(),
            },
            target: LegConfig {
                phone_number: phone_number(self.to_number)?,
                language: required(self.target_language)?,
                tts_provider: tts(self.target_tts_provider),
                voice: self.target_voice.unwrap_or_default(),
            },
            hold_music: self.play_waiting_music.unwrap_or(true),
        })
    }
}

/// `POST /initiate-call`: register a session and dial both parties.
///
/// The source party is dialed first, then the target. If either call cannot
/// be placed the session is torn down again and the carrier's error is
/// reported as 502.
pub async fn initiate_call(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<InitiateCallRequest>,
) -> AppResult<HttpResponse> {
    let config = body.into_inner().into_session_config(&state.config.relay.default_tts_provider)?;

    let caller_id = &state.config.telephony.from_number;
    if caller_id.is_empty() {
        return Err(AppError::ConfigError("Carrier phone number not configured".to_string()));
    }

    let connection = req.connection_info().clone();
    let host = state.public_host(connection.host());

    let session_id = config.session_id(chrono::Utc::now());
    state.engine.create_session(&session_id, config).await?;

    for leg in Leg::BOTH {
        let callback_url = format!("https://{}/voice/{}/{}", host, leg, session_id);
        if let Err(err) = state.engine.place_call(&session_id, leg, caller_id, &callback_url).await {
            error!(session_id = %session_id, leg = %leg, "Call placement failed: {}", err);
            state.engine.teardown(&session_id).await;
            return Err(err.into());
        }
    }

    info!(session_id = %session_id, "Translation session started");
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "session_id": session_id
    })))
}
