use crate::error::AppError;
use crate::relay::session::LegConfig;
use crate::relay::Leg;
use crate::state::AppState;
use crate::twiml;
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::{debug, warn};

/// Leg settings used when the carrier asks about a session we do not know,
/// e.g. after a restart. The call still connects; its messages are dropped.
fn fallback_leg(leg: Leg, tts_provider: &str) -> LegConfig {
    let language = match leg {
        Leg::Source => "es-ES",
        Leg::Target => "en-US",
    };
    LegConfig {
        phone_number: String::new(),
        language: language.to_string(),
        tts_provider: tts_provider.to_string(),
        voice: String::new(),
    }
}

/// `POST /voice/{leg}/{session_id}`: the carrier's answer webhook.
///
/// Responds with markup that connects the answered call to
/// `wss://{host}/ws/{leg}/{session_id}`. The form fields the carrier posts
/// are not needed.
pub async fn voice_webhook(
    req: HttpRequest,
    path: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let (leg, session_id) = path.into_inner();
    let leg: Leg = leg.parse().map_err(AppError::BadRequest)?;

    let leg_config = match state.engine.registry().get(&session_id).await {
        Some(session) => session.lock().await.config.leg(leg).clone(),
        None => {
            warn!(session_id = %session_id, leg = %leg, "Answer webhook for unknown session, using defaults");
            fallback_leg(leg, &state.config.relay.default_tts_provider)
        }
    };

    let connection = req.connection_info().clone();
    let ws_url = format!("wss://{}/ws/{}/{}", state.public_host(connection.host()), leg, session_id);
    debug!(session_id = %session_id, leg = %leg, ws_url = %ws_url, "Serving call markup");

    Ok(HttpResponse::Ok()
        .content_type("text/xml")
        .body(twiml::conversation_relay(&ws_url, &leg_config)?))
}
