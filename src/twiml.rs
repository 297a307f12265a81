//! Call-control markup for the carrier.
//!
//! When a placed call is answered, the carrier fetches markup that connects
//! the call's audio to a ConversationRelay WebSocket. The relay service does
//! speech recognition and synthesis; this crate only sees text.

use crate::error::{AppError, AppResult};
use crate::relay::session::LegConfig;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use std::io::Cursor;

/// Speech recognition provider for a language. Arabic variants are only
/// recognized well by Google.
pub fn transcription_provider(language: &str) -> &'static str {
    if language.starts_with("ar-") {
        "google"
    } else {
        "deepgram"
    }
}

/// Render the markup connecting a leg to `ws_url`.
pub fn conversation_relay(ws_url: &str, leg: &LegConfig) -> AppResult<String> {
    let mut relay = BytesStart::new("ConversationRelay");
    relay.push_attribute(("debug", "speaker-events"));
    relay.push_attribute(("url", ws_url));
    relay.push_attribute(("language", leg.language.as_str()));
    relay.push_attribute(("ttsProvider", leg.tts_provider.as_str()));
    if !leg.voice.is_empty() {
        relay.push_attribute(("voice", leg.voice.as_str()));
    }
    relay.push_attribute(("transcriptionProvider", transcription_provider(&leg.language)));

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    let events = [
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
        Event::Start(BytesStart::new("Response")),
        Event::Start(BytesStart::new("Connect")),
        Event::Empty(relay),
        Event::End(BytesEnd::new("Connect")),
        Event::End(BytesEnd::new("Response")),
    ];
    for event in events {
        writer
            .write_event(event)
            .map_err(|e| AppError::Internal(format!("Failed to write call-control markup: {}", e)))?;
    }

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| AppError::Internal(format!("Call-control markup is not UTF-8: {}", e)))
}
