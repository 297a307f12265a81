//! # Translation Pump
//!
//! Translates one utterance and streams it, token by token, to the opposite
//! leg of the session.
//!
//! ## Delivery contract:
//! - Every non-empty token becomes `{type: text, token, last: false}`, sent
//!   sequentially in production order.
//! - A completed translation ends with exactly one `{type: text, token: "",
//!   last: true}`, even when it produced no tokens.
//! - A failed or timed-out translation stops where it is: no further tokens
//!   and no end marker.
//! - An utterance whose destination leg is not attached is dropped. A missed
//!   turn in a live conversation has no value later, so nothing is buffered.

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::relay::metrics::RelayMetrics;
use crate::relay::registry::SessionHandle;
use crate::relay::transport::{Leg, OutboundEvent, Transport};
use crate::relay::translator::{self, TokenChannel, Translator};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to a relayed utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Delivered in full, with this many token events before the end marker
    Delivered { tokens: usize },
    /// Nothing was sent because the destination leg is not attached
    DroppedLegUnavailable,
    /// Nothing was sent because the utterance was blank
    DroppedEmpty,
}

#[derive(Clone)]
pub struct TranslationPump {
    translator: Arc<dyn Translator>,
    settings: Arc<RelayConfig>,
    metrics: Arc<RelayMetrics>,
}

/// What the pump needs from the session, copied out so no lock is held while
/// translating.
struct RelayRoute {
    session_id: String,
    destination: Option<Arc<dyn Transport>>,
    origin: Option<Arc<dyn Transport>>,
    source_language: String,
    target_language: String,
    hold_music: bool,
}

impl TranslationPump {
    pub fn new(translator: Arc<dyn Translator>, settings: Arc<RelayConfig>, metrics: Arc<RelayMetrics>) -> Self {
        Self { translator, settings, metrics }
    }

    /// Relay `text`, spoken on leg `from`, to the other leg.
    pub async fn relay(&self, session: &SessionHandle, from: Leg, text: &str) -> RelayResult<RelayOutcome> {
        let route = {
            let session = session.lock().await;
            RelayRoute {
                session_id: session.id.clone(),
                destination: session.transport(from.other()),
                origin: session.transport(from),
                source_language: session.config.leg(from).language.clone(),
                target_language: session.config.leg(from.other()).language.clone(),
                hold_music: session.config.hold_music,
            }
        };

        if text.trim().is_empty() {
            debug!(session_id = %route.session_id, leg = %from, "Ignoring blank utterance");
            return Ok(RelayOutcome::DroppedEmpty);
        }

        let Some(destination) = route.destination else {
            self.metrics.utterance_dropped();
            debug!(
                session_id = %route.session_id,
                leg = %from,
                "{}",
                RelayError::LegUnavailable(format!("{} leg not attached, utterance dropped", from.other()))
            );
            return Ok(RelayOutcome::DroppedLegUnavailable);
        };

        let timeout = self.settings.translation_timeout();
        let streamed = tokio::time::timeout(
            timeout,
            self.stream_tokens(
                destination.as_ref(),
                text,
                &route.source_language,
                &route.target_language,
            ),
        )
        .await
        .unwrap_or_else(|_| {
            Err(RelayError::TranslationFailure(format!(
                "no complete translation within {}s",
                timeout.as_secs()
            )))
        });

        let tokens = match streamed {
            Ok(tokens) => tokens,
            Err(err) => {
                match err {
                    RelayError::TransportFailure(_) => self.metrics.transport_failed(),
                    _ => self.metrics.translation_failed(),
                }
                return Err(err);
            }
        };

        self.metrics.utterance_relayed();
        info!(
            session_id = %route.session_id,
            from = %from,
            to = %from.other(),
            tokens,
            "Utterance relayed"
        );

        if route.hold_music {
            if let Some(origin) = route.origin {
                if let Err(err) = origin.send(OutboundEvent::hold_music(&self.settings.hold_music_url)).await {
                    warn!(session_id = %route.session_id, leg = %from, "Hold music not started: {}", err);
                }
            }
        }

        Ok(RelayOutcome::Delivered { tokens })
    }

    /// Forward the translation of `text` to `destination`, returning the
    /// number of token events sent before the end marker.
    async fn stream_tokens(
        &self,
        destination: &dyn Transport,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> RelayResult<usize> {
        let stream = self.translator.translate(text, source_lang, target_lang).await?;
        let mut channel = TokenChannel::spawn(stream);
        let mut sent = 0;

        while let Some(token) = channel.next().await {
            let token = token?;
            if token.is_empty() {
                continue;
            }
            destination.send(OutboundEvent::token(token)).await?;
            sent += 1;
        }

        destination.send(OutboundEvent::end_of_utterance()).await?;
        Ok(sent)
    }

    /// Translate `text` and return the whole result at once, bounded by the
    /// same timeout as a relayed utterance.
    pub async fn translate_collect(&self, text: &str, source_lang: &str, target_lang: &str) -> RelayResult<String> {
        let timeout = self.settings.translation_timeout();
        tokio::time::timeout(
            timeout,
            translator::translate_collect(self.translator.as_ref(), text, source_lang, target_lang),
        )
        .await
        .unwrap_or_else(|_| {
            Err(RelayError::TranslationFailure(format!(
                "no complete translation within {}s",
                timeout.as_secs()
            )))
        })
    }
}
