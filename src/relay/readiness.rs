//! # Readiness Coordinator
//!
//! Two-sided rendezvous between the legs of a session.
//!
//! ## State machine:
//! ```text
//!            setup (one leg)                 setup (second leg)
//! WAITING ─────────────────────▸ WAITING ───────────────────────▸ READY
//!   wait tone to attached legs               localized "ready" notice
//!                                            to both legs, exactly once
//! ```
//! `READY` is terminal. Later setups only re-attach the transport.

use crate::config::RelayConfig;
use crate::error::RelayResult;
use crate::relay::pump::TranslationPump;
use crate::relay::registry::SessionRegistry;
use crate::relay::session::Readiness;
use crate::relay::transport::{Leg, OutboundEvent, Transport};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ReadinessCoordinator {
    registry: SessionRegistry,
    pump: TranslationPump,
    settings: Arc<RelayConfig>,
}

/// Work decided under the session lock and carried out after releasing it,
/// still inside the session's setup gate.
enum SetupAction {
    PlayWaitTone(Vec<(Leg, Arc<dyn Transport>)>),
    NotifyReady(Vec<(Leg, Arc<dyn Transport>, String)>),
    Nothing,
}

impl ReadinessCoordinator {
    pub fn new(registry: SessionRegistry, pump: TranslationPump, settings: Arc<RelayConfig>) -> Self {
        Self { registry, pump, settings }
    }

    /// Handle a `setup` message: attach `transport` to `leg` and advance the
    /// rendezvous.
    pub async fn on_setup(
        &self,
        session_id: &str,
        leg: Leg,
        transport: Arc<dyn Transport>,
        call_id: Option<String>,
    ) -> RelayResult<Readiness> {
        let handle = self.registry.require(session_id).await?;
        let gate = handle.lock().await.setup_gate();
        let _setup = gate.lock().await;

        let action = {
            let mut session = handle.lock().await;
            if let Some(previous) = session.attach(leg, transport.clone()) {
                if previous.id() != transport.id() {
                    debug!(session_id, leg = %leg, replaced = previous.id(), "Leg transport replaced");
                }
            }
            if let Some(call_id) = call_id {
                session.set_call_id(leg, call_id);
            }

            if session.readiness() == Readiness::Ready {
                SetupAction::Nothing
            } else if session.claim_ready_notice() {
                SetupAction::NotifyReady(
                    session
                        .attached()
                        .into_iter()
                        .map(|(leg, t)| (leg, t, session.config.leg(leg).language.clone()))
                        .collect(),
                )
            } else {
                SetupAction::PlayWaitTone(session.attached())
            }
        };

        match action {
            SetupAction::PlayWaitTone(legs) => {
                for (leg, transport) in legs {
                    if let Err(err) = transport.send(OutboundEvent::wait_tone(&self.settings.wait_url)).await {
                        warn!(session_id, leg = %leg, "Wait tone not started: {}", err);
                    }
                }
                debug!(session_id, leg = %leg, "Waiting for the other leg");
                Ok(Readiness::Waiting)
            }
            SetupAction::NotifyReady(legs) => {
                for (leg, transport, language) in legs {
                    let notice = self.ready_notice(&language).await;
                    if let Err(err) = transport.send(OutboundEvent::final_text(notice)).await {
                        warn!(session_id, leg = %leg, "Readiness notice not delivered: {}", err);
                    }
                }
                info!(session_id, "Both legs attached, session ready");
                Ok(Readiness::Ready)
            }
            SetupAction::Nothing => Ok(Readiness::Ready),
        }
    }

    /// The readiness phrase in `language`, or untranslated if translation fails.
    async fn ready_notice(&self, language: &str) -> String {
        let phrase = &self.settings.ready_phrase;
        match self
            .pump
            .translate_collect(phrase, &self.settings.ready_source_language, language)
            .await
        {
            Ok(text) => text,
            Err(err) => {
                warn!(language, "Sending untranslated readiness notice: {}", err);
                phrase.clone()
            }
        }
    }
}
