//! # Relay Engine
//!
//! Bundles the relay components around one shared registry and hosts the
//! per-leg inbound loop.
//!
//! ## Per-leg loop:
//! Both legs run the same [`RelayEngine::run_leg`], parametrized by their
//! [`Leg`] role. Messages of one leg are handled strictly in arrival order:
//! an utterance is fully relayed before the next message is read, so
//! utterances spoken on one leg reach the other leg in the order they were
//! spoken. When the inbound stream ends, the session is torn down.

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::relay::lifecycle::LifecycleManager;
use crate::relay::metrics::RelayMetrics;
use crate::relay::pump::{RelayOutcome, TranslationPump};
use crate::relay::readiness::ReadinessCoordinator;
use crate::relay::registry::{SessionHandle, SessionRegistry};
use crate::relay::session::{Readiness, SessionConfig};
use crate::relay::telephony::CallPlacer;
use crate::relay::transport::{InboundMessage, Leg, Transport};
use crate::relay::translator::Translator;
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct RelayEngine {
    registry: SessionRegistry,
    pump: TranslationPump,
    readiness: ReadinessCoordinator,
    lifecycle: LifecycleManager,
    calls: Arc<dyn CallPlacer>,
    metrics: Arc<RelayMetrics>,
}

impl RelayEngine {
    pub fn new(
        registry: SessionRegistry,
        translator: Arc<dyn Translator>,
        calls: Arc<dyn CallPlacer>,
        settings: RelayConfig,
    ) -> Self {
        let settings = Arc::new(settings);
        let metrics = Arc::new(RelayMetrics::default());
        let pump = TranslationPump::new(translator, settings.clone(), metrics.clone());
        let readiness = ReadinessCoordinator::new(registry.clone(), pump.clone(), settings);
        let lifecycle = LifecycleManager::new(registry.clone(), metrics.clone());

        Self { registry, pump, readiness, lifecycle, calls, metrics }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Register a new call pair.
    pub async fn create_session(&self, id: &str, config: SessionConfig) -> RelayResult<SessionHandle> {
        let handle = self.registry.create(id, config).await?;
        self.metrics.session_created();
        info!(session_id = id, "Session created");
        Ok(handle)
    }

    /// Dial one leg of a session and remember the carrier's call id.
    ///
    /// `callback_url` is where the carrier fetches the leg's call-control markup.
    pub async fn place_call(&self, session_id: &str, leg: Leg, from: &str, callback_url: &str) -> RelayResult<String> {
        let handle = self.registry.require(session_id).await?;
        let to = handle.lock().await.config.leg(leg).phone_number.clone();

        info!(session_id, leg = %leg, to = %to, callback_url, "Placing call");
        let call_id = self.calls.place_call(&to, from, callback_url).await?;

        handle.lock().await.set_call_id(leg, call_id.clone());
        Ok(call_id)
    }

    pub async fn on_setup(
        &self,
        session_id: &str,
        leg: Leg,
        transport: Arc<dyn Transport>,
        call_id: Option<String>,
    ) -> RelayResult<Readiness> {
        self.readiness.on_setup(session_id, leg, transport, call_id).await
    }

    /// Relay an utterance spoken on `from` to the other leg.
    pub async fn relay(&self, session_id: &str, from: Leg, text: &str) -> RelayResult<RelayOutcome> {
        let handle = self.registry.require(session_id).await?;
        self.pump.relay(&handle, from, text).await
    }

    pub async fn teardown(&self, session_id: &str) -> bool {
        self.lifecycle.teardown(session_id).await
    }

    /// Consume one leg's inbound messages until the stream ends, then tear
    /// the session down.
    pub async fn run_leg<S>(&self, session_id: &str, leg: Leg, transport: Arc<dyn Transport>, inbound: S)
    where
        S: Stream<Item = RelayResult<InboundMessage>> + Send,
    {
        futures_util::pin_mut!(inbound);
        info!(session_id, leg = %leg, transport = transport.id(), "Leg connected");

        while let Some(message) = inbound.next().await {
            let message = match message {
                Ok(message) => message,
                Err(err) => {
                    warn!(session_id, leg = %leg, "Leg transport failed: {}", err);
                    break;
                }
            };

            if let Err(err) = self.dispatch(session_id, leg, &transport, message).await {
                match err {
                    RelayError::SessionNotFound(_) => debug!(session_id, leg = %leg, "Message dropped: {}", err),
                    _ => warn!(session_id, leg = %leg, "{}", err),
                }
            }
        }

        info!(session_id, leg = %leg, "Leg disconnected");
        self.teardown(session_id).await;
    }

    async fn dispatch(
        &self,
        session_id: &str,
        leg: Leg,
        transport: &Arc<dyn Transport>,
        message: InboundMessage,
    ) -> RelayResult<()> {
        if let Some(text) = message.utterance() {
            let outcome = self.relay(session_id, leg, text).await?;
            debug!(session_id, leg = %leg, ?outcome, "Utterance handled");
            return Ok(());
        }

        match message {
            InboundMessage::Setup { call_sid } => {
                let readiness = self.on_setup(session_id, leg, transport.clone(), call_sid).await?;
                debug!(session_id, leg = %leg, ?readiness, "Leg set up");
            }
            InboundMessage::Interrupt { utterance_until_interrupt } => {
                debug!(session_id, leg = %leg, heard = ?utterance_until_interrupt, "Playback interrupted");
            }
            InboundMessage::Dtmf { digit } => {
                debug!(session_id, leg = %leg, ?digit, "Keypad press ignored");
            }
            InboundMessage::Error { description } => {
                warn!(session_id, leg = %leg, "Carrier reported an error: {}", description.unwrap_or_default());
            }
            other => {
                debug!(session_id, leg = %leg, message = ?other, "Ignoring message");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::{
        relay_settings, sample_config, RecordingCallPlacer, RecordingTransport, ScriptedTranslator,
    };
    use crate::relay::transport::OutboundEvent;
    use futures_util::stream;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    fn engine(translator: ScriptedTranslator, calls: RecordingCallPlacer) -> RelayEngine {
        RelayEngine::new(SessionRegistry::new(), Arc::new(translator), Arc::new(calls), relay_settings())
    }

    fn prompt(text: &str) -> RelayResult<InboundMessage> {
        Ok(InboundMessage::Prompt { voice_prompt: text.to_string(), last: true })
    }

    fn setup() -> RelayResult<InboundMessage> {
        Ok(InboundMessage::Setup { call_sid: None })
    }

    #[tokio::test]
    async fn test_place_call_records_call_id() {
        let calls = RecordingCallPlacer::default();
        let engine = engine(ScriptedTranslator::tokens(&[]), calls.clone());
        engine.create_session("s1", sample_config("es-ES", "en-US")).await.unwrap();

        let call_id = engine
            .place_call("s1", Leg::Target, "+14430000000", "https://relay.example.com/voice/target/s1")
            .await
            .unwrap();

        assert_eq!(
            calls.calls(),
            vec![(
                "+15550001111".to_string(),
                "+14430000000".to_string(),
                "https://relay.example.com/voice/target/s1".to_string()
            )]
        );
        let session = engine.registry().get("s1").await.unwrap();
        assert_eq!(session.lock().await.leg(Leg::Target).call_id, Some(call_id));
        assert_eq!(engine.metrics().snapshot().sessions_created, 1);
    }

    /// Full conversation: both legs attach, one utterance each way, then a
    /// hang-up ends the session for both.
    #[tokio::test]
    async fn test_conversation_between_two_legs() {
        let translator = ScriptedTranslator::per_target(&[("es-ES", "Hola"), ("en-US", "Hello")]);
        let engine = engine(translator, RecordingCallPlacer::default());
        engine.create_session("s1", sample_config("es-ES", "en-US")).await.unwrap();

        let a = RecordingTransport::new("a");
        let b = RecordingTransport::new("b");
        let (a_tx, a_rx) = mpsc::channel(8);
        let (b_tx, b_rx) = mpsc::channel(8);

        let source = tokio::spawn({
            let engine = engine.clone();
            let a = a.clone();
            async move { engine.run_leg("s1", Leg::Source, a, ReceiverStream::new(a_rx)).await }
        });
        let target = tokio::spawn({
            let engine = engine.clone();
            let b = b.clone();
            async move { engine.run_leg("s1", Leg::Target, b, ReceiverStream::new(b_rx)).await }
        });

        a_tx.send(setup()).await.unwrap();
        while a.events().is_empty() {
            tokio::task::yield_now().await;
        }
        b_tx.send(setup()).await.unwrap();

        // Wait until the rendezvous completed before speaking
        while a.events().len() < 2 || b.events().is_empty() {
            tokio::task::yield_now().await;
        }

        a_tx.send(prompt("Hola")).await.unwrap();
        while b.events().len() < 3 {
            tokio::task::yield_now().await;
        }
        b_tx.send(prompt("Hello")).await.unwrap();
        while a.events().len() < 4 {
            tokio::task::yield_now().await;
        }

        // Source hangs up; the target's connection closes as a consequence
        drop(a_tx);
        source.await.unwrap();
        drop(b_tx);
        target.await.unwrap();

        assert!(engine.registry().get("s1").await.is_none());
        assert_eq!(
            b.events(),
            vec![
                OutboundEvent::final_text("Hello"),
                OutboundEvent::token("Hello"),
                OutboundEvent::end_of_utterance(),
                OutboundEvent::session_complete(),
            ]
        );
        assert_eq!(
            a.events(),
            vec![
                OutboundEvent::wait_tone(relay_settings().wait_url),
                OutboundEvent::final_text("Hola"),
                OutboundEvent::token("Hola"),
                OutboundEvent::end_of_utterance(),
                OutboundEvent::session_complete(),
            ]
        );
        assert!(a.is_closed());
        assert!(b.is_closed());
        assert_eq!(engine.metrics().snapshot().sessions_torn_down, 1);
    }

    #[tokio::test]
    async fn test_messages_for_unknown_session_are_dropped() {
        let engine = engine(ScriptedTranslator::tokens(&["x"]), RecordingCallPlacer::default());
        let a = RecordingTransport::new("a");

        let inbound = stream::iter(vec![setup(), prompt("Hola")]);
        engine.run_leg("ghost", Leg::Source, a.clone(), inbound).await;

        assert!(a.events().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_ends_leg() {
        let engine = engine(ScriptedTranslator::tokens(&["Hello"]), RecordingCallPlacer::default());
        engine.create_session("s1", sample_config("es-ES", "en-US")).await.unwrap();
        let a = RecordingTransport::new("a");

        let inbound = stream::iter(vec![
            setup(),
            Err(RelayError::TransportFailure("protocol error".to_string())),
            prompt("never read"),
        ]);
        engine.run_leg("s1", Leg::Source, a.clone(), inbound).await;

        assert!(engine.registry().is_empty().await);
        assert_eq!(
            a.events(),
            vec![OutboundEvent::wait_tone(relay_settings().wait_url), OutboundEvent::session_complete()]
        );
    }

    #[tokio::test]
    async fn test_translation_failure_keeps_session_alive() {
        let engine = engine(
            ScriptedTranslator::failing_after(&["Hello"], "stream reset"),
            RecordingCallPlacer::default(),
        );
        engine.create_session("s1", sample_config("es-ES", "en-US")).await.unwrap();
        let a = RecordingTransport::new("a");
        let b = RecordingTransport::new("b");
        engine.on_setup("s1", Leg::Target, b.clone(), None).await.unwrap();
        engine.on_setup("s1", Leg::Source, a.clone(), None).await.unwrap();
        let before = b.events().len();

        let err = engine.relay("s1", Leg::Source, "Hola").await.err();

        assert_eq!(err, Some(RelayError::TranslationFailure("stream reset".to_string())));
        assert_eq!(b.events()[before..].to_vec(), vec![OutboundEvent::token("Hello")]);
        assert!(engine.registry().get("s1").await.is_some());
    }
}
