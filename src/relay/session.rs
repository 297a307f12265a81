//! # Translation Session State
//!
//! One [`TranslationSession`] ties the two legs of a translated call together.
//! Everything about the call pair that is decided when the translation is
//! requested (numbers, languages, voices, hold music) lives in the immutable
//! [`SessionConfig`]; the mutable part is which transports are attached and
//! whether the readiness notice went out.
//!
//! ## Session Lifecycle:
//! 1. **Created**: registered when the translation request is accepted
//! 2. **Waiting**: fewer than two legs attached, attached legs hear a wait tone
//! 3. **Ready**: both legs attached and notified, utterances flow both ways
//! 4. **Torn down**: removed from the registry, both transports closed

use crate::relay::transport::{Leg, Transport};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-leg settings fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct LegConfig {
    /// E.164 phone number of this party
    pub phone_number: String,
    /// Language the party speaks (BCP-47, e.g. "es-ES")
    pub language: String,
    /// Speech synthesis provider, forwarded to the carrier unchanged
    pub tts_provider: String,
    /// Voice name; empty means the provider's default
    pub voice: String,
}

/// Everything known about a call pair when it is requested.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub source: LegConfig,
    pub target: LegConfig,
    /// Play hold music to a speaker while the counterpart listens
    pub hold_music: bool,
}

impl SessionConfig {
    pub fn leg(&self, leg: Leg) -> &LegConfig {
        match leg {
            Leg::Source => &self.source,
            Leg::Target => &self.target,
        }
    }

    /// Derive the session id: creation time plus the digits of both numbers.
    pub fn session_id(&self, created_at: DateTime<Utc>) -> String {
        format!(
            "session_{}_{}_{}",
            created_at.timestamp(),
            self.source.phone_number.trim_start_matches('+'),
            self.target.phone_number.trim_start_matches('+'),
        )
    }
}

/// Connection state of one leg.
#[derive(Default)]
pub struct LegState {
    /// Live transport, `None` until the party's media stream attaches
    pub transport: Option<Arc<dyn Transport>>,
    /// Carrier call id, recorded after the call is placed
    pub call_id: Option<String>,
}

impl fmt::Debug for LegState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegState")
            .field("transport", &self.transport.as_ref().map(|t| t.id().to_string()))
            .field("call_id", &self.call_id)
            .finish()
    }
}

/// Where a session stands in the readiness rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Fewer than two legs attached
    Waiting,
    /// Both legs attached and the readiness notice was sent
    Ready,
}

/// State of one translation call pair.
#[derive(Debug)]
pub struct TranslationSession {
    pub id: String,
    pub config: SessionConfig,
    pub created_at: DateTime<Utc>,
    source: LegState,
    target: LegState,
    ready_notified: bool,
    /// Serializes setup handling, sends included, for this session
    setup_gate: Arc<Mutex<()>>,
}

impl TranslationSession {
    pub fn new(id: String, config: SessionConfig) -> Self {
        Self {
            id,
            config,
            created_at: Utc::now(),
            source: LegState::default(),
            target: LegState::default(),
            ready_notified: false,
            setup_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn leg(&self, leg: Leg) -> &LegState {
        match leg {
            Leg::Source => &self.source,
            Leg::Target => &self.target,
        }
    }

    fn leg_mut(&mut self, leg: Leg) -> &mut LegState {
        match leg {
            Leg::Source => &mut self.source,
            Leg::Target => &mut self.target,
        }
    }

    /// Attach a transport to a leg, replacing any previous one.
    ///
    /// The replaced transport is returned, not closed.
    pub fn attach(&mut self, leg: Leg, transport: Arc<dyn Transport>) -> Option<Arc<dyn Transport>> {
        self.leg_mut(leg).transport.replace(transport)
    }

    pub fn set_call_id(&mut self, leg: Leg, call_id: impl Into<String>) {
        self.leg_mut(leg).call_id = Some(call_id.into());
    }

    pub fn transport(&self, leg: Leg) -> Option<Arc<dyn Transport>> {
        self.leg(leg).transport.clone()
    }

    /// Transports of every attached leg.
    pub fn attached(&self) -> Vec<(Leg, Arc<dyn Transport>)> {
        Leg::BOTH
            .into_iter()
            .filter_map(|leg| self.transport(leg).map(|t| (leg, t)))
            .collect()
    }

    pub fn both_attached(&self) -> bool {
        self.source.transport.is_some() && self.target.transport.is_some()
    }

    pub fn readiness(&self) -> Readiness {
        if self.ready_notified() {
            Readiness::Ready
        } else {
            Readiness::Waiting
        }
    }

    pub fn ready_notified(&self) -> bool {
        self.ready_notified
    }

    /// Held by the readiness coordinator for a whole setup, so a wait tone
    /// decided before the notice was claimed is always sent before the notice.
    pub fn setup_gate(&self) -> Arc<Mutex<()>> {
        self.setup_gate.clone()
    }

    /// Claim the one-time readiness notice.
    ///
    /// Returns `true` exactly once per session, and only when both legs are
    /// attached. The caller that gets `true` sends the notice.
    pub fn claim_ready_notice(&mut self) -> bool {
        if self.ready_notified || !self.both_attached() {
            return false;
        }
        self.ready_notified = true;
        true
    }

    /// Release both transports, leaving the session detached.
    pub fn detach_all(&mut self) -> Vec<(Leg, Arc<dyn Transport>)> {
        Leg::BOTH
            .into_iter()
            .filter_map(|leg| self.leg_mut(leg).transport.take().map(|t| (leg, t)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::{sample_config, RecordingTransport};

    #[test]
    fn test_session_id_derivation() {
        let config = sample_config("es-ES", "en-US");
        let created_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(
            config.session_id(created_at),
            "session_1700000000_34600111222_15550001111"
        );
    }

    #[test]
    fn test_ready_notice_claimed_once() {
        let mut session = TranslationSession::new("s1".to_string(), sample_config("es-ES", "en-US"));
        assert!(!session.claim_ready_notice());

        session.attach(Leg::Source, RecordingTransport::new("a"));
        assert!(!session.claim_ready_notice());
        assert_eq!(session.readiness(), Readiness::Waiting);

        session.attach(Leg::Target, RecordingTransport::new("b"));
        assert!(session.claim_ready_notice());
        assert!(!session.claim_ready_notice());
        assert_eq!(session.readiness(), Readiness::Ready);
    }

    #[test]
    fn test_attach_replaces_without_closing() {
        let mut session = TranslationSession::new("s1".to_string(), sample_config("es-ES", "en-US"));
        let first = RecordingTransport::new("first");
        assert!(session.attach(Leg::Source, first.clone()).is_none());

        let replaced = session.attach(Leg::Source, RecordingTransport::new("second"));
        assert_eq!(replaced.map(|t| t.id().to_string()), Some("first".to_string()));
        assert!(!first.is_closed());
        assert_eq!(session.transport(Leg::Source).unwrap().id(), "second");
    }
}
