//! Per-leg transport abstraction and the messages that cross it.
//!
//! The relay engine never talks to a socket directly. Each attached leg is a
//! [`Transport`] (the outbound half) plus an ordered stream of
//! [`InboundMessage`]s (the inbound half) fed by whatever network adapter
//! accepted the connection.

use crate::error::RelayResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One side of a translated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Leg {
    /// The party who requested the translation (dialed first)
    Source,
    /// The party being called
    Target,
}

impl Leg {
    /// The counterpart of this leg.
    pub fn other(self) -> Leg {
        match self {
            Leg::Source => Leg::Target,
            Leg::Target => Leg::Source,
        }
    }

    /// Path segment used in webhook and WebSocket URLs.
    pub fn as_str(self) -> &'static str {
        match self {
            Leg::Source => "source",
            Leg::Target => "target",
        }
    }

    pub const BOTH: [Leg; 2] = [Leg::Source, Leg::Target];
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Leg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(Leg::Source),
            "target" => Ok(Leg::Target),
            other => Err(format!("Unknown leg '{}'", other)),
        }
    }
}

/// Messages a leg sends to the relay (ConversationRelay wire format).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// The leg is connected and ready to receive
    Setup {
        #[serde(default, rename = "callSid")]
        call_sid: Option<String>,
    },

    /// A recognized utterance
    Prompt {
        #[serde(rename = "voicePrompt")]
        voice_prompt: String,
        /// `false` for partial prompts, which are not relayed
        #[serde(default = "default_last")]
        last: bool,
    },

    /// A recognized utterance, alternate framing
    SpeechRecognition {
        #[serde(alias = "voicePrompt")]
        text: String,
    },

    /// The caller talked over playback
    Interrupt {
        #[serde(default, rename = "utteranceUntilInterrupt")]
        utterance_until_interrupt: Option<String>,
    },

    /// A keypad press
    Dtmf {
        #[serde(default)]
        digit: Option<String>,
    },

    /// Carrier-side error report
    Error {
        #[serde(default)]
        description: Option<String>,
    },

    /// Speaker events and other informational messages
    Info,

    #[serde(other)]
    Unknown,
}

fn default_last() -> bool {
    true
}

impl InboundMessage {
    /// The utterance carried by this message, if it is a complete one.
    pub fn utterance(&self) -> Option<&str> {
        match self {
            InboundMessage::Prompt { voice_prompt, last: true } => Some(voice_prompt),
            InboundMessage::SpeechRecognition { text } => Some(text),
            _ => None,
        }
    }
}

/// Messages the relay sends to a leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundEvent {
    /// Audio playback request (hold music, wait tone)
    Play {
        source: String,
        /// Number of repetitions, 0 loops until preempted
        #[serde(rename = "loop")]
        loop_count: u32,
        preemptible: bool,
        interruptible: bool,
    },

    /// A translated token, or the end-of-utterance marker when `last` is set
    Text { token: String, last: bool },

    /// Session termination notice
    End {
        #[serde(rename = "handoffData")]
        handoff_data: String,
    },
}

impl OutboundEvent {
    pub fn token(token: impl Into<String>) -> Self {
        OutboundEvent::Text { token: token.into(), last: false }
    }

    pub fn end_of_utterance() -> Self {
        OutboundEvent::Text { token: String::new(), last: true }
    }

    /// A complete message delivered in one piece.
    pub fn final_text(text: impl Into<String>) -> Self {
        OutboundEvent::Text { token: text.into(), last: true }
    }

    /// Looping hold music that the next real message cuts off.
    pub fn hold_music(source: impl Into<String>) -> Self {
        OutboundEvent::Play {
            source: source.into(),
            loop_count: 0,
            preemptible: true,
            interruptible: true,
        }
    }

    /// Looping wait tone played while the counterpart has not joined.
    pub fn wait_tone(source: impl Into<String>) -> Self {
        OutboundEvent::Play {
            source: source.into(),
            loop_count: 0,
            preemptible: true,
            interruptible: false,
        }
    }

    pub fn session_complete() -> Self {
        OutboundEvent::End { handoff_data: "session complete".to_string() }
    }
}

/// Outbound half of a leg's duplex channel.
///
/// Implementations must deliver events in the order `send` is awaited.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Identifier used in logs
    fn id(&self) -> &str;

    async fn send(&self, event: OutboundEvent) -> RelayResult<()>;

    async fn close(&self) -> RelayResult<()>;
}
