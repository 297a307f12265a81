//! Test doubles for the relay engine's collaborators.

use crate::config::{AppConfig, RelayConfig};
use crate::error::{RelayError, RelayResult};
use crate::relay::session::{LegConfig, SessionConfig};
use crate::relay::telephony::CallPlacer;
use crate::relay::transport::{OutboundEvent, Transport};
use crate::relay::translator::{TokenStream, Translator};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn sample_config(source_language: &str, target_language: &str) -> SessionConfig {
    SessionConfig {
        source: LegConfig {
            phone_number: "+34600111222".to_string(),
            language: source_language.to_string(),
            tts_provider: "ElevenLabs".to_string(),
            voice: String::new(),
        },
        target: LegConfig {
            phone_number: "+15550001111".to_string(),
            language: target_language.to_string(),
            tts_provider: "Google".to_string(),
            voice: "en-US-Journey-O".to_string(),
        },
        hold_music: false,
    }
}

pub fn relay_settings() -> RelayConfig {
    AppConfig::default().relay
}

/// Transport that records everything sent to it.
pub struct RecordingTransport {
    id: String,
    events: Mutex<Vec<OutboundEvent>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    /// Yield to the scheduler before recording each send
    yielding: bool,
}

impl RecordingTransport {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            events: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            yielding: false,
        })
    }

    /// Like [`new`](Self::new), but every send suspends once before it lands.
    pub fn yielding(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            events: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            yielding: true,
        })
    }

    pub fn events(&self) -> Vec<OutboundEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, event: OutboundEvent) -> RelayResult<()> {
        if self.yielding {
            tokio::task::yield_now().await;
        }
        if self.is_closed() {
            return Err(RelayError::TransportFailure(format!("{} is closed", self.id)));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn close(&self) -> RelayResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(RelayError::TransportFailure(format!("{} already closed", self.id)));
        }
        Ok(())
    }
}

/// How a scripted translation ends after its tokens.
#[derive(Debug, Clone)]
enum Ending {
    Complete,
    Fail(String),
    Hang,
}

#[derive(Debug, Clone)]
struct Script {
    tokens: Vec<String>,
    ending: Ending,
}

impl Script {
    fn new(tokens: &[&str], ending: Ending) -> Self {
        Self { tokens: tokens.iter().map(|t| t.to_string()).collect(), ending }
    }

    fn into_stream(self) -> TokenStream {
        let tokens = stream::iter(self.tokens.into_iter().map(Ok));
        match self.ending {
            Ending::Complete => tokens.boxed(),
            Ending::Fail(msg) => tokens
                .chain(stream::once(async move { Err(RelayError::TranslationFailure(msg)) }))
                .boxed(),
            Ending::Hang => tokens.chain(stream::pending()).boxed(),
        }
    }
}

/// Translator that replays canned token sequences and records its calls.
#[derive(Clone)]
pub struct ScriptedTranslator {
    default: Script,
    per_target: Arc<HashMap<String, Script>>,
    unavailable: Option<String>,
    calls: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl ScriptedTranslator {
    fn with_default(default: Script) -> Self {
        Self {
            default,
            per_target: Arc::new(HashMap::new()),
            unavailable: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every translation yields `tokens`, then completes.
    pub fn tokens(tokens: &[&str]) -> Self {
        Self::with_default(Script::new(tokens, Ending::Complete))
    }

    /// Every translation yields `tokens`, then fails with `message`.
    pub fn failing_after(tokens: &[&str], message: &str) -> Self {
        Self::with_default(Script::new(tokens, Ending::Fail(message.to_string())))
    }

    /// Every translation yields `tokens`, then never finishes.
    pub fn hanging_after(tokens: &[&str]) -> Self {
        Self::with_default(Script::new(tokens, Ending::Hang))
    }

    /// Every translation fails before producing a stream.
    pub fn unavailable(message: &str) -> Self {
        let mut translator = Self::tokens(&[]);
        translator.unavailable = Some(message.to_string());
        translator
    }

    /// Translations into each listed language yield that language's text.
    pub fn per_target(translations: &[(&str, &str)]) -> Self {
        let mut translator = Self::tokens(&[]);
        translator.per_target = Arc::new(
            translations
                .iter()
                .map(|(lang, text)| (lang.to_string(), Script::new(&[*text], Ending::Complete)))
                .collect(),
        );
        translator
    }

    /// `(text, source_lang, target_lang)` of every call, in order.
    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Translator for ScriptedTranslator {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> RelayResult<TokenStream> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), source_lang.to_string(), target_lang.to_string()));

        if let Some(message) = &self.unavailable {
            return Err(RelayError::TranslationFailure(message.clone()));
        }

        let script = self.per_target.get(target_lang).unwrap_or(&self.default).clone();
        Ok(script.into_stream())
    }
}

/// Call placer that hands out sequential call ids and records each request.
#[derive(Clone, Default)]
pub struct RecordingCallPlacer {
    calls: Arc<Mutex<Vec<(String, String, String)>>>,
    fail_on_call: Option<usize>,
}

impl RecordingCallPlacer {
    /// Fails the `n`-th call (1-based) with a carrier error.
    pub fn failing_on(n: usize) -> Self {
        Self { fail_on_call: Some(n), ..Self::default() }
    }

    /// `(to, from, callback_url)` of every call, in order.
    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallPlacer for RecordingCallPlacer {
    async fn place_call(&self, to: &str, from: &str, callback_url: &str) -> RelayResult<String> {
        let mut calls = self.calls.lock().unwrap();
        calls.push((to.to_string(), from.to_string(), callback_url.to_string()));

        if self.fail_on_call == Some(calls.len()) {
            return Err(RelayError::CallPlacement(format!("carrier rejected call to {}", to)));
        }
        Ok(format!("CA{:032}", calls.len()))
    }
}
