//! Streaming translation seam.
//!
//! A [`Translator`] turns one utterance into a lazy, finite stream of tokens.
//! The pump never polls that stream itself: [`TokenChannel`] moves it onto a
//! producer task that feeds an ordered, bounded channel, and aborts the task
//! as soon as the consumer goes away.

use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Tokens of one translation, in production order. Not restartable.
pub type TokenStream = BoxStream<'static, RelayResult<String>>;

/// Tokens buffered between the producer task and the pump.
const TOKEN_BUFFER: usize = 64;

#[async_trait]
pub trait Translator: Send + Sync {
    /// Start translating `text` from `source_lang` into `target_lang`.
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> RelayResult<TokenStream>;
}

/// Receiving end of a translation driven by a background producer task.
pub struct TokenChannel {
    tokens: mpsc::Receiver<RelayResult<String>>,
    producer: JoinHandle<()>,
}

impl TokenChannel {
    /// Spawn a producer that drains `stream` into an ordered channel.
    ///
    /// The producer stops at the first error, after forwarding it.
    pub fn spawn(mut stream: TokenStream) -> Self {
        let (tx, tokens) = mpsc::channel(TOKEN_BUFFER);

        let producer = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        });

        Self { tokens, producer }
    }

    /// Next token, `None` once the translation completed.
    pub async fn next(&mut self) -> Option<RelayResult<String>> {
        self.tokens.recv().await
    }
}

impl Drop for TokenChannel {
    fn drop(&mut self) {
        self.producer.abort();
    }
}

/// Translate and gather the whole result into one string.
pub async fn translate_collect(
    translator: &dyn Translator,
    text: &str,
    source_lang: &str,
    target_lang: &str,
) -> RelayResult<String> {
    let mut channel = TokenChannel::spawn(translator.translate(text, source_lang, target_lang).await?);
    let mut collected = String::new();

    while let Some(token) = channel.next().await {
        collected.push_str(&token?);
    }

    if collected.trim().is_empty() {
        return Err(RelayError::TranslationFailure("empty translation".to_string()));
    }
    Ok(collected)
}
