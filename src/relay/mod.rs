//! Session relay engine: bridges two live calls that speak different
//! languages, translating each utterance and streaming the result to the
//! opposite leg.
//!
//! The engine is transport-agnostic. It sees each leg as a [`Transport`]
//! it can send [`OutboundEvent`]s to, fed by a stream of [`InboundMessage`]s.

pub mod chat_completion;
pub mod engine;
pub mod lifecycle;
pub mod metrics;
pub mod pump;
pub mod readiness;
pub mod registry;
pub mod session;
pub mod telephony;
pub mod translator;
pub mod transport;

#[cfg(test)]
pub mod testing;

pub use engine::RelayEngine;
pub use transport::{InboundMessage, Leg, OutboundEvent, Transport};
