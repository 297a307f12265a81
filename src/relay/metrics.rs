//! Relay counters, reported by the health endpoint.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RelayMetrics {
    sessions_created: AtomicU64,
    sessions_torn_down: AtomicU64,
    utterances_relayed: AtomicU64,
    utterances_dropped: AtomicU64,
    translation_failures: AtomicU64,
    transport_failures: AtomicU64,
}

/// Point-in-time copy of [`RelayMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelayMetricsSnapshot {
    pub sessions_created: u64,
    pub sessions_torn_down: u64,
    pub utterances_relayed: u64,
    pub utterances_dropped: u64,
    pub translation_failures: u64,
    pub transport_failures: u64,
}

impl RelayMetrics {
    pub fn session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_torn_down(&self) {
        self.sessions_torn_down.fetch_add(1, Ordering::Relaxed);
    }

    pub fn utterance_relayed(&self) {
        self.utterances_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn utterance_dropped(&self) {
        self.utterances_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn translation_failed(&self) {
        self.translation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transport_failed(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayMetricsSnapshot {
        RelayMetricsSnapshot {
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_torn_down: self.sessions_torn_down.load(Ordering::Relaxed),
            utterances_relayed: self.utterances_relayed.load(Ordering::Relaxed),
            utterances_dropped: self.utterances_dropped.load(Ordering::Relaxed),
            translation_failures: self.translation_failures.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
        }
    }
}
