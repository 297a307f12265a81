//! # Lifecycle Manager
//!
//! Sole owner of session teardown. Removing the session from the registry is
//! the first step, so a second teardown (the other leg's handler ending a
//! moment later, for instance) finds nothing and returns without side
//! effects. Transport failures during teardown are logged and swallowed.

use crate::relay::metrics::RelayMetrics;
use crate::relay::registry::SessionRegistry;
use crate::relay::transport::OutboundEvent;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct LifecycleManager {
    registry: SessionRegistry,
    metrics: Arc<RelayMetrics>,
}

impl LifecycleManager {
    pub fn new(registry: SessionRegistry, metrics: Arc<RelayMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Tear a session down: notify and close both legs, forget the session.
    ///
    /// Returns `true` if this call removed the session, `false` if it was
    /// already gone.
    pub async fn teardown(&self, session_id: &str) -> bool {
        let Some(handle) = self.registry.remove(session_id).await else {
            debug!(session_id, "Teardown skipped, session already gone");
            return false;
        };

        let (legs, created_at) = {
            let mut session = handle.lock().await;
            (session.detach_all(), session.created_at)
        };

        for (leg, transport) in legs {
            if let Err(err) = transport.send(OutboundEvent::session_complete()).await {
                warn!(session_id, leg = %leg, transport = transport.id(), "End notice not delivered: {}", err);
            }
            if let Err(err) = transport.close().await {
                warn!(session_id, leg = %leg, transport = transport.id(), "Close failed: {}", err);
            }
        }

        self.metrics.session_torn_down();
        info!(
            session_id,
            duration_secs = (Utc::now() - created_at).num_seconds(),
            "Session torn down"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::{sample_config, RecordingTransport};
    use crate::relay::transport::{Leg, Transport};

    #[tokio::test]
    async fn test_teardown_notifies_and_closes_both_legs() {
        let registry = SessionRegistry::new();
        let metrics = Arc::new(RelayMetrics::default());
        let lifecycle = LifecycleManager::new(registry.clone(), metrics.clone());

        let handle = registry.create("s1", sample_config("es-ES", "en-US")).await.unwrap();
        let a = RecordingTransport::new("a");
        let b = RecordingTransport::new("b");
        {
            let mut session = handle.lock().await;
            session.attach(Leg::Source, a.clone());
            session.attach(Leg::Target, b.clone());
        }

        assert!(lifecycle.teardown("s1").await);

        assert!(registry.get("s1").await.is_none());
        for transport in [&a, &b] {
            assert_eq!(transport.events(), vec![OutboundEvent::session_complete()]);
            assert!(transport.is_closed());
        }
        assert!(handle.lock().await.attached().is_empty());
        assert_eq!(metrics.snapshot().sessions_torn_down, 1);
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let registry = SessionRegistry::new();
        let metrics = Arc::new(RelayMetrics::default());
        let lifecycle = LifecycleManager::new(registry.clone(), metrics.clone());

        let handle = registry.create("s1", sample_config("es-ES", "en-US")).await.unwrap();
        let a = RecordingTransport::new("a");
        handle.lock().await.attach(Leg::Source, a.clone());

        assert!(lifecycle.teardown("s1").await);
        assert!(!lifecycle.teardown("s1").await);

        assert_eq!(a.events(), vec![OutboundEvent::session_complete()]);
        assert_eq!(a.close_calls(), 1);
        assert_eq!(metrics.snapshot().sessions_torn_down, 1);
    }

    #[tokio::test]
    async fn test_teardown_swallows_transport_failures() {
        let registry = SessionRegistry::new();
        let lifecycle = LifecycleManager::new(registry.clone(), Arc::new(RelayMetrics::default()));

        let handle = registry.create("s1", sample_config("es-ES", "en-US")).await.unwrap();
        let dead = RecordingTransport::new("dead");
        dead.close().await.unwrap();
        let alive = RecordingTransport::new("alive");
        {
            let mut session = handle.lock().await;
            session.attach(Leg::Source, dead.clone());
            session.attach(Leg::Target, alive.clone());
        }

        assert!(lifecycle.teardown("s1").await);

        assert!(dead.events().is_empty());
        assert_eq!(alive.events(), vec![OutboundEvent::session_complete()]);
        assert!(alive.is_closed());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_teardown_unknown_session() {
        let lifecycle = LifecycleManager::new(SessionRegistry::new(), Arc::new(RelayMetrics::default()));
        assert!(!lifecycle.teardown("never-created").await);
    }
}
