use std::sync::Weak;

use tracing::{debug, warn};

use super::state::Disposition;
use super::BridgeInner;
use crate::events::CallEvent;

/// Engine-side handle for reporting asynchronous events
///
/// May be cloned and used from any number of engine threads. Events are applied
/// to the bridge state and delivered to the sink in the order `emit` calls
/// complete. Once the bridge is dropped, emitted events are discarded.
#[derive(Clone)]
pub struct EngineEventSender {
    inner: Weak<BridgeInner>,
}

impl EngineEventSender {
    pub(crate) fn new(inner: Weak<BridgeInner>) -> Self {
        Self { inner }
    }

    /// Report an event; returns `false` if the bridge is gone
    pub fn emit(&self, event: CallEvent) -> bool {
        match self.inner.upgrade() {
            Some(inner) => {
                inner.ingest(event);
                true
            }
            None => {
                debug!("Bridge dropped, discarding {}", event.name());
                false
            }
        }
    }

    /// Whether the bridge still exists
    pub fn is_connected(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl std::fmt::Debug for EngineEventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineEventSender")
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl BridgeInner {
    /// Apply an event and queue it for delivery
    ///
    /// Queuing happens under the state lock so concurrent producers observe one
    /// global order.
    pub(crate) fn ingest(&self, event: CallEvent) {
        let mut state = self.state.lock();
        match state.apply_event(&event) {
            Disposition::Forward => {
                debug!(
                    "Engine event {} applied (engine {}, session {})",
                    event.name(),
                    state.engine,
                    state.session_state()
                );
                self.dispatcher.publish(event);
            }
            Disposition::Absorb(reason) => {
                warn!("Absorbing {} event: {}", event.name(), reason);
            }
        }
    }
}
