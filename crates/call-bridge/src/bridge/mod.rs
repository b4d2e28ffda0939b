//! The call bridge controller
//!
//! [`CallBridge`] owns the shared state model (engine lifecycle, channel session,
//! remote users, local media, pending requests), the event dispatcher and the
//! permission gate. Commands are grouped by concern:
//!
//! - `lifecycle` - `initialize`, `destroy`
//! - `channel` - `join_channel`, `leave_channel`, `reconnect`
//! - `media` - local capture and remote subscriptions
//! - `ingest` - the engine-facing [`EngineEventSender`]
//!
//! # Locking
//!
//! A single mutex guards the state model. Commands claim their transition under
//! the lock, release it, then forward to the engine; a synchronous refusal rolls
//! the claim back. Engine events are applied and queued for delivery under the
//! same lock, so the delivery order is the order in which they were applied.
//! The sink itself is only ever called from the dispatcher's forwarding thread,
//! outside the state lock.
//!
//! A sink that keeps a clone of the bridge forms a reference cycle with it;
//! clear the sink before dropping the last handle.

mod channel;
mod ingest;
mod lifecycle;
mod media;
pub(crate) mod state;


use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::dispatch::{DispatchStats, EventDispatcher};
use crate::engine::RtcEngine;
use crate::error::Result;
use crate::events::CallEventSink;
use crate::permission::{CapabilityProvider, PermissionGate};
use crate::types::{CapabilityKind, CapabilityState, ChannelSession, EngineState, LocalMedia, RemoteUser, SessionState};

pub use ingest::EngineEventSender;

use state::CallState;

pub(crate) struct BridgeInner {
    pub(crate) state: Mutex<CallState>,
    pub(crate) engine: Arc<dyn RtcEngine>,
    pub(crate) dispatcher: EventDispatcher,
    pub(crate) permissions: PermissionGate,
}

/// Control-plane bridge between the application and the media engine
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct CallBridge {
    pub(crate) inner: Arc<BridgeInner>,
}

impl CallBridge {
    /// Create a bridge driving `engine`
    ///
    /// Starts the forwarding thread. The engine must be given
    /// [`CallBridge::engine_events`] to report its outcomes.
    pub fn new(
        config: BridgeConfig,
        engine: Arc<dyn RtcEngine>,
        capabilities: Arc<dyn CapabilityProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let dispatcher = EventDispatcher::start(
            config.event_queue_capacity,
            config.clear_timeout(),
            &config.forwarder_thread_name,
        )?;

        info!("Call bridge created");
        Ok(Self {
            inner: Arc::new(BridgeInner {
                state: Mutex::new(CallState::new()),
                engine,
                dispatcher,
                permissions: PermissionGate::new(capabilities),
            }),
        })
    }

    /// Handle the engine uses to report asynchronous events
    pub fn engine_events(&self) -> EngineEventSender {
        EngineEventSender::new(Arc::downgrade(&self.inner))
    }

    // ===== SINK =====

    /// Register the event sink, replacing any previous one
    pub fn set_sink(&self, sink: Arc<dyn CallEventSink>) {
        self.inner.dispatcher.set_sink(sink);
    }

    /// Detach the event sink
    ///
    /// Always safe, including with no sink installed or from inside a sink
    /// callback. Returns whether a sink was detached.
    pub fn clear_sink(&self) -> bool {
        self.inner.dispatcher.clear_sink()
    }

    pub fn has_sink(&self) -> bool {
        self.inner.dispatcher.has_sink()
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.inner.dispatcher.stats()
    }

    // ===== QUERIES =====

    pub fn engine_state(&self) -> EngineState {
        self.inner.state.lock().engine
    }

    /// Snapshot of the current channel session, if any
    pub fn session(&self) -> Option<ChannelSession> {
        self.inner.state.lock().session.clone()
    }

    pub fn session_state(&self) -> SessionState {
        self.inner.state.lock().session_state()
    }

    /// Ids of the remote users in the channel, sorted
    pub fn online_users(&self) -> Vec<String> {
        self.inner.state.lock().remote_users.keys().cloned().collect()
    }

    pub fn remote_user(&self, user_id: &str) -> Option<RemoteUser> {
        self.inner.state.lock().remote_users.get(user_id).cloned()
    }

    /// Local capture state as last accepted by the engine
    pub fn local_media(&self) -> LocalMedia {
        self.inner.state.lock().local.clone()
    }

    // ===== CAPABILITIES =====

    /// Whether the capability is currently granted
    pub fn has_capability(&self, kind: CapabilityKind) -> bool {
        self.inner.permissions.has_capability(kind)
    }

    /// Granted, denied, or pending an outstanding request
    pub fn capability_state(&self, kind: CapabilityKind) -> CapabilityState {
        self.inner.permissions.capability_state(kind)
    }

    /// Ask for capabilities; each answer arrives as a `permissionResult` event
    ///
    /// `request_code` correlates the answers with this request. Requesting again
    /// with a code that is still outstanding adds the kinds to that request.
    pub fn request_capabilities(&self, kinds: &[CapabilityKind], request_code: i32) -> Result<()> {
        debug!(
            "Requesting capabilities {:?} (request code {})",
            kinds, request_code
        );
        self.inner
            .permissions
            .request(Arc::downgrade(&self.inner), kinds, request_code)
    }
}

impl std::fmt::Debug for CallBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CallBridge")
            .field("engine", &state.engine)
            .field("session", &state.session_state())
            .field("remote_users", &state.remote_users.len())
            .finish()
    }
}
