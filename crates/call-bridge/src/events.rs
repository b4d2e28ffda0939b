//! Events delivered to the application
//!
//! The external engine reports outcomes asynchronously. Each report is a
//! [`CallEvent`]; after the bridge has applied it to its state model it is
//! forwarded, in emission order, to the single registered [`CallEventSink`].
//!
//! # Event Types
//!
//! - **Lifecycle** - engine init result, engine destroyed
//! - **Channel** - join/leave results, remote users joining and leaving
//! - **Media** - local publish confirmations, remote subscription results
//! - **Capability** - permission request outcomes
//! - **Error** - engine faults not tied to a specific command
//!
//! # Usage Examples
//!
//! ## Handling specific events
//!
//! ```rust
//! use rvoip_call_bridge::events::{CallEvent, CallEventSink};
//!
//! struct RoomUi;
//!
//! impl CallEventSink for RoomUi {
//!     fn on_remote_user_joined(&self, user_id: &str) {
//!         println!("{} entered the room", user_id);
//!     }
//!
//!     fn on_error(&self, code: i32, message: &str) {
//!         eprintln!("engine fault {}: {}", code, message);
//!     }
//! }
//!
//! let ui = RoomUi;
//! ui.on_event(CallEvent::RemoteUserJoined { user_id: "u2".to_string() });
//! ```
//!
//! ## Closures as sinks
//!
//! ```rust
//! use rvoip_call_bridge::events::{CallEvent, CallEventSink};
//! use std::sync::Arc;
//!
//! let sink: Arc<dyn CallEventSink> = Arc::new(|event: CallEvent| {
//!     println!("event: {}", event.name());
//! });
//! sink.on_event(CallEvent::EngineDestroyed);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::types::CapabilityKind;

/// Permission result code: capability granted
pub const PERMISSION_GRANTED: i32 = 0;
/// Permission result code: capability denied
pub const PERMISSION_DENIED: i32 = 1;

/// Asynchronous notification from the engine or the permission gate
///
/// Codes follow the engine's convention: `0` is success, anything else is an
/// engine-specific failure the application interprets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallEvent {
    /// Result of `initialize`
    EngineInitResult { code: i32, message: String },
    /// The engine finished releasing its resources
    EngineDestroyed,
    /// Result of `join_channel` or `reconnect`
    JoinChannelResult {
        code: i32,
        channel: String,
        user_id: String,
    },
    /// Result of `leave_channel`; the session is Idle afterwards whatever the code
    LeaveChannelResult { code: i32 },
    /// A remote participant joined the channel
    RemoteUserJoined { user_id: String },
    /// A remote participant left the channel
    RemoteUserLeft { user_id: String, reason: i32 },
    /// Local video publish outcome
    LocalVideoPublished { code: i32 },
    /// Local audio publish outcome
    LocalAudioPublished { code: i32 },
    /// Remote video (un)subscription outcome
    RemoteVideoSubscribed { code: i32, user_id: String },
    /// Remote audio (un)subscription outcome
    RemoteAudioSubscribed { code: i32, user_id: String },
    /// Outcome of a capability request (`PERMISSION_GRANTED` / `PERMISSION_DENIED`)
    PermissionResult { kind: CapabilityKind, code: i32 },
    /// Engine fault not tied to a specific command
    Error { code: i32, message: String },
}

impl CallEvent {
    /// Stable event name, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            CallEvent::EngineInitResult { .. } => "engineInitResult",
            CallEvent::EngineDestroyed => "engineDestroyed",
            CallEvent::JoinChannelResult { .. } => "joinChannelResult",
            CallEvent::LeaveChannelResult { .. } => "leaveChannelResult",
            CallEvent::RemoteUserJoined { .. } => "remoteUserJoined",
            CallEvent::RemoteUserLeft { .. } => "remoteUserLeft",
            CallEvent::LocalVideoPublished { .. } => "localVideoPublished",
            CallEvent::LocalAudioPublished { .. } => "localAudioPublished",
            CallEvent::RemoteVideoSubscribed { .. } => "remoteVideoSubscribed",
            CallEvent::RemoteAudioSubscribed { .. } => "remoteAudioSubscribed",
            CallEvent::PermissionResult { .. } => "permissionResult",
            CallEvent::Error { .. } => "error",
        }
    }

    /// Result code carried by the event, if any
    pub fn code(&self) -> Option<i32> {
        match self {
            CallEvent::EngineInitResult { code, .. }
            | CallEvent::JoinChannelResult { code, .. }
            | CallEvent::LeaveChannelResult { code }
            | CallEvent::LocalVideoPublished { code }
            | CallEvent::LocalAudioPublished { code }
            | CallEvent::RemoteVideoSubscribed { code, .. }
            | CallEvent::RemoteAudioSubscribed { code, .. }
            | CallEvent::PermissionResult { code, .. }
            | CallEvent::Error { code, .. } => Some(*code),
            CallEvent::EngineDestroyed
            | CallEvent::RemoteUserJoined { .. }
            | CallEvent::RemoteUserLeft { .. } => None,
        }
    }

    /// User identity the event refers to, if any
    pub fn user_id(&self) -> Option<&str> {
        match self {
            CallEvent::JoinChannelResult { user_id, .. }
            | CallEvent::RemoteUserJoined { user_id }
            | CallEvent::RemoteUserLeft { user_id, .. }
            | CallEvent::RemoteVideoSubscribed { user_id, .. }
            | CallEvent::RemoteAudioSubscribed { user_id, .. } => Some(user_id),
            _ => None,
        }
    }

    /// Typed view of an `error` event
    pub fn engine_fault(&self) -> Option<BridgeError> {
        match self {
            CallEvent::Error { code, message } => Some(BridgeError::EngineFault {
                code: *code,
                message: message.clone(),
            }),
            _ => None,
        }
    }
}

/// The single consumer of bridge events
///
/// Every method has an empty default so implementors only override what they
/// care about. [`CallEventSink::on_event`] routes to the specific methods;
/// override it instead to receive the raw events.
///
/// Calls are strictly serialized and happen on the bridge's forwarding thread,
/// never while the bridge's state lock is held, so a sink may issue commands
/// from inside a callback.
pub trait CallEventSink: Send + Sync {
    fn on_engine_init_result(&self, _code: i32, _message: &str) {}

    fn on_engine_destroyed(&self) {}

    fn on_join_channel_result(&self, _code: i32, _channel: &str, _user_id: &str) {}

    fn on_leave_channel_result(&self, _code: i32) {}

    fn on_remote_user_joined(&self, _user_id: &str) {}

    fn on_remote_user_left(&self, _user_id: &str, _reason: i32) {}

    fn on_local_video_published(&self, _code: i32) {}

    fn on_local_audio_published(&self, _code: i32) {}

    fn on_remote_video_subscribed(&self, _code: i32, _user_id: &str) {}

    fn on_remote_audio_subscribed(&self, _code: i32, _user_id: &str) {}

    fn on_permission_result(&self, _kind: CapabilityKind, _code: i32) {}

    fn on_error(&self, _code: i32, _message: &str) {}

    /// Entry point used by the dispatcher
    fn on_event(&self, event: CallEvent) {
        match event {
            CallEvent::EngineInitResult { code, message } => {
                self.on_engine_init_result(code, &message)
            }
            CallEvent::EngineDestroyed => self.on_engine_destroyed(),
            CallEvent::JoinChannelResult {
                code,
                channel,
                user_id,
            } => self.on_join_channel_result(code, &channel, &user_id),
            CallEvent::LeaveChannelResult { code } => self.on_leave_channel_result(code),
            CallEvent::RemoteUserJoined { user_id } => self.on_remote_user_joined(&user_id),
            CallEvent::RemoteUserLeft { user_id, reason } => {
                self.on_remote_user_left(&user_id, reason)
            }
            CallEvent::LocalVideoPublished { code } => self.on_local_video_published(code),
            CallEvent::LocalAudioPublished { code } => self.on_local_audio_published(code),
            CallEvent::RemoteVideoSubscribed { code, user_id } => {
                self.on_remote_video_subscribed(code, &user_id)
            }
            CallEvent::RemoteAudioSubscribed { code, user_id } => {
                self.on_remote_audio_subscribed(code, &user_id)
            }
            CallEvent::PermissionResult { kind, code } => self.on_permission_result(kind, code),
            CallEvent::Error { code, message } => self.on_error(code, &message),
        }
    }
}

impl<F> CallEventSink for F
where
    F: Fn(CallEvent) + Send + Sync,
{
    fn on_event(&self, event: CallEvent) {
        self(event)
    }
}
