//! Type definitions for the call bridge
//!
//! This module holds the in-memory state model shared by the lifecycle,
//! channel and media components:
//!
//! - **EngineState** - the single process-wide engine lifecycle
//! - **ChannelSession** - the (at most one) active channel membership
//! - **RemoteUser** - remote participants tracked while a session is joined
//! - **PendingRequest** - bookkeeping that correlates an issued asynchronous
//!   command with its completion event
//!
//! Nothing here is persisted; a new bridge always starts `Uninitialized`.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound of the local capture volume accepted by `set_local_volume`
pub const MAX_LOCAL_VOLUME: i32 = 100;

// ===== ENGINE LIFECYCLE =====

/// Lifecycle of the external engine as seen by the bridge
///
/// ```text
/// Uninitialized ──initialize──▶ Initializing ──init ok──▶ Ready
///       ▲                            │
///       └───────── init failed ──────┘
/// Ready ──destroy──▶ Destroying ──destroyed──▶ Destroyed (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EngineState {
    /// No engine instance yet
    #[default]
    Uninitialized,
    /// `initialize` accepted, waiting for the init result
    Initializing,
    /// Engine usable
    Ready,
    /// `destroy` accepted, waiting for the destroyed notification
    Destroying,
    /// Engine released; no further commands are accepted
    Destroyed,
}

impl EngineState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Destroyed)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "Uninitialized",
            EngineState::Initializing => "Initializing",
            EngineState::Ready => "Ready",
            EngineState::Destroying => "Destroying",
            EngineState::Destroyed => "Destroyed",
        };
        f.write_str(name)
    }
}

// ===== CHANNEL SESSION =====

/// State of the channel session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No channel membership
    #[default]
    Idle,
    /// Join forwarded, waiting for the join result
    Joining,
    /// Member of the channel
    Joined,
    /// Leave forwarded, waiting for the leave result
    Leaving,
    /// Rejoin forwarded while joined, waiting for a join result
    Reconnecting,
}

impl SessionState {
    /// Joined or reconnecting: the session has remote peers and local media
    /// keeps flowing
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Joined | SessionState::Reconnecting)
    }

    /// A join, leave or reconnect is waiting for its completion event
    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            SessionState::Joining | SessionState::Leaving | SessionState::Reconnecting
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::Joining => "Joining",
            SessionState::Joined => "Joined",
            SessionState::Leaving => "Leaving",
            SessionState::Reconnecting => "Reconnecting",
        };
        f.write_str(name)
    }
}

/// The active channel membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSession {
    /// Channel (room) name
    pub channel_name: String,
    /// Local user identity in the channel
    pub local_user_id: String,
    /// Join token; only held until the join attempt completes
    pub token: Option<String>,
    /// Current session state
    pub state: SessionState,
    /// When the join was confirmed
    pub joined_at: Option<DateTime<Utc>>,
}

impl ChannelSession {
    pub(crate) fn joining(channel_name: &str, local_user_id: &str, token: &str) -> Self {
        Self {
            channel_name: channel_name.to_string(),
            local_user_id: local_user_id.to_string(),
            token: Some(token.to_string()),
            state: SessionState::Joining,
            joined_at: None,
        }
    }
}

/// A remote participant of the current channel
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteUser {
    /// Remote user identity, unique within the session
    pub user_id: String,
    /// Whether the remote video stream is subscribed
    pub video_subscribed: bool,
    /// Whether the remote audio stream is subscribed
    pub audio_subscribed: bool,
}

impl RemoteUser {
    pub(crate) fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn flag_mut(&mut self, media: MediaKind) -> &mut bool {
        match media {
            MediaKind::Video => &mut self.video_subscribed,
            MediaKind::Audio => &mut self.audio_subscribed,
        }
    }
}

/// Media kind of a remote stream subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => f.write_str("video"),
            MediaKind::Audio => f.write_str("audio"),
        }
    }
}

/// Local capture state as last accepted by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMedia {
    pub camera_enabled: bool,
    pub microphone_enabled: bool,
    pub volume: u8,
    /// Last `localVideoPublished` code, including ones received while not joined
    pub last_video_publish_code: Option<i32>,
    /// Last `localAudioPublished` code, including ones received while not joined
    pub last_audio_publish_code: Option<i32>,
}

impl Default for LocalMedia {
    fn default() -> Self {
        Self {
            camera_enabled: false,
            microphone_enabled: false,
            volume: MAX_LOCAL_VOLUME as u8,
            last_video_publish_code: None,
            last_audio_publish_code: None,
        }
    }
}

// ===== CAPABILITIES =====

/// OS-level capability that local capture depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CapabilityKind {
    Camera,
    Microphone,
}

impl CapabilityKind {
    /// Wire value used by the permission result event (0 camera, 1 microphone)
    pub fn code(&self) -> i32 {
        match self {
            CapabilityKind::Camera => 0,
            CapabilityKind::Microphone => 1,
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::Camera => f.write_str("camera"),
            CapabilityKind::Microphone => f.write_str("microphone"),
        }
    }
}

/// Answer of a capability state query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapabilityState {
    Granted,
    Denied,
    /// A request for this capability is outstanding
    Pending,
}

// ===== PENDING REQUESTS =====

/// An issued asynchronous operation awaiting its completion event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Bridge-local id, used to roll back a claim when the engine refuses it
    pub id: u64,
    pub kind: PendingKind,
}

/// What a [`PendingRequest`] is waiting for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingKind {
    Initialize,
    Destroy,
    Join {
        channel: String,
        user_id: String,
    },
    Reconnect {
        channel: String,
        user_id: String,
    },
    Leave {
        /// Session state to restore if the engine refuses the leave
        previous: SessionState,
    },
    Subscribe {
        user_id: String,
        media: MediaKind,
        /// Engine-confirmed flag value this request started from
        previous: bool,
        requested: bool,
    },
    Permission {
        request_code: i32,
        kinds: BTreeSet<CapabilityKind>,
    },
}

impl PendingKind {
    /// Whether this request only makes sense inside the current channel session
    pub fn is_session_scoped(&self) -> bool {
        matches!(
            self,
            PendingKind::Join { .. }
                | PendingKind::Reconnect { .. }
                | PendingKind::Leave { .. }
                | PendingKind::Subscribe { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_state_defaults_to_uninitialized() {
        assert_eq!(EngineState::default(), EngineState::Uninitialized);
        assert!(EngineState::Destroyed.is_terminal());
        assert!(!EngineState::Destroying.is_terminal());
    }

    #[test]
    fn test_session_state_predicates() {
        assert!(SessionState::Joined.is_active());
        assert!(SessionState::Reconnecting.is_active());
        assert!(!SessionState::Leaving.is_active());

        assert!(SessionState::Joining.is_transitioning());
        assert!(SessionState::Leaving.is_transitioning());
        assert!(!SessionState::Joined.is_transitioning());
        assert!(!SessionState::Idle.is_transitioning());
    }

    #[test]
    fn test_capability_codes_match_wire_values() {
        assert_eq!(CapabilityKind::Camera.code(), 0);
        assert_eq!(CapabilityKind::Microphone.code(), 1);
    }

    #[test]
    fn test_remote_user_flags() {
        let mut user = RemoteUser::new("u1");
        *user.flag_mut(MediaKind::Audio) = true;
        assert!(user.audio_subscribed);
        assert!(!user.video_subscribed);
    }
}
