//! Shared state model and its transitions
//!
//! Everything here is pure bookkeeping guarded by the bridge's single state
//! lock. Commands first *claim* a transition (`begin_*`), then the lock is
//! released and the command is forwarded to the engine; a synchronous engine
//! refusal rolls the claim back through [`CallState::abort`]. Engine events are
//! applied with [`CallState::apply_event`], which also decides whether the event
//! is forwarded to the sink or absorbed.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::error::{BridgeError, Result};
use crate::events::CallEvent;
use crate::types::{
    ChannelSession, EngineState, LocalMedia, MediaKind, PendingKind, PendingRequest, RemoteUser,
    SessionState,
};

/// What to do with an applied event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// Deliver to the sink
    Forward,
    /// Applied (or ignored) silently; the reason is logged
    Absorb(&'static str),
}

#[derive(Debug, Default)]
pub(crate) struct CallState {
    pub engine: EngineState,
    pub debug_mode: bool,
    /// `None` is the Idle session
    pub session: Option<ChannelSession>,
    pub remote_users: BTreeMap<String, RemoteUser>,
    pub local: LocalMedia,
    pending: Vec<PendingRequest>,
    next_request_id: u64,
}

impl CallState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(SessionState::Idle)
    }

    #[cfg(test)]
    pub fn pending(&self) -> &[PendingRequest] {
        &self.pending
    }

    fn push_pending(&mut self, kind: PendingKind) -> u64 {
        self.next_request_id += 1;
        let id = self.next_request_id;
        self.pending.push(PendingRequest { id, kind });
        id
    }

    fn take_pending_where(&mut self, pred: impl Fn(&PendingKind) -> bool) -> Option<PendingKind> {
        let pos = self.pending.iter().position(|p| pred(&p.kind))?;
        Some(self.pending.remove(pos).kind)
    }

    fn set_session_state(&mut self, state: SessionState) {
        if let Some(session) = self.session.as_mut() {
            session.state = state;
        }
    }

    /// Back to Idle: drops the session, its remote users and session-scoped requests
    fn reset_session(&mut self) {
        self.session = None;
        self.remote_users.clear();
        self.pending.retain(|p| !p.kind.is_session_scoped());
    }

    // ===== GUARDS =====

    pub fn require_ready(&self, operation: &'static str) -> Result<()> {
        if self.engine != EngineState::Ready {
            return Err(BridgeError::invalid_state(operation, self.engine));
        }
        Ok(())
    }

    fn require_session(&self, operation: &'static str, allowed: &[SessionState]) -> Result<()> {
        let current = self.session_state();
        if !allowed.contains(&current) {
            return Err(BridgeError::invalid_state(
                operation,
                format!("session {}", current),
            ));
        }
        Ok(())
    }

    // ===== ENGINE LIFECYCLE =====

    pub fn begin_initialize(&mut self, app_id: &str, debug_mode: bool) -> Result<u64> {
        if self.engine != EngineState::Uninitialized {
            return Err(BridgeError::invalid_state("initialize", self.engine));
        }
        if app_id.is_empty() {
            return Err(BridgeError::invalid_argument("app id must not be empty"));
        }
        self.engine = EngineState::Initializing;
        self.debug_mode = debug_mode;
        Ok(self.push_pending(PendingKind::Initialize))
    }

    pub fn begin_destroy(&mut self) -> Result<u64> {
        self.require_ready("destroy")?;
        let session = self.session_state();
        if session.is_transitioning() {
            return Err(BridgeError::invalid_state(
                "destroy",
                format!("session {}", session),
            ));
        }
        self.engine = EngineState::Destroying;
        Ok(self.push_pending(PendingKind::Destroy))
    }

    // ===== CHANNEL SESSION =====

    pub fn begin_join(&mut self, channel: &str, user_id: &str, token: &str) -> Result<u64> {
        self.require_ready("join_channel")?;
        self.require_session("join_channel", &[SessionState::Idle])?;
        if channel.is_empty() {
            return Err(BridgeError::invalid_argument("channel name must not be empty"));
        }
        if user_id.is_empty() {
            return Err(BridgeError::invalid_argument("user id must not be empty"));
        }

        self.remote_users.clear();
        self.session = Some(ChannelSession::joining(channel, user_id, token));
        Ok(self.push_pending(PendingKind::Join {
            channel: channel.to_string(),
            user_id: user_id.to_string(),
        }))
    }

    pub fn begin_leave(&mut self) -> Result<u64> {
        self.require_ready("leave_channel")?;
        self.require_session(
            "leave_channel",
            &[SessionState::Joined, SessionState::Reconnecting],
        )?;
        let previous = self.session_state();
        self.set_session_state(SessionState::Leaving);
        Ok(self.push_pending(PendingKind::Leave { previous }))
    }

    /// Returns the request id plus the channel and user to rejoin with
    pub fn begin_reconnect(&mut self) -> Result<(u64, String, String)> {
        self.require_ready("reconnect")?;
        self.require_session("reconnect", &[SessionState::Joined])?;
        let Some(session) = self.session.as_mut() else {
            return Err(BridgeError::invalid_state("reconnect", "no session"));
        };
        session.state = SessionState::Reconnecting;
        let channel = session.channel_name.clone();
        let user_id = session.local_user_id.clone();
        let id = self.push_pending(PendingKind::Reconnect {
            channel: channel.clone(),
            user_id: user_id.clone(),
        });
        Ok((id, channel, user_id))
    }

    // ===== MEDIA CONTROL =====

    /// Optimistically set a subscription flag; returns the request id
    pub fn begin_subscribe(&mut self, user_id: &str, media: MediaKind, subscribe: bool) -> Result<u64> {
        let operation = match media {
            MediaKind::Video => "subscribe_remote_video",
            MediaKind::Audio => "subscribe_remote_audio",
        };
        self.require_ready(operation)?;
        self.require_session(operation, &[SessionState::Joined, SessionState::Reconnecting])?;
        let Some(user) = self.remote_users.get_mut(user_id) else {
            return Err(BridgeError::not_found(user_id));
        };

        let flag = user.flag_mut(media);
        let previous = *flag;
        *flag = subscribe;
        Ok(self.push_pending(PendingKind::Subscribe {
            user_id: user_id.to_string(),
            media,
            previous,
            requested: subscribe,
        }))
    }

    // ===== ROLLBACK =====

    /// Undo a claimed transition the engine refused
    pub fn abort(&mut self, request_id: u64) {
        let Some(pos) = self.pending.iter().position(|p| p.id == request_id) else {
            return;
        };
        match self.pending.remove(pos).kind {
            PendingKind::Initialize => {
                if self.engine == EngineState::Initializing {
                    self.engine = EngineState::Uninitialized;
                }
            }
            PendingKind::Destroy => {
                if self.engine == EngineState::Destroying {
                    self.engine = EngineState::Ready;
                }
            }
            PendingKind::Join { .. } => {
                if self.session_state() == SessionState::Joining {
                    self.reset_session();
                }
            }
            PendingKind::Reconnect { .. } => {
                if self.session_state() == SessionState::Reconnecting {
                    self.set_session_state(SessionState::Joined);
                }
            }
            PendingKind::Leave { previous } => {
                if self.session_state() == SessionState::Leaving {
                    self.set_session_state(previous);
                }
            }
            PendingKind::Subscribe {
                user_id,
                media,
                previous,
                ..
            } => self.settle_subscription(&user_id, media, previous),
            PendingKind::Permission { .. } => {}
        }
    }

    // ===== EVENTS =====

    /// Apply an event to the state model
    pub fn apply_event(&mut self, event: &CallEvent) -> Disposition {
        if self.engine == EngineState::Destroyed && !matches!(event, CallEvent::PermissionResult { .. }) {
            return Disposition::Absorb("engine already destroyed");
        }

        match event {
            CallEvent::EngineInitResult { code, .. } => self.on_init_result(*code),
            CallEvent::EngineDestroyed => self.on_destroyed(),
            CallEvent::JoinChannelResult {
                code,
                channel,
                user_id,
            } => self.on_join_result(*code, channel, user_id),
            CallEvent::LeaveChannelResult { .. } => self.on_leave_result(),
            CallEvent::RemoteUserJoined { user_id } => self.on_remote_joined(user_id),
            CallEvent::RemoteUserLeft { user_id, .. } => self.on_remote_left(user_id),
            CallEvent::LocalVideoPublished { code } => {
                self.local.last_video_publish_code = Some(*code);
                self.publish_disposition()
            }
            CallEvent::LocalAudioPublished { code } => {
                self.local.last_audio_publish_code = Some(*code);
                self.publish_disposition()
            }
            CallEvent::RemoteVideoSubscribed { code, user_id } => {
                self.on_subscribed(*code, user_id, MediaKind::Video)
            }
            CallEvent::RemoteAudioSubscribed { code, user_id } => {
                self.on_subscribed(*code, user_id, MediaKind::Audio)
            }
            CallEvent::PermissionResult { .. } => Disposition::Forward,
            CallEvent::Error { .. } => Disposition::Forward,
        }
    }

    fn on_init_result(&mut self, code: i32) -> Disposition {
        if self.engine != EngineState::Initializing {
            return Disposition::Absorb("init result while not initializing");
        }
        self.take_pending_where(|k| matches!(k, PendingKind::Initialize));
        self.engine = if code == 0 {
            EngineState::Ready
        } else {
            EngineState::Uninitialized
        };
        Disposition::Forward
    }

    fn on_destroyed(&mut self) -> Disposition {
        if self.engine != EngineState::Destroying {
            return Disposition::Absorb("destroyed notification while not destroying");
        }
        self.reset_session();
        self.pending.clear();
        self.local = LocalMedia::default();
        self.engine = EngineState::Destroyed;
        Disposition::Forward
    }

    fn on_join_result(&mut self, code: i32, channel: &str, user_id: &str) -> Disposition {
        let state = self.session_state();
        if !matches!(state, SessionState::Joining | SessionState::Reconnecting) {
            return Disposition::Absorb("join result without a pending join");
        }
        let matched = self.take_pending_where(|k| match k {
            PendingKind::Join {
                channel: c,
                user_id: u,
            }
            | PendingKind::Reconnect {
                channel: c,
                user_id: u,
            } => c == channel && u == user_id,
            _ => false,
        });
        if matched.is_none() {
            return Disposition::Absorb("join result for a different channel or user");
        }

        if code == 0 {
            if let Some(session) = self.session.as_mut() {
                session.state = SessionState::Joined;
                session.token = None;
                if state == SessionState::Joining {
                    session.joined_at = Some(Utc::now());
                }
            }
        } else {
            self.reset_session();
        }
        Disposition::Forward
    }

    fn on_leave_result(&mut self) -> Disposition {
        if self.session_state() != SessionState::Leaving {
            return Disposition::Absorb("leave result while not leaving");
        }
        self.reset_session();
        Disposition::Forward
    }

    fn on_remote_joined(&mut self, user_id: &str) -> Disposition {
        if !self.session_state().is_active() {
            return Disposition::Absorb("remote join outside an active session");
        }
        if self.remote_users.contains_key(user_id) {
            return Disposition::Absorb("duplicate remote join");
        }
        self.remote_users
            .insert(user_id.to_string(), RemoteUser::new(user_id));
        Disposition::Forward
    }

    fn on_remote_left(&mut self, user_id: &str) -> Disposition {
        let state = self.session_state();
        if !(state.is_active() || state == SessionState::Leaving) {
            return Disposition::Absorb("remote leave outside an active session");
        }
        if self.remote_users.remove(user_id).is_none() {
            return Disposition::Absorb("remote leave for an unknown user");
        }
        self.pending.retain(|p| {
            !matches!(&p.kind, PendingKind::Subscribe { user_id: u, .. } if u == user_id)
        });
        Disposition::Forward
    }

    fn publish_disposition(&self) -> Disposition {
        if self.session_state() == SessionState::Joined {
            Disposition::Forward
        } else {
            Disposition::Absorb("publish outcome while not joined")
        }
    }

    fn on_subscribed(&mut self, code: i32, user_id: &str, media: MediaKind) -> Disposition {
        let pending = self.take_pending_where(|k| {
            matches!(k, PendingKind::Subscribe { user_id: u, media: m, .. } if u == user_id && *m == media)
        });
        if !self.remote_users.contains_key(user_id) {
            return Disposition::Absorb("subscription result for an untracked user");
        }
        if let Some(PendingKind::Subscribe {
            previous, requested, ..
        }) = pending
        {
            let confirmed = if code == 0 { requested } else { previous };
            self.settle_subscription(user_id, media, confirmed);
        }
        Disposition::Forward
    }

    /// Record the engine's answer for the oldest subscription of `user_id`/`media`
    ///
    /// With a later request still in flight the flag keeps that request's
    /// optimistic value and `confirmed` becomes its rollback value.
    fn settle_subscription(&mut self, user_id: &str, media: MediaKind, confirmed: bool) {
        let later = self.pending.iter_mut().find_map(|p| match &mut p.kind {
            PendingKind::Subscribe {
                user_id: u,
                media: m,
                previous,
                ..
            } if u.as_str() == user_id && *m == media => Some(previous),
            _ => None,
        });
        match later {
            Some(previous) => *previous = confirmed,
            None => {
                if let Some(user) = self.remote_users.get_mut(user_id) {
                    *user.flag_mut(media) = confirmed;
                }
            }
        }
    }
}
