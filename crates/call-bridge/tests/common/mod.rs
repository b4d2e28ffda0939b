//! Shared fixtures for the call bridge integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use rvoip_call_bridge::{
    BridgeConfig, CallBridge, CallEvent, CallEventSink, EngineCode, RtcEngine,
    StaticCapabilityProvider,
};

/// Engine that records every command and answers with a scripted code
///
/// It never emits events on its own; tests play the engine's threads through
/// [`CallBridge::engine_events`].
#[derive(Default)]
pub struct ScriptedEngine {
    commands: Mutex<Vec<String>>,
    refusals: Mutex<HashMap<String, EngineCode>>,
}

impl ScriptedEngine {
    pub fn refuse(&self, operation: &str, code: EngineCode) {
        self.refusals.lock().insert(operation.to_string(), code);
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    fn answer(&self, operation: &str, command: String) -> EngineCode {
        self.commands.lock().push(command);
        self.refusals.lock().get(operation).copied().unwrap_or(0)
    }
}

impl RtcEngine for ScriptedEngine {
    fn initialize(&self, app_id: &str, debug_mode: bool) -> EngineCode {
        self.answer("initialize", format!("initialize {} {}", app_id, debug_mode))
    }

    fn destroy(&self) -> EngineCode {
        self.answer("destroy", "destroy".to_string())
    }

    fn join_channel(&self, channel: &str, user_id: &str, token: &str) -> EngineCode {
        self.answer(
            "join_channel",
            format!("join_channel {} {} {}", channel, user_id, token),
        )
    }

    fn leave_channel(&self) -> EngineCode {
        self.answer("leave_channel", "leave_channel".to_string())
    }

    fn rejoin_channel(&self, channel: &str, user_id: &str) -> EngineCode {
        self.answer("rejoin_channel", format!("rejoin_channel {} {}", channel, user_id))
    }

    fn enable_local_video(&self, enable: bool) -> EngineCode {
        self.answer("enable_local_video", format!("enable_local_video {}", enable))
    }

    fn enable_local_audio(&self, enable: bool) -> EngineCode {
        self.answer("enable_local_audio", format!("enable_local_audio {}", enable))
    }

    fn switch_camera(&self) -> EngineCode {
        self.answer("switch_camera", "switch_camera".to_string())
    }

    fn set_local_volume(&self, volume: u8) -> EngineCode {
        self.answer("set_local_volume", format!("set_local_volume {}", volume))
    }

    fn subscribe_remote_video(&self, user_id: &str, subscribe: bool) -> EngineCode {
        self.answer(
            "subscribe_remote_video",
            format!("subscribe_remote_video {} {}", user_id, subscribe),
        )
    }

    fn subscribe_remote_audio(&self, user_id: &str, subscribe: bool) -> EngineCode {
        self.answer(
            "subscribe_remote_audio",
            format!("subscribe_remote_audio {} {}", user_id, subscribe),
        )
    }
}

/// Sink that stores everything it receives
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<CallEvent>>,
    arrived: Condvar,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<CallEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Wait until at least `count` events arrived
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock();
        while events.len() < count {
            if self.arrived.wait_until(&mut events, deadline).timed_out() {
                return events.len() >= count;
            }
        }
        true
    }
}

impl CallEventSink for RecordingSink {
    fn on_event(&self, event: CallEvent) {
        self.events.lock().push(event);
        self.arrived.notify_all();
    }
}

pub const WAIT: Duration = Duration::from_secs(2);

pub fn new_bridge() -> (CallBridge, Arc<ScriptedEngine>, Arc<RecordingSink>) {
    new_bridge_with(BridgeConfig::default())
}

pub fn new_bridge_with(
    config: BridgeConfig,
) -> (CallBridge, Arc<ScriptedEngine>, Arc<RecordingSink>) {
    let engine = Arc::new(ScriptedEngine::default());
    let bridge = CallBridge::new(
        config,
        engine.clone(),
        Arc::new(StaticCapabilityProvider::new()),
    )
    .expect("bridge");
    let sink = RecordingSink::new();
    bridge.set_sink(sink.clone());
    (bridge, engine, sink)
}

pub fn init_ok() -> CallEvent {
    CallEvent::EngineInitResult {
        code: 0,
        message: "ok".to_string(),
    }
}

pub fn join_result(code: i32, channel: &str, user_id: &str) -> CallEvent {
    CallEvent::JoinChannelResult {
        code,
        channel: channel.to_string(),
        user_id: user_id.to_string(),
    }
}

pub fn remote_joined(user_id: &str) -> CallEvent {
    CallEvent::RemoteUserJoined {
        user_id: user_id.to_string(),
    }
}

pub fn remote_left(user_id: &str, reason: i32) -> CallEvent {
    CallEvent::RemoteUserLeft {
        user_id: user_id.to_string(),
        reason,
    }
}

/// Bridge with the engine Ready and the init result already delivered
pub fn ready_bridge() -> (CallBridge, Arc<ScriptedEngine>, Arc<RecordingSink>) {
    let (bridge, engine, sink) = new_bridge();
    bridge.initialize("app1", false).expect("initialize");
    bridge.engine_events().emit(init_ok());
    assert!(sink.wait_for(1, WAIT));
    (bridge, engine, sink)
}

/// Bridge joined to `room1` as `u1` with the given remote users present
pub fn joined_bridge(users: &[&str]) -> (CallBridge, Arc<ScriptedEngine>, Arc<RecordingSink>) {
    let (bridge, engine, sink) = ready_bridge();
    bridge.join_channel("room1", "u1", "tok").expect("join");
    let events = bridge.engine_events();
    events.emit(join_result(0, "room1", "u1"));
    for user in users {
        events.emit(remote_joined(user));
    }
    assert!(sink.wait_for(2 + users.len(), WAIT));
    (bridge, engine, sink)
}
