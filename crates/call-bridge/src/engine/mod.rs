//! Seam to the external media engine
//!
//! The engine (capture, codecs, transport) lives outside this crate. The bridge
//! only needs two things from it: a synchronous accept/reject code for every
//! forwarded command, and asynchronous completion events, which the engine
//! reports through an [`EngineEventSender`](crate::EngineEventSender) obtained
//! from the bridge.
//!
//! [`loopback::LoopbackEngine`] is an in-process stand-in used by the sandbox
//! harness and tests.

pub mod loopback;

/// Synchronous answer of the engine to a command (`0` = accepted)
pub type EngineCode = i32;

/// Engine accepted the command
pub const ENGINE_OK: EngineCode = 0;

/// Fixed command interface of the external engine
///
/// Implementations must not block on network or media I/O: they accept or
/// reject immediately and report the outcome later as an event. They may emit
/// events from any thread, including the calling one.
pub trait RtcEngine: Send + Sync {
    fn initialize(&self, app_id: &str, debug_mode: bool) -> EngineCode;

    fn destroy(&self) -> EngineCode;

    fn join_channel(&self, channel: &str, user_id: &str, token: &str) -> EngineCode;

    fn leave_channel(&self) -> EngineCode;

    /// Re-establish the current membership; answered with a join result
    fn rejoin_channel(&self, channel: &str, user_id: &str) -> EngineCode;

    fn enable_local_video(&self, enable: bool) -> EngineCode;

    fn enable_local_audio(&self, enable: bool) -> EngineCode;

    fn switch_camera(&self) -> EngineCode;

    fn set_local_volume(&self, volume: u8) -> EngineCode;

    fn subscribe_remote_video(&self, user_id: &str, subscribe: bool) -> EngineCode;

    fn subscribe_remote_audio(&self, user_id: &str, subscribe: bool) -> EngineCode;
}
