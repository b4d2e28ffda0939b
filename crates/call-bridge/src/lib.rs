//! # Call Bridge
//!
//! Control-plane bridge for a real-time audio/video call engine.
//!
//! The media engine (capture, codecs, transport) is an external collaborator
//! behind the [`RtcEngine`] trait. This crate owns what sits between that engine
//! and the application:
//!
//! - the engine lifecycle (`initialize` / `destroy`)
//! - the channel session and its remote participants
//! - local media and remote subscription commands
//! - ordered, serialized delivery of engine events to a single sink
//! - capability (camera / microphone) checks and requests
//!
//! Commands are synchronous and never block on I/O: each is validated against
//! the current state, forwarded to the engine, and its outcome later arrives as
//! a [`CallEvent`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_call_bridge::{
//!     BridgeConfig, CallBridge, CallEvent, LoopbackConfig, LoopbackEngine,
//!     StaticCapabilityProvider,
//! };
//!
//! # fn main() -> rvoip_call_bridge::Result<()> {
//! let engine = Arc::new(LoopbackEngine::new(LoopbackConfig::default())?);
//! let bridge = CallBridge::new(
//!     BridgeConfig::default(),
//!     engine.clone(),
//!     Arc::new(StaticCapabilityProvider::new()),
//! )?;
//! engine.connect(bridge.engine_events());
//!
//! bridge.set_sink(Arc::new(|event: CallEvent| println!("{:?}", event)));
//! bridge.initialize("my-app", false)?;
//! // ... wait for engineInitResult, then
//! bridge.join_channel("room1", "alice", "token")?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod permission;
pub mod types;

mod bridge;

pub use bridge::{CallBridge, EngineEventSender};
pub use config::{BridgeConfig, SandboxConfig};
pub use dispatch::DispatchStats;
pub use engine::loopback::{LoopbackConfig, LoopbackEngine};
pub use engine::{EngineCode, RtcEngine, ENGINE_OK};
pub use error::{result_code, BridgeError, Result};
pub use events::{CallEvent, CallEventSink, PERMISSION_DENIED, PERMISSION_GRANTED};
pub use logging::{setup_logging, LoggingConfig};
pub use permission::{CapabilityProvider, CapabilityResponder, StaticCapabilityProvider};
pub use types::{
    CapabilityKind, CapabilityState, ChannelSession, EngineState, LocalMedia, MediaKind,
    RemoteUser, SessionState,
};
