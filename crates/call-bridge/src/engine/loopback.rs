//! In-process engine for the sandbox harness and tests
//!
//! Accepts every command and answers with the matching completion event from a
//! worker thread of its own, the way a real engine reports from its internal
//! threads. Network conditions can be simulated: a fixed latency before each
//! event, and a packet-loss percentage that makes join and reconnect attempts
//! fail with [`CODE_JOIN_FAILED`].

use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{EngineCode, RtcEngine, ENGINE_OK};
use crate::bridge::EngineEventSender;
use crate::config::SandboxConfig;
use crate::error::Result;
use crate::events::CallEvent;

/// Join result code reported when the simulated network drops the attempt
pub const CODE_JOIN_FAILED: i32 = 2002;

/// Network simulation settings
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoopbackConfig {
    /// Delay before each event is reported
    pub latency: Duration,
    /// Chance (0..=100) that a join or reconnect attempt fails
    pub packet_loss_percent: u8,
    /// Seed for the loss simulation; random when `None`
    pub seed: Option<u64>,
}

impl LoopbackConfig {
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_packet_loss(mut self, percent: u8) -> Self {
        self.packet_loss_percent = percent.min(100);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Settings of a sandbox run; no simulation unless it is enabled there
    pub fn from_sandbox(config: &SandboxConfig) -> Self {
        if !config.enable_network_simulation {
            return Self::default();
        }
        Self::default()
            .with_latency(Duration::from_millis(config.latency_ms))
            .with_packet_loss(config.packet_loss_percent)
    }
}

/// Engine stand-in that echoes commands back as events
pub struct LoopbackEngine {
    config: LoopbackConfig,
    sender: Arc<Mutex<Option<EngineEventSender>>>,
    queue: Mutex<Option<mpsc::UnboundedSender<CallEvent>>>,
    commands: Mutex<Vec<String>>,
    rng: Mutex<SmallRng>,
    worker_id: ThreadId,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackEngine {
    /// Start the engine's reporting thread
    pub fn new(config: LoopbackConfig) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender: Arc<Mutex<Option<EngineEventSender>>> = Arc::new(Mutex::new(None));

        let worker_sender = sender.clone();
        let latency = config.latency;
        let worker = thread::Builder::new()
            .name("loopback-engine".to_string())
            .spawn(move || report_loop(rx, worker_sender, latency))?;

        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        debug!(
            "Loopback engine started (latency {:?}, packet loss {}%)",
            config.latency, config.packet_loss_percent
        );

        Ok(Self {
            config,
            sender,
            queue: Mutex::new(Some(tx)),
            commands: Mutex::new(Vec::new()),
            rng: Mutex::new(rng),
            worker_id: worker.thread().id(),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Attach the bridge's event handle; events before this are dropped
    pub fn connect(&self, sender: EngineEventSender) {
        *self.sender.lock() = Some(sender);
    }

    /// Commands received so far, oldest first
    pub fn issued_commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn simulate_remote_join(&self, user_id: &str) {
        self.schedule(CallEvent::RemoteUserJoined {
            user_id: user_id.to_string(),
        });
    }

    pub fn simulate_remote_leave(&self, user_id: &str, reason: i32) {
        self.schedule(CallEvent::RemoteUserLeft {
            user_id: user_id.to_string(),
            reason,
        });
    }

    pub fn simulate_error(&self, code: i32, message: &str) {
        self.schedule(CallEvent::Error {
            code,
            message: message.to_string(),
        });
    }

    fn record(&self, command: String) {
        trace!("Loopback engine received {}", command);
        self.commands.lock().push(command);
    }

    fn schedule(&self, event: CallEvent) {
        let queue = self.queue.lock();
        let sent = queue.as_ref().map(|tx| tx.send(event).is_ok()).unwrap_or(false);
        if !sent {
            warn!("Loopback engine stopped, event not scheduled");
        }
    }

    fn packet_lost(&self) -> bool {
        match self.config.packet_loss_percent {
            0 => false,
            percent => self.rng.lock().gen_range(0..100u8) < percent,
        }
    }

    fn schedule_join_result(&self, channel: &str, user_id: &str) {
        let code = if self.packet_lost() {
            debug!("Simulated packet loss on join of {}", channel);
            CODE_JOIN_FAILED
        } else {
            0
        };
        self.schedule(CallEvent::JoinChannelResult {
            code,
            channel: channel.to_string(),
            user_id: user_id.to_string(),
        });
    }
}

impl RtcEngine for LoopbackEngine {
    fn initialize(&self, app_id: &str, debug_mode: bool) -> EngineCode {
        self.record(format!("initialize({}, {})", app_id, debug_mode));
        self.schedule(CallEvent::EngineInitResult {
            code: 0,
            message: "ok".to_string(),
        });
        ENGINE_OK
    }

    fn destroy(&self) -> EngineCode {
        self.record("destroy".to_string());
        self.schedule(CallEvent::EngineDestroyed);
        ENGINE_OK
    }

    fn join_channel(&self, channel: &str, user_id: &str, _token: &str) -> EngineCode {
        self.record(format!("join_channel({}, {})", channel, user_id));
        self.schedule_join_result(channel, user_id);
        ENGINE_OK
    }

    fn leave_channel(&self) -> EngineCode {
        self.record("leave_channel".to_string());
        self.schedule(CallEvent::LeaveChannelResult { code: 0 });
        ENGINE_OK
    }

    fn rejoin_channel(&self, channel: &str, user_id: &str) -> EngineCode {
        self.record(format!("rejoin_channel({}, {})", channel, user_id));
        self.schedule_join_result(channel, user_id);
        ENGINE_OK
    }

    fn enable_local_video(&self, enable: bool) -> EngineCode {
        self.record(format!("enable_local_video({})", enable));
        if enable {
            self.schedule(CallEvent::LocalVideoPublished { code: 0 });
        }
        ENGINE_OK
    }

    fn enable_local_audio(&self, enable: bool) -> EngineCode {
        self.record(format!("enable_local_audio({})", enable));
        if enable {
            self.schedule(CallEvent::LocalAudioPublished { code: 0 });
        }
        ENGINE_OK
    }

    fn switch_camera(&self) -> EngineCode {
        self.record("switch_camera".to_string());
        ENGINE_OK
    }

    fn set_local_volume(&self, volume: u8) -> EngineCode {
        self.record(format!("set_local_volume({})", volume));
        ENGINE_OK
    }

    fn subscribe_remote_video(&self, user_id: &str, subscribe: bool) -> EngineCode {
        self.record(format!("subscribe_remote_video({}, {})", user_id, subscribe));
        self.schedule(CallEvent::RemoteVideoSubscribed {
            code: 0,
            user_id: user_id.to_string(),
        });
        ENGINE_OK
    }

    fn subscribe_remote_audio(&self, user_id: &str, subscribe: bool) -> EngineCode {
        self.record(format!("subscribe_remote_audio({}, {})", user_id, subscribe));
        self.schedule(CallEvent::RemoteAudioSubscribed {
            code: 0,
            user_id: user_id.to_string(),
        });
        ENGINE_OK
    }
}

impl Drop for LoopbackEngine {
    fn drop(&mut self) {
        self.queue.lock().take();

        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if thread::current().id() == self.worker_id {
            return;
        }
        if worker.join().is_err() {
            warn!("Loopback engine worker panicked");
        }
    }
}

fn report_loop(
    mut rx: mpsc::UnboundedReceiver<CallEvent>,
    sender: Arc<Mutex<Option<EngineEventSender>>>,
    latency: Duration,
) {
    while let Some(event) = rx.blocking_recv() {
        if !latency.is_zero() {
            thread::sleep(latency);
        }

        let target = sender.lock().clone();
        match target {
            Some(target) => {
                target.emit(event);
            }
            None => debug!("Loopback engine not connected, dropping {}", event.name()),
        }
    }
    debug!("Loopback engine worker stopped");
}
