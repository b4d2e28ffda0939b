//! Sandbox harness for the call bridge
//!
//! Loads a JSON sandbox config, then drives one call against the loopback
//! engine: initialize, request capabilities, join, enable camera and
//! microphone, let remote users come in, stay up for the configured time (or
//! until Ctrl-C), leave and destroy. Every event reaching the sink is logged.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use rvoip_call_bridge::logging::parse_log_level;
use rvoip_call_bridge::{
    setup_logging, BridgeConfig, CallBridge, CallEvent, CallEventSink, CapabilityKind,
    EngineState, LoggingConfig, LoopbackConfig, LoopbackEngine, SandboxConfig, SessionState,
    StaticCapabilityProvider,
};

const JOIN_ATTEMPTS: u32 = 3;
const CAPABILITY_REQUEST_CODE: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "call-sandbox")]
#[command(about = "Drive a scripted call through the call bridge")]
struct Args {
    /// Sandbox config file (JSON)
    #[arg(default_value = "sandbox_config.json")]
    config: PathBuf,

    /// How long the call stays up, overrides the config
    #[arg(short, long)]
    run_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// JSON log output
    #[arg(long)]
    json: bool,
}

/// Logs every event the bridge delivers
struct LoggingSink;

impl CallEventSink for LoggingSink {
    fn on_event(&self, event: CallEvent) {
        match event.code() {
            Some(code) if code != 0 => warn!("📨 {} failed: {:?}", event.name(), event),
            _ => info!("📨 {}: {:?}", event.name(), event),
        }
    }
}

async fn wait_until(what: &str, timeout: Duration, condition: impl Fn() -> bool) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            bail!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = SandboxConfig::load_from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(run_secs) = args.run_secs {
        config.run_secs = run_secs;
    }

    let mut logging = LoggingConfig::new(parse_log_level(&args.log_level)?, "call-sandbox");
    if args.json {
        logging = logging.with_json();
    }
    if let Some(path) = &config.log_file_path {
        logging = logging.with_log_file(path);
    }
    let _log_guard = setup_logging(&logging)?;

    info!("🚀 Sandbox config: {:?}", config);
    run(config).await
}

async fn run(config: SandboxConfig) -> Result<()> {
    let engine = Arc::new(LoopbackEngine::new(LoopbackConfig::from_sandbox(&config))?);
    let bridge = CallBridge::new(
        BridgeConfig::default(),
        engine.clone(),
        Arc::new(StaticCapabilityProvider::new()),
    )?;
    engine.connect(bridge.engine_events());
    bridge.set_sink(Arc::new(LoggingSink));

    // Every simulated event may be delayed by the configured latency
    let step_timeout = Duration::from_secs(5) + Duration::from_millis(config.latency_ms * 4);

    bridge.initialize(&config.app_id, true)?;
    wait_until("engine init", step_timeout, || {
        bridge.engine_state() != EngineState::Initializing
    })
    .await?;
    if bridge.engine_state() != EngineState::Ready {
        bail!("engine failed to initialize");
    }

    bridge.request_capabilities(
        &[CapabilityKind::Camera, CapabilityKind::Microphone],
        CAPABILITY_REQUEST_CODE,
    )?;

    join(&bridge, &config, step_timeout).await?;

    if bridge.has_capability(CapabilityKind::Camera) {
        bridge.enable_local_camera(true)?;
    }
    if bridge.has_capability(CapabilityKind::Microphone) {
        bridge.enable_local_microphone(true)?;
    }

    let remote_users: Vec<String> = (1..=config.user_count)
        .map(|i| format!("remote-{}", i))
        .collect();
    for user in &remote_users {
        engine.simulate_remote_join(user);
    }
    wait_until("remote users", step_timeout, || {
        bridge.online_users().len() == remote_users.len()
    })
    .await?;
    for user in &remote_users {
        bridge.subscribe_remote_video(user, true)?;
        bridge.subscribe_remote_audio(user, true)?;
    }
    info!("✅ In call with {:?}", bridge.online_users());

    tokio::select! {
        _ = tokio::time::sleep(config.run_duration()) => {
            info!("Run time elapsed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    if bridge.session_state() == SessionState::Joined {
        bridge.leave_channel()?;
        wait_until("leave", step_timeout, || {
            bridge.session_state() == SessionState::Idle
        })
        .await?;
    }

    bridge.destroy()?;
    wait_until("engine destroy", step_timeout, || {
        bridge.engine_state() == EngineState::Destroyed
    })
    .await?;

    // Give the forwarder a moment to hand over the last events
    tokio::time::sleep(Duration::from_millis(50)).await;
    bridge.clear_sink();

    let stats = bridge.dispatch_stats();
    info!(
        "📊 Events published {}, delivered {}, discarded {}, overflowed {}",
        stats.published, stats.delivered, stats.discarded, stats.overflowed
    );
    Ok(())
}

/// Join, retrying when the simulated network loses the attempt
async fn join(bridge: &CallBridge, config: &SandboxConfig, timeout: Duration) -> Result<()> {
    for attempt in 1..=JOIN_ATTEMPTS {
        bridge.join_channel(&config.channel_name, &config.local_user_id, "sandbox-token")?;
        wait_until("join result", timeout, || {
            bridge.session_state() != SessionState::Joining
        })
        .await?;

        if bridge.session_state() == SessionState::Joined {
            info!(
                "Joined {} as {} (attempt {})",
                config.channel_name, config.local_user_id, attempt
            );
            return Ok(());
        }
        error!("Join attempt {} failed", attempt);
    }
    bail!("could not join {} after {} attempts", config.channel_name, JOIN_ATTEMPTS)
}
