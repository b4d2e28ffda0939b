use tracing::{debug, warn};

use super::CallBridge;
use crate::engine::{EngineCode, ENGINE_OK};
use crate::error::{BridgeError, Result};
use crate::types::{LocalMedia, MediaKind, MAX_LOCAL_VOLUME};

impl CallBridge {
    /// Forward a local capture command and record it once accepted
    fn local_command(
        &self,
        operation: &'static str,
        forward: impl FnOnce() -> EngineCode,
        record: impl FnOnce(&mut LocalMedia),
    ) -> Result<()> {
        self.inner.state.lock().require_ready(operation)?;

        let code = forward();
        if code != ENGINE_OK {
            warn!("Engine rejected {} with code {}", operation, code);
            return Err(BridgeError::engine_rejected(operation, code));
        }

        record(&mut self.inner.state.lock().local);
        debug!("{} accepted", operation);
        Ok(())
    }

    /// Start or stop the local camera; allowed before joining for preview
    pub fn enable_local_camera(&self, enable: bool) -> Result<()> {
        self.local_command(
            "enable_local_camera",
            || self.inner.engine.enable_local_video(enable),
            |local| local.camera_enabled = enable,
        )
    }

    pub fn enable_local_microphone(&self, enable: bool) -> Result<()> {
        self.local_command(
            "enable_local_microphone",
            || self.inner.engine.enable_local_audio(enable),
            |local| local.microphone_enabled = enable,
        )
    }

    /// Set the capture volume, `0..=100`
    pub fn set_local_volume(&self, volume: i32) -> Result<()> {
        self.inner.state.lock().require_ready("set_local_volume")?;
        if !(0..=MAX_LOCAL_VOLUME).contains(&volume) {
            return Err(BridgeError::invalid_argument(format!(
                "volume {} outside 0..={}",
                volume, MAX_LOCAL_VOLUME
            )));
        }
        let volume = volume as u8;

        self.local_command(
            "set_local_volume",
            || self.inner.engine.set_local_volume(volume),
            |local| local.volume = volume,
        )
    }

    pub fn switch_camera(&self) -> Result<()> {
        self.local_command("switch_camera", || self.inner.engine.switch_camera(), |_| {})
    }

    /// Subscribe to (or drop) a remote user's video
    ///
    /// The flag is updated right away and reverted if the engine reports a
    /// failure for it.
    pub fn subscribe_remote_video(&self, user_id: &str, subscribe: bool) -> Result<()> {
        self.subscribe_remote(user_id, MediaKind::Video, subscribe)
    }

    /// Subscribe to (or drop) a remote user's audio
    pub fn subscribe_remote_audio(&self, user_id: &str, subscribe: bool) -> Result<()> {
        self.subscribe_remote(user_id, MediaKind::Audio, subscribe)
    }

    fn subscribe_remote(&self, user_id: &str, media: MediaKind, subscribe: bool) -> Result<()> {
        let request = self
            .inner
            .state
            .lock()
            .begin_subscribe(user_id, media, subscribe)?;

        let (operation, code) = match media {
            MediaKind::Video => (
                "subscribe_remote_video",
                self.inner.engine.subscribe_remote_video(user_id, subscribe),
            ),
            MediaKind::Audio => (
                "subscribe_remote_audio",
                self.inner.engine.subscribe_remote_audio(user_id, subscribe),
            ),
        };
        if code != ENGINE_OK {
            warn!("Engine rejected {} for {} with code {}", operation, user_id, code);
            self.inner.state.lock().abort(request);
            return Err(BridgeError::engine_rejected(operation, code));
        }

        debug!(
            "Remote {} of {} {}",
            media,
            user_id,
            if subscribe { "subscribed" } else { "unsubscribed" }
        );
        Ok(())
    }
}
