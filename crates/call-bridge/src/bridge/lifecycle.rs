use tracing::{info, warn};

use super::CallBridge;
use crate::engine::ENGINE_OK;
use crate::error::{BridgeError, Result};

impl CallBridge {
    /// Start the engine
    ///
    /// Only valid while Uninitialized. The outcome arrives as an
    /// `engineInitResult` event, which moves the engine to Ready or back to
    /// Uninitialized.
    pub fn initialize(&self, app_id: &str, debug_mode: bool) -> Result<()> {
        let request = self.inner.state.lock().begin_initialize(app_id, debug_mode)?;

        let code = self.inner.engine.initialize(app_id, debug_mode);
        if code != ENGINE_OK {
            warn!("Engine rejected initialize with code {}", code);
            self.inner.state.lock().abort(request);
            return Err(BridgeError::engine_rejected("initialize", code));
        }

        info!("Engine initializing (debug mode: {})", debug_mode);
        Ok(())
    }

    /// Release the engine
    ///
    /// Only valid while Ready with no join, leave or reconnect in flight. After
    /// the `engineDestroyed` event every command is rejected; events already
    /// queued are still delivered.
    pub fn destroy(&self) -> Result<()> {
        let request = self.inner.state.lock().begin_destroy()?;

        let code = self.inner.engine.destroy();
        if code != ENGINE_OK {
            warn!("Engine rejected destroy with code {}", code);
            self.inner.state.lock().abort(request);
            return Err(BridgeError::engine_rejected("destroy", code));
        }

        info!("Engine destroying");
        Ok(())
    }
}
