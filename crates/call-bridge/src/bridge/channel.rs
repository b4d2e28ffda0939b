use tracing::{info, warn};

use super::CallBridge;
use crate::engine::ENGINE_OK;
use crate::error::{BridgeError, Result};

impl CallBridge {
    /// Join a channel
    ///
    /// Requires a Ready engine and an Idle session. The session is Joining until
    /// the `joinChannelResult` event arrives.
    pub fn join_channel(&self, channel: &str, user_id: &str, token: &str) -> Result<()> {
        let request = self.inner.state.lock().begin_join(channel, user_id, token)?;

        let code = self.inner.engine.join_channel(channel, user_id, token);
        if code != ENGINE_OK {
            warn!("Engine rejected join of {} with code {}", channel, code);
            self.inner.state.lock().abort(request);
            return Err(BridgeError::engine_rejected("join_channel", code));
        }

        info!("Joining channel {} as {}", channel, user_id);
        Ok(())
    }

    /// Leave the current channel
    ///
    /// Valid while Joined or Reconnecting. The `leaveChannelResult` event always
    /// returns the session to Idle; its code is informational.
    pub fn leave_channel(&self) -> Result<()> {
        let request = self.inner.state.lock().begin_leave()?;

        let code = self.inner.engine.leave_channel();
        if code != ENGINE_OK {
            warn!("Engine rejected leave with code {}", code);
            self.inner.state.lock().abort(request);
            return Err(BridgeError::engine_rejected("leave_channel", code));
        }

        info!("Leaving channel");
        Ok(())
    }

    /// Re-establish the current membership
    ///
    /// Only valid while Joined. A later `joinChannelResult` returns the session
    /// to Joined, or to Idle on failure.
    pub fn reconnect(&self) -> Result<()> {
        let (request, channel, user_id) = self.inner.state.lock().begin_reconnect()?;

        let code = self.inner.engine.rejoin_channel(&channel, &user_id);
        if code != ENGINE_OK {
            warn!("Engine rejected reconnect to {} with code {}", channel, code);
            self.inner.state.lock().abort(request);
            return Err(BridgeError::engine_rejected("reconnect", code));
        }

        info!("Reconnecting to channel {}", channel);
        Ok(())
    }
}
