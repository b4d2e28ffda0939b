//! Error types for the call bridge
//!
//! Every command entry point returns [`Result`]. Rejections detected locally
//! (`InvalidState`, `InvalidArgument`, `NotFound`) and synchronous refusals from
//! the external engine (`EngineRejected`) are returned directly to the caller and
//! never travel through the event sink. `EngineFault` is the typed view of an
//! asynchronous `error` event (see [`crate::events::CallEvent::engine_fault`]).
//!
//! Applications that need the integer command surface can map any result to a
//! code with [`result_code`]: `0` means accepted, negative values identify the
//! rejection kind.

use thiserror::Error;

/// Result type for call bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Command accepted
pub const CODE_OK: i32 = 0;
/// Command not valid for the current lifecycle/session state
pub const CODE_INVALID_STATE: i32 = -1;
/// Malformed input caught before reaching the engine
pub const CODE_INVALID_ARGUMENT: i32 = -2;
/// Operation targets an untracked remote user
pub const CODE_NOT_FOUND: i32 = -3;
/// The external engine synchronously refused the command
pub const CODE_ENGINE_REJECTED: i32 = -4;
/// Asynchronous engine fault
pub const CODE_ENGINE_FAULT: i32 = -5;
/// Configuration or I/O problem outside the command surface
pub const CODE_CONFIG: i32 = -6;

/// Errors that can occur in the call bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Command not valid for the current lifecycle or session state
    #[error("Invalid state for {operation}: {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// Malformed input
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Remote user is not tracked in the current session
    #[error("Remote user not found: {user_id}")]
    NotFound { user_id: String },

    /// The engine refused the forwarded command
    #[error("Engine rejected {operation} with code {code}")]
    EngineRejected { operation: &'static str, code: i32 },

    /// Asynchronous engine fault not tied to a pending command
    #[error("Engine fault {code}: {message}")]
    EngineFault { code: i32, message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// I/O error while loading configuration or spawning workers
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Create an invalid state error
    pub fn invalid_state(operation: &'static str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(user_id: impl Into<String>) -> Self {
        Self::NotFound {
            user_id: user_id.into(),
        }
    }

    /// Create an engine rejection error
    pub fn engine_rejected(operation: &'static str, code: i32) -> Self {
        Self::EngineRejected { operation, code }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Integer code of this error on the command surface
    pub fn code(&self) -> i32 {
        match self {
            BridgeError::InvalidState { .. } => CODE_INVALID_STATE,
            BridgeError::InvalidArgument { .. } => CODE_INVALID_ARGUMENT,
            BridgeError::NotFound { .. } => CODE_NOT_FOUND,
            BridgeError::EngineRejected { .. } => CODE_ENGINE_REJECTED,
            BridgeError::EngineFault { .. } => CODE_ENGINE_FAULT,
            BridgeError::Config { .. } | BridgeError::Io(_) => CODE_CONFIG,
        }
    }

    /// Whether this error was detected by the bridge before reaching the engine
    pub fn is_local_rejection(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidState { .. }
                | BridgeError::InvalidArgument { .. }
                | BridgeError::NotFound { .. }
        )
    }
}

/// Map a command result to its integer code (`0` = accepted)
pub fn result_code(result: &Result<()>) -> i32 {
    match result {
        Ok(()) => CODE_OK,
        Err(e) => e.code(),
    }
}
