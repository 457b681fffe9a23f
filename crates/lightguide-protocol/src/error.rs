//! Error types for the LightGuide protocol.

use thiserror::Error;

/// Errors that can occur when building or parsing protocol frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A command could not be constructed from the given fields.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A cell reference was outside the 8×12 grid or badly formatted.
    #[error("invalid cell: {0}")]
    InvalidCell(String),

    /// A mask was not exactly 24 hex characters.
    #[error("invalid mask {mask:?}: {reason}")]
    InvalidMask {
        /// The offending mask text.
        mask: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A frame was not `<`...`>` delimited.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
