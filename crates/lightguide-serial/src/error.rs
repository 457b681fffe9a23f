//! Error types for the serial transport.

use std::io;

use lightguide_protocol::ProtocolError;
use thiserror::Error;

/// Errors that can occur while talking to the panel.
#[derive(Debug, Error)]
pub enum SerialError {
    /// The serial port could not be opened.
    #[error("failed to open serial port {port}: {source}")]
    Connect {
        /// Port name that was requested.
        port: String,
        /// Underlying driver error.
        #[source]
        source: serialport::Error,
    },

    /// An operation needed an open connection but there is none.
    #[error("serial port is not open")]
    NotConnected,

    /// A write or drain exceeded the port timeout.
    #[error("write timed out: {0}")]
    WriteTimeout(#[source] io::Error),

    /// Any other I/O failure on the port.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial driver error outside of connect (e.g. port enumeration).
    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),

    /// The sender was stopped and no longer accepts frames.
    #[error("sender has stopped")]
    SenderStopped,

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A command could not be built.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SerialError {
    /// Classify an I/O error from a write or drain.
    pub(crate) fn from_write(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::TimedOut {
            SerialError::WriteTimeout(err)
        } else {
            SerialError::Io(err)
        }
    }
}

/// Result type alias for serial operations.
pub type SerialResult<T> = Result<T, SerialError>;
