//! Serial transport for LightGuide panels.
//!
//! This crate owns everything that touches the wire:
//!
//! - [`Connection`]: the open serial handle, with an atomic
//!   write + flush + drain operation
//! - [`wait_for_ack`]: the bounded read loop that looks for `<ACK>`
//! - [`Sender`]: a single background worker that writes queued frames in
//!   FIFO order, optionally waiting for an ACK after each one
//! - [`LightPanel`]: the caller-facing facade (connect, send, stop)
//! - [`SimulatedDevice`]: an in-memory panel for tests and dry runs
//!
//! ## Threading
//!
//! Callers only enqueue. The sender's worker thread is the only thread that
//! writes to or reads from a [`Connection`], so device latency never blocks a
//! caller.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lightguide_protocol::Command;
//! use lightguide_serial::{Connection, LightGuideConfig, Sender};
//!
//! let config = LightGuideConfig::default();
//! let connection = Arc::new(Connection::new(config.serial.clone()));
//! connection.connect("/dev/ttyUSB0")?;
//!
//! let sender = Sender::new(connection, config.sender.clone())?;
//! sender.start()?;
//! sender.send(&Command::brightness(80))?;
//! sender.stop();
//! ```

pub mod ack;
pub mod config;
pub mod connection;
pub mod error;
pub mod link;
pub mod panel;
pub mod sender;
pub mod simulated;

pub use ack::{wait_for_ack, wait_for_ack_on};
pub use config::{LightGuideConfig, SenderConfig, SerialConfig};
pub use connection::{Connection, ReadTimeoutGuard};
pub use error::{SerialError, SerialResult};
pub use link::{list_ports, NativeLink, SerialLink};
pub use panel::LightPanel;
pub use sender::{Sender, SenderState};
pub use simulated::{AckMode, SimulatedDevice, SimulatedLink};
