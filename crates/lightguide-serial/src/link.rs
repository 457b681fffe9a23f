//! Byte-stream links a [`Connection`](crate::Connection) can own.
//!
//! [`SerialLink`] is the small slice of a serial port the sender needs.
//! [`NativeLink`] implements it on top of the `serialport` crate; the
//! [`SimulatedLink`](crate::SimulatedLink) implements it in memory.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::config::SerialConfig;
use crate::error::SerialResult;

/// A bidirectional byte stream with serial-port style controls.
///
/// Reads return `Ok(0)` or an `io::ErrorKind::TimedOut` error when nothing
/// arrives within [`timeout`](SerialLink::timeout).
pub trait SerialLink: Send {
    /// Port name for logs and metrics.
    fn name(&self) -> &str;

    /// Write every byte of `data`.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush host-side write buffers.
    fn flush(&mut self) -> io::Result<()>;

    /// Bytes handed to the driver that have not left the host yet.
    fn bytes_to_write(&self) -> io::Result<u32>;

    /// Read whatever is available, waiting at most the current timeout.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Current read/write timeout.
    fn timeout(&self) -> Duration;

    /// Change the read/write timeout.
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Discard unread input.
    fn clear_input(&self) -> io::Result<()>;

    /// Discard unread input and unsent output.
    fn clear_all(&self) -> io::Result<()>;
}

/// A real serial port.
pub struct NativeLink {
    name: String,
    port: Box<dyn SerialPort>,
}

impl NativeLink {
    /// Open `port_name` with the panel's line settings: 8 data bits, no
    /// parity, two stop bits, no flow control.
    pub fn open(port_name: &str, config: &SerialConfig) -> Result<NativeLink, serialport::Error> {
        let port = serialport::new(port_name, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::Two)
            .flow_control(FlowControl::None)
            .timeout(config.write_timeout())
            .open()?;
        debug!(port = port_name, baud = config.baud_rate, "opened serial port");
        Ok(NativeLink {
            name: port_name.to_string(),
            port,
        })
    }
}

impl SerialLink for NativeLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, data)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(&mut self.port)
    }

    fn bytes_to_write(&self) -> io::Result<u32> {
        Ok(self.port.bytes_to_write()?)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut self.port, buf)
    }

    fn timeout(&self) -> Duration {
        self.port.timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        Ok(self.port.set_timeout(timeout)?)
    }

    fn clear_input(&self) -> io::Result<()> {
        Ok(self.port.clear(ClearBuffer::Input)?)
    }

    fn clear_all(&self) -> io::Result<()> {
        Ok(self.port.clear(ClearBuffer::All)?)
    }
}

/// Names of the serial ports present on this machine.
pub fn list_ports() -> SerialResult<Vec<String>> {
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(|info| info.port_name).collect())
}
