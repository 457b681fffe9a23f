//! The open serial connection to a panel.
//!
//! ## Single writer
//!
//! A [`Connection`] is shared (`Arc<Connection>`) between the caller, which
//! connects, closes and checks [`is_open`](Connection::is_open), and the
//! sender worker, which is the only thread that writes or reads. The link
//! mutex makes write + flush + drain atomic should a second writer ever
//! appear. Reads take the same mutex only so the handle can be shared; they
//! are not safe to interleave with another reader.
//!
//! Every link installed by [`connect`](Connection::connect) or
//! [`attach`](Connection::attach) gets a new generation number. A sender
//! captures the generation it was created for and writes with
//! [`write_and_drain_on`](Connection::write_and_drain_on), so a worker that
//! outlived its stop timeout can never reach a port opened after it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use lightguide_metrics::{metric_defs, MetricLabels};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::SerialConfig;
use crate::error::{SerialError, SerialResult};
use crate::link::{NativeLink, SerialLink};

/// A serial connection that is either Open (owns a link) or Closed.
pub struct Connection {
    config: SerialConfig,
    link: Mutex<Option<Box<dyn SerialLink>>>,
    /// Mirrors `link.is_some()` so callers never wait on an in-flight write.
    open: AtomicBool,
    /// Bumped under the link lock each time a link is installed.
    generation: AtomicU64,
    port_name: Mutex<Option<String>>,
}

impl Connection {
    /// Create a closed connection.
    pub fn new(config: SerialConfig) -> Self {
        Connection {
            config,
            link: Mutex::new(None),
            open: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            port_name: Mutex::new(None),
        }
    }

    /// Serial settings this connection opens ports with.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Whether a link is currently open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Generation of the current link. Changes on every connect or attach.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Name of the open port, if any.
    pub fn port_name(&self) -> Option<String> {
        self.port_name.lock().clone()
    }

    /// Open `port` with the configured line settings.
    ///
    /// Any previously open link is closed first, so on failure the
    /// connection is left Closed.
    pub fn connect(&self, port: &str) -> SerialResult<()> {
        self.close();

        let labels = MetricLabels::new(port);
        metrics::counter!(metric_defs::CONNECT_ATTEMPTS.name, &labels.to_labels()).increment(1);

        match NativeLink::open(port, &self.config) {
            Ok(link) => {
                self.install(Box::new(link));
                Ok(())
            }
            Err(source) => {
                metrics::counter!(metric_defs::CONNECT_FAILURES.name, &labels.to_labels())
                    .increment(1);
                warn!(port, error = %source, "failed to open serial port");
                Err(SerialError::Connect {
                    port: port.to_string(),
                    source,
                })
            }
        }
    }

    /// Take ownership of an already-open link, closing any previous one.
    pub fn attach(&self, link: Box<dyn SerialLink>) {
        self.close();
        self.install(link);
    }

    fn install(&self, link: Box<dyn SerialLink>) {
        let name = link.name().to_string();
        if let Err(e) = link.clear_all() {
            debug!(port = %name, error = %e, "could not clear port buffers");
        }

        let mut slot = self.link.lock();
        *slot = Some(link);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        drop(slot);

        *self.port_name.lock() = Some(name.clone());
        self.open.store(true, Ordering::Release);
        info!(port = %name, generation, "serial connection open");
    }

    /// Release the link. Safe to call any number of times.
    pub fn close(&self) {
        let link = self.link.lock().take();
        self.open.store(false, Ordering::Release);
        let name = self.port_name.lock().take();
        if let Some(link) = link {
            // Dropping the port closes it; drivers do not report close errors.
            drop(link);
            info!(port = name.as_deref().unwrap_or("?"), "serial connection closed");
        }
    }

    /// Write a whole frame, flush it, wait until the driver reports no
    /// outstanding output, then sleep `inter_delay`.
    ///
    /// The drain wait has no upper bound of its own; a write that stalls is
    /// bounded by the port timeout and surfaces as
    /// [`SerialError::WriteTimeout`].
    pub fn write_and_drain(&self, bytes: &[u8], inter_delay: Duration) -> SerialResult<()> {
        self.write_frame(None, bytes, inter_delay)
    }

    /// Like [`write_and_drain`](Self::write_and_drain), but fails with
    /// [`SerialError::NotConnected`] unless the link is still the one of
    /// `generation`.
    pub fn write_and_drain_on(
        &self,
        generation: u64,
        bytes: &[u8],
        inter_delay: Duration,
    ) -> SerialResult<()> {
        self.write_frame(Some(generation), bytes, inter_delay)
    }

    fn write_frame(
        &self,
        generation: Option<u64>,
        bytes: &[u8],
        inter_delay: Duration,
    ) -> SerialResult<()> {
        if !self.is_open() {
            return Err(SerialError::NotConnected);
        }

        let started = Instant::now();
        let mut guard = self.link.lock();
        if generation.is_some_and(|g| g != self.generation()) {
            return Err(SerialError::NotConnected);
        }
        let link = guard.as_mut().ok_or(SerialError::NotConnected)?;

        link.write_all(bytes).map_err(SerialError::from_write)?;
        link.flush().map_err(SerialError::from_write)?;

        let mut polls = 0u32;
        loop {
            match link.bytes_to_write() {
                Ok(0) => break,
                Ok(_) => {
                    polls += 1;
                    thread::sleep(self.config.drain_poll_interval());
                }
                Err(e) => return Err(SerialError::from_write(e)),
            }
        }
        trace!(bytes = bytes.len(), polls, "frame drained");

        let labels = MetricLabels::new(link.name()).to_labels();
        metrics::histogram!(metric_defs::WRITE_TIME.name, &labels)
            .record(started.elapsed().as_micros() as f64);

        if !inter_delay.is_zero() {
            thread::sleep(inter_delay);
        }
        Ok(())
    }

    /// Read whatever is available into `buf`. A read timeout yields `Ok(0)`.
    pub fn read(&self, buf: &mut [u8]) -> SerialResult<usize> {
        let mut guard = self.link.lock();
        let link = guard.as_mut().ok_or(SerialError::NotConnected)?;
        match link.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(SerialError::Io(e)),
        }
    }

    /// Discard unread input. Failure is logged, not returned.
    pub fn clear_input(&self) {
        self.clear_input_on(self.generation());
    }

    /// Discard unread input if the link is still the one of `generation`.
    pub fn clear_input_on(&self, generation: u64) {
        let guard = self.link.lock();
        if generation != self.generation() {
            return;
        }
        if let Some(link) = guard.as_ref() {
            if let Err(e) = link.clear_input() {
                debug!(port = link.name(), error = %e, "could not clear input buffer");
            }
        }
    }

    /// Current port timeout.
    pub fn timeout(&self) -> SerialResult<Duration> {
        let guard = self.link.lock();
        guard
            .as_ref()
            .map(|link| link.timeout())
            .ok_or(SerialError::NotConnected)
    }

    /// Change the port timeout.
    pub fn set_timeout(&self, timeout: Duration) -> SerialResult<()> {
        let mut guard = self.link.lock();
        let link = guard.as_mut().ok_or(SerialError::NotConnected)?;
        link.set_timeout(timeout)?;
        Ok(())
    }

    /// Temporarily switch the port timeout; the previous value comes back
    /// when the guard is dropped, unless the link was replaced meanwhile.
    pub fn scoped_read_timeout(&self, timeout: Duration) -> SerialResult<ReadTimeoutGuard<'_>> {
        let generation = self.generation();
        let previous = self.timeout()?;
        self.set_timeout(timeout)?;
        Ok(ReadTimeoutGuard {
            connection: self,
            generation,
            previous,
        })
    }

    pub(crate) fn metric_labels(&self) -> MetricLabels {
        MetricLabels::new(self.port_name().unwrap_or_else(|| "none".to_string()))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Restores a connection's timeout on drop.
pub struct ReadTimeoutGuard<'a> {
    connection: &'a Connection,
    generation: u64,
    previous: Duration,
}

impl ReadTimeoutGuard<'_> {
    fn link_replaced(&self) -> bool {
        self.connection.generation() != self.generation
    }

    /// Change the timeout while the guard is held.
    pub fn set(&self, timeout: Duration) -> SerialResult<()> {
        if self.link_replaced() {
            return Err(SerialError::NotConnected);
        }
        self.connection.set_timeout(timeout)
    }

    /// The timeout that will be restored.
    pub fn previous(&self) -> Duration {
        self.previous
    }
}

impl Drop for ReadTimeoutGuard<'_> {
    fn drop(&mut self) {
        if self.link_replaced() {
            return;
        }
        match self.connection.set_timeout(self.previous) {
            Ok(()) | Err(SerialError::NotConnected) => {}
            Err(e) => warn!(error = %e, "could not restore port timeout"),
        }
    }
}
