//! The background sender.
//!
//! A [`Sender`] owns one worker thread and one FIFO queue. Callers enqueue
//! encoded frames with [`Sender::send`] and return immediately; the worker
//! pops frames in order and writes each one through
//! [`Connection::write_and_drain`], optionally waiting for `<ACK>` before
//! taking the next.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle --start()--> Running --stop()--> Stopping --worker exits--> Stopped
//!   \______________________stop()_____________________________________/
//! ```
//!
//! Stop travels through the queue as a tagged [`Outbound::Stop`] item, so
//! every frame sent before `stop()` is written before the worker exits.
//! Frames that land behind the stop marker are logged and dropped.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError};
use lightguide_metrics::{metric_defs, MetricLabels};
use lightguide_protocol::Command;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::ack::wait_for_ack_on;
use crate::config::SenderConfig;
use crate::connection::Connection;
use crate::error::{SerialError, SerialResult};

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Created, worker not started. Frames queue up.
    Idle,
    /// Worker is writing frames.
    Running,
    /// Stop requested; the worker finishes what is ahead of the stop marker.
    Stopping,
    /// Worker has exited. Terminal.
    Stopped,
}

/// Items on the worker's queue.
#[derive(Debug)]
enum Outbound {
    Frame(Vec<u8>),
    Stop,
}

/// Serializes frames onto a [`Connection`] from a single worker thread.
pub struct Sender {
    connection: Arc<Connection>,
    /// Link generation this sender writes to.
    generation: u64,
    config: SenderConfig,
    state: Arc<Mutex<SenderState>>,
    queue_tx: channel::Sender<Outbound>,
    queue_rx: Receiver<Outbound>,
    /// Moved into the worker on start.
    done_tx: Mutex<Option<channel::Sender<()>>>,
    done_rx: Receiver<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
    labels: MetricLabels,
}

impl Sender {
    /// Create an idle sender for `connection`.
    ///
    /// Fails with [`SerialError::NotConnected`] if the connection is not
    /// open: a sender without a port would silently lose every frame.
    ///
    /// The sender is bound to the link open right now. If the connection is
    /// later closed or given a new link, remaining frames fail with
    /// `NotConnected` instead of reaching the new port.
    pub fn new(connection: Arc<Connection>, config: SenderConfig) -> SerialResult<Sender> {
        if !connection.is_open() {
            return Err(SerialError::NotConnected);
        }

        let (queue_tx, queue_rx) = channel::unbounded();
        let (done_tx, done_rx) = channel::bounded(1);
        let labels = connection.metric_labels();
        let generation = connection.generation();

        Ok(Sender {
            connection,
            generation,
            config,
            state: Arc::new(Mutex::new(SenderState::Idle)),
            queue_tx,
            queue_rx,
            done_tx: Mutex::new(Some(done_tx)),
            done_rx,
            worker: Mutex::new(None),
            labels,
        })
    }

    /// Start the worker thread. Calling it on a running sender does nothing.
    pub fn start(&self) -> SerialResult<()> {
        let mut state = self.state.lock();
        let current = *state;
        match current {
            SenderState::Running => return Ok(()),
            SenderState::Stopping | SenderState::Stopped => return Err(SerialError::SenderStopped),
            SenderState::Idle => {}
        }
        if !self.connection.is_open() || self.connection.generation() != self.generation {
            return Err(SerialError::NotConnected);
        }
        let done_tx = self.done_tx.lock().take().ok_or(SerialError::SenderStopped)?;

        let worker = Worker {
            connection: Arc::clone(&self.connection),
            generation: self.generation,
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            queue_rx: self.queue_rx.clone(),
            done_tx,
            labels: self.labels.clone(),
        };

        let handle = thread::Builder::new()
            .name("lightguide-sender".to_string())
            .spawn(move || worker.run())?;

        *self.worker.lock() = Some(handle);
        *state = SenderState::Running;
        info!(
            port = %self.labels.port,
            wait_for_ack = self.config.wait_for_ack,
            "sender started"
        );
        Ok(())
    }

    /// Encode and enqueue a command.
    pub fn send(&self, command: &Command) -> SerialResult<()> {
        debug!(command = command.name(), "queueing command");
        self.send_frame(command.encode())
    }

    /// Enqueue an already encoded frame. Never blocks on the device.
    pub fn send_frame(&self, frame: Vec<u8>) -> SerialResult<()> {
        let labels = self.labels.to_labels();

        // Held across the push so the worker cannot reach Stopped between
        // the check and the enqueue.
        let state = self.state.lock();
        if *state == SenderState::Stopped {
            metrics::counter!(metric_defs::FRAMES_DROPPED.name, &labels).increment(1);
            return Err(SerialError::SenderStopped);
        }
        self.queue_tx
            .send(Outbound::Frame(frame))
            .map_err(|_| SerialError::SenderStopped)?;
        drop(state);

        metrics::counter!(metric_defs::FRAMES_QUEUED.name, &labels).increment(1);
        metrics::gauge!(metric_defs::QUEUE_DEPTH.name, &labels).set(self.queue_rx.len() as f64);
        Ok(())
    }

    /// Stop the worker after it has written everything queued so far.
    ///
    /// Waits at most the configured stop timeout. Safe to call repeatedly;
    /// a call that finds a stop already in progress returns immediately.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            let current = *state;
            match current {
                SenderState::Stopping | SenderState::Stopped => return,
                SenderState::Idle => {
                    *state = SenderState::Stopped;
                    drop(state);
                    let dropped = drain_dropped(&self.queue_rx, &self.labels);
                    info!(dropped, "idle sender stopped");
                    return;
                }
                SenderState::Running => {
                    *state = SenderState::Stopping;
                    let _ = self.queue_tx.send(Outbound::Stop);
                }
            }
        }

        let timeout = self.config.stop_timeout();
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.worker.lock().take() {
                    if handle.join().is_err() {
                        warn!("sender worker panicked");
                    }
                }
                *self.state.lock() = SenderState::Stopped;
                info!(port = %self.labels.port, "sender stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "sender worker did not stop in time; leaving it to finish"
                );
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SenderState {
        *self.state.lock()
    }

    /// Frames waiting to be written.
    pub fn queue_len(&self) -> usize {
        self.queue_rx.len()
    }

    /// The connection this sender writes to.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Discard whatever is left on the queue, counting frames as dropped.
fn drain_dropped(queue_rx: &Receiver<Outbound>, labels: &MetricLabels) -> usize {
    let dropped = queue_rx
        .try_iter()
        .filter(|item| matches!(item, Outbound::Frame(_)))
        .count();
    if dropped > 0 {
        warn!(dropped, "discarding frames queued after stop");
        metrics::counter!(metric_defs::FRAMES_DROPPED.name, &labels.to_labels())
            .increment(dropped as u64);
    }
    dropped
}

/// State moved onto the worker thread.
struct Worker {
    connection: Arc<Connection>,
    generation: u64,
    config: SenderConfig,
    state: Arc<Mutex<SenderState>>,
    queue_rx: Receiver<Outbound>,
    done_tx: channel::Sender<()>,
    labels: MetricLabels,
}

impl Worker {
    fn run(self) {
        debug!("sender worker running");

        while let Ok(item) = self.queue_rx.recv() {
            match item {
                Outbound::Frame(frame) => self.deliver(&frame),
                Outbound::Stop => break,
            }
            metrics::gauge!(metric_defs::QUEUE_DEPTH.name, &self.labels.to_labels())
                .set(self.queue_rx.len() as f64);
        }

        *self.state.lock() = SenderState::Stopped;
        drain_dropped(&self.queue_rx, &self.labels);
        let _ = self.done_tx.send(());
        debug!("sender worker exited");
    }

    /// Write one frame and, if configured, wait for its ACK. Failures are
    /// logged and the worker moves on.
    fn deliver(&self, frame: &[u8]) {
        let labels = self.labels.to_labels();
        let text = String::from_utf8_lossy(frame);

        if self.config.wait_for_ack {
            self.connection.clear_input_on(self.generation);
        }

        let written = self.connection.write_and_drain_on(
            self.generation,
            frame,
            self.config.inter_frame_delay(),
        );
        match written {
            Ok(()) => {
                metrics::counter!(metric_defs::FRAMES_WRITTEN.name, &labels).increment(1);
                metrics::counter!(metric_defs::BYTES_WRITTEN.name, &labels)
                    .increment(frame.len() as u64);
                debug!(frame = %text, "frame written");
            }
            Err(SerialError::NotConnected) => {
                metrics::counter!(metric_defs::WRITE_ERRORS.name, &labels).increment(1);
                warn!(frame = %text, "connection closed or replaced; frame not written");
                return;
            }
            Err(SerialError::WriteTimeout(e)) => {
                metrics::counter!(metric_defs::WRITE_ERRORS.name, &labels).increment(1);
                warn!(frame = %text, error = %e, "write timed out; not retrying");
            }
            Err(e) => {
                metrics::counter!(metric_defs::WRITE_ERRORS.name, &labels).increment(1);
                warn!(frame = %text, error = %e, "write failed; not retrying");
            }
        }

        if self.config.wait_for_ack {
            let started = Instant::now();
            let timeout = self.config.ack_timeout();
            if wait_for_ack_on(&self.connection, self.generation, timeout) {
                metrics::counter!(metric_defs::ACKS_RECEIVED.name, &labels).increment(1);
                metrics::histogram!(metric_defs::ACK_LATENCY.name, &labels)
                    .record(started.elapsed().as_micros() as f64);
            } else {
                metrics::counter!(metric_defs::ACK_TIMEOUTS.name, &labels).increment(1);
                warn!(frame = %text, "frame not acknowledged");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SerialConfig;
    use crate::simulated::{AckMode, SimulatedDevice};
    use std::time::Duration;

    fn fast_config() -> SenderConfig {
        SenderConfig::default()
            .with_inter_frame_delay_ms(0)
            .with_ack_timeout_ms(50)
            .with_stop_timeout_ms(2000)
    }

    fn open(device: &SimulatedDevice) -> Arc<Connection> {
        let connection = Arc::new(Connection::new(SerialConfig::default()));
        connection.attach(Box::new(device.link("sim-sender")));
        connection
    }

    #[test]
    fn test_new_requires_open_connection() {
        let connection = Arc::new(Connection::new(SerialConfig::default()));
        let err = Sender::new(connection, fast_config()).err().unwrap();
        assert!(matches!(err, SerialError::NotConnected));
    }

    #[test]
    fn test_lifecycle() {
        let device = SimulatedDevice::new(AckMode::Silent);
        let sender = Sender::new(open(&device), fast_config()).unwrap();
        assert_eq!(sender.state(), SenderState::Idle);

        sender.start().unwrap();
        sender.start().unwrap();
        assert_eq!(sender.state(), SenderState::Running);

        sender.stop();
        assert_eq!(sender.state(), SenderState::Stopped);
        sender.stop();
        assert_eq!(sender.state(), SenderState::Stopped);

        assert!(matches!(sender.start(), Err(SerialError::SenderStopped)));
    }

    #[test]
    fn test_two_panel_offs_written_before_stop() {
        let device = SimulatedDevice::new(AckMode::Silent);
        let sender = Sender::new(open(&device), fast_config()).unwrap();
        sender.start().unwrap();

        sender.send(&Command::PanelOff).unwrap();
        sender.send(&Command::PanelOff).unwrap();
        sender.stop();

        assert_eq!(
            device.frames(),
            vec!["<A,1,X,empty>".to_string(), "<A,1,X,empty>".to_string()]
        );
        assert_eq!(sender.state(), SenderState::Stopped);
    }

    #[test]
    fn test_frames_queued_while_idle_are_sent_on_start() {
        let device = SimulatedDevice::new(AckMode::Silent);
        let sender = Sender::new(open(&device), fast_config()).unwrap();

        sender.send(&Command::brightness(10)).unwrap();
        assert_eq!(sender.queue_len(), 1);
        assert!(device.frames().is_empty());

        sender.start().unwrap();
        assert!(device.wait_for_writes(1, Duration::from_secs(2)));
        sender.stop();
        assert_eq!(device.frames(), vec!["<A,1,L,empty,0,0,0,10>".to_string()]);
    }

    #[test]
    fn test_stop_while_idle_drops_queue() {
        let device = SimulatedDevice::new(AckMode::Silent);
        let sender = Sender::new(open(&device), fast_config()).unwrap();
        sender.send(&Command::PanelOff).unwrap();

        sender.stop();
        assert_eq!(sender.state(), SenderState::Stopped);
        assert_eq!(sender.queue_len(), 0);
        assert!(device.frames().is_empty());
    }

    #[test]
    fn test_send_after_stop_is_rejected() {
        let device = SimulatedDevice::new(AckMode::Silent);
        let sender = Sender::new(open(&device), fast_config()).unwrap();
        sender.start().unwrap();
        sender.stop();

        let err = sender.send(&Command::PanelOff).unwrap_err();
        assert!(matches!(err, SerialError::SenderStopped));
        assert!(device.frames().is_empty());
    }

    #[test]
    fn test_ack_mode_clears_input_per_frame() {
        let device = SimulatedDevice::new(AckMode::AckEveryFrame);
        let sender = Sender::new(open(&device), fast_config().with_ack(true)).unwrap();
        sender.start().unwrap();

        sender.send(&Command::BlankPanel).unwrap();
        sender.send(&Command::PanelOff).unwrap();
        sender.stop();

        assert_eq!(device.frames().len(), 2);
        assert_eq!(device.input_clears(), 2);
    }

    #[test]
    fn test_start_requires_open_connection() {
        let device = SimulatedDevice::new(AckMode::Silent);
        let connection = open(&device);
        let sender = Sender::new(Arc::clone(&connection), fast_config()).unwrap();
        connection.close();

        assert!(matches!(sender.start(), Err(SerialError::NotConnected)));
        sender.stop();
        assert_eq!(sender.state(), SenderState::Stopped);
    }

    #[test]
    fn test_connection_closed_mid_queue_does_not_hang() {
        let device = SimulatedDevice::new(AckMode::Silent);
        let connection = open(&device);
        let sender = Sender::new(Arc::clone(&connection), fast_config().with_ack(true)).unwrap();
        sender.start().unwrap();
        connection.close();

        sender.send(&Command::PanelOff).unwrap();
        sender.send(&Command::BlankPanel).unwrap();
        sender.stop();

        assert_eq!(sender.state(), SenderState::Stopped);
        assert!(device.frames().is_empty());
    }
}
