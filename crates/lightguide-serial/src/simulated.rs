//! An in-memory panel.
//!
//! [`SimulatedDevice`] records every write a [`SimulatedLink`] receives and
//! can answer each frame with `<ACK>`. It backs the crate's tests and the
//! CLI's `--simulate` mode.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use lightguide_protocol::ACK_TOKEN;
use parking_lot::{Condvar, Mutex};

use crate::link::SerialLink;

/// How the simulated panel answers frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Never answers.
    Silent,
    /// Answers every write with `<ACK>`.
    AckEveryFrame,
}

#[derive(Debug)]
struct DeviceState {
    writes: Vec<Vec<u8>>,
    inbound: VecDeque<u8>,
    ack_mode: AckMode,
    write_delay: Duration,
    fail_writes: bool,
    drain_polls: u32,
    pending_output: u32,
    input_clears: usize,
    buffer_clears: usize,
    failed_writes: usize,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<DeviceState>,
    inbound_ready: Condvar,
}

/// Handle to a simulated panel. Clones share the same device.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    shared: Arc<Shared>,
}

impl SimulatedDevice {
    /// Create a device with the given ACK behaviour.
    pub fn new(ack_mode: AckMode) -> Self {
        SimulatedDevice {
            shared: Arc::new(Shared {
                state: Mutex::new(DeviceState {
                    writes: Vec::new(),
                    inbound: VecDeque::new(),
                    ack_mode,
                    write_delay: Duration::ZERO,
                    fail_writes: false,
                    drain_polls: 0,
                    pending_output: 0,
                    input_clears: 0,
                    buffer_clears: 0,
                    failed_writes: 0,
                }),
                inbound_ready: Condvar::new(),
            }),
        }
    }

    /// Create a link to this device.
    pub fn link(&self, name: &str) -> SimulatedLink {
        SimulatedLink {
            name: name.to_string(),
            timeout: Duration::from_millis(1000),
            shared: self.shared.clone(),
        }
    }

    /// Change how the device answers frames.
    pub fn set_ack_mode(&self, ack_mode: AckMode) {
        self.shared.state.lock().ack_mode = ack_mode;
    }

    /// Make every write take at least `delay`.
    pub fn set_write_delay(&self, delay: Duration) {
        self.shared.state.lock().write_delay = delay;
    }

    /// Make writes fail with `TimedOut`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.shared.state.lock().fail_writes = fail;
    }

    /// Report outstanding output for this many drain polls after each write.
    pub fn set_drain_polls(&self, polls: u32) {
        self.shared.state.lock().drain_polls = polls;
    }

    /// Queue bytes for the host to read.
    pub fn inject(&self, data: &[u8]) {
        self.shared.state.lock().inbound.extend(data.iter().copied());
        self.shared.inbound_ready.notify_all();
    }

    /// Every write, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().writes.clone()
    }

    /// Every write as text, in order.
    pub fn frames(&self) -> Vec<String> {
        self.writes()
            .iter()
            .map(|w| String::from_utf8_lossy(w).to_string())
            .collect()
    }

    /// All written bytes concatenated, as they would appear on the wire.
    pub fn wire(&self) -> Vec<u8> {
        self.shared.state.lock().writes.concat()
    }

    /// Outstanding output the driver would report right now.
    pub fn pending_output(&self) -> u32 {
        self.shared.state.lock().pending_output
    }

    /// Number of times the host cleared its input buffer.
    pub fn input_clears(&self) -> usize {
        self.shared.state.lock().input_clears
    }

    /// Number of times the host cleared both buffers, as it does on open.
    pub fn buffer_clears(&self) -> usize {
        self.shared.state.lock().buffer_clears
    }

    /// Writes rejected while [`set_fail_writes`](Self::set_fail_writes) was on.
    pub fn failed_writes(&self) -> usize {
        self.shared.state.lock().failed_writes
    }

    /// Block until at least `count` writes arrived or `timeout` passed.
    pub fn wait_for_writes(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.writes.len() >= count)
    }

    /// Block until at least `count` writes failed or `timeout` passed.
    pub fn wait_for_failed_writes(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.failed_writes >= count)
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&DeviceState) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if done(&*self.shared.state.lock()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

/// The host side of a [`SimulatedDevice`].
#[derive(Debug)]
pub struct SimulatedLink {
    name: String,
    timeout: Duration,
    shared: Arc<Shared>,
}

impl SerialLink for SimulatedLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let delay = self.shared.state.lock().write_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut state = self.shared.state.lock();
        if state.fail_writes {
            state.failed_writes += 1;
            return Err(io::Error::new(io::ErrorKind::TimedOut, "simulated write timeout"));
        }
        state.writes.push(data.to_vec());
        state.pending_output = state.drain_polls;
        if state.ack_mode == AckMode::AckEveryFrame {
            state.inbound.extend(ACK_TOKEN.iter().copied());
            drop(state);
            self.shared.inbound_ready.notify_all();
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn bytes_to_write(&self) -> io::Result<u32> {
        let mut state = self.shared.state.lock();
        let pending = state.pending_output;
        state.pending_output = pending.saturating_sub(1);
        Ok(pending)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.shared.state.lock();
        if state.inbound.is_empty() {
            let _ = self
                .shared
                .inbound_ready
                .wait_for(&mut state, self.timeout);
        }
        if state.inbound.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "simulated read timeout"));
        }
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn clear_input(&self) -> io::Result<()> {
        let mut state = self.shared.state.lock();
        state.inbound.clear();
        state.input_clears += 1;
        Ok(())
    }

    fn clear_all(&self) -> io::Result<()> {
        let mut state = self.shared.state.lock();
        state.inbound.clear();
        state.pending_output = 0;
        state.buffer_clears += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_every_frame() {
        let device = SimulatedDevice::new(AckMode::AckEveryFrame);
        let mut link = device.link("sim");
        link.write_all(b"<A,1,X,empty>").unwrap();

        let mut buf = [0u8; 16];
        let n = link.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"<ACK>");
    }

    #[test]
    fn test_silent_read_times_out() {
        let device = SimulatedDevice::new(AckMode::Silent);
        let mut link = device.link("sim");
        link.set_timeout(Duration::from_millis(5)).unwrap();

        let started = Instant::now();
        let err = link.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_drain_polls_count_down() {
        let device = SimulatedDevice::new(AckMode::Silent);
        device.set_drain_polls(2);
        let mut link = device.link("sim");
        link.write_all(b"x").unwrap();

        assert_eq!(link.bytes_to_write().unwrap(), 2);
        assert_eq!(link.bytes_to_write().unwrap(), 1);
        assert_eq!(link.bytes_to_write().unwrap(), 0);
    }

    #[test]
    fn test_injected_bytes_wake_reader() {
        let device = SimulatedDevice::new(AckMode::Silent);
        let mut link = device.link("sim");
        link.set_timeout(Duration::from_secs(2)).unwrap();

        let injector = device.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            injector.inject(b"<ACK>");
        });

        let started = Instant::now();
        let mut buf = [0u8; 8];
        let n = link.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"<ACK>");
        assert!(started.elapsed() < Duration::from_secs(1));
        handle.join().unwrap();
    }
}
