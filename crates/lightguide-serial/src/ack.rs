//! Waiting for the panel's `<ACK>`.

use std::time::{Duration, Instant};

use lightguide_protocol::FrameCodec;
use tracing::{debug, trace, warn};

use crate::connection::Connection;

/// Read chunk size. ACK frames are five bytes; anything longer is noise.
const READ_CHUNK: usize = 64;

/// Read from `connection` until a chunk ending in `>` leaves `<ACK>` in the
/// accumulated buffer, or until `timeout` has passed.
///
/// The port timeout is lowered to the configured ACK poll interval for the
/// duration of the wait, so the deadline is overshot by at most one poll.
/// The previous timeout is restored on every exit path.
pub fn wait_for_ack(connection: &Connection, timeout: Duration) -> bool {
    wait(connection, None, timeout)
}

/// [`wait_for_ack`], giving up as soon as the connection no longer holds the
/// link of `generation`.
pub fn wait_for_ack_on(connection: &Connection, generation: u64, timeout: Duration) -> bool {
    wait(connection, Some(generation), timeout)
}

fn wait(connection: &Connection, generation: Option<u64>, timeout: Duration) -> bool {
    let started = Instant::now();
    let deadline = started + timeout;
    let poll = connection
        .config()
        .ack_poll_interval()
        .max(Duration::from_millis(1));

    let first_poll = poll.min(timeout).max(Duration::from_millis(1));
    let guard = match connection.scoped_read_timeout(first_poll) {
        Ok(guard) => guard,
        Err(e) => {
            warn!(error = %e, "cannot wait for ACK");
            return false;
        }
    };

    let mut codec = FrameCodec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        if generation.is_some_and(|g| g != connection.generation()) {
            debug!("link replaced while waiting for ACK");
            return false;
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                buffered = codec.buffered_len(),
                partial = %codec.buffer_as_str(),
                "no ACK before timeout"
            );
            return false;
        }

        let remaining = deadline - now;
        if remaining < poll {
            if let Err(e) = guard.set(remaining.max(Duration::from_millis(1))) {
                warn!(error = %e, "ACK wait aborted");
                return false;
            }
        }

        match connection.read(&mut chunk) {
            Ok(0) => {}
            Ok(n) => {
                codec.push(&chunk[..n]);
                if codec.ends_with_delimiter() && codec.contains_ack() {
                    trace!(elapsed_us = started.elapsed().as_micros() as u64, "ACK received");
                    return true;
                }
            }
            Err(e) => {
                warn!(error = %e, partial = %codec.buffer_as_str(), "ACK wait aborted");
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SerialConfig;
    use crate::simulated::{AckMode, SimulatedDevice};
    use serial_test::serial;
    use std::thread;

    fn open(device: &SimulatedDevice) -> Connection {
        let connection = Connection::new(SerialConfig::default());
        connection.attach(Box::new(device.link("sim-ack")));
        connection
    }

    #[test]
    #[serial]
    fn test_silent_device_times_out_in_bounds() {
        let device = SimulatedDevice::new(AckMode::Silent);
        let connection = open(&device);

        let started = Instant::now();
        assert!(!wait_for_ack(&connection, Duration::from_millis(100)));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100), "returned early: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(150), "overshot: {:?}", elapsed);
    }

    #[test]
    fn test_ack_found() {
        let device = SimulatedDevice::new(AckMode::AckEveryFrame);
        let connection = open(&device);
        connection.write_and_drain(b"<A,1,X,empty>", Duration::ZERO).unwrap();

        assert!(wait_for_ack(&connection, Duration::from_millis(500)));
    }

    #[test]
    fn test_ack_after_other_frame() {
        let device = SimulatedDevice::new(AckMode::Silent);
        let connection = open(&device);
        device.inject(b"<BUSY><ACK>");

        assert!(wait_for_ack(&connection, Duration::from_millis(500)));
    }

    #[test]
    fn test_ack_split_across_reads() {
        let device = SimulatedDevice::new(AckMode::Silent);
        let connection = open(&device);
        device.inject(b"<AC");

        let late = device.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            late.inject(b"K>");
        });

        assert!(wait_for_ack(&connection, Duration::from_millis(500)));
        handle.join().unwrap();
    }

    #[test]
    fn test_other_frames_are_not_ack() {
        let device = SimulatedDevice::new(AckMode::Silent);
        let connection = open(&device);
        device.inject(b"<NAK>");

        assert!(!wait_for_ack(&connection, Duration::from_millis(40)));
    }

    #[test]
    fn test_timeout_restored() {
        let device = SimulatedDevice::new(AckMode::Silent);
        let connection = open(&device);
        connection.set_timeout(Duration::from_millis(777)).unwrap();

        wait_for_ack(&connection, Duration::from_millis(20));
        assert_eq!(connection.timeout().unwrap(), Duration::from_millis(777));

        device.inject(b"<ACK>");
        assert!(wait_for_ack(&connection, Duration::from_millis(20)));
        assert_eq!(connection.timeout().unwrap(), Duration::from_millis(777));
    }

    #[test]
    fn test_closed_connection_is_no_ack() {
        let connection = Connection::new(SerialConfig::default());
        assert!(!wait_for_ack(&connection, Duration::from_millis(10)));
    }
}
