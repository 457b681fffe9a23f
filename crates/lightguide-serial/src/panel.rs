//! Caller-facing panel handle.
//!
//! [`LightPanel`] bundles a [`Connection`] with its [`Sender`] and exposes
//! the handful of operations a UI needs: connect, send, stop, is_open.

use std::sync::Arc;

use lightguide_protocol::{Cell, CellMask, Command, Rgb};
use tracing::{info, warn};

use crate::config::LightGuideConfig;
use crate::connection::Connection;
use crate::error::{SerialError, SerialResult};
use crate::link::SerialLink;
use crate::sender::{Sender, SenderState};

/// A LightGuide panel reached over one serial port.
pub struct LightPanel {
    config: LightGuideConfig,
    connection: Arc<Connection>,
    sender: Option<Sender>,
}

impl LightPanel {
    /// Create a disconnected panel handle.
    pub fn new(config: LightGuideConfig) -> Self {
        let connection = Arc::new(Connection::new(config.serial.clone()));
        LightPanel {
            config,
            connection,
            sender: None,
        }
    }

    /// Settings the panel was created with.
    pub fn config(&self) -> &LightGuideConfig {
        &self.config
    }

    /// Open `port` and start a sender on it. Failures are logged and
    /// reported as `false`; use [`try_connect`](Self::try_connect) for the
    /// error itself.
    pub fn connect(&mut self, port: &str) -> bool {
        match self.try_connect(port) {
            Ok(()) => true,
            Err(e) => {
                warn!(port, error = %e, "connect failed");
                false
            }
        }
    }

    /// Open `port` and start a sender on it.
    ///
    /// A previously running sender is stopped first, so frames already
    /// queued are written to the old port before it is replaced. If that
    /// stop times out, the frames it still holds are dropped rather than
    /// written to the new port.
    pub fn try_connect(&mut self, port: &str) -> SerialResult<()> {
        self.stop();
        self.connection.connect(port)?;
        self.start_sender()
    }

    /// Use an already open link instead of a named port.
    pub fn attach(&mut self, link: Box<dyn SerialLink>) -> SerialResult<()> {
        self.stop();
        self.connection.attach(link);
        self.start_sender()
    }

    /// Bind a new sender to the link just installed. Frames still held by a
    /// sender whose stop timed out are refused by the connection.
    fn start_sender(&mut self) -> SerialResult<()> {
        let sender = Sender::new(Arc::clone(&self.connection), self.config.sender.clone())?;
        sender.start()?;
        self.sender = Some(sender);
        Ok(())
    }

    /// Whether the serial port is open.
    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    /// Name of the open port, if any.
    pub fn port_name(&self) -> Option<String> {
        self.connection.port_name()
    }

    /// State of the current sender, if one was started.
    pub fn sender_state(&self) -> Option<SenderState> {
        self.sender.as_ref().map(Sender::state)
    }

    /// Queue a command for the panel.
    pub fn send(&self, command: &Command) -> SerialResult<()> {
        self.sender
            .as_ref()
            .ok_or(SerialError::NotConnected)?
            .send(command)
    }

    /// Set global brightness; clamped to `0..=255`.
    pub fn set_brightness(&self, level: i64) -> SerialResult<()> {
        self.send(&Command::brightness(level))
    }

    /// Light every cell in `mask` with `color`.
    pub fn light_cells(&self, mask: CellMask, color: Rgb) -> SerialResult<()> {
        self.send(&Command::mask_color(mask, color))
    }

    /// Blank the panel, then light `cell` with `note`.
    ///
    /// The note is validated before anything is queued.
    pub fn show_cell(&self, cell: Cell, note: &str, color: Rgb) -> SerialResult<()> {
        let command = Command::single_cell(cell, note, color)?;
        self.send(&Command::BlankPanel)?;
        self.send(&command)
    }

    /// Clear every cell without turning the panel off.
    pub fn blank(&self) -> SerialResult<()> {
        self.send(&Command::BlankPanel)
    }

    /// Turn the whole panel off.
    pub fn panel_off(&self) -> SerialResult<()> {
        self.send(&Command::PanelOff)
    }

    /// Stop the sender after it writes everything queued. The port stays open.
    pub fn stop(&mut self) {
        if let Some(sender) = self.sender.take() {
            sender.stop();
        }
    }

    /// Turn the panel off, stop the sender and close the port.
    pub fn shutdown(&mut self) {
        if self.is_open() && self.sender.is_some() {
            if let Err(e) = self.panel_off() {
                warn!(error = %e, "could not queue panel off");
            }
        }
        self.stop();
        self.connection.close();
        info!("panel shut down");
    }
}

impl Drop for LightPanel {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SenderConfig;
    use crate::simulated::{AckMode, SimulatedDevice};
    use std::thread;
    use std::time::Duration;

    fn quick_config() -> LightGuideConfig {
        LightGuideConfig {
            sender: SenderConfig::default().with_inter_frame_delay_ms(0),
            ..LightGuideConfig::default()
        }
    }

    fn attached(device: &SimulatedDevice) -> LightPanel {
        let mut panel = LightPanel::new(quick_config());
        panel.attach(Box::new(device.link("sim-panel"))).unwrap();
        panel
    }

    #[test]
    fn test_send_without_connection() {
        let panel = LightPanel::new(quick_config());
        assert!(!panel.is_open());
        assert!(panel.sender_state().is_none());
        assert!(matches!(panel.panel_off(), Err(SerialError::NotConnected)));
    }

    #[test]
    fn test_connect_to_missing_port_is_false() {
        let mut panel = LightPanel::new(quick_config());
        assert!(!panel.connect("/dev/lightguide-does-not-exist"));
        assert!(!panel.is_open());
    }

    #[test]
    fn test_show_cell_blanks_first() {
        let device = SimulatedDevice::new(AckMode::Silent);
        let mut panel = attached(&device);

        let cell: Cell = "C07".parse().unwrap();
        panel.show_cell(cell, "buffer", Rgb::GREEN).unwrap();
        panel.stop();

        assert_eq!(
            device.frames(),
            vec!["<A,1,X, >".to_string(), "<C,7,S,buffer,0,255,0>".to_string()]
        );
        assert!(panel.is_open());
    }

    #[test]
    fn test_invalid_note_queues_nothing() {
        let device = SimulatedDevice::new(AckMode::Silent);
        let mut panel = attached(&device);

        let cell: Cell = "A01".parse().unwrap();
        let err = panel.show_cell(cell, "a,b", Rgb::RED).unwrap_err();
        assert!(matches!(err, SerialError::Protocol(_)));
        panel.stop();
        assert!(device.frames().is_empty());
    }

    #[test]
    fn test_shutdown_turns_panel_off_and_closes() {
        let device = SimulatedDevice::new(AckMode::Silent);
        let mut panel = attached(&device);

        panel.set_brightness(300).unwrap();
        let mut mask = CellMask::new();
        mask.select_row(0).unwrap();
        panel.light_cells(mask, Rgb::BLUE).unwrap();
        panel.shutdown();

        assert_eq!(
            device.frames(),
            vec![
                "<A,1,L,empty,0,0,0,255>".to_string(),
                "<A,1,M,FF0F00000000000000000000,0,0,255>".to_string(),
                "<A,1,X,empty>".to_string(),
            ]
        );
        assert!(!panel.is_open());
        assert!(panel.sender_state().is_none());

        panel.shutdown();
        assert_eq!(device.frames().len(), 3);
    }

    #[test]
    fn test_reattach_switches_device() {
        let first = SimulatedDevice::new(AckMode::Silent);
        let second = SimulatedDevice::new(AckMode::Silent);
        let mut panel = attached(&first);

        panel.blank().unwrap();
        panel.attach(Box::new(second.link("sim-panel-2"))).unwrap();
        panel.panel_off().unwrap();
        panel.stop();

        assert_eq!(first.frames(), vec!["<A,1,X, >".to_string()]);
        assert_eq!(second.frames(), vec!["<A,1,X,empty>".to_string()]);
        assert_eq!(panel.port_name().as_deref(), Some("sim-panel-2"));
    }

    #[test]
    fn test_reattach_after_stop_timeout_keeps_old_frames_off_new_device() {
        let first = SimulatedDevice::new(AckMode::Silent);
        first.set_write_delay(Duration::from_millis(100));
        let second = SimulatedDevice::new(AckMode::Silent);

        let config = LightGuideConfig {
            sender: SenderConfig::default()
                .with_inter_frame_delay_ms(0)
                .with_stop_timeout_ms(20),
            ..LightGuideConfig::default()
        };
        let mut panel = LightPanel::new(config);
        panel.attach(Box::new(first.link("sim-slow"))).unwrap();
        for level in 1..=3 {
            panel.set_brightness(level).unwrap();
        }

        // The old worker is still writing level 1 when its stop times out.
        panel.attach(Box::new(second.link("sim-fresh"))).unwrap();
        panel.panel_off().unwrap();
        assert!(second.wait_for_writes(1, Duration::from_secs(2)));
        thread::sleep(Duration::from_millis(50));

        assert_eq!(second.frames(), vec!["<A,1,X,empty>".to_string()]);
        assert!(first
            .frames()
            .iter()
            .all(|frame| frame == "<A,1,L,empty,0,0,0,1>"));
    }
}
