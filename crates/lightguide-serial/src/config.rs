//! Configuration for the serial connection and the sender.
//!
//! Every field has a default, so an empty YAML document is a valid
//! configuration:
//!
//! ```yaml
//! serial:
//!   baud_rate: 500000
//!   write_timeout_ms: 1000
//! sender:
//!   wait_for_ack: true
//!   ack_timeout_ms: 250
//! ```

use std::path::Path;
use std::time::Duration;

use lightguide_protocol::DEFAULT_BAUD_RATE;
use serde::{Deserialize, Serialize};

use crate::error::{SerialError, SerialResult};

/// Serial line and port timing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate. The panel firmware listens at 500000.
    pub baud_rate: u32,

    /// Port timeout applied to writes (milliseconds).
    /// A stalled write fails with `WriteTimeout` after this long.
    pub write_timeout_ms: u64,

    /// Read timeout used while polling for an ACK (milliseconds).
    /// Bounds how far an ACK wait can overshoot its deadline.
    pub ack_poll_interval_ms: u64,

    /// Sleep between checks of the outstanding-output counter (milliseconds).
    pub drain_poll_interval_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baud_rate: DEFAULT_BAUD_RATE,
            write_timeout_ms: 1000,
            ack_poll_interval_ms: 10,
            drain_poll_interval_ms: 1,
        }
    }
}

impl SerialConfig {
    /// Set the write timeout.
    pub fn with_write_timeout_ms(mut self, write_timeout_ms: u64) -> Self {
        self.write_timeout_ms = write_timeout_ms;
        self
    }

    /// Set the ACK poll interval.
    pub fn with_ack_poll_interval_ms(mut self, ack_poll_interval_ms: u64) -> Self {
        self.ack_poll_interval_ms = ack_poll_interval_ms;
        self
    }

    /// Write timeout as a duration.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// ACK poll interval as a duration.
    pub fn ack_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ack_poll_interval_ms)
    }

    /// Drain poll interval as a duration.
    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }
}

/// Sender worker behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Wait for `<ACK>` after every frame before writing the next one.
    pub wait_for_ack: bool,

    /// How long to wait for an ACK (milliseconds).
    pub ack_timeout_ms: u64,

    /// Pause after each drained frame to give the panel processing time (milliseconds).
    pub inter_frame_delay_ms: u64,

    /// Upper bound on how long `stop()` waits for the worker (milliseconds).
    pub stop_timeout_ms: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            wait_for_ack: false,
            ack_timeout_ms: 1000,
            inter_frame_delay_ms: 50,
            stop_timeout_ms: 5000,
        }
    }
}

impl SenderConfig {
    /// Enable or disable ACK waiting.
    pub fn with_ack(mut self, wait_for_ack: bool) -> Self {
        self.wait_for_ack = wait_for_ack;
        self
    }

    /// Set the ACK timeout.
    pub fn with_ack_timeout_ms(mut self, ack_timeout_ms: u64) -> Self {
        self.ack_timeout_ms = ack_timeout_ms;
        self
    }

    /// Set the inter-frame delay.
    pub fn with_inter_frame_delay_ms(mut self, inter_frame_delay_ms: u64) -> Self {
        self.inter_frame_delay_ms = inter_frame_delay_ms;
        self
    }

    /// Set the stop timeout.
    pub fn with_stop_timeout_ms(mut self, stop_timeout_ms: u64) -> Self {
        self.stop_timeout_ms = stop_timeout_ms;
        self
    }

    /// ACK timeout as a duration.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Inter-frame delay as a duration.
    pub fn inter_frame_delay(&self) -> Duration {
        Duration::from_millis(self.inter_frame_delay_ms)
    }

    /// Stop timeout as a duration.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Complete configuration, as loaded from a YAML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightGuideConfig {
    /// Serial line settings.
    pub serial: SerialConfig,
    /// Sender settings.
    pub sender: SenderConfig,
}

impl LightGuideConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(text: &str) -> SerialResult<Self> {
        let config: LightGuideConfig = if text.trim().is_empty() {
            LightGuideConfig::default()
        } else {
            serde_yaml::from_str(text).map_err(|e| SerialError::Config(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> SerialResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SerialError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text)
    }

    /// Reject values that would make the sender misbehave.
    pub fn validate(&self) -> SerialResult<()> {
        if self.serial.baud_rate == 0 {
            return Err(SerialError::Config("baud_rate must be positive".to_string()));
        }
        if self.serial.write_timeout_ms == 0 {
            return Err(SerialError::Config("write_timeout_ms must be positive".to_string()));
        }
        if self.serial.ack_poll_interval_ms == 0 {
            return Err(SerialError::Config("ack_poll_interval_ms must be positive".to_string()));
        }
        if self.sender.stop_timeout_ms == 0 {
            return Err(SerialError::Config("stop_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LightGuideConfig::default();
        assert_eq!(config.serial.baud_rate, 500_000);
        assert!(!config.sender.wait_for_ack);
        assert_eq!(config.sender.inter_frame_delay(), Duration::from_millis(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = LightGuideConfig::from_yaml_str(
            "sender:\n  wait_for_ack: true\n  ack_timeout_ms: 250\n",
        )
        .unwrap();
        assert!(config.sender.wait_for_ack);
        assert_eq!(config.sender.ack_timeout(), Duration::from_millis(250));
        assert_eq!(config.sender.stop_timeout_ms, 5000);
        assert_eq!(config.serial, SerialConfig::default());
    }

    #[test]
    fn test_empty_yaml() {
        assert_eq!(LightGuideConfig::from_yaml_str("").unwrap(), LightGuideConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let yaml = "serial:\n  ack_poll_interval_ms: 0\n";
        let err = LightGuideConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, SerialError::Config(_)));
        assert!(LightGuideConfig::from_yaml_str("serial: [1, 2]").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "serial:\n  write_timeout_ms: 200").unwrap();
        let config = LightGuideConfig::load(file.path()).unwrap();
        assert_eq!(config.serial.write_timeout(), Duration::from_millis(200));

        assert!(LightGuideConfig::load("/nonexistent/lightguide.yaml").is_err());
    }

    #[test]
    fn test_builders() {
        let sender = SenderConfig::default()
            .with_ack(true)
            .with_ack_timeout_ms(100)
            .with_inter_frame_delay_ms(0)
            .with_stop_timeout_ms(1000);
        assert!(sender.wait_for_ack);
        assert_eq!(sender.inter_frame_delay(), Duration::ZERO);

        let serial = SerialConfig::default().with_write_timeout_ms(20).with_ack_poll_interval_ms(5);
        assert_eq!(serial.ack_poll_interval(), Duration::from_millis(5));
    }
}
