//! # Serial Line Supply
//!
//! Opens the Meteostick's USB serial port and turns its byte stream into
//! complete text lines.
//!
//! This module handles:
//! - Opening the serial port at the configured baud rate (8N1)
//! - Newline framing with a read timeout (see [`line_reader`])
//! - The [`LineSource`] seam the runner reads from

pub mod line_reader;
pub mod port_trait;

pub use line_reader::{LineReader, MAX_LINE_LENGTH};
pub use port_trait::{LineRead, LineSource};

use crate::config::SerialConfig;
use crate::error::{MeteostickError, Result};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// Meteostick serial port handle
pub struct StickSerial {
    port: tokio_serial::SerialStream,
    device_path: String,
}

impl std::fmt::Debug for StickSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StickSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl StickSerial {
    /// Open the port named in configuration
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` if the port cannot be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use meteostick_bridge::config::SerialConfig;
    /// use meteostick_bridge::serial::StickSerial;
    ///
    /// let serial = StickSerial::open(&SerialConfig::default())?;
    /// println!("Connected to: {}", serial.device_path());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let path = config.port.as_str();
        debug!("Opening serial port: {}", path);

        match Self::open_port(path, config.baud_rate) {
            Ok(port) => {
                info!("Opened Meteostick at {} ({} baud)", path, config.baud_rate);
                Ok(Self {
                    port,
                    device_path: path.to_string(),
                })
            }
            Err(e) => {
                warn!("Failed to open {}: {}", path, e);
                Err(MeteostickError::SerialPortNotFound(path.to_string()))
            }
        }
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| MeteostickError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Wrap the port in a line reader using the configured timeout
    pub fn into_line_reader(self, config: &SerialConfig) -> LineReader<tokio_serial::SerialStream> {
        LineReader::new(self.port, config.timeout(), config.discard_first_line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_port_with_invalid_path_returns_error() {
        match StickSerial::open_port("/dev/nonexistent_serial_device_12345", 115_200).unwrap_err() {
            MeteostickError::Serial(msg) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_from_config() {
        let mut config = SerialConfig::default();
        config.port = "/dev/nonexistent_meteostick".to_string();
        match StickSerial::open(&config).unwrap_err() {
            MeteostickError::SerialPortNotFound(path) => {
                assert_eq!(path, "/dev/nonexistent_meteostick");
            }
            other => panic!("Expected SerialPortNotFound, got: {:?}", other),
        }
    }

    #[test]
    #[ignore] // Needs a Meteostick attached
    fn test_open_with_real_hardware() {
        match StickSerial::open(&SerialConfig::default()) {
            Ok(serial) => println!("Opened Meteostick at: {}", serial.device_path()),
            Err(e) => println!("No Meteostick detected: {}", e),
        }
    }
}
