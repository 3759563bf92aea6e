//! # Error Types
//!
//! Custom error types for Meteostick Bridge using `thiserror`.
//!
//! The first group of variants are per-packet discards: the packet is dropped,
//! the pipeline keeps running and no other channel is affected. The rest are
//! setup or supply failures.

use thiserror::Error;

/// Main error type for Meteostick Bridge
#[derive(Debug, Error)]
pub enum MeteostickError {
    /// Structurally invalid line (wrong arity, non-numeric field, bad channel)
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    /// Empty line, banner/comment text or an unrecognized tag
    #[error("Unknown packet type: {0}")]
    UnknownPacketType(String),

    /// Valid sensor packet on a channel with no configured role
    #[error("No role bound to channel {0}")]
    UnboundChannel(u8),

    /// Packet type that the bound role never transmits
    #[error("Channel {channel} ({role}) does not transmit {packet} packets")]
    RoleMismatch {
        channel: u8,
        role: String,
        packet: &'static str,
    },

    /// Decoded value outside the sensor's physical envelope
    #[error("{field} value {value} outside valid range {min}..={max}")]
    OutOfRangeValue {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Counter delta above the plausibility ceiling
    #[error(
        "Implausible counter jump from {previous} to {current} (delta {delta}, ceiling {ceiling})"
    )]
    ImplausibleCounterJump {
        previous: u32,
        current: u32,
        delta: u32,
        ceiling: u32,
    },

    /// Stick reports a rain bucket different from the configured one
    #[error("Stick reports rain bucket {reported}, configured {configured}")]
    BucketMismatch {
        reported: String,
        configured: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate device paths could be opened
    #[error("No Meteostick found at: {0}")]
    SerialPortNotFound(String),

    /// The line supply ended (device unplugged, EOF)
    #[error("Line supply closed")]
    LineSupplyClosed,
}

impl MeteostickError {
    /// Whether this error only discards the current packet.
    pub fn is_packet_local(&self) -> bool {
        matches!(
            self,
            MeteostickError::MalformedPacket(_)
                | MeteostickError::UnknownPacketType(_)
                | MeteostickError::UnboundChannel(_)
                | MeteostickError::RoleMismatch { .. }
                | MeteostickError::OutOfRangeValue { .. }
                | MeteostickError::ImplausibleCounterJump { .. }
                | MeteostickError::BucketMismatch { .. }
        )
    }
}

/// Result type alias for Meteostick Bridge
pub type Result<T> = std::result::Result<T, MeteostickError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_local_classification() {
        assert!(MeteostickError::MalformedPacket("x".into()).is_packet_local());
        assert!(MeteostickError::UnboundChannel(3).is_packet_local());
        assert!(!MeteostickError::LineSupplyClosed.is_packet_local());
        assert!(!MeteostickError::Serial("gone".into()).is_packet_local());
    }

    #[test]
    fn test_display_messages() {
        let err = MeteostickError::OutOfRangeValue {
            field: "outHumidity",
            value: 104.0,
            min: 0.0,
            max: 100.0,
        };
        assert_eq!(err.to_string(), "outHumidity value 104 outside valid range 0..=100");

        let err = MeteostickError::UnboundChannel(5);
        assert_eq!(err.to_string(), "No role bound to channel 5");
    }
}
