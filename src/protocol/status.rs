//! # Stick Status Lines
//!
//! Lines starting with `#` are informational. Three shapes carry state the
//! engine cares about:
//!
//! ```text
//! # MeteoStick Version 3.2.3 (c)2015 Smartbedded
//! # Hop 12
//! # Rain bucket 0.2mm
//! ```
//!
//! Every other `#` line is banner or debug text.

use crate::error::{MeteostickError, Result};
use crate::units::RainBucket;

/// Marker that starts every info/status line
pub const STATUS_PREFIX: char = '#';

/// Meta-information reported by the stick itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    FirmwareVersion(String),
    /// Currently active frequency-hop channel
    FrequencyHop(u8),
    RainBucket(RainBucket),
}

/// Parses a `#` line.
///
/// Returns `Ok(None)` for banner/comment text, `Ok(Some(..))` for a
/// recognized status line and `MalformedPacket` when a recognized keyword is
/// followed by an unusable value.
pub fn parse_status(line: &str) -> Result<Option<StatusLine>> {
    let body = match line.trim().strip_prefix(STATUS_PREFIX) {
        Some(body) => body,
        None => return Ok(None),
    };
    let tokens: Vec<&str> = body.split_whitespace().collect();
    let lower: Vec<String> = tokens.iter().map(|t| t.to_ascii_lowercase()).collect();
    let keywords: Vec<&str> = lower.iter().map(String::as_str).collect();

    match keywords.as_slice() {
        ["meteostick", "version", ..] => {
            let version = tokens.get(2).ok_or_else(|| {
                MeteostickError::MalformedPacket(format!("missing firmware version in '{}'", line))
            })?;
            Ok(Some(StatusLine::FirmwareVersion(version.to_string())))
        }
        ["hop", value] => value
            .parse::<u8>()
            .map(|hop| Some(StatusLine::FrequencyHop(hop)))
            .map_err(|_| {
                MeteostickError::MalformedPacket(format!("invalid hop channel '{}'", value))
            }),
        ["rain", "bucket", value] => match *value {
            "0.01in" => Ok(Some(StatusLine::RainBucket(RainBucket::Imperial))),
            "0.2mm" => Ok(Some(StatusLine::RainBucket(RainBucket::Metric))),
            other => Err(MeteostickError::MalformedPacket(format!(
                "unknown rain bucket '{}'",
                other
            ))),
        },
        _ => Ok(None),
    }
}
