//! # Line Parser
//!
//! Splits one text line into a tag and its fields, validates arity and field
//! types against the layout table in [`PacketKind::fields`] and produces a
//! typed [`ParsedPacket`].

use super::packet::{Channel, FieldKind, Packet, PacketKind, ParsedPacket, BATTERY_LOW_TOKEN};
use super::status::{parse_status, STATUS_PREFIX};
use crate::error::{MeteostickError, Result};

/// Values pulled out of a line in layout order
#[derive(Debug, Default)]
struct Fields {
    channel: Option<Channel>,
    probe: Option<u8>,
    integer: Option<u32>,
    decimals: Vec<f64>,
    signal: Option<f64>,
}

/// Parse one line of stick output.
///
/// # Errors
///
/// - `UnknownPacketType` for empty lines, banner/comment lines and tags
///   outside the vocabulary
/// - `MalformedPacket` for wrong token counts, non-numeric fields, channels
///   outside 1-8 and probe numbers outside the station's range
///
/// # Examples
///
/// ```
/// use meteostick_bridge::protocol::{parse_line, Packet};
///
/// let parsed = parse_line("R 1 42 -67 L").unwrap();
/// assert_eq!(parsed.packet, Packet::Rain { counter: 42 });
/// assert!(parsed.battery_low);
/// ```
pub fn parse_line(line: &str) -> Result<ParsedPacket> {
    let line = line.trim();
    if line.is_empty() {
        return Err(MeteostickError::UnknownPacketType("empty line".to_string()));
    }

    if line.starts_with(STATUS_PREFIX) {
        return match parse_status(line)? {
            Some(status) => Ok(ParsedPacket {
                packet: Packet::Status(status),
                channel: None,
                signal: None,
                battery_low: false,
            }),
            None => Err(MeteostickError::UnknownPacketType(line.to_string())),
        };
    }

    let mut tokens = line.split_whitespace();
    let tag = tokens.next().unwrap_or_default();
    let kind = PacketKind::from_tag(tag)
        .ok_or_else(|| MeteostickError::UnknownPacketType(tag.to_string()))?;

    let rest: Vec<&str> = tokens.collect();
    let layout = kind.fields();

    let battery_low = if rest.len() == layout.len() {
        false
    } else if kind.has_signal() && rest.len() == layout.len() + 1 {
        match rest.last() {
            Some(&BATTERY_LOW_TOKEN) => true,
            Some(other) => {
                return Err(MeteostickError::MalformedPacket(format!(
                    "unexpected trailing token '{}' in '{}'",
                    other, line
                )))
            }
            None => false,
        }
    } else {
        return Err(MeteostickError::MalformedPacket(format!(
            "{} line needs {} fields, got {}: '{}'",
            kind,
            layout.len(),
            rest.len(),
            line
        )));
    };

    let mut fields = Fields::default();
    for (field, token) in layout.iter().zip(rest.iter()) {
        match *field {
            FieldKind::Channel => {
                let number = parse_integer(token, line)?;
                let number = u8::try_from(number).map_err(|_| {
                    MeteostickError::MalformedPacket(format!("channel {} out of range", number))
                })?;
                fields.channel = Some(Channel::try_from(number)?);
            }
            FieldKind::Probe(max) => {
                let probe = parse_integer(token, line)?;
                if probe == 0 || probe > max as u32 {
                    return Err(MeteostickError::MalformedPacket(format!(
                        "probe {} outside 1-{} in '{}'",
                        probe, max, line
                    )));
                }
                fields.probe = Some(probe as u8);
            }
            FieldKind::Integer => fields.integer = Some(parse_integer(token, line)?),
            FieldKind::Decimal => fields.decimals.push(parse_decimal(token, line)?),
            FieldKind::Signal => fields.signal = Some(parse_decimal(token, line)?),
        }
    }

    let packet = build_packet(kind, &fields)?;

    Ok(ParsedPacket {
        packet,
        channel: fields.channel,
        signal: fields.signal,
        battery_low,
    })
}

/// Assemble the typed packet. The layout table guarantees which fields are
/// populated for each kind.
fn build_packet(kind: PacketKind, fields: &Fields) -> Result<Packet> {
    let decimal = |i: usize| fields.decimals.get(i).copied().unwrap_or_default();
    let probe = fields.probe.unwrap_or_default();

    let packet = match kind {
        PacketKind::Wind => Packet::Wind {
            speed: decimal(0),
            direction: decimal(1),
        },
        PacketKind::TempHum => Packet::TempHum {
            temperature: decimal(0),
            humidity: decimal(1),
        },
        PacketKind::LeafWetness => Packet::LeafWetness { probe, value: decimal(0) },
        PacketKind::SoilMoisture => Packet::SoilMoisture { probe, value: decimal(0) },
        PacketKind::SoilTemp => Packet::SoilTemp { probe, value: decimal(0) },
        PacketKind::Rain => Packet::Rain {
            counter: fields.integer.unwrap_or_default(),
        },
        PacketKind::Solar => Packet::Solar { radiation: decimal(0) },
        PacketKind::Uv => Packet::Uv { index: decimal(0) },
        PacketKind::SolarPower => Packet::SolarPower { charge: decimal(0) },
        PacketKind::Barometer => Packet::Barometer {
            temperature: decimal(0),
            pressure: decimal(1),
        },
        PacketKind::Status => {
            return Err(MeteostickError::MalformedPacket(
                "status lines have no field layout".to_string(),
            ))
        }
    };
    Ok(packet)
}

fn parse_integer(token: &str, line: &str) -> Result<u32> {
    token.parse::<u32>().map_err(|_| {
        MeteostickError::MalformedPacket(format!("expected integer, got '{}' in '{}'", token, line))
    })
}

fn parse_decimal(token: &str, line: &str) -> Result<f64> {
    match token.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(MeteostickError::MalformedPacket(format!(
            "expected number, got '{}' in '{}'",
            token, line
        ))),
    }
}
