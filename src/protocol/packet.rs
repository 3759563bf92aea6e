//! # Packet Types
//!
//! Core protocol definitions for Meteostick computed-values lines.

use std::fmt;

use super::status::StatusLine;
use crate::error::{MeteostickError, Result};
use crate::station::clock::Timestamp;

/// Number of radio channels a Davis receiver can listen on
pub const MAX_CHANNELS: usize = 8;

/// Trailing token marking a low transmitter battery
pub const BATTERY_LOW_TOKEN: &str = "L";

/// A radio channel (1-8), i.e. one Davis transmitter ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Channel(u8);

impl Channel {
    /// Creates a channel, `None` unless `number` is in 1..=8.
    pub fn new(number: u8) -> Option<Self> {
        if (1..=MAX_CHANNELS as u8).contains(&number) {
            Some(Self(number))
        } else {
            None
        }
    }

    /// Channel number as printed on the transmitter DIP switches (1-8)
    pub fn number(self) -> u8 {
        self.0
    }

    /// Zero-based slot index
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Davis transmitter ID (0-7)
    pub fn transmitter_id(self) -> u8 {
        self.0 - 1
    }

    /// All eight channels in ascending order
    pub fn all() -> impl Iterator<Item = Channel> {
        (1..=MAX_CHANNELS as u8).map(Channel)
    }
}

impl TryFrom<u8> for Channel {
    type Error = MeteostickError;

    fn try_from(number: u8) -> Result<Self> {
        Channel::new(number).ok_or_else(|| {
            MeteostickError::MalformedPacket(format!(
                "channel {} outside 1-{}",
                number, MAX_CHANNELS
            ))
        })
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Field types that make up a sensor line after its tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Radio channel 1-8
    Channel,
    /// Probe number 1..=max on a leaf/soil station
    Probe(u8),
    /// Unsigned integer (counters)
    Integer,
    /// Fixed-point decimal
    Decimal,
    /// Received signal strength
    Signal,
}

/// Packet type tags of the computed-values output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Wind,
    TempHum,
    LeafWetness,
    SoilMoisture,
    SoilTemp,
    Rain,
    Solar,
    Uv,
    SolarPower,
    Barometer,
    Status,
}

impl PacketKind {
    /// Looks up a sensor line tag. Status lines (`#`) are not tag-dispatched.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "W" => Some(PacketKind::Wind),
            "T" => Some(PacketKind::TempHum),
            "L" => Some(PacketKind::LeafWetness),
            "M" => Some(PacketKind::SoilMoisture),
            "O" => Some(PacketKind::SoilTemp),
            "R" => Some(PacketKind::Rain),
            "S" => Some(PacketKind::Solar),
            "U" => Some(PacketKind::Uv),
            "P" => Some(PacketKind::SolarPower),
            "B" => Some(PacketKind::Barometer),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PacketKind::Wind => "wind",
            PacketKind::TempHum => "temperature/humidity",
            PacketKind::LeafWetness => "leaf wetness",
            PacketKind::SoilMoisture => "soil moisture",
            PacketKind::SoilTemp => "soil temperature",
            PacketKind::Rain => "rain",
            PacketKind::Solar => "solar radiation",
            PacketKind::Uv => "UV",
            PacketKind::SolarPower => "solar power",
            PacketKind::Barometer => "barometer",
            PacketKind::Status => "status",
        }
    }

    /// Field layout following the tag. An optional battery-low token may
    /// follow the layout of any packet that carries a signal field.
    pub fn fields(self) -> &'static [FieldKind] {
        use FieldKind::*;
        match self {
            PacketKind::Wind | PacketKind::TempHum => &[Channel, Decimal, Decimal, Signal],
            PacketKind::LeafWetness => &[Channel, Probe(2), Decimal, Signal],
            PacketKind::SoilMoisture | PacketKind::SoilTemp => {
                &[Channel, Probe(4), Decimal, Signal]
            }
            PacketKind::Rain => &[Channel, Integer, Signal],
            PacketKind::Solar | PacketKind::Uv | PacketKind::SolarPower => {
                &[Channel, Decimal, Signal]
            }
            PacketKind::Barometer => &[Decimal, Decimal],
            PacketKind::Status => &[],
        }
    }

    /// Whether lines of this kind carry a signal field (and so may carry
    /// the battery flag)
    pub fn has_signal(self) -> bool {
        self.fields().contains(&FieldKind::Signal)
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed packet, one variant per packet kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Wind speed (m/s) and direction (raw byte or degrees)
    Wind { speed: f64, direction: f64 },
    /// Temperature (°C) and relative humidity (%)
    TempHum { temperature: f64, humidity: f64 },
    LeafWetness { probe: u8, value: f64 },
    SoilMoisture { probe: u8, value: f64 },
    SoilTemp { probe: u8, value: f64 },
    /// Cumulative bucket-tip counter
    Rain { counter: u32 },
    Solar { radiation: f64 },
    Uv { index: f64 },
    SolarPower { charge: f64 },
    /// The stick's own sensors: indoor temperature (°C), pressure (hPa)
    Barometer { temperature: f64, pressure: f64 },
    Status(StatusLine),
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Wind { .. } => PacketKind::Wind,
            Packet::TempHum { .. } => PacketKind::TempHum,
            Packet::LeafWetness { .. } => PacketKind::LeafWetness,
            Packet::SoilMoisture { .. } => PacketKind::SoilMoisture,
            Packet::SoilTemp { .. } => PacketKind::SoilTemp,
            Packet::Rain { .. } => PacketKind::Rain,
            Packet::Solar { .. } => PacketKind::Solar,
            Packet::Uv { .. } => PacketKind::Uv,
            Packet::SolarPower { .. } => PacketKind::SolarPower,
            Packet::Barometer { .. } => PacketKind::Barometer,
            Packet::Status(_) => PacketKind::Status,
        }
    }
}

/// Result of parsing one line
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPacket {
    pub packet: Packet,
    /// Present for every sensor packet, absent for barometer and status lines
    pub channel: Option<Channel>,
    pub signal: Option<f64>,
    pub battery_low: bool,
}

impl ParsedPacket {
    pub fn kind(&self) -> PacketKind {
        self.packet.kind()
    }
}

/// One line as delivered by the serial supply, stamped on arrival
#[derive(Debug, Clone)]
pub struct RawLine {
    pub text: String,
    pub received_at: Timestamp,
}

impl RawLine {
    pub fn new(text: impl Into<String>, received_at: Timestamp) -> Self {
        Self {
            text: text.into(),
            received_at,
        }
    }
}
