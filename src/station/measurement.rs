//! Measurement names and the quantity each one carries, used to name record
//! fields and pick the unit conversion.

use std::fmt;

use crate::units::UnitSystem;

/// Physical quantity of a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Temperature,
    Speed,
    Pressure,
    /// Direction, percentages, indices and raw probe scales
    Unconverted,
}

/// A primary measurement decoded from a packet.
///
/// Probe-indexed variants carry the probe or station number (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Measurement {
    OutTemp,
    OutHumidity,
    WindSpeed,
    WindDir,
    Radiation,
    Uv,
    SolarPower,
    ExtraTemp(u8),
    ExtraHumid(u8),
    LeafWet(u8),
    SoilMoist(u8),
    SoilTemp(u8),
    InTemp,
    Pressure,
}

impl Measurement {
    /// Record field name
    pub fn field_name(self) -> String {
        match self {
            Measurement::OutTemp => "outTemp".to_string(),
            Measurement::OutHumidity => "outHumidity".to_string(),
            Measurement::WindSpeed => "windSpeed".to_string(),
            Measurement::WindDir => "windDir".to_string(),
            Measurement::Radiation => "radiation".to_string(),
            Measurement::Uv => "UV".to_string(),
            Measurement::SolarPower => "solarPower".to_string(),
            Measurement::ExtraTemp(n) => format!("extraTemp{}", n),
            Measurement::ExtraHumid(n) => format!("extraHumid{}", n),
            Measurement::LeafWet(n) => format!("leafWet{}", n),
            Measurement::SoilMoist(n) => format!("soilMoist{}", n),
            Measurement::SoilTemp(n) => format!("soilTemp{}", n),
            Measurement::InTemp => "inTemp".to_string(),
            Measurement::Pressure => "pressure".to_string(),
        }
    }

    pub fn quantity(self) -> Quantity {
        match self {
            Measurement::OutTemp
            | Measurement::ExtraTemp(_)
            | Measurement::SoilTemp(_)
            | Measurement::InTemp => Quantity::Temperature,
            Measurement::WindSpeed => Quantity::Speed,
            Measurement::Pressure => Quantity::Pressure,
            _ => Quantity::Unconverted,
        }
    }

    /// Convert a canonical (°C, m/s, hPa) value into `units`.
    pub fn convert(self, value: f64, units: UnitSystem) -> f64 {
        match self.quantity() {
            Quantity::Temperature => units.temperature(value),
            Quantity::Speed => units.speed(value),
            Quantity::Pressure => units.pressure(value),
            Quantity::Unconverted => value,
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.field_name())
    }
}
