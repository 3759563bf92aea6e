//! # Output Unit Systems
//!
//! The stick reports engineering units (°C, m/s, hPa). Records are emitted in
//! either the METRICWX system (the stick's native units, rain in mm) or the US
//! system. Nothing else is converted.

use serde::Deserialize;

/// Millimetres per inch
const MM_PER_INCH: f64 = 25.4;

/// Metres per second to miles per hour
const MS_TO_MPH: f64 = 2.236_936;

/// Hectopascal to inches of mercury
const HPA_TO_INHG: f64 = 0.029_529_983;

/// Kilometres per mile
const KM_PER_MILE: f64 = 1.609_344;

/// Unit system of emitted records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    /// °C, m/s, mm, hPa, km
    #[default]
    MetricWx,
    /// °F, mph, in, inHg, miles
    Us,
}

impl UnitSystem {
    /// Numeric code carried in the record's `usUnits` field
    pub fn code(self) -> u8 {
        match self {
            UnitSystem::MetricWx => 17,
            UnitSystem::Us => 1,
        }
    }

    pub fn temperature(self, celsius: f64) -> f64 {
        match self {
            UnitSystem::MetricWx => celsius,
            UnitSystem::Us => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    pub fn speed(self, meters_per_second: f64) -> f64 {
        match self {
            UnitSystem::MetricWx => meters_per_second,
            UnitSystem::Us => meters_per_second * MS_TO_MPH,
        }
    }

    pub fn rain(self, millimeters: f64) -> f64 {
        match self {
            UnitSystem::MetricWx => millimeters,
            UnitSystem::Us => millimeters / MM_PER_INCH,
        }
    }

    pub fn pressure(self, hectopascal: f64) -> f64 {
        match self {
            UnitSystem::MetricWx => hectopascal,
            UnitSystem::Us => hectopascal * HPA_TO_INHG,
        }
    }

    /// Distance from metres (wind run is km or miles)
    pub fn distance(self, meters: f64) -> f64 {
        match self {
            UnitSystem::MetricWx => meters / 1000.0,
            UnitSystem::Us => meters / 1000.0 / KM_PER_MILE,
        }
    }
}

/// Rain gauge bucket fitted to the ISS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RainBucket {
    /// 0.01 inch per tip
    #[default]
    Imperial,
    /// 0.2 mm per tip
    Metric,
}

impl RainBucket {
    /// Rain per tip expressed in `units`.
    ///
    /// Each bucket is exact in its own unit, so the imperial bucket yields
    /// exactly 0.01 in US records and the metric bucket exactly 0.2 mm in
    /// METRICWX records.
    pub fn tip_size(self, units: UnitSystem) -> f64 {
        match (self, units) {
            (RainBucket::Imperial, UnitSystem::Us) => 0.01,
            (RainBucket::Imperial, UnitSystem::MetricWx) => 0.01 * MM_PER_INCH,
            (RainBucket::Metric, UnitSystem::MetricWx) => 0.2,
            (RainBucket::Metric, UnitSystem::Us) => 0.2 / MM_PER_INCH,
        }
    }
}

impl std::fmt::Display for RainBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RainBucket::Imperial => write!(f, "0.01in"),
            RainBucket::Metric => write!(f, "0.2mm"),
        }
    }
}
