//! # Sensor Decoders
//!
//! One decode routine per packet kind. Each converts the packet's raw fields
//! into calibrated physical values and checks them against the sensor's
//! physical envelope. A value outside its envelope discards the whole packet
//! rather than being clamped, so radio corruption never shows up as a valid
//! reading.
//!
//! Rain packets are not turned into rainfall here: the decoder only validates
//! the raw tip counter and hands it on to the accumulator.

use super::calibration::{
    wind_direction_from_raw, Curve, WindDirectionEncoding, WIND_VANE_RAW_MAX,
};
use super::measurement::Measurement;
use super::registry::{ChannelBinding, SensorRole};
use crate::config::{CalibrationConfig, Config};
use crate::error::{MeteostickError, Result};
use crate::protocol::packet::Packet;

/// Field name reported when a raw vane reading is out of range
pub const RAW_WIND_DIRECTION_FIELD: &str = "windDir (raw)";

/// Physical envelope `(min, max)` per quantity
pub mod envelope {
    pub const AIR_TEMPERATURE_C: (f64, f64) = (-40.0, 65.0);
    pub const SOIL_TEMPERATURE_C: (f64, f64) = (-40.0, 65.0);
    pub const HUMIDITY_PCT: (f64, f64) = (0.0, 100.0);
    pub const WIND_SPEED_MS: (f64, f64) = (0.0, 80.0);
    pub const WIND_DIRECTION_DEG: (f64, f64) = (0.0, 360.0);
    pub const RADIATION_WM2: (f64, f64) = (0.0, 1800.0);
    pub const UV_INDEX: (f64, f64) = (0.0, 16.0);
    pub const SOLAR_POWER: (f64, f64) = (0.0, 100.0);
    pub const LEAF_WETNESS: (f64, f64) = (0.0, 15.0);
    pub const SOIL_MOISTURE_CBAR: (f64, f64) = (0.0, 200.0);
    pub const INDOOR_TEMPERATURE_C: (f64, f64) = (-20.0, 60.0);
    pub const PRESSURE_HPA: (f64, f64) = (500.0, 1100.0);
}

/// Calibrated output of one packet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub values: Vec<(Measurement, f64)>,
    /// Raw rain tip counter, for the accumulator
    pub rain_counter: Option<u32>,
}

impl Decoded {
    fn values(values: Vec<(Measurement, f64)>) -> Self {
        Self {
            values,
            rain_counter: None,
        }
    }

    pub fn value(&self, measurement: Measurement) -> Option<f64> {
        self.values
            .iter()
            .find(|(m, _)| *m == measurement)
            .map(|(_, v)| *v)
    }
}

/// Stateless packet decoder holding the configured calibration
#[derive(Debug, Clone)]
pub struct Decoder {
    calibration: CalibrationConfig,
    wind_direction: WindDirectionEncoding,
    rain_modulus: u32,
}

impl Decoder {
    pub fn new(config: &Config) -> Self {
        Self {
            calibration: config.calibration.clone(),
            wind_direction: config.station.wind_direction,
            rain_modulus: config.accumulator.rain_modulus,
        }
    }

    /// Decode a transmitter packet received on a bound channel.
    ///
    /// # Errors
    ///
    /// - `RoleMismatch` if the binding's role never sends this packet kind
    /// - `OutOfRangeValue` if any calibrated value falls outside its envelope
    pub fn decode(&self, packet: &Packet, binding: &ChannelBinding) -> Result<Decoded> {
        let kind = packet.kind();
        if !binding.role.accepts(kind) {
            return Err(MeteostickError::RoleMismatch {
                channel: binding.channel.number(),
                role: binding.role.to_string(),
                packet: kind.name(),
            });
        }

        match *packet {
            Packet::Wind { speed, direction } => self.decode_wind(speed, direction),
            Packet::TempHum { temperature, humidity } => {
                self.decode_temp_hum(binding.role, temperature, humidity)
            }
            Packet::LeafWetness { probe, value } => decode_probe(
                &binding.curves.leaf_wetness,
                "leafWet",
                Measurement::LeafWet(probe),
                value,
                envelope::LEAF_WETNESS,
            ),
            Packet::SoilMoisture { probe, value } => decode_probe(
                &binding.curves.soil_moisture,
                "soilMoist",
                Measurement::SoilMoist(probe),
                value,
                envelope::SOIL_MOISTURE_CBAR,
            ),
            Packet::SoilTemp { probe, value } => {
                let celsius = self.calibration.probe_temperature.apply(value);
                within("soilTemp", celsius, envelope::SOIL_TEMPERATURE_C)?;
                Ok(Decoded::values(vec![(Measurement::SoilTemp(probe), celsius)]))
            }
            Packet::Rain { counter } => self.decode_rain(counter),
            Packet::Solar { radiation } => {
                let value = self.calibration.radiation.apply(radiation);
                within("radiation", value, envelope::RADIATION_WM2)?;
                Ok(Decoded::values(vec![(Measurement::Radiation, value)]))
            }
            Packet::Uv { index } => {
                let value = self.calibration.uv.apply(index);
                within("UV", value, envelope::UV_INDEX)?;
                Ok(Decoded::values(vec![(Measurement::Uv, value)]))
            }
            Packet::SolarPower { charge } => {
                within("solarPower", charge, envelope::SOLAR_POWER)?;
                Ok(Decoded::values(vec![(Measurement::SolarPower, charge)]))
            }
            Packet::Barometer { .. } | Packet::Status(_) => Err(MeteostickError::RoleMismatch {
                channel: binding.channel.number(),
                role: binding.role.to_string(),
                packet: kind.name(),
            }),
        }
    }

    /// Decode the stick's own barometer line.
    ///
    /// # Errors
    ///
    /// `OutOfRangeValue` if the indoor temperature or pressure is implausible
    pub fn decode_barometer(&self, temperature: f64, pressure: f64) -> Result<Decoded> {
        within("inTemp", temperature, envelope::INDOOR_TEMPERATURE_C)?;
        within("pressure", pressure, envelope::PRESSURE_HPA)?;
        Ok(Decoded::values(vec![
            (Measurement::InTemp, temperature),
            (Measurement::Pressure, pressure),
        ]))
    }

    fn decode_wind(&self, speed: f64, direction: f64) -> Result<Decoded> {
        within("windSpeed", speed, envelope::WIND_SPEED_MS)?;

        let degrees = match self.wind_direction {
            WindDirectionEncoding::Raw => {
                within(RAW_WIND_DIRECTION_FIELD, direction, (0.0, WIND_VANE_RAW_MAX))?;
                wind_direction_from_raw(direction)
            }
            WindDirectionEncoding::Degrees => direction,
        };
        within("windDir", degrees, envelope::WIND_DIRECTION_DEG)?;

        Ok(Decoded::values(vec![
            (Measurement::WindSpeed, speed),
            (Measurement::WindDir, degrees),
        ]))
    }

    fn decode_temp_hum(
        &self,
        role: SensorRole,
        temperature: f64,
        humidity: f64,
    ) -> Result<Decoded> {
        let (temp_field, humid_field) = match role {
            SensorRole::TempHum1 => (Measurement::ExtraTemp(1), Measurement::ExtraHumid(1)),
            SensorRole::TempHum2 => (Measurement::ExtraTemp(2), Measurement::ExtraHumid(2)),
            _ => (Measurement::OutTemp, Measurement::OutHumidity),
        };

        let celsius = self.calibration.iss_temperature.apply(temperature);
        within(static_name(temp_field), celsius, envelope::AIR_TEMPERATURE_C)?;

        let relative = self.calibration.humidity.apply(humidity);
        within(static_name(humid_field), relative, envelope::HUMIDITY_PCT)?;

        Ok(Decoded::values(vec![(temp_field, celsius), (humid_field, relative)]))
    }

    fn decode_rain(&self, counter: u32) -> Result<Decoded> {
        if counter >= self.rain_modulus {
            return Err(MeteostickError::OutOfRangeValue {
                field: "rain counter",
                value: counter as f64,
                min: 0.0,
                max: (self.rain_modulus - 1) as f64,
            });
        }
        Ok(Decoded {
            values: Vec::new(),
            rain_counter: Some(counter),
        })
    }
}

fn decode_probe(
    curve: &Curve,
    field: &'static str,
    measurement: Measurement,
    raw: f64,
    bounds: (f64, f64),
) -> Result<Decoded> {
    let value = curve.apply(raw).ok_or_else(|| {
        let points = curve.points();
        MeteostickError::OutOfRangeValue {
            field,
            value: raw,
            min: points.first().map(|p| p.0).unwrap_or_default(),
            max: points.last().map(|p| p.0).unwrap_or_default(),
        }
    })?;
    within(field, value, bounds)?;
    Ok(Decoded::values(vec![(measurement, value)]))
}

fn within(field: &'static str, value: f64, (min, max): (f64, f64)) -> Result<f64> {
    if value < min || value > max || !value.is_finite() {
        return Err(MeteostickError::OutOfRangeValue { field, value, min, max });
    }
    Ok(value)
}

fn static_name(measurement: Measurement) -> &'static str {
    match measurement {
        Measurement::OutTemp => "outTemp",
        Measurement::OutHumidity => "outHumidity",
        Measurement::ExtraTemp(_) => "extraTemp",
        Measurement::ExtraHumid(_) => "extraHumid",
        _ => "value",
    }
}
