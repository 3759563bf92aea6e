//! # Channel Registry
//!
//! Maps each of the eight radio channels to a configured sensor role and
//! owns the per-channel state arena.
//!
//! ## Roles
//!
//! | Role | Transmits |
//! |------|-----------|
//! | ISS | wind, temperature/humidity, rain, solar, UV, solar power |
//! | Anemometer kit | wind |
//! | Leaf & soil station | leaf wetness, soil moisture, soil temperature |
//! | Temp/humidity station 1, 2 | temperature/humidity |
//!
//! Bindings are fixed at startup; rebinding requires a restart.

use std::fmt;

use serde::Deserialize;

use super::calibration::Curve;
use super::clock::Timestamp;
use super::measurement::Measurement;
use super::state::ChannelState;
use crate::config::Config;
use crate::error::{MeteostickError, Result};
use crate::protocol::packet::{Channel, PacketKind, MAX_CHANNELS};

/// Sensor role a transmitter channel plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorRole {
    /// Integrated sensor suite
    Iss,
    /// Anemometer transmitter kit
    Anemometer,
    /// Leaf & soil moisture/temperature station
    LeafSoil,
    /// First extra temperature/humidity station
    #[serde(rename = "temp_hum_1")]
    TempHum1,
    /// Second extra temperature/humidity station
    #[serde(rename = "temp_hum_2")]
    TempHum2,
}

impl SensorRole {
    pub fn name(self) -> &'static str {
        match self {
            SensorRole::Iss => "iss",
            SensorRole::Anemometer => "anemometer",
            SensorRole::LeafSoil => "leaf_soil",
            SensorRole::TempHum1 => "temp_hum_1",
            SensorRole::TempHum2 => "temp_hum_2",
        }
    }

    /// Whether a transmitter in this role sends packets of `kind`
    pub fn accepts(self, kind: PacketKind) -> bool {
        use PacketKind::*;
        match self {
            SensorRole::Iss => matches!(kind, Wind | TempHum | Rain | Solar | Uv | SolarPower),
            SensorRole::Anemometer => kind == Wind,
            SensorRole::LeafSoil => matches!(kind, LeafWetness | SoilMoisture | SoilTemp),
            SensorRole::TempHum1 | SensorRole::TempHum2 => kind == TempHum,
        }
    }

    /// Record fields this role contributes, present as "no value" when silent
    pub fn expected_fields(self) -> Vec<Measurement> {
        match self {
            SensorRole::Iss => vec![
                Measurement::OutTemp,
                Measurement::OutHumidity,
                Measurement::WindSpeed,
                Measurement::WindDir,
                Measurement::Radiation,
                Measurement::Uv,
                Measurement::SolarPower,
            ],
            SensorRole::Anemometer => vec![Measurement::WindSpeed, Measurement::WindDir],
            SensorRole::LeafSoil => {
                let mut fields = vec![Measurement::LeafWet(1), Measurement::LeafWet(2)];
                fields.extend((1..=4).map(Measurement::SoilMoist));
                fields.extend((1..=4).map(Measurement::SoilTemp));
                fields
            }
            SensorRole::TempHum1 => vec![Measurement::ExtraTemp(1), Measurement::ExtraHumid(1)],
            SensorRole::TempHum2 => vec![Measurement::ExtraTemp(2), Measurement::ExtraHumid(2)],
        }
    }
}

impl fmt::Display for SensorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Calibration curves for the probes of a leaf & soil station
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeCurves {
    pub soil_moisture: Curve,
    pub leaf_wetness: Curve,
}

impl Default for ProbeCurves {
    fn default() -> Self {
        Self {
            soil_moisture: Curve::identity(200.0),
            leaf_wetness: Curve::identity(15.0),
        }
    }
}

/// Immutable configuration of one channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBinding {
    pub channel: Channel,
    pub role: SensorRole,
    pub repeater: bool,
    pub curves: ProbeCurves,
}

impl ChannelBinding {
    pub fn new(channel: Channel, role: SensorRole) -> Self {
        Self {
            channel,
            role,
            repeater: false,
            curves: ProbeCurves::default(),
        }
    }

    pub fn transmitter_id(&self) -> u8 {
        self.channel.transmitter_id()
    }
}

/// Channel-indexed arena of bindings and runtime state.
#[derive(Debug)]
pub struct ChannelRegistry {
    bindings: [Option<ChannelBinding>; MAX_CHANNELS],
    states: [ChannelState; MAX_CHANNELS],
}

impl ChannelRegistry {
    /// Builds the registry from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` errors for channel numbers outside 1-8 or invalid
    /// probe curves.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut bindings: [Option<ChannelBinding>; MAX_CHANNELS] = Default::default();

        for entry in &config.channels {
            let channel = Channel::new(entry.channel).ok_or_else(|| {
                config_error(format!("channel {} is out of bounds (must be 1-8)", entry.channel))
            })?;
            let curves = ProbeCurves {
                soil_moisture: entry.soil_moisture_curve().map_err(config_error)?,
                leaf_wetness: entry.leaf_wetness_curve().map_err(config_error)?,
            };
            bindings[channel.index()] = Some(ChannelBinding {
                channel,
                role: entry.role,
                repeater: entry.repeater,
                curves,
            });
        }

        let states = std::array::from_fn(|_| ChannelState::new(&config.accumulator));
        Ok(Self { bindings, states })
    }

    /// Role bound to `channel`.
    ///
    /// # Errors
    ///
    /// `UnboundChannel` if no role is configured for it.
    pub fn role_for(&self, channel: Channel) -> Result<SensorRole> {
        self.binding(channel).map(|b| b.role)
    }

    /// Binding of `channel`.
    ///
    /// # Errors
    ///
    /// `UnboundChannel` if no role is configured for it.
    pub fn binding(&self, channel: Channel) -> Result<&ChannelBinding> {
        self.bindings[channel.index()]
            .as_ref()
            .ok_or(MeteostickError::UnboundChannel(channel.number()))
    }

    /// Records liveness of a bound channel.
    ///
    /// # Errors
    ///
    /// `UnboundChannel` if no role is configured for it.
    pub fn touch(
        &mut self,
        channel: Channel,
        at: Timestamp,
        battery_low: bool,
        signal: Option<f64>,
    ) -> Result<()> {
        self.binding(channel)?;
        self.states[channel.index()].touch(at, battery_low, signal);
        Ok(())
    }

    /// Bound channels in ascending channel order
    pub fn bindings(&self) -> impl Iterator<Item = &ChannelBinding> {
        self.bindings.iter().flatten()
    }

    /// Binding for a role, if any
    pub fn channel_for(&self, role: SensorRole) -> Option<&ChannelBinding> {
        self.bindings().find(|b| b.role == role)
    }

    pub fn state(&self, channel: Channel) -> &ChannelState {
        &self.states[channel.index()]
    }

    pub fn state_mut(&mut self, channel: Channel) -> &mut ChannelState {
        &mut self.states[channel.index()]
    }

    /// Bitmask of bound transmitters, bit `n - 1` for channel `n`
    pub fn transmitter_mask(&self) -> u8 {
        self.bindings()
            .fold(0u8, |mask, b| mask | (1 << b.channel.transmitter_id()))
    }
}

fn config_error(message: impl fmt::Display) -> MeteostickError {
    use serde::de::Error;
    MeteostickError::Config(toml::de::Error::custom(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;

    fn config_with(channels: Vec<(u8, SensorRole)>) -> Config {
        let mut config = Config::default();
        config.channels = channels
            .into_iter()
            .map(|(channel, role)| ChannelConfig {
                channel,
                role,
                repeater: false,
                soil_moisture_curve: None,
                leaf_wetness_curve: None,
            })
            .collect();
        config
    }

    fn ch(n: u8) -> Channel {
        Channel::new(n).unwrap()
    }

    #[test]
    fn test_role_lookup() {
        let config = config_with(vec![(1, SensorRole::Iss), (4, SensorRole::LeafSoil)]);
        let registry = ChannelRegistry::from_config(&config).unwrap();
        assert_eq!(registry.role_for(ch(1)).unwrap(), SensorRole::Iss);
        assert_eq!(registry.role_for(ch(4)).unwrap(), SensorRole::LeafSoil);
        assert!(matches!(
            registry.role_for(ch(2)),
            Err(MeteostickError::UnboundChannel(2))
        ));
    }

    #[test]
    fn test_touch_unbound_channel() {
        let config = config_with(vec![(1, SensorRole::Iss)]);
        let mut registry = ChannelRegistry::from_config(&config).unwrap();
        let result = registry.touch(ch(5), Timestamp::now(), false, None);
        assert!(matches!(result, Err(MeteostickError::UnboundChannel(5))));
        assert_eq!(registry.state(ch(5)).packets_received(), 0);
    }

    #[test]
    fn test_touch_records_liveness() {
        let config = config_with(vec![(1, SensorRole::Iss)]);
        let mut registry = ChannelRegistry::from_config(&config).unwrap();
        let now = Timestamp::now();
        registry.touch(ch(1), now, true, Some(-60.0)).unwrap();
        assert_eq!(registry.state(ch(1)).last_seen(), Some(now));
        assert!(registry.state(ch(1)).battery_low());
    }

    #[test]
    fn test_transmitter_mask() {
        let registry = ChannelRegistry::from_config(&config_with(vec![
            (1, SensorRole::Iss),
            (2, SensorRole::Anemometer),
            (8, SensorRole::TempHum1),
        ]))
        .unwrap();
        assert_eq!(registry.transmitter_mask(), 0b1000_0011);
    }

    #[test]
    fn test_bindings_in_channel_order() {
        let registry = ChannelRegistry::from_config(&config_with(vec![
            (6, SensorRole::Anemometer),
            (2, SensorRole::Iss),
        ]))
        .unwrap();
        let channels: Vec<u8> = registry.bindings().map(|b| b.channel.number()).collect();
        assert_eq!(channels, vec![2, 6]);
        assert_eq!(registry.channel_for(SensorRole::Anemometer).unwrap().channel, ch(6));
    }

    #[test]
    fn test_role_accepts() {
        assert!(SensorRole::Iss.accepts(PacketKind::Rain));
        assert!(!SensorRole::Iss.accepts(PacketKind::SoilMoisture));
        assert!(SensorRole::Anemometer.accepts(PacketKind::Wind));
        assert!(!SensorRole::Anemometer.accepts(PacketKind::TempHum));
        assert!(SensorRole::LeafSoil.accepts(PacketKind::LeafWetness));
        assert!(SensorRole::TempHum2.accepts(PacketKind::TempHum));
        assert!(!SensorRole::TempHum2.accepts(PacketKind::Barometer));
    }

    #[test]
    fn test_expected_fields() {
        assert_eq!(SensorRole::LeafSoil.expected_fields().len(), 10);
        assert_eq!(
            SensorRole::TempHum2.expected_fields(),
            vec![Measurement::ExtraTemp(2), Measurement::ExtraHumid(2)]
        );
    }
}
