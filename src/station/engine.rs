//! # Station Engine
//!
//! Glues the pipeline together:
//!
//! ```text
//! RawLine -> parse_line -> registry lookup -> Decoder -> accumulators -> ChannelState
//!                                                                          |
//!                                               tick(now) -> Assembler -> ObservationRecord
//! ```
//!
//! Every per-packet failure is local: the line is counted, logged and
//! dropped, and no channel state is touched. Conditions that would repeat on
//! every packet (unbound channel, role mismatch) are warned about once.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, trace, warn};

use super::assembler::Assembler;
use super::clock::Timestamp;
use super::decoder::{Decoder, RAW_WIND_DIRECTION_FIELD};
use super::measurement::Measurement;
use super::registry::ChannelRegistry;
use super::state::ChannelState;
use super::status::{StatusHandler, StickStatus};
use crate::config::Config;
use crate::error::{MeteostickError, Result};
use crate::protocol::packet::{Packet, ParsedPacket, RawLine, MAX_CHANNELS};
use crate::protocol::parse_line;
use crate::record::ObservationRecord;

/// Line and discard counters since startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub lines: u64,
    pub decoded: u64,
    pub status_lines: u64,
    pub malformed: u64,
    pub unknown: u64,
    pub unbound: u64,
    pub role_mismatch: u64,
    pub out_of_range: u64,
    pub implausible: u64,
    pub bucket_mismatch: u64,
    pub ticks: u64,
}

impl PipelineStats {
    /// Lines that produced no state change
    pub fn discarded(&self) -> u64 {
        self.malformed
            + self.unknown
            + self.unbound
            + self.role_mismatch
            + self.out_of_range
            + self.implausible
    }

    fn count(&mut self, error: &MeteostickError) {
        match error {
            MeteostickError::MalformedPacket(_) => self.malformed += 1,
            MeteostickError::UnknownPacketType(_) => self.unknown += 1,
            MeteostickError::UnboundChannel(_) => self.unbound += 1,
            MeteostickError::RoleMismatch { .. } => self.role_mismatch += 1,
            MeteostickError::OutOfRangeValue { .. } => self.out_of_range += 1,
            MeteostickError::ImplausibleCounterJump { .. } => self.implausible += 1,
            MeteostickError::BucketMismatch { .. } => self.bucket_mismatch += 1,
            _ => {}
        }
    }
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lines={} decoded={} status={} malformed={} unknown={} unbound={} \
             role_mismatch={} out_of_range={} implausible={} ticks={}",
            self.lines,
            self.decoded,
            self.status_lines,
            self.malformed,
            self.unknown,
            self.unbound,
            self.role_mismatch,
            self.out_of_range,
            self.implausible,
            self.ticks
        )
    }
}

#[derive(Debug)]
pub struct Engine {
    registry: ChannelRegistry,
    stick: ChannelState,
    decoder: Decoder,
    assembler: Assembler,
    status: StatusHandler,
    stats: PipelineStats,
    warned_unbound: [bool; MAX_CHANNELS],
    warned_mismatch: HashSet<(u8, &'static str)>,
    warned_raw_direction: bool,
}

impl Engine {
    /// Builds the engine from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` errors for invalid channel bindings.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            registry: ChannelRegistry::from_config(config)?,
            stick: ChannelState::new(&config.accumulator),
            decoder: Decoder::new(config),
            assembler: Assembler::new(config),
            status: StatusHandler::new(config.station.rain_bucket),
            stats: PipelineStats::default(),
            warned_unbound: [false; MAX_CHANNELS],
            warned_mismatch: HashSet::new(),
            warned_raw_direction: false,
        })
    }

    /// Feeds one line through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the per-packet error that caused the line to be dropped. All
    /// of them are packet-local; the caller only needs to keep going.
    pub fn ingest(&mut self, line: &RawLine) -> Result<()> {
        self.stats.lines += 1;
        let result = self.process(line);
        match &result {
            Ok(()) => self.stats.decoded += 1,
            Err(e) => {
                self.stats.count(e);
                self.report_discard(e, line);
            }
        }
        result
    }

    /// Assembles the observation record for the tick at `now`.
    pub fn tick(&mut self, now: Timestamp) -> ObservationRecord {
        self.stats.ticks += 1;
        let bucket = self.status.effective_bucket();
        self.assembler.assemble(&self.registry, &self.stick, bucket, now)
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn stick_status(&self) -> &StickStatus {
        self.status.status()
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// State of the stick's own barometer and thermometer
    pub fn stick_state(&self) -> &ChannelState {
        &self.stick
    }

    fn process(&mut self, line: &RawLine) -> Result<()> {
        let parsed = parse_line(&line.text)?;
        trace!("Parsed {:?}", parsed);

        match parsed.packet {
            Packet::Status(ref status) => {
                self.stats.status_lines += 1;
                self.status.apply(status)
            }
            Packet::Barometer { temperature, pressure } => {
                let decoded = self.decoder.decode_barometer(temperature, pressure)?;
                self.stick.touch(line.received_at, false, None);
                self.stick.record(decoded.values);
                Ok(())
            }
            _ => self.process_sensor(&parsed, line.received_at),
        }
    }

    fn process_sensor(&mut self, parsed: &ParsedPacket, at: Timestamp) -> Result<()> {
        let channel = parsed.channel.ok_or_else(|| {
            MeteostickError::MalformedPacket(format!("{} packet without channel", parsed.kind()))
        })?;

        let binding = self.registry.binding(channel)?;
        let decoded = self.decoder.decode(&parsed.packet, binding)?;

        let state = self.registry.state_mut(channel);
        if let Some(counter) = decoded.rain_counter {
            let tips = state.rain_mut().observe(counter)?;
            if tips > 0 {
                debug!("Channel {}: {} rain tip(s), counter {}", channel, tips, counter);
            }
        }
        if let Some(speed) = decoded.value(Measurement::WindSpeed) {
            state.wind_run_mut().observe(at, speed);
        }

        self.registry.touch(channel, at, parsed.battery_low, parsed.signal)?;
        debug!("Channel {}: {:?}", channel, decoded.values);
        self.registry.state_mut(channel).record(decoded.values);
        Ok(())
    }

    fn report_discard(&mut self, error: &MeteostickError, line: &RawLine) {
        match error {
            MeteostickError::UnknownPacketType(_) => {
                trace!("Ignored line '{}'", line.text.trim_end());
            }
            MeteostickError::MalformedPacket(_) => {
                debug!("Dropped line '{}': {}", line.text.trim_end(), error);
            }
            MeteostickError::UnboundChannel(channel) => {
                let slot = usize::from(channel.saturating_sub(1)).min(MAX_CHANNELS - 1);
                if !self.warned_unbound[slot] {
                    self.warned_unbound[slot] = true;
                    warn!(
                        "Receiving packets on channel {} which has no configured role; \
                         ignoring them",
                        channel
                    );
                } else {
                    debug!("{}", error);
                }
            }
            MeteostickError::RoleMismatch { channel, packet, .. } => {
                if self.warned_mismatch.insert((*channel, *packet)) {
                    warn!("{}; ignoring them", error);
                } else {
                    debug!("{}", error);
                }
            }
            MeteostickError::BucketMismatch { .. } => {
                warn!("{}; keeping the configured bucket", error);
            }
            MeteostickError::OutOfRangeValue { field: RAW_WIND_DIRECTION_FIELD, value, .. }
                if !self.warned_raw_direction =>
            {
                self.warned_raw_direction = true;
                warn!(
                    "Wind direction {} does not fit a raw vane reading (0-255); if the stick \
                     reports degrees, set station.wind_direction = \"degrees\"",
                    value
                );
            }
            _ => {
                warn!("Dropped line '{}': {}", line.text.trim_end(), error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use crate::protocol::packet::Channel;
    use crate::station::registry::SensorRole;
    use crate::units::RainBucket;
    use std::time::Duration;

    fn engine_with(channels: &[(u8, SensorRole)]) -> Engine {
        let mut config = Config::default();
        config.channels = channels
            .iter()
            .map(|&(channel, role)| ChannelConfig {
                channel,
                role,
                repeater: false,
                soil_moisture_curve: None,
                leaf_wetness_curve: None,
            })
            .collect();
        Engine::new(&config).unwrap()
    }

    fn line(text: &str, at: Timestamp) -> RawLine {
        RawLine::new(text, at)
    }

    fn ch(n: u8) -> Channel {
        Channel::new(n).unwrap()
    }

    #[test]
    fn test_sensor_packet_updates_state() {
        let mut engine = engine_with(&[(1, SensorRole::Iss)]);
        let now = Timestamp::now();
        engine.ingest(&line("T 1 21.4 55 -62", now)).unwrap();

        let state = engine.registry().state(ch(1));
        assert_eq!(state.value(Measurement::OutTemp), Some(21.4));
        assert_eq!(state.value(Measurement::OutHumidity), Some(55.0));
        assert_eq!(state.signal(), Some(-62.0));
        assert_eq!(state.last_seen(), Some(now));
        assert_eq!(engine.stats().decoded, 1);
    }

    #[test]
    fn test_battery_flag() {
        let mut engine = engine_with(&[(1, SensorRole::Iss)]);
        engine.ingest(&line("W 1 2.5 100 -70 L", Timestamp::now())).unwrap();
        assert!(engine.registry().state(ch(1)).battery_low());
    }

    #[test]
    fn test_unbound_channel_is_ignored() {
        let mut engine = engine_with(&[(1, SensorRole::Iss)]);
        let now = Timestamp::now();
        for _ in 0..3 {
            let result = engine.ingest(&line("T 3 21.4 55 -62", now));
            assert!(matches!(result, Err(MeteostickError::UnboundChannel(3))));
        }
        assert_eq!(engine.registry().state(ch(3)).packets_received(), 0);
        assert_eq!(engine.stats().unbound, 3);
    }

    #[test]
    fn test_role_mismatch_is_ignored() {
        let mut engine = engine_with(&[(1, SensorRole::Iss), (2, SensorRole::Anemometer)]);
        let result = engine.ingest(&line("R 2 17 -60", Timestamp::now()));
        assert!(matches!(result, Err(MeteostickError::RoleMismatch { channel: 2, .. })));
        assert_eq!(engine.registry().state(ch(2)).packets_received(), 0);
        assert_eq!(engine.stats().role_mismatch, 1);
    }

    #[test]
    fn test_out_of_range_leaves_state_untouched() {
        let mut engine = engine_with(&[(1, SensorRole::Iss)]);
        let now = Timestamp::now();
        engine.ingest(&line("T 1 20.0 50 -60", now)).unwrap();

        let later = now.advanced_by(Duration::from_secs(5));
        assert!(engine.ingest(&line("T 1 20.0 140 -60", later)).is_err());

        let state = engine.registry().state(ch(1));
        assert_eq!(state.value(Measurement::OutHumidity), Some(50.0));
        assert_eq!(state.last_seen(), Some(now));
        assert_eq!(engine.stats().out_of_range, 1);
    }

    #[test]
    fn test_degree_directions_in_raw_mode_are_flagged_once() {
        let mut engine = engine_with(&[(1, SensorRole::Iss)]);
        let now = Timestamp::now();
        assert!(!engine.warned_raw_direction);

        for direction in [276, 300] {
            let result = engine.ingest(&line(&format!("W 1 2.0 {} -60", direction), now));
            assert!(matches!(
                result,
                Err(MeteostickError::OutOfRangeValue { field: RAW_WIND_DIRECTION_FIELD, .. })
            ));
        }
        assert!(engine.warned_raw_direction);
        assert_eq!(engine.registry().state(ch(1)).value(Measurement::WindSpeed), None);
        assert_eq!(engine.stats().out_of_range, 2);
    }

    #[test]
    fn test_implausible_rain_discards_packet() {
        let mut engine = engine_with(&[(1, SensorRole::Iss)]);
        let now = Timestamp::now();
        engine.ingest(&line("R 1 10 -60", now)).unwrap();
        let result = engine.ingest(&line("R 1 200 -60", now.advanced_by(Duration::from_secs(3))));
        assert!(matches!(result, Err(MeteostickError::ImplausibleCounterJump { .. })));

        let state = engine.registry().state(ch(1));
        assert_eq!(state.rain().last_value(), Some(10));
        assert_eq!(state.packets_received(), 1);
    }

    #[test]
    fn test_barometer_updates_stick() {
        let mut engine = engine_with(&[(1, SensorRole::Iss)]);
        engine.ingest(&line("B 22.5 1011.3", Timestamp::now())).unwrap();
        assert_eq!(engine.stick_state().value(Measurement::Pressure), Some(1011.3));
        assert_eq!(engine.stick_state().value(Measurement::InTemp), Some(22.5));
    }

    #[test]
    fn test_status_lines() {
        let mut engine = engine_with(&[(1, SensorRole::Iss)]);
        let now = Timestamp::now();
        engine.ingest(&line("# MeteoStick Version 3.2.3", now)).unwrap();
        engine.ingest(&line("# Hop 4", now)).unwrap();
        let result = engine.ingest(&line("# Rain bucket 0.2mm", now));
        assert!(matches!(result, Err(MeteostickError::BucketMismatch { .. })));
        assert!(engine.ingest(&line("# Rain bucket 0.2mm", now)).is_ok());

        let status = engine.stick_status();
        assert_eq!(status.firmware.as_deref(), Some("3.2.3"));
        assert_eq!(status.hop, Some(4));
        assert_eq!(status.reported_bucket, Some(RainBucket::Metric));
        assert_eq!(engine.stats().status_lines, 4);
        assert_eq!(engine.stats().bucket_mismatch, 1);
    }

    #[test]
    fn test_rain_uses_configured_bucket_after_mismatch() {
        let mut engine = engine_with(&[(1, SensorRole::Iss)]);
        let now = Timestamp::now();
        engine.ingest(&line("R 1 10 -60", now)).unwrap();
        engine.tick(now);

        assert!(engine.ingest(&line("# Rain bucket 0.2mm", now)).is_err());
        let later = now.advanced_by(Duration::from_secs(3));
        engine.ingest(&line("R 1 12 -60", later)).unwrap();

        // Two imperial tips (0.01 in) in millimetres
        let rain = engine.tick(later).get("rain").unwrap();
        assert!((rain - 0.508).abs() < 1e-9, "rain was {}", rain);
    }

    #[test]
    fn test_banner_lines_are_unknown() {
        let mut engine = engine_with(&[(1, SensorRole::Iss)]);
        let now = Timestamp::now();
        assert!(engine.ingest(&line("# Smartbedded banner", now)).is_err());
        assert!(engine.ingest(&line("", now)).is_err());
        assert!(engine.ingest(&line("?", now)).is_err());
        assert_eq!(engine.stats().unknown, 3);
        assert_eq!(engine.stats().discarded(), 3);
    }

    #[test]
    fn test_wind_feeds_wind_run() {
        let mut engine = engine_with(&[(1, SensorRole::Iss)]);
        let now = Timestamp::now();
        engine.ingest(&line("W 1 4.0 128 -60", now)).unwrap();
        engine
            .ingest(&line("W 1 4.0 128 -60", now.advanced_by(Duration::from_secs(10))))
            .unwrap();
        let meters = engine.registry().state(ch(1)).wind_run().total_meters();
        assert!((meters - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_tick_counts() {
        let mut engine = engine_with(&[(1, SensorRole::Iss)]);
        let record = engine.tick(Timestamp::now());
        assert!(record.is_empty());
        assert_eq!(engine.stats().ticks, 1);
    }
}
