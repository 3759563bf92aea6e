//! # Observation Assembler
//!
//! Builds one [`ObservationRecord`] per tick from the channel states. The
//! assembler never mutates channel state; what it does own are reporting
//! cursors so cumulative totals turn into per-tick increments:
//!
//! - `rain`: tips accumulated since the previous tick on which the ISS was
//!   fresh, times the configured tip size
//! - `windrun`: distance integrated since the previous fresh tick of the
//!   channel supplying wind
//!
//! A stale channel keeps its cursor, so rain that fell while it was silent
//! is reported on the first tick after it reappears.
//!
//! Wind comes from the anemometer kit when it is bound and fresh, otherwise
//! from the ISS.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, info};

use super::clock::Timestamp;
use super::measurement::Measurement;
use super::registry::{ChannelBinding, ChannelRegistry, SensorRole};
use super::state::ChannelState;
use crate::config::{Config, StalenessConfig};
use crate::protocol::packet::{Channel, MAX_CHANNELS};
use crate::record::{ChannelHealth, ObservationRecord};
use crate::units::{RainBucket, UnitSystem};

/// Trailing window for the reception quality estimate
pub const RX_CHECK_WINDOW: Duration = Duration::from_secs(60);

/// Davis transmit period for a transmitter id: `(41 + id) / 16` seconds
pub fn transmit_period(transmitter_id: u8) -> Duration {
    Duration::from_secs_f64((41.0 + f64::from(transmitter_id)) / 16.0)
}

#[derive(Debug)]
pub struct Assembler {
    staleness: StalenessConfig,
    units: UnitSystem,
    rain_cursors: [u64; MAX_CHANNELS],
    wind_run_cursors: [f64; MAX_CHANNELS],
    /// Per channel `(tick time, packets received)` samples within the rx window
    rx_history: [VecDeque<(Timestamp, u64)>; MAX_CHANNELS],
    last_health: [Option<ChannelHealth>; MAX_CHANNELS],
}

impl Assembler {
    pub fn new(config: &Config) -> Self {
        let units = config.output.units;
        Self {
            staleness: config.staleness.clone(),
            units,
            rain_cursors: [0; MAX_CHANNELS],
            wind_run_cursors: [0.0; MAX_CHANNELS],
            rx_history: Default::default(),
            last_health: [None; MAX_CHANNELS],
        }
    }

    /// Assembles the record for the tick at `now`.
    ///
    /// `stick` is the state of the stick's own barometer and thermometer;
    /// `bucket` converts rain tips to depth.
    pub fn assemble(
        &mut self,
        registry: &ChannelRegistry,
        stick: &ChannelState,
        bucket: RainBucket,
        now: Timestamp,
    ) -> ObservationRecord {
        let mut record = ObservationRecord::new(now.epoch_seconds(), self.units.code());

        // Anemometer last so its fresh wind values replace the ISS's
        let mut bindings: Vec<&ChannelBinding> = registry.bindings().collect();
        bindings.sort_by_key(|b| b.role == SensorRole::Anemometer);

        let mut wind_source: Option<Channel> = None;

        for binding in bindings {
            let state = registry.state(binding.channel);
            let health = health_of(state, &now, self.staleness.for_role(binding.role));
            self.note_health(binding, health);
            record.channel_health.insert(binding.channel.number(), health);
            let fresh = health.is_fresh();

            for measurement in binding.role.expected_fields() {
                let value = if fresh {
                    state.value(measurement).map(|v| measurement.convert(v, self.units))
                } else {
                    None
                };
                let name = measurement.field_name();
                if value.is_some() || !record.has_field(&name) {
                    record.set(name, value);
                }
            }

            if fresh && matches!(binding.role, SensorRole::Iss | SensorRole::Anemometer) {
                wind_source = Some(binding.channel);
            }

            self.add_channel_aux(&mut record, binding, state, fresh, now);
        }

        if let Some(iss) = registry.channel_for(SensorRole::Iss) {
            let rain = if record.health(iss.channel.number()).is_some_and(ChannelHealth::is_fresh) {
                let tips = self.tips_since_last_tick(iss.channel, registry.state(iss.channel));
                Some(tips as f64 * bucket.tip_size(self.units))
            } else {
                None
            };
            record.set("rain", rain);
        }

        self.add_wind_run(&mut record, registry, wind_source);
        self.add_stick(&mut record, stick, &now);

        debug!(
            "Assembled record at {} ({} fields, wind from {:?})",
            record.timestamp,
            record.fields.len(),
            wind_source.map(Channel::number)
        );
        record
    }

    fn tips_since_last_tick(&mut self, channel: Channel, state: &ChannelState) -> u64 {
        let total = state.rain().total();
        let cursor = &mut self.rain_cursors[channel.index()];
        let tips = total.saturating_sub(*cursor);
        *cursor = total;
        tips
    }

    fn add_wind_run(
        &mut self,
        record: &mut ObservationRecord,
        registry: &ChannelRegistry,
        source: Option<Channel>,
    ) {
        let mut any_wind_role = false;
        let mut reported = None;

        for binding in registry.bindings() {
            if !matches!(binding.role, SensorRole::Iss | SensorRole::Anemometer) {
                continue;
            }
            any_wind_role = true;

            let fresh = record
                .health(binding.channel.number())
                .is_some_and(ChannelHealth::is_fresh);
            if !fresh {
                continue;
            }

            let total = registry.state(binding.channel).wind_run().total_meters();
            let cursor = &mut self.wind_run_cursors[binding.channel.index()];
            let meters = (total - *cursor).max(0.0);
            *cursor = total;

            if source == Some(binding.channel) {
                reported = Some(self.units.distance(meters));
            }
        }

        if any_wind_role {
            record.set("windrun", reported);
        }
    }

    fn add_channel_aux(
        &mut self,
        record: &mut ObservationRecord,
        binding: &ChannelBinding,
        state: &ChannelState,
        fresh: bool,
        now: Timestamp,
    ) {
        let n = binding.channel.number();
        let rx_check = self.rx_check_percent(binding, state, now);

        let (battery, rssi, rx_check) = if fresh {
            (Some(if state.battery_low() { 1.0 } else { 0.0 }), state.signal(), rx_check)
        } else {
            (None, None, None)
        };

        record.set(format!("batteryStatus{}", n), battery);
        record.set(format!("rssi{}", n), rssi);
        record.set(format!("rxCheckPercent{}", n), rx_check);
    }

    /// Received over expected packets in the trailing window, `None` until
    /// the window spans at least one transmit period.
    fn rx_check_percent(
        &mut self,
        binding: &ChannelBinding,
        state: &ChannelState,
        now: Timestamp,
    ) -> Option<f64> {
        let history = &mut self.rx_history[binding.channel.index()];
        history.push_back((now, state.packets_received()));
        while history
            .front()
            .is_some_and(|(at, _)| now.since(at) > RX_CHECK_WINDOW)
        {
            history.pop_front();
        }

        let (oldest_at, oldest_count) = *history.front()?;
        let elapsed = now.since(&oldest_at);
        let period = transmit_period(binding.transmitter_id());
        if elapsed < period {
            return None;
        }

        let received = state.packets_received().saturating_sub(oldest_count) as f64;
        let expected = elapsed.as_secs_f64() / period.as_secs_f64();
        Some((100.0 * received / expected).min(100.0))
    }

    fn add_stick(&self, record: &mut ObservationRecord, stick: &ChannelState, now: &Timestamp) {
        let fresh = !stick.is_stale(now, self.staleness.for_stick());
        for measurement in [Measurement::InTemp, Measurement::Pressure] {
            let value = if fresh {
                stick.value(measurement).map(|v| measurement.convert(v, self.units))
            } else {
                None
            };
            record.set(measurement.field_name(), value);
        }
    }

    fn note_health(&mut self, binding: &ChannelBinding, health: ChannelHealth) {
        let previous = self.last_health[binding.channel.index()].replace(health);
        match (previous, health) {
            (Some(ChannelHealth::Fresh), ChannelHealth::Stale) => {
                info!("Channel {} ({}) went stale", binding.channel, binding.role);
            }
            (Some(ChannelHealth::Stale), ChannelHealth::Fresh) => {
                info!("Channel {} ({}) is reporting again", binding.channel, binding.role);
            }
            _ => {}
        }
    }
}

fn health_of(state: &ChannelState, now: &Timestamp, threshold: Duration) -> ChannelHealth {
    match state.last_seen() {
        None => ChannelHealth::Silent,
        Some(_) if state.is_stale(now, threshold) => ChannelHealth::Stale,
        Some(_) => ChannelHealth::Fresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use crate::units::RainBucket;

    fn config_with(channels: &[(u8, SensorRole)]) -> Config {
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
        config
    }

    fn ch(n: u8) -> Channel {
        Channel::new(n).unwrap()
    }

    struct Fixture {
        config: Config,
        registry: ChannelRegistry,
        stick: ChannelState,
        assembler: Assembler,
    }

    impl Fixture {
        fn new(config: Config) -> Self {
            Self {
                registry: ChannelRegistry::from_config(&config).unwrap(),
                stick: ChannelState::new(&config.accumulator),
                assembler: Assembler::new(&config),
                config,
            }
        }

        fn report(&mut self, channel: u8, at: Timestamp, values: &[(Measurement, f64)]) {
            self.registry.touch(ch(channel), at, false, Some(-60.0)).unwrap();
            self.registry.state_mut(ch(channel)).record(values.iter().copied());
        }

        fn assemble(&mut self, now: Timestamp) -> ObservationRecord {
            let bucket = self.config.station.rain_bucket;
            self.assembler.assemble(&self.registry, &self.stick, bucket, now)
        }
    }

    #[test]
    fn test_silent_station_yields_empty_record() {
        let mut fx = Fixture::new(config_with(&[(1, SensorRole::Iss)]));
        let record = fx.assemble(Timestamp::now());

        assert!(record.is_empty());
        assert!(record.has_field("outTemp"));
        assert!(record.has_field("rain"));
        assert!(record.has_field("inTemp"));
        assert_eq!(record.health(1), Some(ChannelHealth::Silent));
        assert_eq!(record.us_units, 17);
    }

    #[test]
    fn test_fresh_values_copied() {
        let mut fx = Fixture::new(config_with(&[(1, SensorRole::Iss)]));
        let t0 = Timestamp::now();
        fx.report(1, t0, &[(Measurement::OutTemp, 12.5), (Measurement::OutHumidity, 80.0)]);

        let record = fx.assemble(t0.advanced_by(Duration::from_secs(2)));
        assert_eq!(record.get("outTemp"), Some(12.5));
        assert_eq!(record.get("outHumidity"), Some(80.0));
        assert_eq!(record.get("windSpeed"), None);
        assert_eq!(record.get("batteryStatus1"), Some(0.0));
        assert_eq!(record.get("rssi1"), Some(-60.0));
        assert_eq!(record.health(1), Some(ChannelHealth::Fresh));
    }

    #[test]
    fn test_stale_channel_omitted_then_reappears() {
        let mut fx = Fixture::new(config_with(&[(1, SensorRole::Iss)]));
        let t0 = Timestamp::now();
        fx.report(1, t0, &[(Measurement::OutTemp, 12.5)]);

        let stale_at = t0.advanced_by(Duration::from_secs(fx.config.staleness.iss_s + 1));
        let record = fx.assemble(stale_at);
        assert!(record.has_field("outTemp"));
        assert_eq!(record.get("outTemp"), None);
        assert_eq!(record.get("batteryStatus1"), None);
        assert_eq!(record.health(1), Some(ChannelHealth::Stale));

        fx.report(1, stale_at, &[(Measurement::OutTemp, 13.0)]);
        let record = fx.assemble(stale_at.advanced_by(Duration::from_secs(1)));
        assert_eq!(record.get("outTemp"), Some(13.0));
    }

    #[test]
    fn test_anemometer_wind_takes_precedence() {
        let config = config_with(&[(1, SensorRole::Iss), (2, SensorRole::Anemometer)]);
        let mut fx = Fixture::new(config);
        let t0 = Timestamp::now();
        fx.report(1, t0, &[(Measurement::WindSpeed, 3.0), (Measurement::WindDir, 90.0)]);
        fx.report(2, t0, &[(Measurement::WindSpeed, 5.0), (Measurement::WindDir, 180.0)]);

        let record = fx.assemble(t0.advanced_by(Duration::from_secs(1)));
        assert_eq!(record.get("windSpeed"), Some(5.0));
        assert_eq!(record.get("windDir"), Some(180.0));

        // Anemometer silent: ISS wind is used
        let later = t0.advanced_by(Duration::from_secs(fx.config.staleness.anemometer_s + 5));
        fx.report(1, later, &[(Measurement::WindSpeed, 3.5)]);
        let record = fx.assemble(later);
        assert_eq!(record.get("windSpeed"), Some(3.5));
    }

    #[test]
    fn test_rain_reported_incrementally() {
        let mut config = config_with(&[(1, SensorRole::Iss)]);
        config.station.rain_bucket = RainBucket::Metric;
        let mut fx = Fixture::new(config);
        let t0 = Timestamp::now();

        fx.registry.state_mut(ch(1)).rain_mut().observe(10).unwrap();
        fx.report(1, t0, &[]);
        assert_eq!(fx.assemble(t0).get("rain"), Some(0.0));

        fx.registry.state_mut(ch(1)).rain_mut().observe(13).unwrap();
        fx.report(1, t0, &[]);
        let rain = fx.assemble(t0).get("rain").unwrap();
        assert!((rain - 0.6).abs() < 1e-9);

        assert_eq!(fx.assemble(t0).get("rain"), Some(0.0));
    }

    #[test]
    fn test_rain_while_stale_reported_on_return() {
        let mut fx = Fixture::new(config_with(&[(1, SensorRole::Iss)]));
        let t0 = Timestamp::now();
        fx.registry.state_mut(ch(1)).rain_mut().observe(0).unwrap();
        fx.report(1, t0, &[]);
        fx.assemble(t0);

        fx.registry.state_mut(ch(1)).rain_mut().observe(4).unwrap();
        let stale_at = t0.advanced_by(Duration::from_secs(120));
        assert_eq!(fx.assemble(stale_at).get("rain"), None);

        fx.report(1, stale_at, &[]);
        let rain = fx.assemble(stale_at).get("rain").unwrap();
        assert!((rain - 4.0 * 0.254).abs() < 1e-9);
    }

    #[test]
    fn test_wind_run_increment() {
        let mut fx = Fixture::new(config_with(&[(1, SensorRole::Iss)]));
        let t0 = Timestamp::now();
        fx.registry.state_mut(ch(1)).wind_run_mut().observe(t0, 10.0);
        fx.report(1, t0, &[]);
        assert_eq!(fx.assemble(t0).get("windrun"), Some(0.0));

        let t1 = t0.advanced_by(Duration::from_secs(20));
        fx.registry.state_mut(ch(1)).wind_run_mut().observe(t1, 10.0);
        fx.report(1, t1, &[]);
        let windrun = fx.assemble(t1).get("windrun").unwrap();
        assert!((windrun - 0.2).abs() < 1e-9, "windrun was {}", windrun);
    }

    #[test]
    fn test_rx_check_percent() {
        let mut fx = Fixture::new(config_with(&[(1, SensorRole::Iss)]));
        let t0 = Timestamp::now();
        fx.report(1, t0, &[]);
        assert_eq!(fx.assemble(t0).get("rxCheckPercent1"), None);

        // Channel 1 transmits every 41/16 s; 10 packets in 51.25 s is 50%
        let period = transmit_period(0);
        let t1 = t0.advanced_by(period * 20);
        for _ in 0..10 {
            fx.report(1, t1, &[]);
        }
        let pct = fx.assemble(t1).get("rxCheckPercent1").unwrap();
        assert!((pct - 50.0).abs() < 1e-6, "rx check was {}", pct);
    }

    #[test]
    fn test_rx_check_capped() {
        let mut fx = Fixture::new(config_with(&[(1, SensorRole::Iss)]));
        let t0 = Timestamp::now();
        fx.report(1, t0, &[]);
        fx.assemble(t0);

        let t1 = t0.advanced_by(Duration::from_secs(5));
        for _ in 0..20 {
            fx.report(1, t1, &[]);
        }
        assert_eq!(fx.assemble(t1).get("rxCheckPercent1"), Some(100.0));
    }

    #[test]
    fn test_stick_values_and_units() {
        let mut config = config_with(&[(1, SensorRole::Iss)]);
        config.output.units = UnitSystem::Us;
        let mut fx = Fixture::new(config);
        let t0 = Timestamp::now();
        fx.stick.touch(t0, false, None);
        fx.stick.record([(Measurement::InTemp, 20.0), (Measurement::Pressure, 1013.25)]);
        fx.report(1, t0, &[(Measurement::WindSpeed, 10.0)]);

        let record = fx.assemble(t0);
        assert_eq!(record.us_units, 1);
        assert!((record.get("inTemp").unwrap() - 68.0).abs() < 1e-9);
        assert!((record.get("pressure").unwrap() - 29.92).abs() < 0.01);
        assert!((record.get("windSpeed").unwrap() - 22.369).abs() < 0.01);

        let later = t0.advanced_by(Duration::from_secs(fx.config.staleness.stick_s + 1));
        assert_eq!(fx.assemble(later).get("inTemp"), None);
    }

    #[test]
    fn test_transmit_period() {
        assert_eq!(transmit_period(0), Duration::from_secs_f64(2.5625));
        assert_eq!(transmit_period(7), Duration::from_secs(3));
    }
}
