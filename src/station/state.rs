//! Per-channel runtime state: latest calibrated values, liveness, battery and
//! signal, and the stateful rain/wind accumulators.
//!
//! Only the decode path mutates a `ChannelState`; the assembler reads it.

use std::collections::BTreeMap;
use std::time::Duration;

use super::accumulator::{WindRun, WrappingCounter};
use super::clock::Timestamp;
use super::measurement::Measurement;
use crate::config::AccumulatorConfig;

#[derive(Debug, Clone)]
pub struct ChannelState {
    latest: BTreeMap<Measurement, f64>,
    last_seen: Option<Timestamp>,
    battery_low: bool,
    signal: Option<f64>,
    packets_received: u64,
    rain: WrappingCounter,
    wind_run: WindRun,
}

impl ChannelState {
    pub fn new(accumulator: &AccumulatorConfig) -> Self {
        Self {
            latest: BTreeMap::new(),
            last_seen: None,
            battery_low: false,
            signal: None,
            packets_received: 0,
            rain: WrappingCounter::new(
                accumulator.rain_modulus,
                accumulator.rain_ceiling,
                accumulator.reset_confirmations,
            ),
            wind_run: WindRun::new(Duration::from_secs(accumulator.wind_run_max_gap_s)),
        }
    }

    /// Records liveness of the transmitter along with its auxiliary flags.
    pub fn touch(&mut self, at: Timestamp, battery_low: bool, signal: Option<f64>) {
        self.last_seen = Some(at);
        self.battery_low = battery_low;
        if signal.is_some() {
            self.signal = signal;
        }
        self.packets_received += 1;
    }

    /// Stores calibrated values, replacing earlier values of the same kind.
    pub fn record<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = (Measurement, f64)>,
    {
        self.latest.extend(values);
    }

    /// True if nothing arrived within `threshold` before `now`, or ever.
    pub fn is_stale(&self, now: &Timestamp, threshold: Duration) -> bool {
        match &self.last_seen {
            Some(seen) => now.since(seen) > threshold,
            None => true,
        }
    }

    pub fn latest(&self) -> &BTreeMap<Measurement, f64> {
        &self.latest
    }

    pub fn value(&self, measurement: Measurement) -> Option<f64> {
        self.latest.get(&measurement).copied()
    }

    pub fn last_seen(&self) -> Option<Timestamp> {
        self.last_seen
    }

    pub fn battery_low(&self) -> bool {
        self.battery_low
    }

    pub fn signal(&self) -> Option<f64> {
        self.signal
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }

    pub fn rain(&self) -> &WrappingCounter {
        &self.rain
    }

    pub fn rain_mut(&mut self) -> &mut WrappingCounter {
        &mut self.rain
    }

    pub fn wind_run(&self) -> &WindRun {
        &self.wind_run
    }

    pub fn wind_run_mut(&mut self) -> &mut WindRun {
        &mut self.wind_run
    }
}
