//! # Rain and Wind Accumulators
//!
//! [`WrappingCounter`] turns a fixed-width, wrap-around counter (the rain
//! bucket tip counter) into a monotonic cumulative total.
//!
//! - The first reading after startup is a baseline and adds nothing.
//! - `delta = (current - previous) mod modulus`, so wrap-around and any number
//!   of missed packets in between are handled.
//! - A delta above the plausibility ceiling is rejected and leaves the state
//!   untouched. If `confirmations` (at least two) consecutive rejected
//!   readings agree with each other, the transmitter has been power-cycled:
//!   the counter re-baselines on the newest reading with zero delta.
//!
//! [`WindRun`] integrates wind speed over time into distance.

use std::time::Duration;

use tracing::info;

use super::clock::Timestamp;
use crate::error::{MeteostickError, Result};

/// Modulus of the Davis 8-bit tip counter
pub const RAIN_COUNTER_MODULUS: u32 = 256;

#[derive(Debug, Clone)]
pub struct WrappingCounter {
    modulus: u32,
    ceiling: u32,
    confirmations: u8,
    last: Option<u32>,
    total: u64,
    /// Latest rejected reading and how many agreeing rejections led to it
    pending_reset: Option<(u32, u8)>,
}

impl WrappingCounter {
    pub fn new(modulus: u32, ceiling: u32, confirmations: u8) -> Self {
        Self {
            modulus,
            ceiling,
            confirmations,
            last: None,
            total: 0,
            pending_reset: None,
        }
    }

    /// Feeds one counter reading and returns the accepted delta.
    ///
    /// # Errors
    ///
    /// `ImplausibleCounterJump` if the delta exceeds the ceiling; the stored
    /// counter value and total are unchanged.
    pub fn observe(&mut self, value: u32) -> Result<u32> {
        let value = value % self.modulus;

        let previous = match self.last {
            Some(previous) => previous,
            None => {
                self.last = Some(value);
                return Ok(0);
            }
        };

        let delta = self.distance(previous, value);
        if delta <= self.ceiling {
            self.pending_reset = None;
            self.last = Some(value);
            self.total += u64::from(delta);
            return Ok(delta);
        }

        let agreeing = match self.pending_reset {
            Some((rejected, count)) if self.distance(rejected, value) <= self.ceiling => count + 1,
            _ => 1,
        };

        if agreeing >= self.confirmations.max(2) {
            info!(
                "Counter reset detected ({} -> {}), re-baselining",
                previous, value
            );
            self.pending_reset = None;
            self.last = Some(value);
            return Ok(0);
        }

        self.pending_reset = Some((value, agreeing));
        Err(MeteostickError::ImplausibleCounterJump {
            previous,
            current: value,
            delta,
            ceiling: self.ceiling,
        })
    }

    /// Last accepted counter value, `None` before the first reading
    pub fn last_value(&self) -> Option<u32> {
        self.last
    }

    /// Sum of all accepted deltas since startup
    pub fn total(&self) -> u64 {
        self.total
    }

    fn distance(&self, from: u32, to: u32) -> u32 {
        let modulus = u64::from(self.modulus);
        let delta = (u64::from(to) + modulus - u64::from(from)) % modulus;
        delta as u32
    }
}

/// Wind run integrated from speed samples (left Riemann sum).
#[derive(Debug, Clone)]
pub struct WindRun {
    max_gap: Duration,
    last: Option<(Timestamp, f64)>,
    meters: f64,
}

impl WindRun {
    pub fn new(max_gap: Duration) -> Self {
        Self {
            max_gap,
            last: None,
            meters: 0.0,
        }
    }

    /// Adds the distance covered since the previous sample at its speed.
    /// Gaps longer than `max_gap` contribute nothing.
    pub fn observe(&mut self, at: Timestamp, speed_ms: f64) {
        if let Some((previous_at, previous_speed)) = self.last {
            let gap = at.since(&previous_at);
            if gap <= self.max_gap {
                self.meters += previous_speed * gap.as_secs_f64();
            }
        }
        self.last = Some((at, speed_ms));
    }

    /// Total distance in metres since startup
    pub fn total_meters(&self) -> f64 {
        self.meters
    }
}
