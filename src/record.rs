//! Assembled observation records handed to the host consumer.

use std::collections::BTreeMap;

use serde::Serialize;

/// Liveness of a bound channel at assembly time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelHealth {
    /// Reported within its staleness window
    Fresh,
    /// Reported before, but not within its staleness window
    Stale,
    /// Never reported since startup
    Silent,
}

impl ChannelHealth {
    pub fn is_fresh(self) -> bool {
        self == ChannelHealth::Fresh
    }
}

/// One observation record per assembly tick.
///
/// Every field of every bound role is present; `None` means "no value" and
/// serializes as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationRecord {
    /// Unix epoch seconds of the tick
    pub timestamp: i64,

    /// Unit system code (1 = US, 17 = METRICWX)
    #[serde(rename = "usUnits")]
    pub us_units: u8,

    /// Field name -> value
    #[serde(flatten)]
    pub fields: BTreeMap<String, Option<f64>>,

    /// Channel number -> health, for monitoring
    #[serde(skip)]
    pub channel_health: BTreeMap<u8, ChannelHealth>,
}

impl ObservationRecord {
    pub fn new(timestamp: i64, us_units: u8) -> Self {
        Self {
            timestamp,
            us_units,
            fields: BTreeMap::new(),
            channel_health: BTreeMap::new(),
        }
    }

    /// Value of `field`, `None` if absent or missing
    pub fn get(&self, field: &str) -> Option<f64> {
        self.fields.get(field).copied().flatten()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// True if no field carries a value (total sensor silence)
    pub fn is_empty(&self) -> bool {
        self.fields.values().all(Option::is_none)
    }

    pub fn health(&self, channel: u8) -> Option<ChannelHealth> {
        self.channel_health.get(&channel).copied()
    }

    pub(crate) fn set(&mut self, field: impl Into<String>, value: Option<f64>) {
        self.fields.insert(field.into(), value);
    }
}
