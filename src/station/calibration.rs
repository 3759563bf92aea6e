//! # Calibration Module
//!
//! Maps raw sensor values to physical units.
//!
//! ## Linear maps
//!
//! Temperature, humidity, solar radiation and UV use `value = raw * scale + offset`.
//! The stick's computed-values firmware already reports engineering units, so
//! the defaults are the identity; ISS and probe temperatures are calibrated
//! separately.
//!
//! ## Piecewise curves
//!
//! Soil-moisture and leaf-wetness probes are non-linear. A [`Curve`] holds
//! `(raw, value)` breakpoints with strictly increasing `raw` and interpolates
//! linearly between them. Raw values outside the curve's domain have no
//! calibrated value.
//!
//! ## Wind direction
//!
//! The anemometer vane reports a byte (0-255). Davis maps it onto the
//! vane's 342° electrical travel starting 9° past north:
//! `direction = 9 + raw * 342 / 255`.
//!
//! ```
//! use meteostick_bridge::station::calibration::wind_direction_from_raw;
//!
//! let dir = wind_direction_from_raw(128.0);
//! assert!((dir - 180.0).abs() < 1.0);
//! ```

use serde::Deserialize;

/// Offset of the vane's electrical zero from north, degrees
pub const WIND_VANE_OFFSET_DEG: f64 = 9.0;

/// Electrical travel of the vane potentiometer, degrees
pub const WIND_VANE_SPAN_DEG: f64 = 342.0;

/// Largest raw vane reading
pub const WIND_VANE_RAW_MAX: f64 = 255.0;

/// How the stick encodes the wind direction field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WindDirectionEncoding {
    /// Raw vane byte 0-255
    #[default]
    Raw,
    /// Already converted to degrees 0-360
    Degrees,
}

/// Linear calibration `raw * scale + offset`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Linear {
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

fn default_scale() -> f64 { 1.0 }

impl Default for Linear {
    fn default() -> Self {
        Self::identity()
    }
}

impl Linear {
    #[must_use]
    pub fn new(scale: f64, offset: f64) -> Self {
        Self { scale, offset }
    }

    #[must_use]
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
        }
    }

    #[inline]
    pub fn apply(&self, raw: f64) -> f64 {
        raw * self.scale + self.offset
    }
}

/// Piecewise-linear calibration curve.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    points: Vec<(f64, f64)>,
}

impl Curve {
    /// Builds a curve from breakpoints.
    ///
    /// # Errors
    ///
    /// Returns a message if fewer than two points are given, a point is not
    /// finite, or raw values are not strictly increasing.
    pub fn new(points: Vec<(f64, f64)>) -> std::result::Result<Self, String> {
        if points.len() < 2 {
            return Err("calibration curve needs at least two points".to_string());
        }
        if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err("calibration curve points must be finite".to_string());
        }
        if points.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err("calibration curve raw values must be strictly increasing".to_string());
        }
        Ok(Self { points })
    }

    /// Identity over `0..=max`.
    #[must_use]
    pub fn identity(max: f64) -> Self {
        Self {
            points: vec![(0.0, 0.0), (max, max)],
        }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Calibrated value for `raw`, `None` outside the curve's domain.
    pub fn apply(&self, raw: f64) -> Option<f64> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        if raw < first.0 || raw > last.0 {
            return None;
        }

        self.points.windows(2).find_map(|w| {
            let (x0, y0) = w[0];
            let (x1, y1) = w[1];
            if raw >= x0 && raw <= x1 {
                Some(y0 + (raw - x0) * (y1 - y0) / (x1 - x0))
            } else {
                None
            }
        })
    }
}

/// Converts a raw vane byte to degrees.
#[must_use]
pub fn wind_direction_from_raw(raw: f64) -> f64 {
    WIND_VANE_OFFSET_DEG + raw * WIND_VANE_SPAN_DEG / WIND_VANE_RAW_MAX
}
