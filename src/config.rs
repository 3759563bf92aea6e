//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! The configuration is read once at startup and never changes during a run.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{MeteostickError, Result};
use crate::protocol::packet::MAX_CHANNELS;
use crate::station::calibration::{Curve, Linear, WindDirectionEncoding};
use crate::station::registry::SensorRole;
use crate::units::{RainBucket, UnitSystem};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub station: StationConfig,
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub staleness: StalenessConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub accumulator: AccumulatorConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default = "default_max_tries")]
    pub max_tries: u32,

    #[serde(default = "default_discard_first_line")]
    pub discard_first_line: bool,
}

/// Radio frequency band of the Davis transmitters
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Frequency {
    /// 868.3 MHz
    #[default]
    EU,
    /// 915 MHz
    US,
    /// 921 MHz
    AU,
}

/// Receiver-wide station settings
#[derive(Debug, Deserialize, Clone)]
pub struct StationConfig {
    #[serde(default)]
    pub frequency: Frequency,

    #[serde(default)]
    pub rain_bucket: RainBucket,

    #[serde(default)]
    pub wind_direction: WindDirectionEncoding,
}

/// One transmitter channel binding
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    pub channel: u8,

    pub role: SensorRole,

    #[serde(default)]
    pub repeater: bool,

    #[serde(default)]
    pub soil_moisture_curve: Option<Vec<[f64; 2]>>,

    #[serde(default)]
    pub leaf_wetness_curve: Option<Vec<[f64; 2]>>,
}

/// Silence windows in seconds, per sensor role
#[derive(Debug, Deserialize, Clone)]
pub struct StalenessConfig {
    #[serde(default = "default_stale_iss_s")]
    pub iss_s: u64,

    #[serde(default = "default_stale_anemometer_s")]
    pub anemometer_s: u64,

    #[serde(default = "default_stale_leaf_soil_s")]
    pub leaf_soil_s: u64,

    #[serde(default = "default_stale_temp_hum_s")]
    pub temp_hum_s: u64,

    /// The stick's own barometer/thermometer
    #[serde(default = "default_stale_stick_s")]
    pub stick_s: u64,
}

/// Linear calibration per measurement
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CalibrationConfig {
    #[serde(default)]
    pub iss_temperature: Linear,

    #[serde(default)]
    pub probe_temperature: Linear,

    #[serde(default)]
    pub humidity: Linear,

    #[serde(default)]
    pub radiation: Linear,

    #[serde(default)]
    pub uv: Linear,
}

/// Counter plausibility and integration limits
#[derive(Debug, Deserialize, Clone)]
pub struct AccumulatorConfig {
    #[serde(default = "default_rain_modulus")]
    pub rain_modulus: u32,

    /// Largest believable tip delta between two rain packets
    #[serde(default = "default_rain_ceiling")]
    pub rain_ceiling: u32,

    /// Agreeing implausible readings needed to accept a counter reset
    #[serde(default = "default_reset_confirmations")]
    pub reset_confirmations: u8,

    #[serde(default = "default_wind_run_max_gap_s")]
    pub wind_run_max_gap_s: u64,
}

/// Record emission settings
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub units: UnitSystem,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Daily-rotated log files are written here when set
    #[serde(default)]
    pub directory: Option<String>,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_timeout_ms() -> u64 { 3000 }
fn default_reconnect_interval_ms() -> u64 { 10000 }
fn default_max_tries() -> u32 { 10 }
fn default_discard_first_line() -> bool { true }

fn default_channels() -> Vec<ChannelConfig> {
    vec![ChannelConfig {
        channel: 1,
        role: SensorRole::Iss,
        repeater: false,
        soil_moisture_curve: None,
        leaf_wetness_curve: None,
    }]
}

fn default_stale_iss_s() -> u64 { 60 }
fn default_stale_anemometer_s() -> u64 { 30 }
fn default_stale_leaf_soil_s() -> u64 { 900 }
fn default_stale_temp_hum_s() -> u64 { 300 }
fn default_stale_stick_s() -> u64 { 120 }

fn default_rain_modulus() -> u32 { 256 }
fn default_rain_ceiling() -> u32 { 100 }
fn default_reset_confirmations() -> u8 { 3 }
fn default_wind_run_max_gap_s() -> u64 { 30 }

fn default_poll_interval_ms() -> u64 { 2500 }

fn default_log_level() -> String { "info".to_string() }

/// Baud rates the stick firmware accepts
const VALID_BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

/// Largest supported rain counter modulus (16-bit counters)
pub const MAX_RAIN_MODULUS: u32 = 65536;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_tries: default_max_tries(),
            discard_first_line: default_discard_first_line(),
        }
    }
}

impl SerialConfig {
    /// Longest wait for a line before the runner gets control back
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            frequency: Frequency::default(),
            rain_bucket: RainBucket::default(),
            wind_direction: WindDirectionEncoding::default(),
        }
    }
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            iss_s: default_stale_iss_s(),
            anemometer_s: default_stale_anemometer_s(),
            leaf_soil_s: default_stale_leaf_soil_s(),
            temp_hum_s: default_stale_temp_hum_s(),
            stick_s: default_stale_stick_s(),
        }
    }
}

impl StalenessConfig {
    /// Silence window for a transmitter role
    pub fn for_role(&self, role: SensorRole) -> Duration {
        let seconds = match role {
            SensorRole::Iss => self.iss_s,
            SensorRole::Anemometer => self.anemometer_s,
            SensorRole::LeafSoil => self.leaf_soil_s,
            SensorRole::TempHum1 | SensorRole::TempHum2 => self.temp_hum_s,
        };
        Duration::from_secs(seconds)
    }

    /// Silence window for the stick's own sensors
    pub fn for_stick(&self) -> Duration {
        Duration::from_secs(self.stick_s)
    }
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            rain_modulus: default_rain_modulus(),
            rain_ceiling: default_rain_ceiling(),
            reset_confirmations: default_reset_confirmations(),
            wind_run_max_gap_s: default_wind_run_max_gap_s(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            units: UnitSystem::default(),
        }
    }
}

impl OutputConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            station: StationConfig::default(),
            channels: default_channels(),
            staleness: StalenessConfig::default(),
            calibration: CalibrationConfig::default(),
            accumulator: AccumulatorConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ChannelConfig {
    /// Parsed soil-moisture curve, identity over 0-200 cbar when unset
    pub fn soil_moisture_curve(&self) -> std::result::Result<Curve, String> {
        build_curve(&self.soil_moisture_curve, 200.0)
    }

    /// Parsed leaf-wetness curve, identity over 0-15 when unset
    pub fn leaf_wetness_curve(&self) -> std::result::Result<Curve, String> {
        build_curve(&self.leaf_wetness_curve, 15.0)
    }
}

fn build_curve(
    points: &Option<Vec<[f64; 2]>>,
    identity_max: f64,
) -> std::result::Result<Curve, String> {
    match points {
        Some(points) => Curve::new(points.iter().map(|[x, y]| (*x, *y)).collect()),
        None => Ok(Curve::identity(identity_max)),
    }
}

fn invalid(message: impl std::fmt::Display) -> MeteostickError {
    MeteostickError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use meteostick_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Bitmask of bound transmitters, bit `n - 1` for channel `n`
    pub fn transmitter_mask(&self) -> u8 {
        self.channels
            .iter()
            .filter(|c| (1..=MAX_CHANNELS as u8).contains(&c.channel))
            .fold(0u8, |mask, c| mask | (1 << (c.channel - 1)))
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Serial
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !VALID_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid("baud_rate must be one of: 9600, 19200, 38400, 57600, 115200"));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 60000 {
            return Err(invalid("timeout_ms must be between 1 and 60000"));
        }

        if self.serial.reconnect_interval_ms == 0 || self.serial.reconnect_interval_ms > 600000 {
            return Err(invalid("reconnect_interval_ms must be between 1 and 600000"));
        }

        if self.serial.max_tries == 0 {
            return Err(invalid("max_tries must be greater than 0"));
        }

        // Channel bindings
        let mut seen_channels = [false; MAX_CHANNELS];
        let mut seen_roles: Vec<SensorRole> = Vec::new();
        for binding in &self.channels {
            if binding.channel == 0 || binding.channel as usize > MAX_CHANNELS {
                return Err(invalid(format!(
                    "channel {} is out of bounds (must be 1-8)",
                    binding.channel
                )));
            }

            let slot = (binding.channel - 1) as usize;
            if seen_channels[slot] {
                return Err(invalid(format!("channel {} is bound more than once", binding.channel)));
            }
            seen_channels[slot] = true;

            if seen_roles.contains(&binding.role) {
                return Err(invalid(format!("role {} is bound more than once", binding.role)));
            }
            seen_roles.push(binding.role);

            if binding.role != SensorRole::LeafSoil
                && (binding.soil_moisture_curve.is_some() || binding.leaf_wetness_curve.is_some())
            {
                return Err(invalid(format!(
                    "channel {}: probe curves only apply to leaf_soil stations",
                    binding.channel
                )));
            }

            binding
                .soil_moisture_curve()
                .map_err(|e| {
                    invalid(format!("channel {} soil_moisture_curve: {}", binding.channel, e))
                })?;
            binding
                .leaf_wetness_curve()
                .map_err(|e| {
                    invalid(format!("channel {} leaf_wetness_curve: {}", binding.channel, e))
                })?;
        }

        if !seen_roles.contains(&SensorRole::Iss) {
            return Err(invalid("an iss channel must be configured"));
        }

        // Staleness windows
        for (name, value) in [
            ("iss_s", self.staleness.iss_s),
            ("anemometer_s", self.staleness.anemometer_s),
            ("leaf_soil_s", self.staleness.leaf_soil_s),
            ("temp_hum_s", self.staleness.temp_hum_s),
            ("stick_s", self.staleness.stick_s),
        ] {
            if value == 0 {
                return Err(invalid(format!("staleness {} must be greater than 0", name)));
            }
        }

        // Calibration
        for (name, cal) in [
            ("iss_temperature", self.calibration.iss_temperature),
            ("probe_temperature", self.calibration.probe_temperature),
            ("humidity", self.calibration.humidity),
            ("radiation", self.calibration.radiation),
            ("uv", self.calibration.uv),
        ] {
            if !cal.scale.is_finite() || !cal.offset.is_finite() || cal.scale == 0.0 {
                return Err(invalid(format!(
                    "calibration {} needs a finite, non-zero scale and finite offset",
                    name
                )));
            }
        }

        // Accumulators
        if !(2..=MAX_RAIN_MODULUS).contains(&self.accumulator.rain_modulus) {
            return Err(invalid(format!(
                "rain_modulus must be between 2 and {}",
                MAX_RAIN_MODULUS
            )));
        }

        let accumulator = &self.accumulator;
        if accumulator.rain_ceiling == 0 || accumulator.rain_ceiling >= accumulator.rain_modulus {
            return Err(invalid("rain_ceiling must be between 1 and rain_modulus - 1"));
        }

        if self.accumulator.reset_confirmations < 2 {
            return Err(invalid("reset_confirmations must be at least 2"));
        }

        if self.accumulator.wind_run_max_gap_s == 0 {
            return Err(invalid("wind_run_max_gap_s must be greater than 0"));
        }

        // Output
        if self.output.poll_interval_ms < 100 || self.output.poll_interval_ms > 600000 {
            return Err(invalid("poll_interval_ms must be between 100 and 600000"));
        }

        // Logging
        if !VALID_LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}
