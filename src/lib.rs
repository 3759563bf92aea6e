//! # Meteostick Bridge Library
//!
//! Decode the text output of a Meteostick USB receiver (computed-values mode)
//! into timestamped weather observation records.
//!
//! The pipeline parses each line from the stick, maps its radio channel to a
//! configured sensor role, calibrates and range-checks the values, runs the
//! rain and wind accumulators and assembles one record per polling tick.

pub mod config;
pub mod error;
pub mod protocol;
pub mod record;
pub mod runner;
pub mod serial;
pub mod station;
pub mod units;
