//! Station engine: channel registry, sensor decoding, accumulation and
//! record assembly.

pub mod accumulator;
pub mod assembler;
pub mod calibration;
pub mod clock;
pub mod decoder;
pub mod engine;
pub mod measurement;
pub mod registry;
pub mod state;
pub mod status;

pub use assembler::Assembler;
pub use clock::Timestamp;
pub use decoder::{Decoded, Decoder};
pub use engine::{Engine, PipelineStats};
pub use measurement::Measurement;
pub use registry::{ChannelBinding, ChannelRegistry, SensorRole};
pub use state::ChannelState;
pub use status::{StatusHandler, StickStatus};
