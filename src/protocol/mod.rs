//! # Meteostick Line Protocol
//!
//! Parsing of the text lines the Meteostick emits in its computed-values
//! output mode.
//!
//! This module handles:
//! - The closed packet vocabulary and per-tag field layout
//! - Tokenizing and validating one line into a typed packet
//! - Recognizing the stick's own status lines (firmware, hop, rain bucket)

pub mod packet;
pub mod parser;
pub mod status;

pub use packet::{Channel, Packet, PacketKind, ParsedPacket, RawLine};
pub use parser::parse_line;
pub use status::StatusLine;
