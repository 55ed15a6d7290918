//! Sans-IO implementation of the CCSDS ground-to-space data link stack.
//!
//! This crate provides the protocol layers used to uplink telecommands to a
//! spacecraft and downlink telemetry from it:
//!
//! - [`cltu`]: Communications Link Transmission Units (CCSDS 231.0-B-3), the
//!   uplink synchronization layer with a BCH check byte per 7-byte block.
//! - [`frame`]: TC and TM Transfer Frames (CCSDS 232.0-B-3 / 132.0-B-2),
//!   the link layer carrying spacecraft ID, virtual channel and counters.
//! - [`space_packet`]: Space Packets (CCSDS 133.0-B-2), the variable-length
//!   application packets multiplexed into frames.
//! - [`clcw`]: the Communications Link Control Word reported in the TM
//!   Operational Control Field.
//! - [`pus`]: the ECSS-E-70-41A telecommand secondary header.
//! - [`farm`]: the FARM-1 half of COP-1, the acceptance window and lockout
//!   state machine that makes the uplink reliable.
//! - [`endpoint`]: the [`Spacecraft`](endpoint::Spacecraft) and
//!   [`Ground`](endpoint::Ground) coordinators tying the layers together.
//!
//! No I/O or timers are performed internally: callers feed byte slices into
//! the decoders and receive outputs through sink traits passed into each
//! call. Encoders write into caller-provided buffers. Decoders never fail on
//! malformed input; they drop it, count it in a saturating 16-bit error
//! counter and resynchronize on the next sync pattern or frame boundary.

use thiserror::Error;

pub mod clcw;
pub mod cltu;
pub mod config;
pub mod crc;
pub mod endpoint;
pub mod farm;
pub mod frame;
pub mod pus;
pub mod space_packet;

#[cfg(test)]
mod tests;

pub use crate::clcw::Clcw;
pub use crate::config::{Config, ConfigError};
pub use crate::endpoint::{Ground, GroundHandler, Spacecraft, SpacecraftHandler};

/// Errors surfaced by the encode paths.
///
/// Decode paths never return these; malformed input is counted and dropped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// The destination buffer cannot hold the minimum encoded size
    #[error("destination buffer too small")]
    BufferTooSmall,
    /// A required payload is empty
    #[error("payload is empty")]
    EmptyPayload,
    /// The payload does not fit the length field or the configured maximum
    #[error("payload too large")]
    PayloadTooLarge,
    /// The addressed virtual channel is outside the configured range
    #[error("virtual channel out of range")]
    InvalidChannel,
}

/// Ceiling at which all error counters stop advancing.
pub const COUNTER_MAX: u16 = 0xFFFF;

pub(crate) fn saturating_inc(counter: &mut u16) {
    if *counter < COUNTER_MAX {
        *counter += 1;
    }
}
