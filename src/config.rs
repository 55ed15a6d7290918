//! Link configuration, frozen when an endpoint is built.
//!
//! The values here are the mission-level constants of the stack: frame
//! sizes, which optional fields are on the wire, and how many virtual
//! channels each endpoint keeps state for. Both ends of a link must be
//! built from matching values.

use thiserror::Error;

use crate::frame::{self, tc, tm};
use crate::pus;

/// Largest width the FARM sliding window may take
pub const MAX_FARM_WINDOW: u16 = 256;
/// TC virtual channel IDs fit in 6 bits
pub const MAX_TC_CHANNELS: usize = 64;
/// TM virtual channel IDs fit in 3 bits
pub const MAX_TM_CHANNELS: usize = 8;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("spacecraft ID allow-list is empty")]
    NoSpacecraftIds,
    #[error("TC frame size out of range")]
    TcFrameSize,
    #[error("TM frame size out of range")]
    TmFrameSize,
    #[error("space packet buffer cannot hold a minimal packet")]
    SpMaxDataSize,
    #[error("FARM window must be a power of two between 2 and 256")]
    FarmWindow,
    #[error("virtual channel count out of range")]
    Channels,
    #[error("PUS header below its 4 byte minimum")]
    PusHeaderSize,
}

/// Link parameters shared by both coordinators.
#[derive(Debug, Clone)]
pub struct Config {
    /// Spacecraft IDs accepted on receive; the first is used on transmit
    pub scids: Vec<u16>,
    /// Upper bound on the data field a space packet parser stores
    pub sp_max_data_size: usize,
    /// Upper bound on the TC frame length, 1024 at most
    pub tc_frame_max_size: usize,
    /// Fixed TM frame size, 1024 at most
    pub tm_frame_size: usize,
    /// Carry the Operational Control Field in TM frames
    pub use_ocf: bool,
    /// Append the Frame Error Control Field to TC and TM frames
    pub use_fecf: bool,
    /// Include the one-byte segment header in TC frames
    pub tc_segment_header: bool,
    /// Wrap and unwrap TC frames in CLTUs
    pub use_cltu: bool,
    /// FARM sliding window width W; a power of two up to 256
    pub farm_window: u16,
    /// Number of telecommand virtual channels with FARM state
    pub max_tc_channels: usize,
    /// Number of telemetry virtual channels with frame counters
    pub max_tm_channels: usize,
    /// PUS telecommand secondary header size
    pub pus_header_size: usize,
    /// Virtual channel used for idle telemetry frames
    pub idle_vc: u8,
}

impl Config {
    /// A configuration accepting the given spacecraft IDs, with the
    /// defaults of a small mission: 508-byte frames, FECF, OCF and segment
    /// header on, CLTU handling off.
    pub fn new(scids: Vec<u16>) -> Self {
        Self {
            scids,
            sp_max_data_size: 496,
            tc_frame_max_size: 508,
            tm_frame_size: 508,
            use_ocf: true,
            use_fecf: true,
            tc_segment_header: true,
            use_cltu: false,
            farm_window: 16,
            max_tc_channels: 1,
            max_tm_channels: 8,
            pus_header_size: pus::DEFAULT_HEADER_SIZE,
            idle_vc: 7,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.scids.is_empty() {
            return Err(ConfigError::NoSpacecraftIds);
        }
        let tc_overhead = tc::PRIMARY_HEADER_SIZE
            + usize::from(self.tc_segment_header)
            + if self.use_fecf { frame::FECF_SIZE } else { 0 };
        if self.tc_frame_max_size > frame::MAX_FRAME_SIZE
            || self.tc_frame_max_size <= tc_overhead
        {
            return Err(ConfigError::TcFrameSize);
        }
        let tm_overhead = tm::PRIMARY_HEADER_SIZE
            + if self.use_ocf { tm::OCF_SIZE } else { 0 }
            + if self.use_fecf { frame::FECF_SIZE } else { 0 };
        if self.tm_frame_size > frame::MAX_FRAME_SIZE || self.tm_frame_size <= tm_overhead {
            return Err(ConfigError::TmFrameSize);
        }
        if self.sp_max_data_size < 1 {
            return Err(ConfigError::SpMaxDataSize);
        }
        if !self.farm_window.is_power_of_two()
            || self.farm_window < 2
            || self.farm_window > MAX_FARM_WINDOW
        {
            return Err(ConfigError::FarmWindow);
        }
        if self.max_tc_channels < 1
            || self.max_tc_channels > MAX_TC_CHANNELS
            || self.max_tm_channels < 1
            || self.max_tm_channels > MAX_TM_CHANNELS
        {
            return Err(ConfigError::Channels);
        }
        if self.pus_header_size < pus::MIN_HEADER_SIZE {
            return Err(ConfigError::PusHeaderSize);
        }
        Ok(())
    }

    /// Space left for packet data in a TM frame.
    pub(crate) fn tm_body_size(&self) -> usize {
        tm::body_size(self.tm_frame_size, self.use_ocf, self.use_fecf)
    }
}
