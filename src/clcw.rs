//! The Communications Link Control Word (CCSDS 232.0-B-3 §4.2).
//!
//! The CLCW is the 32-bit downlink report of the FARM: it tells the ground
//! which frame sequence number the spacecraft expects next and whether the
//! uplink is in retransmit or lockout. It travels in the Operational Control
//! Field of every TM Transfer Frame.

use bytes::{Buf, BufMut};
use thiserror::Error;

const VERSION: u32 = 0b00;
const COP_IN_EFFECT: u32 = 0b01;

/// Size of the encoded word in the OCF
pub const SIZE: usize = 4;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ClcwError {
    /// The version field of the received word is not 0
    #[error("unsupported CLCW version")]
    InvalidVersion,
}

/// Decoded Communications Link Control Word.
///
/// All fields except `no_rf_avail` and `no_bit_lock`, which describe the
/// physical uplink channel, are specific to the reported virtual channel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Clcw {
    /// Mission-specific status field (3 bits)
    pub status_field: u8,
    /// Virtual channel this word reports on (6 bits)
    pub virtual_channel: u8,
    /// No radio frequency carrier available on the uplink
    pub no_rf_avail: bool,
    /// The physical layer has not acquired bit lock
    pub no_bit_lock: bool,
    /// A type-A frame violated the acceptance window; only an Unlock
    /// directive clears this
    pub lockout: bool,
    /// The receiving end cannot currently accept frames
    pub wait: bool,
    /// One or more type-A frames were rejected and must be retransmitted
    pub retransmit: bool,
    /// Two least significant bits of the type-B frame counter
    pub farm_b_counter: u8,
    /// The next expected frame sequence number, V(R)
    pub report_value: u8,
}

impl Clcw {
    /// Packs the word. Fixed fields: version `0b00`, COP-in-effect `0b01`.
    pub fn word(&self) -> u32 {
        (VERSION & 0x3) << 29
            | (u32::from(self.status_field) & 0x7) << 26
            | (COP_IN_EFFECT & 0x3) << 24
            | (u32::from(self.virtual_channel) & 0x3F) << 18
            | u32::from(self.no_rf_avail) << 15
            | u32::from(self.no_bit_lock) << 14
            | u32::from(self.lockout) << 13
            | u32::from(self.wait) << 12
            | u32::from(self.retransmit) << 11
            | (u32::from(self.farm_b_counter) & 0x3) << 9
            | u32::from(self.report_value)
    }

    /// Unpacks a received word, rejecting any version other than 0.
    pub fn extract(word: u32) -> Result<Self, ClcwError> {
        if (word >> 29) & 0x3 != VERSION {
            return Err(ClcwError::InvalidVersion);
        }
        Ok(Self {
            status_field: ((word >> 26) & 0x7) as u8,
            virtual_channel: ((word >> 18) & 0x3F) as u8,
            no_rf_avail: (word >> 15) & 0x1 != 0,
            no_bit_lock: (word >> 14) & 0x1 != 0,
            lockout: (word >> 13) & 0x1 != 0,
            wait: (word >> 12) & 0x1 != 0,
            retransmit: (word >> 11) & 0x1 != 0,
            farm_b_counter: ((word >> 9) & 0x3) as u8,
            report_value: (word & 0xFF) as u8,
        })
    }

    pub fn encode<B: BufMut>(&self, w: &mut B) {
        w.put_u32(self.word());
    }

    pub fn decode<B: Buf>(r: &mut B) -> Result<Self, ClcwError> {
        Self::extract(r.get_u32())
    }
}
