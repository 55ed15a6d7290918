//! The two ends of the link.
//!
//! [`Spacecraft`] receives telecommands (CLTU → TC frame → FARM → space
//! packet) and emits telemetry; [`Ground`] is the mirror image. Each owns
//! the per-virtual-channel state of its side and the error counters of the
//! layers below it. Outputs are delivered through a handler trait passed
//! into every call, so the coordinators hold no callbacks and borrow
//! nothing between calls.

use crate::clcw::Clcw;
use crate::space_packet::SpacePacketHeader;

mod ground;
mod space;

pub use ground::Ground;
pub use space::Spacecraft;

/// Events produced by the spacecraft coordinator.
pub trait SpacecraftHandler {
    /// A telecommand space packet passed all acceptance checks on
    /// `virtual_channel`. `payload` includes any secondary header.
    fn on_space_packet(&mut self, virtual_channel: u8, header: &SpacePacketHeader, payload: &[u8]);

    /// Downlink bytes ready for the transmitter; each telemetry frame
    /// arrives as one ASM slice followed by one frame slice.
    fn on_tm_bytes(&mut self, bytes: &[u8]);
}

/// Events produced by the ground coordinator.
pub trait GroundHandler {
    /// A telemetry space packet was received on `virtual_channel`.
    fn on_space_packet(&mut self, virtual_channel: u8, header: &SpacePacketHeader, payload: &[u8]);

    /// A CLCW arrived in the OCF of a frame on `virtual_channel`.
    fn on_clcw(&mut self, virtual_channel: u8, clcw: Clcw) {
        let _ = (virtual_channel, clcw);
    }

    /// Uplink bytes ready for the transmitter: a whole CLTU, or an ASM
    /// slice followed by a frame slice when CLTU wrapping is off.
    fn on_tc_bytes(&mut self, bytes: &[u8]);
}
