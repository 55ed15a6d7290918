//! FARM-1, the Frame Acceptance and Reporting Mechanism (CCSDS 232.1-B-2).
//!
//! The spacecraft half of COP-1. Each telecommand virtual channel keeps a
//! [`FarmState`]: the next expected frame sequence number V(R), the lockout
//! and retransmit flags, and the type-B counter. Type-A frames are accepted
//! only at V(R); frames ahead of it request a retransmission, frames far
//! outside the window lock the channel until the ground sends an Unlock
//! directive. The state is reported back to the ground in every CLCW.

use tracing::{debug, warn};

use crate::clcw::Clcw;

/// Disposition of a type-A frame against the acceptance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acceptance {
    /// The frame carried V(R); V(R) advanced
    Accepted,
    /// Inside the already-accepted half of the window; dropped quietly
    Duplicate,
    /// Inside the coming half of the window; retransmit flag raised
    OutOfSequence,
    /// Outside the window; the channel just entered lockout
    Lockout,
    /// The channel was already in lockout
    LockedOut,
}

/// COP directives recognized in control-command frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlCommand {
    Unlock,
    SetVr(u8),
}

/// Decodes a control-command frame payload; unknown directives are ignored.
pub(crate) fn parse_control_command(payload: &[u8]) -> Option<ControlCommand> {
    match payload {
        [0x00] => Some(ControlCommand::Unlock),
        [0x82, 0x00, vr] => Some(ControlCommand::SetVr(*vr)),
        _ => {
            debug!(len = payload.len(), "unrecognized control command ignored");
            None
        }
    }
}

/// Per-virtual-channel FARM-1 state.
#[derive(Debug, Clone)]
pub struct FarmState {
    expected_seq: u8,
    farm_b_counter: u8,
    lockout: bool,
    wait: bool,
    retransmit: bool,
    no_rf_avail: bool,
    no_bit_lock: bool,
}

impl Default for FarmState {
    fn default() -> Self {
        Self::new()
    }
}

impl FarmState {
    pub fn new() -> Self {
        Self {
            expected_seq: 0,
            farm_b_counter: 0,
            lockout: false,
            wait: false,
            retransmit: false,
            no_rf_avail: false,
            // nothing received yet, so the physical layer reports no lock
            no_bit_lock: true,
        }
    }

    /// The next expected frame sequence number, V(R).
    pub fn expected_seq(&self) -> u8 {
        self.expected_seq
    }

    pub fn lockout(&self) -> bool {
        self.lockout
    }

    pub fn retransmit(&self) -> bool {
        self.retransmit
    }

    pub fn wait(&self) -> bool {
        self.wait
    }

    pub fn farm_b_counter(&self) -> u8 {
        self.farm_b_counter
    }

    /// Runs the acceptance check for a type-A frame with sequence number
    /// `fsn`. `window` is the sliding window width W.
    ///
    /// The comparison relies on the natural 8-bit rollover: the signed
    /// difference V(R) - N(S) selects between the already-accepted half
    /// `(0, W/2)`, the coming half `[-W/2, 0)` and the lockout region
    /// beyond.
    pub(crate) fn type_a_arrival(&mut self, fsn: u8, window: u16) -> Acceptance {
        if self.lockout {
            return Acceptance::LockedOut;
        }
        let diff = i16::from(self.expected_seq.wrapping_sub(fsn) as i8);
        let half = (window / 2) as i16;
        if diff == 0 {
            self.retransmit = false;
            self.expected_seq = fsn.wrapping_add(1);
            Acceptance::Accepted
        } else if diff > 0 && diff < half {
            Acceptance::Duplicate
        } else if diff < 0 && diff >= -half {
            self.retransmit = true;
            Acceptance::OutOfSequence
        } else {
            warn!(fsn, expected = self.expected_seq, "sequence number outside window, locking out");
            self.lockout = true;
            Acceptance::Lockout
        }
    }

    /// Counts an accepted type-B frame.
    pub(crate) fn type_b_arrival(&mut self) {
        self.farm_b_counter = (self.farm_b_counter + 1) & 0x3;
    }

    pub(crate) fn control_unlock(&mut self) {
        debug!("unlock directive, clearing lockout");
        self.lockout = false;
    }

    pub(crate) fn control_set_vr(&mut self, vr: u8) {
        debug!(vr, "set V(R) directive");
        self.expected_seq = vr;
        self.retransmit = false;
    }

    /// Renders the state into the CLCW reported for `virtual_channel`.
    pub fn clcw(&self, virtual_channel: u8) -> Clcw {
        Clcw {
            status_field: 0,
            virtual_channel,
            no_rf_avail: self.no_rf_avail,
            no_bit_lock: self.no_bit_lock,
            lockout: self.lockout,
            wait: self.wait,
            retransmit: self.retransmit,
            farm_b_counter: self.farm_b_counter,
            report_value: self.expected_seq,
        }
    }
}
