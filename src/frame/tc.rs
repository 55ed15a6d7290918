//! Telecommand Transfer Frames (CCSDS 232.0-B-3).
//!
//! TC frames carry uplink data to the spacecraft. The frame itself has no
//! sync marker; inside a CLTU the decoder is synchronized externally via
//! [`TcDecoder::set_sync`]. Each frame names its spacecraft and virtual
//! channel and carries the frame sequence number the FARM checks.

use tracing::debug;

use crate::frame::{write_fecf, Deframer, FrameLength, FECF_SIZE, FILL, MAX_FRAME_SIZE};
use crate::EncodeError;

/// Primary header size
pub const PRIMARY_HEADER_SIZE: usize = 5;
/// Optional segment header size
pub const SEGMENT_HEADER_SIZE: usize = 1;

/// Sequence flags of the segment header; only the unsegmented form is
/// produced
const NO_SEGMENTATION: u8 = 0b11;

/// Addressing and sequencing fields of a TC frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcFrameHeader {
    /// Type-B frame, accepted without FARM checks
    pub bypass: bool,
    /// Frame carries a COP control command instead of data
    pub control_command: bool,
    /// Destination spacecraft (10 bits)
    pub spacecraft_id: u16,
    /// Virtual channel (6 bits)
    pub virtual_channel: u8,
    /// Per-channel frame sequence number N(S)
    pub frame_seq_number: u8,
    /// Multiplexer access point from the segment header, 0 when absent
    pub map: u8,
}

/// Receiver of validated TC frames.
pub trait TcFrameSink {
    /// `payload` excludes headers and FECF.
    fn on_tc_frame(&mut self, header: &TcFrameHeader, payload: &[u8]);
}

/// Writes a TC frame to the front of `dest`; returns the encoded size.
///
/// Unused destination bytes behind the frame are filled with the `0xCA`
/// pad, so `dest` is normally sized to the configured maximum frame length.
pub fn encode(
    header: &TcFrameHeader,
    payload: &[u8],
    segment_header: bool,
    fecf: bool,
    dest: &mut [u8],
) -> Result<usize, EncodeError> {
    let seg = if segment_header { SEGMENT_HEADER_SIZE } else { 0 };
    let trailer = if fecf { FECF_SIZE } else { 0 };
    if dest.len() < PRIMARY_HEADER_SIZE + seg + 1 + trailer {
        return Err(EncodeError::BufferTooSmall);
    }
    if payload.is_empty() {
        return Err(EncodeError::EmptyPayload);
    }
    let available = dest.len().min(MAX_FRAME_SIZE) - PRIMARY_HEADER_SIZE - seg - trailer;
    if payload.len() > available {
        return Err(EncodeError::PayloadTooLarge);
    }

    let total = PRIMARY_HEADER_SIZE + seg + payload.len() + trailer;
    let length_field = (total - 1) as u16;
    dest[0] = u8::from(header.bypass) << 5
        | u8::from(header.control_command) << 4
        | ((header.spacecraft_id >> 8) & 0x3) as u8;
    dest[1] = (header.spacecraft_id & 0xFF) as u8;
    dest[2] = (header.virtual_channel & 0x3F) << 2 | ((length_field >> 8) & 0x3) as u8;
    dest[3] = (length_field & 0xFF) as u8;
    dest[4] = header.frame_seq_number;
    if segment_header {
        dest[PRIMARY_HEADER_SIZE] = NO_SEGMENTATION << 6 | (header.map & 0x3F);
    }
    let data_start = PRIMARY_HEADER_SIZE + seg;
    dest[data_start..data_start + payload.len()].copy_from_slice(payload);
    dest[data_start + payload.len()..].fill(FILL);
    if fecf {
        write_fecf(dest, data_start + payload.len());
    }
    Ok(total)
}

/// Incremental TC frame decoder.
pub struct TcDecoder {
    deframer: Deframer,
    segment_header: bool,
    fecf: bool,
}

impl TcDecoder {
    pub fn new(max_frame_size: usize, segment_header: bool, fecf: bool) -> Self {
        Self {
            deframer: Deframer::new(
                PRIMARY_HEADER_SIZE,
                FrameLength::FromHeader,
                max_frame_size,
                fecf,
            ),
            segment_header,
            fecf,
        }
    }

    /// Synchronizes the decoder on a frame boundary.
    ///
    /// Must be called when the wrapping protocol signals a start of
    /// transmission; TC frames carry no marker of their own.
    pub fn set_sync(&mut self) {
        self.deframer.set_sync();
    }

    pub fn push<S: TcFrameSink>(&mut self, bytes: &[u8], sink: &mut S) {
        let segment_header = self.segment_header;
        let fecf = self.fecf;
        self.deframer.push(bytes, |frame| {
            let seg = if segment_header { SEGMENT_HEADER_SIZE } else { 0 };
            let trailer = if fecf { FECF_SIZE } else { 0 };
            let data_start = PRIMARY_HEADER_SIZE + seg;
            let data_end = frame.len() - trailer;
            if data_end < data_start {
                debug!(len = frame.len(), "frame too short for its headers");
                return;
            }
            let header = TcFrameHeader {
                bypass: frame[0] & 0x20 != 0,
                control_command: frame[0] & 0x10 != 0,
                spacecraft_id: u16::from(frame[0] & 0x3) << 8 | u16::from(frame[1]),
                virtual_channel: frame[2] >> 2,
                frame_seq_number: frame[4],
                map: if segment_header {
                    frame[PRIMARY_HEADER_SIZE] & 0x3F
                } else {
                    0
                },
            };
            sink.on_tc_frame(&header, &frame[data_start..data_end]);
        });
    }

    pub fn sync_error_count(&self) -> u16 {
        self.deframer.sync_error_count()
    }

    pub fn checksum_error_count(&self) -> u16 {
        self.deframer.checksum_error_count()
    }

    pub fn overflow_error_count(&self) -> u16 {
        self.deframer.overflow_error_count()
    }

    pub fn clear_error_counters(&mut self) {
        self.deframer.clear_error_counters();
    }
}
