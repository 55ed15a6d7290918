//! Telemetry Transfer Frames (CCSDS 132.0-B-2).
//!
//! TM frames have a fixed, mission-configured size and flow continuously
//! from the spacecraft; idle frames keep the channel filled when there is
//! nothing to say. The Operational Control Field at the tail carries the
//! CLCW that closes the COP-1 loop.

use bytes::Buf;
use tracing::debug;

use crate::clcw;
use crate::frame::{write_fecf, Deframer, FrameLength, FECF_SIZE, FILL};
use crate::EncodeError;

/// Primary header size
pub const PRIMARY_HEADER_SIZE: usize = 6;
/// Size of the Operational Control Field
pub const OCF_SIZE: usize = clcw::SIZE;
/// First-header-pointer value marking an idle frame
pub const IDLE_FIRST_HEADER_POINTER: u16 = 0x7FE;

/// Addressing and counting fields of a TM frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TmFrameHeader {
    /// Source spacecraft (10 bits)
    pub spacecraft_id: u16,
    /// Virtual channel (3 bits)
    pub virtual_channel: u8,
    /// Frame count over all virtual channels
    pub master_frame_count: u8,
    /// Frame count of this virtual channel
    pub virtual_frame_count: u8,
    /// A transfer frame secondary header follows the primary one
    pub secondary_header: bool,
    /// Offset of the first packet starting in this frame (11 bits)
    pub first_header_pointer: u16,
}

/// Receiver of validated TM frames.
pub trait TmFrameSink {
    /// `payload` excludes the header, OCF and FECF; `ocf` is present when
    /// the frame carries one.
    fn on_tm_frame(&mut self, header: &TmFrameHeader, payload: &[u8], ocf: Option<u32>);
}

/// Space left for packet data in a frame of `frame_size` bytes.
pub fn body_size(frame_size: usize, ocf: bool, fecf: bool) -> usize {
    frame_size
        - PRIMARY_HEADER_SIZE
        - if ocf { OCF_SIZE } else { 0 }
        - if fecf { FECF_SIZE } else { 0 }
}

/// Writes a TM frame of exactly `frame_size` bytes to the front of `dest`.
///
/// The body is the payload padded with `0xCA`; an empty payload is valid
/// and produces a frame of pure fill. The OCF region is written when `ocf`
/// is given.
pub fn encode(
    header: &TmFrameHeader,
    payload: &[u8],
    ocf: Option<u32>,
    frame_size: usize,
    fecf: bool,
    dest: &mut [u8],
) -> Result<usize, EncodeError> {
    if dest.len() < frame_size {
        return Err(EncodeError::BufferTooSmall);
    }
    let available = body_size(frame_size, ocf.is_some(), fecf);
    if payload.len() > available {
        return Err(EncodeError::PayloadTooLarge);
    }

    dest[0] = ((header.spacecraft_id >> 4) & 0x3F) as u8;
    dest[1] = ((header.spacecraft_id & 0xF) << 4) as u8
        | (header.virtual_channel & 0x7) << 1
        | u8::from(ocf.is_some());
    dest[2] = header.master_frame_count;
    dest[3] = header.virtual_frame_count;
    dest[4] = u8::from(header.secondary_header) << 7
        | ((header.first_header_pointer >> 8) & 0x7) as u8;
    dest[5] = (header.first_header_pointer & 0xFF) as u8;

    dest[PRIMARY_HEADER_SIZE..PRIMARY_HEADER_SIZE + payload.len()].copy_from_slice(payload);
    dest[PRIMARY_HEADER_SIZE + payload.len()..PRIMARY_HEADER_SIZE + available].fill(FILL);
    if let Some(word) = ocf {
        let at = frame_size - if fecf { FECF_SIZE } else { 0 } - OCF_SIZE;
        dest[at..at + OCF_SIZE].copy_from_slice(&word.to_be_bytes());
    }
    if fecf {
        write_fecf(dest, frame_size - FECF_SIZE);
    }
    Ok(frame_size)
}

/// Writes an idle frame: first-header pointer `0x7FE`, body of pure fill.
pub fn encode_idle(
    header: &TmFrameHeader,
    ocf: Option<u32>,
    frame_size: usize,
    fecf: bool,
    dest: &mut [u8],
) -> Result<usize, EncodeError> {
    let header = TmFrameHeader {
        first_header_pointer: IDLE_FIRST_HEADER_POINTER,
        ..*header
    };
    encode(&header, &[], ocf, frame_size, fecf, dest)
}

/// Incremental TM frame decoder for a stream of fixed-size frames.
pub struct TmDecoder {
    deframer: Deframer,
    frame_size: usize,
    use_ocf: bool,
    fecf: bool,
}

impl TmDecoder {
    pub fn new(frame_size: usize, use_ocf: bool, fecf: bool) -> Self {
        Self {
            deframer: Deframer::new(
                PRIMARY_HEADER_SIZE,
                FrameLength::Fixed(frame_size),
                frame_size,
                fecf,
            ),
            frame_size,
            use_ocf,
            fecf,
        }
    }

    pub fn push<S: TmFrameSink>(&mut self, bytes: &[u8], sink: &mut S) {
        let frame_size = self.frame_size;
        let use_ocf = self.use_ocf;
        let fecf = self.fecf;
        self.deframer.push(bytes, |frame| {
            let header = TmFrameHeader {
                spacecraft_id: u16::from(frame[0] & 0x3F) << 4 | u16::from(frame[1] >> 4),
                virtual_channel: (frame[1] & 0x0E) >> 1,
                master_frame_count: frame[2],
                virtual_frame_count: frame[3],
                secondary_header: frame[4] & 0x80 != 0,
                first_header_pointer: u16::from(frame[4] & 0x7) << 8 | u16::from(frame[5]),
            };
            let ocf_flag = frame[1] & 0x01 != 0;
            let trailer = if fecf { FECF_SIZE } else { 0 };
            let ocf = if use_ocf && ocf_flag {
                let at = frame_size - trailer - OCF_SIZE;
                Some((&frame[at..]).get_u32())
            } else {
                if ocf_flag != use_ocf {
                    debug!(ocf_flag, "OCF flag disagrees with channel configuration");
                }
                None
            };
            let data_end =
                frame_size - trailer - if use_ocf && ocf_flag { OCF_SIZE } else { 0 };
            sink.on_tm_frame(&header, &frame[PRIMARY_HEADER_SIZE..data_end], ocf);
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
