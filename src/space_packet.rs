//! Space Packets (CCSDS 133.0-B-2).
//!
//! The application layer of the stack: variable-length packets addressed by
//! an 11-bit APID, multiplexed into the fixed-size Transfer Frames below
//! them. Idle packets on the reserved APID `0x7FF` fill the space a real
//! packet leaves in a TM frame.

use bytes::BufMut;
use tracing::trace;

use crate::{saturating_inc, EncodeError};

/// Primary header size
pub const HEADER_SIZE: usize = 6;
/// APID reserved for idle packets
pub const IDLE_APID: u16 = 0x7FF;
/// Fill pattern of an idle packet's payload
pub const IDLE_FILL: u8 = 0xFF;

/// Direction of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Telemetry = 0,
    Telecommand = 1,
}

/// Position of a packet within a segmented exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceFlags {
    Continuation = 0b00,
    First = 0b01,
    Last = 0b10,
    Unsegmented = 0b11,
}

impl SequenceFlags {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0b00 => SequenceFlags::Continuation,
            0b01 => SequenceFlags::First,
            0b10 => SequenceFlags::Last,
            _ => SequenceFlags::Unsegmented,
        }
    }
}

/// Decoded primary header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpacePacketHeader {
    pub packet_type: PacketType,
    pub sequence_flags: SequenceFlags,
    /// Application process identifier (11 bits)
    pub apid: u16,
    /// Per-APID sequence count (14 bits)
    pub sequence_count: u16,
    pub has_secondary_header: bool,
}

impl SpacePacketHeader {
    /// `data_length` is the full data field: secondary header plus payload.
    fn encode<B: BufMut>(&self, data_length: usize, w: &mut B) {
        debug_assert!((1..=0x10000).contains(&data_length));
        w.put_u8(
            (self.packet_type as u8) << 4
                | u8::from(self.has_secondary_header) << 3
                | ((self.apid >> 8) & 0x7) as u8,
        );
        w.put_u8((self.apid & 0xFF) as u8);
        w.put_u16((self.sequence_flags as u16) << 14 | (self.sequence_count & 0x3FFF));
        w.put_u16((data_length - 1) as u16);
    }
}

/// Writes a packet to the front of `dest`; returns the encoded size.
pub fn encode(
    packet_type: PacketType,
    sequence_flags: SequenceFlags,
    apid: u16,
    sequence_count: u16,
    secondary_header: Option<&[u8]>,
    payload: &[u8],
    dest: &mut [u8],
) -> Result<usize, EncodeError> {
    let secondary = secondary_header.unwrap_or(&[]);
    if payload.is_empty() {
        return Err(EncodeError::EmptyPayload);
    }
    let data_length = secondary.len() + payload.len();
    if data_length > 0x10000 {
        return Err(EncodeError::PayloadTooLarge);
    }
    if dest.len() < HEADER_SIZE + data_length {
        return Err(EncodeError::BufferTooSmall);
    }

    let header = SpacePacketHeader {
        packet_type,
        sequence_flags,
        apid,
        sequence_count,
        has_secondary_header: !secondary.is_empty(),
    };
    let mut w = &mut dest[..];
    header.encode(data_length, &mut w);
    dest[HEADER_SIZE..HEADER_SIZE + secondary.len()].copy_from_slice(secondary);
    dest[HEADER_SIZE + secondary.len()..HEADER_SIZE + data_length].copy_from_slice(payload);
    Ok(HEADER_SIZE + data_length)
}

/// Writes an idle packet of exactly `target_size` bytes to the front of
/// `dest`.
///
/// Idle packets are unsegmented telemetry on the reserved APID with an
/// all-`0xFF` payload; the sequence count is tracked by the caller like any
/// other APID.
pub fn encode_idle(
    sequence_count: u16,
    target_size: usize,
    dest: &mut [u8],
) -> Result<usize, EncodeError> {
    if target_size < HEADER_SIZE + 1 || dest.len() < target_size {
        return Err(EncodeError::BufferTooSmall);
    }

    let header = SpacePacketHeader {
        packet_type: PacketType::Telemetry,
        sequence_flags: SequenceFlags::Unsegmented,
        apid: IDLE_APID,
        sequence_count,
        has_secondary_header: false,
    };
    let mut w = &mut dest[..];
    header.encode(target_size - HEADER_SIZE, &mut w);
    dest[HEADER_SIZE..target_size].fill(IDLE_FILL);
    Ok(target_size)
}

/// Receiver of completed packets.
pub trait SpacePacketSink {
    /// `payload` is the full data field including any secondary header;
    /// `header.has_secondary_header` tells whether one is present.
    fn on_space_packet(&mut self, header: &SpacePacketHeader, payload: &[u8]);
}

/// Byte-incremental Space Packet parser.
///
/// The cursor walks the six header bytes, then the declared data field. A
/// packet whose data field exceeds the buffer configured at construction is
/// counted as one overflow error and discarded at its end, keeping the
/// parser aligned with the stream.
pub struct Parser {
    index: usize,
    header: SpacePacketHeader,
    /// Value of the packet data length field (data field size minus one)
    data_length: u16,
    data: Vec<u8>,
    overflow: bool,
    sync_error_count: u16,
    overflow_error_count: u16,
}

impl Parser {
    pub fn new(max_data_size: usize) -> Self {
        Self {
            index: 0,
            header: SpacePacketHeader {
                packet_type: PacketType::Telemetry,
                sequence_flags: SequenceFlags::Unsegmented,
                apid: 0,
                sequence_count: 0,
                has_secondary_header: false,
            },
            data_length: 0,
            data: vec![0; max_data_size],
            overflow: false,
            sync_error_count: 0,
            overflow_error_count: 0,
        }
    }

    /// Discards any partially received packet.
    ///
    /// Called from outside when the layer below loses the stream (checksum
    /// failure, frame sequence break). Counts one sync error if a packet was
    /// in progress.
    pub fn reset(&mut self) {
        if self.index > 0 {
            saturating_inc(&mut self.sync_error_count);
        }
        self.index = 0;
        self.overflow = false;
    }

    pub fn push<S: SpacePacketSink>(&mut self, bytes: &[u8], sink: &mut S) {
        for &byte in bytes {
            match self.index {
                0 => {
                    self.header.packet_type = if byte & 0x10 != 0 {
                        PacketType::Telecommand
                    } else {
                        PacketType::Telemetry
                    };
                    self.header.has_secondary_header = byte & 0x08 != 0;
                    self.header.apid = u16::from(byte & 0x07) << 8;
                }
                1 => self.header.apid |= u16::from(byte),
                2 => {
                    self.header.sequence_flags = SequenceFlags::from_bits(byte >> 6);
                    self.header.sequence_count = u16::from(byte & 0x3F) << 8;
                }
                3 => self.header.sequence_count |= u16::from(byte),
                4 => self.data_length = u16::from(byte) << 8,
                5 => self.data_length |= u16::from(byte),
                _ => {
                    let at = self.index - HEADER_SIZE;
                    if at < self.data.len() {
                        self.data[at] = byte;
                    } else {
                        if !self.overflow {
                            saturating_inc(&mut self.overflow_error_count);
                        }
                        self.overflow = true;
                    }
                }
            }
            self.index += 1;
            if self.index >= HEADER_SIZE
                && self.index >= HEADER_SIZE + usize::from(self.data_length) + 1
            {
                if !self.overflow {
                    let data = &self.data[..usize::from(self.data_length) + 1];
                    sink.on_space_packet(&self.header, data);
                } else {
                    trace!(
                        apid = self.header.apid,
                        length = usize::from(self.data_length) + 1,
                        "dropping oversized space packet"
                    );
                }
                self.index = 0;
                self.overflow = false;
            }
        }
    }

    pub fn sync_error_count(&self) -> u16 {
        self.sync_error_count
    }

    pub fn overflow_error_count(&self) -> u16 {
        self.overflow_error_count
    }

    pub fn clear_error_counters(&mut self) {
        self.sync_error_count = 0;
        self.overflow_error_count = 0;
    }
}
