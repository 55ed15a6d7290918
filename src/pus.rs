//! Telecommand secondary header of the Packet Utilization Standard
//! (ECSS-E-70-41A).
//!
//! The PUS layer sits inside a telecommand Space Packet and routes the
//! command to a service/subservice pair, carrying the acknowledgement
//! reports the sender asked for.

use tracing::debug;

use crate::crc::crc16_ccitt;
use crate::EncodeError;

/// Smallest header carrying the flags, service, subservice and source ID
pub const MIN_HEADER_SIZE: usize = 4;
/// Header size used when none is configured
pub const DEFAULT_HEADER_SIZE: usize = 5;

const PUS_VERSION: u8 = 0b001;

/// Acknowledgement reports requested by a telecommand.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AckFlags {
    /// Report acceptance of the command
    pub acceptance: bool,
    /// Report start of execution
    pub start: bool,
    /// Report progress of execution
    pub progress: bool,
    /// Report completion of execution
    pub completion: bool,
}

impl AckFlags {
    fn bits(self) -> u8 {
        u8::from(self.completion) << 3
            | u8::from(self.progress) << 2
            | u8::from(self.start) << 1
            | u8::from(self.acceptance)
    }

    fn from_bits(bits: u8) -> Self {
        Self {
            acceptance: bits & 0x1 != 0,
            start: bits & 0x2 != 0,
            progress: bits & 0x4 != 0,
            completion: bits & 0x8 != 0,
        }
    }
}

/// The standard service types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Service {
    TelecommandVerification = 1,
    DeviceCommandDistribution = 2,
    HousekeepingAndDiagnosticDataReporting = 3,
    ParameterStatisticsReporting = 4,
    EventReporting = 5,
    MemoryManagement = 6,
    FunctionManagement = 8,
    TimeManagement = 9,
    OnboardOperationsScheduling = 11,
    OnboardMonitoring = 12,
    LargeDataTransfer = 13,
    PacketForwardingControl = 14,
    OnboardStorageAndRetrieval = 15,
    Test = 17,
    OnboardOperationsProcedure = 18,
    EventAction = 19,
}

impl From<Service> for u8 {
    fn from(service: Service) -> u8 {
        service as u8
    }
}

/// Parsed telecommand secondary header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcHeader {
    pub acks: AckFlags,
    pub service: u8,
    pub subservice: u8,
    pub source_id: u8,
}

impl TcHeader {
    /// Writes the header at its configured size to the front of `dest`.
    ///
    /// Byte 0 carries the CCSDS-secondary-header flag (always custom), the
    /// PUS version and the ack flags; service, subservice and source ID
    /// follow, then zero-filled spare bytes up to `header_size`.
    pub fn encode(&self, header_size: usize, dest: &mut [u8]) -> Result<usize, EncodeError> {
        if header_size < MIN_HEADER_SIZE || dest.len() < header_size {
            return Err(EncodeError::BufferTooSmall);
        }
        dest[0] = PUS_VERSION << 4 | self.acks.bits();
        dest[1] = self.service;
        dest[2] = self.subservice;
        dest[3] = self.source_id;
        dest[4..header_size].fill(0);
        Ok(header_size)
    }
}

/// Receiver of parsed telecommands.
pub trait PusTcSink {
    fn on_pus_tc(&mut self, header: &TcHeader, payload: &[u8]);
}

/// Parses a complete telecommand data field.
///
/// `buf` is the data field of a telecommand Space Packet; everything after
/// the configured header is the application payload. Short input is dropped.
pub fn parse<S: PusTcSink>(buf: &[u8], header_size: usize, sink: &mut S) {
    let header_size = header_size.max(MIN_HEADER_SIZE);
    if buf.len() < header_size {
        debug!(len = buf.len(), "telecommand shorter than its header");
        return;
    }
    let header = TcHeader {
        acks: AckFlags::from_bits(buf[0] & 0x0F),
        service: buf[1],
        subservice: buf[2],
        source_id: buf[3],
    };
    sink.on_pus_tc(&header, &buf[header_size..]);
}

/// The packet error control word, CRC-CCITT-16 over the preceding bytes.
///
/// Deployments choose between a PEC trailer and no checksum at all; this
/// crate computes the word but does not append or verify it implicitly.
pub fn crc16(data: &[u8]) -> u16 {
    crc16_ccitt(data)
}
